//! ABI binding: function lookup, call encoding and pre-resolved event decoders.

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, EventExt, FunctionExt, JsonAbiExt, Specifier},
    json_abi::{Event, EventParam, Function, JsonAbi},
    primitives::{Bytes, LogData, B256},
};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

use super::codec;
use super::error::{BlockchainError, Error, ErrorKind, Result};

/// A contract ABI bound once, with every event decoder resolved up front.
#[derive(Debug, Clone)]
pub struct BoundAbi {
    abi: JsonAbi,
    events: Vec<EventDecoder>,
    event_index: HashMap<String, usize>,
}

impl BoundAbi {
    /// Binds a decoded ABI document.
    ///
    /// Accepts either the bare ABI array or an artifact object with an `abi`
    /// member. Events keep the order they are declared in.
    pub fn from_json(document: &Value) -> Result<Self> {
        let entries = match document {
            Value::Array(_) => document,
            Value::Object(obj) => obj
                .get("abi")
                .ok_or_else(|| Error::Configuration("ABI object has no 'abi' member".into()))?,
            _ => return Err(Error::Configuration("ABI must be a JSON array".into())),
        };

        let abi: JsonAbi = serde_json::from_value(entries.clone())
            .map_err(|e| Error::Configuration(format!("Failed to parse ABI JSON: {}", e)))?;

        let mut events = Vec::new();
        let mut event_index = HashMap::new();
        for entry in entries.as_array().into_iter().flatten() {
            if entry.get("type").and_then(Value::as_str) != Some("event") {
                continue;
            }
            let event: Event = serde_json::from_value(entry.clone()).map_err(|e| {
                Error::Configuration(format!("Failed to parse ABI event: {}", e))
            })?;
            event_index.entry(event.name.clone()).or_insert(events.len());
            events.push(EventDecoder::new(event));
        }

        debug!(
            "Bound ABI with {} functions and {} events",
            abi.functions().count(),
            events.len()
        );

        Ok(Self {
            abi,
            events,
            event_index,
        })
    }

    /// Event decoders in declaration order.
    pub fn events(&self) -> &[EventDecoder] {
        &self.events
    }

    pub fn event(&self, name: &str) -> Option<&EventDecoder> {
        self.event_index.get(name).map(|&i| &self.events[i])
    }

    pub fn event_names(&self) -> Vec<&str> {
        self.events.iter().map(|e| e.name()).collect()
    }

    /// Finds a function by name, using the argument count to pick between overloads.
    pub fn function(&self, name: &str, arg_count: usize) -> Result<&Function> {
        let candidates = self.abi.function(name).ok_or_else(|| {
            let available: Vec<&str> = self.abi.functions().map(|f| f.name.as_str()).collect();
            if available.is_empty() {
                Error::Validation(format!(
                    "Function '{}' not found. The contract ABI contains no functions.",
                    name
                ))
            } else {
                Error::Validation(format!(
                    "Function '{}' not found in contract ABI. Available functions: {}",
                    name,
                    available.join(", ")
                ))
            }
        })?;

        match candidates.as_slice() {
            [only] => Ok(only),
            overloads => overloads
                .iter()
                .find(|f| f.inputs.len() == arg_count)
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "No overload of '{}' takes {} parameters",
                        name, arg_count
                    ))
                }),
        }
    }

    /// Encodes calldata for a function from positional or named JSON parameters.
    pub fn encode_call(&self, function: &Function, parameters: &Value) -> Result<Bytes> {
        let expected = || -> String {
            function
                .inputs
                .iter()
                .map(|input| format!("{}: {}", input.name, input.ty))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let raw: Vec<&Value> = match parameters {
            Value::Null => Vec::new(),
            Value::Array(params) => params.iter().collect(),
            Value::Object(obj) => function
                .inputs
                .iter()
                .map(|input| {
                    obj.get(&input.name).ok_or_else(|| {
                        Error::Validation(format!(
                            "Missing required parameter '{}' of type '{}' for function '{}'. Expected parameters: {{{}}}",
                            input.name,
                            input.ty,
                            function.name,
                            expected()
                        ))
                    })
                })
                .collect::<Result<_>>()?,
            other => {
                return Err(Error::Validation(format!(
                    "Invalid parameter format for function '{}'. Expected an array or an object, got {}",
                    function.name, other
                )))
            }
        };

        if raw.len() != function.inputs.len() {
            return Err(Error::Validation(format!(
                "Parameter count mismatch for function '{}': expected {} parameters, got {}. Expected parameters: [{}]",
                function.name,
                function.inputs.len(),
                raw.len(),
                expected()
            )));
        }

        let mut values = Vec::with_capacity(raw.len());
        for (i, (input, value)) in function.inputs.iter().zip(raw).enumerate() {
            let ty: DynSolType = input.resolve().map_err(|e| {
                Error::Validation(format!("Unsupported parameter type '{}': {}", input.ty, e))
            })?;
            let value = codec::from_json(value, &ty).map_err(|e| {
                Error::Validation(format!(
                    "Invalid parameter #{} ('{}' of type '{}'): {}",
                    i + 1,
                    input.name,
                    input.ty,
                    e
                ))
            })?;
            values.push(value);
        }

        let encoded = function.abi_encode_input(&values).map_err(|e| {
            Error::Validation(format!("Failed to encode function inputs: {}", e))
        })?;
        Ok(encoded.into())
    }

    /// Decodes the return data of a read call into normalized JSON.
    pub fn decode_output(&self, function: &Function, data: &[u8]) -> Result<Value> {
        if data.is_empty() {
            return Ok(Value::Null);
        }
        let decoded = function.abi_decode_output(data, false).map_err(|e| {
            BlockchainError::new(
                ErrorKind::Decode,
                format!("Failed to decode output of '{}': {}", function.name, e),
            )
        })?;
        Ok(codec::outputs_to_json(&decoded))
    }
}

/// Logs carry at most four topics.
pub const MAX_TOPICS: usize = 4;

/// Decoder for one ABI event, resolved when the ABI is bound.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    event: Event,
    selector: B256,
}

impl EventDecoder {
    fn new(event: Event) -> Self {
        let selector = event.selector();
        Self { event, selector }
    }

    pub fn name(&self) -> &str {
        &self.event.name
    }

    pub fn selector(&self) -> B256 {
        self.selector
    }

    pub fn is_anonymous(&self) -> bool {
        self.event.anonymous
    }

    /// Whether a log's topics identify this event.
    pub fn matches(&self, topics: &[B256]) -> bool {
        !self.event.anonymous && topics.first() == Some(&self.selector)
    }

    /// Decodes a log into a field map keyed by input name.
    pub fn decode(&self, log: &LogData) -> std::result::Result<Map<String, Value>, String> {
        let decoded = self
            .event
            .decode_log(log, true)
            .map_err(|e| format!("Failed to decode event '{}': {}", self.event.name, e))?;

        let mut indexed = decoded.indexed.iter();
        let mut body = decoded.body.iter();
        let mut fields = Map::new();
        for (i, input) in self.event.inputs.iter().enumerate() {
            let value = if input.indexed {
                indexed.next()
            } else {
                body.next()
            };
            let value = value.ok_or_else(|| {
                format!("Event '{}' is missing input #{}", self.event.name, i)
            })?;
            fields.insert(field_name(input, i), codec::to_json(value));
        }
        Ok(fields)
    }

    /// Splits argument filters into topic filters for indexed inputs and
    /// value filters applied to decoded non-indexed inputs.
    pub fn log_filter(&self, filters: &Map<String, Value>) -> Result<LogFilter> {
        let mut filter = LogFilter::default();
        let first_topic = if self.event.anonymous { 0 } else { 1 };

        for (name, wanted) in filters {
            let (position, input) = self
                .event
                .inputs
                .iter()
                .enumerate()
                .find(|(i, input)| field_name(input, *i) == *name)
                .ok_or_else(|| {
                    Error::Validation(format!(
                        "Event '{}' has no input named '{}'",
                        self.event.name, name
                    ))
                })?;

            let ty: DynSolType = input.resolve().map_err(|e| {
                Error::Validation(format!("Unsupported input type '{}': {}", input.ty, e))
            })?;
            let values = filter_values(wanted, &ty)
                .into_iter()
                .map(|v| codec::from_json(v, &ty))
                .collect::<std::result::Result<Vec<DynSolValue>, _>>()
                .map_err(|e| {
                    Error::Validation(format!("Invalid filter value for '{}': {}", name, e))
                })?;

            if input.indexed {
                let slot = first_topic
                    + self.event.inputs[..position]
                        .iter()
                        .filter(|p| p.indexed)
                        .count();
                if slot >= MAX_TOPICS {
                    return Err(Error::Validation(format!(
                        "Input '{}' of event '{}' is not stored in a log topic and cannot be filtered",
                        name, self.event.name
                    )));
                }
                let topics = values
                    .iter()
                    .map(codec::topic)
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| Error::Validation(format!("Invalid filter for '{}': {}", name, e)))?;
                filter.topics.push((slot, topics));
            } else {
                filter
                    .fields
                    .push((name.clone(), values.iter().map(codec::to_json).collect()));
            }
        }

        Ok(filter)
    }
}

/// Argument filters resolved against an event's inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    /// Topic slot and the accepted topic values for it.
    pub topics: Vec<(usize, Vec<B256>)>,
    /// Non-indexed field name and the accepted normalized values.
    pub fields: Vec<(String, Vec<Value>)>,
}

impl LogFilter {
    /// Applies the non-indexed field filters to a decoded event.
    pub fn accepts(&self, args: &Map<String, Value>) -> bool {
        self.fields.iter().all(|(name, accepted)| {
            args.get(name)
                .map(|actual| accepted.contains(actual))
                .unwrap_or(false)
        })
    }
}

fn field_name(input: &EventParam, position: usize) -> String {
    if input.name.is_empty() {
        format!("arg{}", position)
    } else {
        input.name.clone()
    }
}

/// A JSON list for a non-list input means "any of these values".
fn filter_values<'a>(wanted: &'a Value, ty: &DynSolType) -> Vec<&'a Value> {
    match (wanted, ty) {
        (Value::Array(options), ty)
            if !matches!(
                ty,
                DynSolType::Array(_) | DynSolType::FixedArray(..) | DynSolType::Tuple(_)
            ) =>
        {
            options.iter().collect()
        }
        (single, _) => vec![single],
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::primitives::{keccak256, Address, U256};
    use serde_json::json;

    pub(crate) fn hash_manager_abi() -> Value {
        json!([
            {
                "type": "function",
                "name": "add",
                "inputs": [{"name": "hashValue", "type": "bytes32", "internalType": "bytes32"}],
                "outputs": [],
                "stateMutability": "nonpayable"
            },
            {
                "type": "function",
                "name": "read",
                "inputs": [{"name": "hashValue", "type": "bytes32", "internalType": "bytes32"}],
                "outputs": [
                    {"name": "exists", "type": "bool", "internalType": "bool"},
                    {"name": "owner", "type": "address", "internalType": "address"},
                    {"name": "links", "type": "bytes32[]", "internalType": "bytes32[]"}
                ],
                "stateMutability": "view"
            },
            {
                "type": "event",
                "name": "HashDeprecated",
                "anonymous": false,
                "inputs": [
                    {"name": "hashValue", "type": "bytes32", "indexed": true, "internalType": "bytes32"},
                    {"name": "note", "type": "bytes", "indexed": false, "internalType": "bytes"}
                ]
            },
            {
                "type": "event",
                "name": "HashAdded",
                "anonymous": false,
                "inputs": [
                    {"name": "hashValue", "type": "bytes32", "indexed": true, "internalType": "bytes32"},
                    {"name": "owner", "type": "address", "indexed": true, "internalType": "address"},
                    {"name": "count", "type": "uint256", "indexed": false, "internalType": "uint256"}
                ]
            }
        ])
    }

    #[test]
    fn test_events_keep_declaration_order() {
        let abi = BoundAbi::from_json(&hash_manager_abi()).unwrap();
        assert_eq!(abi.event_names(), vec!["HashDeprecated", "HashAdded"]);
        assert!(abi.event("HashAdded").is_some());
        assert!(abi.event("Missing").is_none());
    }

    #[test]
    fn test_artifact_object_is_accepted() {
        let artifact = json!({"address": "0x00", "abi": hash_manager_abi()});
        let abi = BoundAbi::from_json(&artifact).unwrap();
        assert_eq!(abi.events().len(), 2);
        assert!(BoundAbi::from_json(&json!("nope")).is_err());
    }

    #[test]
    fn test_function_lookup() {
        let abi = BoundAbi::from_json(&hash_manager_abi()).unwrap();
        assert!(abi.function("add", 1).is_ok());
        let err = abi.function("remove", 1).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("Available functions"));
    }

    #[test]
    fn test_encode_call_with_positional_and_named_parameters() {
        let abi = BoundAbi::from_json(&hash_manager_abi()).unwrap();
        let function = abi.function("add", 1).unwrap();
        let hash = format!("0x{}", "ab".repeat(32));

        let positional = abi.encode_call(function, &json!([hash])).unwrap();
        let named = abi.encode_call(function, &json!({"hashValue": hash})).unwrap();
        assert_eq!(positional, named);
        assert_eq!(&positional[..4], function.selector().as_slice());
        assert_eq!(&positional[4..], [0xab; 32].as_slice());

        assert!(abi.encode_call(function, &json!([])).is_err());
        assert!(abi.encode_call(function, &json!({"other": hash})).is_err());
    }

    #[test]
    fn test_decode_output_normalizes_bytes() {
        let abi = BoundAbi::from_json(&hash_manager_abi()).unwrap();
        let function = abi.function("read", 1).unwrap();
        let owner = Address::repeat_byte(0x11);
        let output = DynSolValue::Tuple(vec![
            DynSolValue::Bool(true),
            DynSolValue::Address(owner),
            DynSolValue::Array(vec![DynSolValue::FixedBytes(B256::repeat_byte(0x01), 32)]),
        ])
        .abi_encode_params();

        let value = abi.decode_output(function, &output).unwrap();
        assert_eq!(
            value,
            json!([true, owner.to_checksum(None), [format!("0x{}", "01".repeat(32))]])
        );
        assert_eq!(abi.decode_output(function, &[]).unwrap(), Value::Null);
    }

    #[test]
    fn test_event_decode() {
        let abi = BoundAbi::from_json(&hash_manager_abi()).unwrap();
        let decoder = abi.event("HashAdded").unwrap();
        let hash = B256::repeat_byte(0x42);
        let owner = Address::repeat_byte(0x07);
        let data = DynSolValue::Uint(U256::from(3u64), 256).abi_encode();
        let log = LogData::new_unchecked(
            vec![decoder.selector(), hash, owner.into_word()],
            data.into(),
        );

        assert!(decoder.matches(log.topics()));
        let fields = decoder.decode(&log).unwrap();
        assert_eq!(fields["hashValue"], json!(format!("0x{}", "42".repeat(32))));
        assert_eq!(fields["owner"], json!(owner.to_checksum(None)));
        assert_eq!(fields["count"], json!("3"));

        let other = abi.event("HashDeprecated").unwrap();
        assert!(!other.matches(log.topics()));
    }

    #[test]
    fn test_log_filter_splits_indexed_and_plain_inputs() {
        let abi = BoundAbi::from_json(&hash_manager_abi()).unwrap();
        let decoder = abi.event("HashAdded").unwrap();
        let hash = format!("0x{}", "aa".repeat(32));
        let owner = Address::repeat_byte(0x07);

        let filters = json!({
            "owner": owner.to_checksum(None),
            "hashValue": [hash, format!("0x{}", "bb".repeat(32))],
            "count": "3"
        });
        let filter = decoder.log_filter(filters.as_object().unwrap()).unwrap();

        assert!(filter
            .topics
            .contains(&(1, vec![B256::repeat_byte(0xaa), B256::repeat_byte(0xbb)])));
        assert!(filter.topics.contains(&(2, vec![owner.into_word()])));
        assert_eq!(filter.fields, vec![("count".to_string(), vec![json!("3")])]);

        let mut args = Map::new();
        args.insert("count".into(), json!("3"));
        assert!(filter.accepts(&args));
        args.insert("count".into(), json!("4"));
        assert!(!filter.accepts(&args));
    }

    #[test]
    fn test_log_filter_rejects_unknown_input() {
        let abi = BoundAbi::from_json(&hash_manager_abi()).unwrap();
        let decoder = abi.event("HashDeprecated").unwrap();
        let filters = json!({"missing": "0x00"});
        let err = decoder.log_filter(filters.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_log_filter_rejects_input_past_last_topic() {
        let abi = json!([{
            "type": "event",
            "name": "Quad",
            "anonymous": false,
            "inputs": [
                {"name": "a", "type": "uint256", "indexed": true},
                {"name": "b", "type": "uint256", "indexed": true},
                {"name": "c", "type": "uint256", "indexed": true},
                {"name": "d", "type": "uint256", "indexed": true}
            ]
        }]);
        let abi = BoundAbi::from_json(&abi).unwrap();
        let decoder = abi.event("Quad").unwrap();

        let filters = json!({"c": "1"});
        let filter = decoder.log_filter(filters.as_object().unwrap()).unwrap();
        assert_eq!(filter.topics[0].0, 3);

        let filters = json!({"d": "1"});
        let err = decoder.log_filter(filters.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_dynamic_indexed_filter_is_hashed() {
        let abi = json!([{
            "type": "event",
            "name": "Named",
            "anonymous": false,
            "inputs": [{"name": "label", "type": "string", "indexed": true}]
        }]);
        let abi = BoundAbi::from_json(&abi).unwrap();
        let decoder = abi.event("Named").unwrap();
        let filters = json!({"label": "hello"});
        let filter = decoder.log_filter(filters.as_object().unwrap()).unwrap();
        assert_eq!(filter.topics, vec![(1, vec![keccak256("hello")])]);
    }
}
