pub mod abi;
pub mod canonical;
pub mod codec;
pub mod connection;
pub mod contract;
pub mod error;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Function name plus JSON arguments, positional (array) or named (object).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub function_name: String,
    #[serde(default)]
    pub parameters: Value,
}

impl FunctionCall {
    pub fn new(function_name: impl Into<String>, parameters: Value) -> Self {
        Self {
            function_name: function_name.into(),
            parameters,
        }
    }
}

/// Decoded result of a read-only call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallValue {
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDetails {
    pub block_hash: String,
    pub block_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub transaction_hash: String,
    pub from_address: String,
    pub to_address: Option<String>,
    pub gas_used: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDetails {
    pub event_name: String,
    pub event_results: Map<String, Value>,
}

/// Decoded transaction receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// "1" on success, "0" on failure.
    pub status: String,
    pub block: BlockDetails,
    pub transaction: TransactionDetails,
    pub events: Vec<EventDetails>,
}

/// One historical event, as returned by `Contract::get_events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub address: String,
    pub block_hash: String,
    pub block_number: String,
    pub event_name: String,
    pub event_args: Map<String, Value>,
    pub transaction_hash: String,
    pub transaction_index: String,
    pub log_index: String,
}

/// Outcome of `Contract::execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "result", rename_all = "snake_case")]
pub enum Execution {
    /// Accepted by the node; carries the transaction hash.
    Submitted(String),
    /// Mined; carries the decoded receipt.
    Confirmed(Response),
}

impl Execution {
    pub fn transaction_hash(&self) -> &str {
        match self {
            Execution::Submitted(hash) => hash,
            Execution::Confirmed(response) => &response.transaction.transaction_hash,
        }
    }
}
