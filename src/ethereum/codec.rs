//! Conversions between ABI values and the JSON shapes exposed to callers.
//!
//! Outward, every byte-string at any depth becomes a lowercase `0x` hex
//! string, integers become decimal strings and addresses are checksummed.
//! Inward, JSON arguments are coerced to ABI values by the declared parameter
//! type, which is the only place hex strings are turned back into bytes.

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, Word},
    primitives::{keccak256, Address, B256, I256, U256},
};
use serde_json::Value;
use std::str::FromStr;

/// Formats raw bytes as a lowercase `0x`-prefixed hex string.
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parses a hex string, with or without the `0x` prefix.
pub fn from_hex(value: &str) -> Result<Vec<u8>, String> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    hex::decode(digits).map_err(|_| format!("Invalid hex string: {}", value))
}

/// Converts a decoded ABI value to JSON, hex-normalizing byte-strings recursively.
pub fn to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(num, _) => Value::String(num.to_string()),
        DynSolValue::Uint(num, _) => Value::String(num.to_string()),
        DynSolValue::Address(addr) => Value::String(addr.to_checksum(None)),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Bytes(bytes) => Value::String(to_hex(bytes)),
        DynSolValue::FixedBytes(word, size) => Value::String(to_hex(&word[..*size])),
        DynSolValue::Function(function) => Value::String(to_hex(function)),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(to_json).collect())
        }
        #[allow(unreachable_patterns)]
        other => Value::String(to_hex(other.abi_encode())),
    }
}

/// Converts a list of function outputs the way callers expect them:
/// nothing becomes `null`, a single output is unwrapped, several form an array.
pub fn outputs_to_json(values: &[DynSolValue]) -> Value {
    match values {
        [] => Value::Null,
        [single] => to_json(single),
        many => Value::Array(many.iter().map(to_json).collect()),
    }
}

/// Coerces a JSON argument into an ABI value of the given type.
pub fn from_json(value: &Value, ty: &DynSolType) -> Result<DynSolValue, String> {
    match ty {
        DynSolType::Address => {
            let addr_str = value
                .as_str()
                .ok_or_else(|| "Address must be a string".to_string())?;
            let address = Address::from_str(addr_str)
                .map_err(|e| format!("Invalid address '{}': {}", addr_str, e))?;
            Ok(DynSolValue::Address(address))
        }
        DynSolType::Bool => {
            let b = value
                .as_bool()
                .ok_or_else(|| "Bool parameter must be a boolean".to_string())?;
            Ok(DynSolValue::Bool(b))
        }
        DynSolType::Uint(bits) => {
            let num = match value {
                Value::Number(n) => n
                    .as_u64()
                    .map(U256::from)
                    .ok_or_else(|| format!("Invalid uint value: {}", n))?,
                Value::String(s) => parse_uint(s)?,
                _ => return Err("Uint must be a number or string".to_string()),
            };
            if num.bit_len() > *bits {
                return Err(format!("Value {} does not fit in uint{}", num, bits));
            }
            Ok(DynSolValue::Uint(num, *bits))
        }
        DynSolType::Int(bits) => {
            let num = match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => I256::from_dec_str(&n.to_string())
                    .map_err(|_| format!("Invalid int value: {}", n))?,
                Value::String(s) => parse_int(s)?,
                _ => return Err("Int must be an integer number or string".to_string()),
            };
            let shift = 256usize.saturating_sub(*bits);
            if num > I256::MAX.asr(shift) || num < I256::MIN.asr(shift) {
                return Err(format!("Value {} does not fit in int{}", num, bits));
            }
            Ok(DynSolValue::Int(num, *bits))
        }
        DynSolType::String => {
            let s = value
                .as_str()
                .ok_or_else(|| "String parameter must be a string".to_string())?;
            Ok(DynSolValue::String(s.to_string()))
        }
        DynSolType::Bytes => {
            let hex_str = value
                .as_str()
                .ok_or_else(|| "Bytes must be a hex string".to_string())?;
            Ok(DynSolValue::Bytes(from_hex(hex_str)?))
        }
        DynSolType::FixedBytes(size) => {
            let hex_str = value
                .as_str()
                .ok_or_else(|| "Bytes must be a hex string".to_string())?;
            let bytes = from_hex(hex_str)?;
            if bytes.len() > *size {
                return Err(format!(
                    "Value {} is {} bytes long, expected at most {}",
                    hex_str,
                    bytes.len(),
                    size
                ));
            }
            let mut word = Word::ZERO;
            word[..bytes.len()].copy_from_slice(&bytes);
            Ok(DynSolValue::FixedBytes(word, *size))
        }
        DynSolType::Array(inner) => {
            let items = value
                .as_array()
                .ok_or_else(|| "Array parameter must be an array".to_string())?;
            let values = items
                .iter()
                .map(|item| from_json(item, inner))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DynSolValue::Array(values))
        }
        DynSolType::FixedArray(inner, len) => {
            let items = value
                .as_array()
                .ok_or_else(|| "Array parameter must be an array".to_string())?;
            if items.len() != *len {
                return Err(format!("Expected {} array elements, got {}", len, items.len()));
            }
            let values = items
                .iter()
                .map(|item| from_json(item, inner))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DynSolValue::FixedArray(values))
        }
        DynSolType::Tuple(types) => {
            let items = value
                .as_array()
                .ok_or_else(|| "Tuple parameter must be an array".to_string())?;
            if items.len() != types.len() {
                return Err(format!(
                    "Expected {} tuple elements, got {}",
                    types.len(),
                    items.len()
                ));
            }
            let values = items
                .iter()
                .zip(types)
                .map(|(item, ty)| from_json(item, ty))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DynSolValue::Tuple(values))
        }
        other => Err(format!("Unsupported Solidity type: {}", other)),
    }
}

/// Computes the log topic an indexed event argument is stored under.
///
/// Value types are stored as their 32-byte word, `string` and `bytes` as the
/// keccak256 of their contents.
pub fn topic(value: &DynSolValue) -> Result<B256, String> {
    match value {
        DynSolValue::Bytes(bytes) => Ok(keccak256(bytes)),
        DynSolValue::String(s) => Ok(keccak256(s.as_bytes())),
        other => other
            .as_word()
            .ok_or_else(|| "Indexed arrays and tuples cannot be used as filters".to_string()),
    }
}

fn parse_uint(s: &str) -> Result<U256, String> {
    let parsed = match s.strip_prefix("0x") {
        Some(digits) => U256::from_str_radix(digits, 16),
        None => U256::from_str_radix(s, 10),
    };
    parsed.map_err(|_| format!("Invalid uint string: {}", s))
}

fn parse_int(s: &str) -> Result<I256, String> {
    let parsed = if s.starts_with("0x") || s.starts_with("-0x") {
        I256::from_hex_str(s)
    } else {
        I256::from_dec_str(s)
    };
    parsed.map_err(|_| format!("Invalid int string: {}", s))
}
