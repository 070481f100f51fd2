use alloy::{
    primitives::{Address, B256},
    rpc::types::BlockNumberOrTag,
};
use std::str::FromStr;

use super::error::{Error, Result};

/// Validates and parses a contract or account address.
pub fn validate_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(Error::Validation("Address cannot be empty".to_string()));
    }

    if !address.starts_with("0x") && !address.starts_with("0X") {
        return Err(Error::Validation(format!(
            "Invalid address format: '{}'. Addresses must start with '0x'",
            address
        )));
    }

    if address.len() != 42 {
        return Err(Error::Validation(format!(
            "Invalid address length: '{}'. Addresses must be exactly 42 characters (0x + 40 hex characters)",
            address
        )));
    }

    if !address[2..].chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::Validation(format!(
            "Invalid address format: '{}'. Contains non-hexadecimal characters",
            address
        )));
    }

    Address::from_str(address)
        .map_err(|e| Error::Validation(format!("Invalid address: '{}'. Error: {}", address, e)))
}

/// Validates a Solidity function identifier.
pub fn validate_function_name(function_name: &str) -> Result<()> {
    let mut chars = function_name.chars();
    let Some(first) = chars.next() else {
        return Err(Error::Validation("Function name cannot be empty".to_string()));
    };

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(Error::Validation(format!(
            "Invalid function name: '{}'. Function names must start with a letter or underscore",
            function_name
        )));
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::Validation(format!(
            "Invalid function name: '{}'. Function names can only contain letters, numbers, and underscores",
            function_name
        )));
    }

    Ok(())
}

/// Validates a 32-byte transaction hash.
pub fn validate_tx_hash(tx_hash: &str) -> Result<B256> {
    let tx_hash = tx_hash.trim();
    if tx_hash.len() != 66 || !tx_hash.starts_with("0x") {
        return Err(Error::Validation(format!(
            "Invalid transaction hash: '{}'. Expected 0x followed by 64 hex characters",
            tx_hash
        )));
    }
    B256::from_str(tx_hash)
        .map_err(|e| Error::Validation(format!("Invalid transaction hash: '{}'. Error: {}", tx_hash, e)))
}

/// Parses a block bound: a decimal or `0x` number, or one of the named tags.
pub fn parse_block(block: &str) -> Result<BlockNumberOrTag> {
    let block = block.trim();
    let parsed = match block {
        "latest" => Some(BlockNumberOrTag::Latest),
        "earliest" => Some(BlockNumberOrTag::Earliest),
        "pending" => Some(BlockNumberOrTag::Pending),
        "safe" => Some(BlockNumberOrTag::Safe),
        "finalized" => Some(BlockNumberOrTag::Finalized),
        _ => match block.strip_prefix("0x") {
            Some(digits) => u64::from_str_radix(digits, 16).ok(),
            None => block.parse::<u64>().ok(),
        }
        .map(BlockNumberOrTag::Number),
    };
    parsed.ok_or_else(|| {
        Error::Validation(format!(
            "Invalid block: '{}'. Use a block number or one of latest, earliest, pending, safe, finalized",
            block
        ))
    })
}
