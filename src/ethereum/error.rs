//! Error taxonomy and normalization of node failures.
//!
//! Every failure that comes back from the node, whatever call produced it
//! (estimation, broadcast, receipt lookup, log query), is folded into a single
//! [`BlockchainError`] carrying a readable message. Failures that never reach
//! the node are reported as [`Error::Validation`] or [`Error::Configuration`].

use alloy::{
    sol_types::{Panic, Revert, SolError},
    transports::{RpcError, TransportErrorKind},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type used throughout the adapter.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level adapter error.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller arguments violate a precondition. Raised before any I/O.
    #[error("{0}")]
    Validation(String),

    /// The connection cannot be built as requested.
    #[error("{0}")]
    Configuration(String),

    /// Session, authentication or liveness failure.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Normalized node or contract failure.
    #[error(transparent)]
    Blockchain(#[from] BlockchainError),
}

impl Error {
    /// Returns the normalized blockchain error, if this is one.
    pub fn as_blockchain(&self) -> Option<&BlockchainError> {
        match self {
            Error::Blockchain(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RpcError<TransportErrorKind>> for Error {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        Error::Blockchain(BlockchainError::from_rpc(&err))
    }
}

/// Session-level failures.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Authentication failed for user '{username}' at {url}: {reason}")]
    Authentication {
        username: String,
        url: String,
        reason: String,
    },

    #[error("Node at {url} not live after {timeout:?}. GET {liveness_url}: {last_error}")]
    NotLive {
        url: String,
        liveness_url: String,
        timeout: Duration,
        last_error: String,
    },

    #[error("Transaction {tx_hash} not mined at {url} after {timeout:?}: {last_error}")]
    ReceiptTimeout {
        tx_hash: String,
        url: String,
        timeout: Duration,
        last_error: String,
    },
}

/// Which failure shape a [`BlockchainError`] was normalized from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorKind {
    /// JSON-RPC error object returned by the node.
    Rpc { code: i64 },
    /// Execution reverted, during estimation or a read call.
    Revert,
    /// HTTP or connection level failure.
    Transport,
    /// Request or response could not be (de)serialized or ABI-decoded.
    Decode,
    /// Transaction could not be built or signed locally.
    Signing,
    /// A failure shape the normalizer does not recognize.
    Unclassified,
}

/// The single normalized error shape for node and contract failures.
///
/// `status` is always 0: the node exposes no structured code channel below the
/// message that callers could rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct BlockchainError {
    pub message: String,
    pub status: i32,
    pub kind: ErrorKind,
}

impl BlockchainError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: 0,
            kind,
        }
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unclassified, message)
    }

    /// Normalizes a transport error according to its shape.
    pub fn from_rpc(err: &RpcError<TransportErrorKind>) -> Self {
        match err {
            RpcError::ErrorResp(payload) => {
                let message = payload.message.to_string();
                let reason = payload
                    .data
                    .as_ref()
                    .and_then(|raw| revert_data(raw.get()))
                    .and_then(|data| revert_reason(&data));

                match reason {
                    Some(reason) if !message.contains(&reason) => Self::new(
                        ErrorKind::Revert,
                        format!("execution reverted: {}", reason),
                    ),
                    Some(_) => Self::new(ErrorKind::Revert, message),
                    None if message.to_lowercase().contains("revert") => {
                        Self::new(ErrorKind::Revert, message)
                    }
                    None => Self::new(
                        ErrorKind::Rpc {
                            code: payload.code,
                        },
                        message,
                    ),
                }
            }
            RpcError::Transport(kind) => Self::new(ErrorKind::Transport, kind.to_string()),
            RpcError::NullResp => Self::new(ErrorKind::Decode, "Node returned a null response"),
            RpcError::SerError(e) => Self::new(ErrorKind::Decode, e.to_string()),
            RpcError::DeserError { err, text } => Self::new(
                ErrorKind::Decode,
                format!("Failed to decode node response: {} ({})", err, text),
            ),
            #[allow(unreachable_patterns)]
            other => Self::unclassified(other.to_string()),
        }
    }
}

impl From<RpcError<TransportErrorKind>> for BlockchainError {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        Self::from_rpc(&err)
    }
}

/// Extracts raw revert bytes from an error payload's `data` member.
///
/// Nodes send either a hex string or an object wrapping one under `data`.
fn revert_data(raw: &str) -> Option<Vec<u8>> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    let hex_str = match &value {
        serde_json::Value::String(s) => s.as_str(),
        serde_json::Value::Object(obj) => obj.get("data")?.as_str()?,
        _ => return None,
    };
    hex::decode(hex_str.strip_prefix("0x").unwrap_or(hex_str)).ok()
}

/// Decodes `Error(string)` or `Panic(uint256)` revert data.
fn revert_reason(data: &[u8]) -> Option<String> {
    if let Ok(revert) = Revert::abi_decode(data, true) {
        return Some(revert.reason);
    }
    if let Ok(panic) = Panic::abi_decode(data, true) {
        return Some(panic.to_string());
    }
    None
}
