//! Ledger adapter for a permissioned, fee-less EVM node.
//!
//! A [`Connection`] carries TLS and bearer-token settings; a [`Contract`]
//! binds an ABI to an address over it and offers read calls, signed
//! transactions, receipt decoding and historical event queries. Failures
//! coming back from the node are normalized into [`BlockchainError`].

pub mod config;
pub mod ethereum;

pub use ethereum::{
    canonical::{canonicalize_json, canonicalize_str},
    connection::{Connection, NodeProvider, TlsMode},
    contract::Contract,
    error::{BlockchainError, ConnectionError, Error, ErrorKind, Result},
    BlockDetails, CallValue, EventDetails, EventRecord, Execution, FunctionCall, Response,
    TransactionDetails,
};
