//! Mock node used by the unit tests: a wiremock server answering JSON-RPC by
//! method name and echoing request ids back.

use alloy::primitives::{Address, B256};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use super::codec::to_hex;

pub(crate) enum Reply {
    Result(Value),
    Error {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

type Handler = Arc<dyn Fn(&Value) -> Reply + Send + Sync>;

#[derive(Clone, Default)]
pub(crate) struct RpcResponder {
    handlers: HashMap<String, Handler>,
}

impl RpcResponder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn handler<F>(mut self, rpc_method: &str, f: F) -> Self
    where
        F: Fn(&Value) -> Reply + Send + Sync + 'static,
    {
        self.handlers.insert(rpc_method.to_string(), Arc::new(f));
        self
    }

    pub(crate) fn result(self, rpc_method: &str, value: Value) -> Self {
        self.handler(rpc_method, move |_| Reply::Result(value.clone()))
    }

    pub(crate) fn error(self, rpc_method: &str, code: i64, message: &str, data: Option<Value>) -> Self {
        let message = message.to_string();
        self.handler(rpc_method, move |_| Reply::Error {
            code,
            message: message.clone(),
            data: data.clone(),
        })
    }

    /// Answers with each value in turn, then keeps repeating the last one.
    pub(crate) fn sequence(self, rpc_method: &str, values: Vec<Value>) -> Self {
        let calls = AtomicUsize::new(0);
        self.handler(rpc_method, move |_| {
            let i = calls.fetch_add(1, Ordering::SeqCst);
            let value = values.get(i).or_else(|| values.last()).cloned();
            Reply::Result(value.unwrap_or(Value::Null))
        })
    }

    pub(crate) async fn mount(self, server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(self)
            .mount(server)
            .await;
    }

    /// Answers only requests carrying the bearer token; everything else gets 401.
    pub(crate) async fn mount_with_bearer(self, server: &MockServer, token: &str) {
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("authorization", format!("Bearer {}", token).as_str()))
            .respond_with(self)
            .with_priority(1)
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(401).set_body_string("missing or invalid token"))
            .mount(server)
            .await;
    }
}

impl Respond for RpcResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let id = body["id"].clone();
        let rpc_method = body["method"].as_str().unwrap_or_default();
        let params = body.get("params").cloned().unwrap_or(Value::Null);

        let reply = match self.handlers.get(rpc_method) {
            Some(handler) => handler(&params),
            None => Reply::Error {
                code: -32601,
                message: format!("the method {} does not exist/is not available", rpc_method),
                data: None,
            },
        };

        let payload = match reply {
            Reply::Result(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Reply::Error {
                code,
                message,
                data,
            } => {
                let mut error = json!({"code": code, "message": message});
                if let Some(data) = data {
                    error["data"] = data;
                }
                json!({"jsonrpc": "2.0", "id": id, "error": error})
            }
        };
        ResponseTemplate::new(200).set_body_json(payload)
    }
}

/// Params of every JSON-RPC request the server saw for a method.
pub(crate) async fn rpc_calls(server: &MockServer, rpc_method: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|request| serde_json::from_slice::<Value>(&request.body).ok())
        .filter(|body| body["method"] == rpc_method)
        .map(|body| body["params"].clone())
        .collect()
}

pub(crate) fn quantity(n: u64) -> Value {
    json!(format!("0x{:x}", n))
}

pub(crate) fn block_hash(number: u64) -> B256 {
    B256::left_padding_from(&number.to_be_bytes())
}

pub(crate) struct TestLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub transaction_index: u64,
    pub log_index: u64,
}

pub(crate) fn log_json(log: &TestLog) -> Value {
    json!({
        "address": log.address.to_checksum(None),
        "topics": log.topics.iter().map(to_hex).collect::<Vec<_>>(),
        "data": to_hex(&log.data),
        "blockHash": to_hex(block_hash(log.block_number)),
        "blockNumber": quantity(log.block_number),
        "transactionHash": to_hex(log.transaction_hash),
        "transactionIndex": quantity(log.transaction_index),
        "logIndex": quantity(log.log_index),
        "removed": false
    })
}

pub(crate) fn receipt_json(
    transaction_hash: B256,
    from: Address,
    to: Address,
    block_number: u64,
    success: bool,
    logs: Vec<Value>,
) -> Value {
    json!({
        "type": "0x0",
        "status": if success { "0x1" } else { "0x0" },
        "cumulativeGasUsed": quantity(30_000),
        "logs": logs,
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "transactionHash": to_hex(transaction_hash),
        "transactionIndex": "0x0",
        "blockHash": to_hex(block_hash(block_number)),
        "blockNumber": quantity(block_number),
        "gasUsed": quantity(30_000),
        "effectiveGasPrice": "0x0",
        "from": from.to_checksum(None),
        "to": to.to_checksum(None),
        "contractAddress": null
    })
}
