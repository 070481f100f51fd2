use alloy::{
    eips::eip2718::Encodable2718,
    json_abi::Function,
    network::{EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes},
    providers::Provider,
    rpc::types::{BlockNumberOrTag, Filter, Log, Topic, TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::RpcError,
};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{
    abi::{BoundAbi, EventDecoder, LogFilter},
    codec::to_hex,
    connection::{Connection, NodeProvider},
    error::{BlockchainError, ConnectionError, Error, ErrorKind, Result},
    utils, BlockDetails, CallValue, EventDetails, EventRecord, Execution, FunctionCall, Response,
    TransactionDetails,
};

pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A deployed contract bound to its ABI over one connection.
#[derive(Clone)]
pub struct Contract {
    provider: NodeProvider,
    address: Address,
    abi: BoundAbi,
    node_url: String,
    receipt_timeout: Duration,
    receipt_poll_interval: Duration,
}

impl Contract {
    pub fn new(connection: &Connection, address: &str, abi: &Value) -> Result<Self> {
        let address = utils::validate_address(address)?;
        let abi = BoundAbi::from_json(abi)?;

        debug!("Bound contract {} at {}", address, connection.url());
        Ok(Self {
            provider: connection.get_provider(),
            address,
            abi,
            node_url: connection.url().to_string(),
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
        })
    }

    /// Overrides how long and how often `wait_for_receipt` polls.
    pub fn with_receipt_polling(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.receipt_timeout = timeout;
        self.receipt_poll_interval = poll_interval;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn event_names(&self) -> Vec<&str> {
        self.abi.event_names()
    }

    /// Read-only invocation. Nothing is signed and no gas is spent.
    pub async fn call(&self, function_call: &FunctionCall) -> Result<CallValue> {
        let (function, input) = self.encode(function_call)?;

        let tx = TransactionRequest::default()
            .with_to(self.address)
            .with_input(input);
        let output = self.provider.call(&tx).await?;

        let value = self.abi.decode_output(function, &output)?;
        Ok(CallValue { value })
    }

    /// Signs a transaction locally and broadcasts it.
    ///
    /// With `synchronous` set, waits for the receipt and returns it decoded;
    /// otherwise returns the hash as soon as the node has accepted it.
    /// Concurrent calls with the same key are not coordinated and may pick
    /// the same nonce.
    pub async fn execute(
        &self,
        function_call: &FunctionCall,
        private_key: &str,
        synchronous: bool,
    ) -> Result<Execution> {
        let signer = parse_signer(private_key)?;
        let from = signer.address();
        let (_, input) = self.encode(function_call)?;

        let nonce = self.provider.get_transaction_count(from).await?;
        let chain_id = self.provider.get_chain_id().await?;

        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(self.address)
            .with_input(input)
            .with_nonce(nonce)
            .with_chain_id(chain_id)
            .with_gas_price(0);

        // A failing estimate means the call would revert; it is never broadcast.
        let estimate = self.provider.estimate_gas(&tx).await?;
        let gas_limit = estimate * 12 / 10;
        debug!(
            "Estimated {} gas for '{}', using limit {}",
            estimate, function_call.function_name, gas_limit
        );

        let wallet = EthereumWallet::from(signer);
        let envelope = tx.with_gas_limit(gas_limit).build(&wallet).await.map_err(|e| {
            BlockchainError::new(
                ErrorKind::Signing,
                format!("Failed to sign transaction: {}", e),
            )
        })?;

        let pending = self
            .provider
            .send_raw_transaction(&envelope.encoded_2718())
            .await?;
        let tx_hash = to_hex(pending.tx_hash());
        info!(
            "Submitted '{}' to {} from {} with nonce {}: {}",
            function_call.function_name, self.address, from, nonce, tx_hash
        );

        if !synchronous {
            return Ok(Execution::Submitted(tx_hash));
        }
        let response = self.wait_for_receipt(&tx_hash).await?;
        Ok(Execution::Confirmed(response))
    }

    /// Polls for a transaction's receipt and decodes it.
    ///
    /// Missing receipts and transport failures are retried until the deadline;
    /// an error answer from the node is returned immediately.
    pub async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Response> {
        let hash = utils::validate_tx_hash(tx_hash)?;
        let deadline = Instant::now() + self.receipt_timeout;
        let mut last_error = "receipt not available yet".to_string();

        loop {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => return Ok(self.decode_receipt(&receipt)),
                Ok(None) => last_error = "receipt not available yet".to_string(),
                Err(err @ RpcError::ErrorResp(_)) => return Err(err.into()),
                Err(err) => last_error = BlockchainError::from_rpc(&err).message,
            }

            if Instant::now() >= deadline {
                return Err(ConnectionError::ReceiptTimeout {
                    tx_hash: tx_hash.to_string(),
                    url: self.node_url.clone(),
                    timeout: self.receipt_timeout,
                    last_error,
                }
                .into());
            }
            debug!("Waiting for receipt of {}: {}", tx_hash, last_error);
            sleep(self.receipt_poll_interval).await;
        }
    }

    /// Queries historical events emitted by this contract.
    ///
    /// Argument filters need an event name. Without one, every ABI event is
    /// queried and the results are merged in chain order.
    pub async fn get_events(
        &self,
        from_block: u64,
        to_block: BlockNumberOrTag,
        event_name: Option<&str>,
        argument_filters: Option<&Map<String, Value>>,
    ) -> Result<Vec<EventRecord>> {
        let Some(name) = event_name else {
            if argument_filters.is_some() {
                return Err(Error::Validation(
                    "argument_filters requires a specific event_name".to_string(),
                ));
            }

            let mut records = Vec::new();
            for decoder in self.abi.events().iter().filter(|d| !d.is_anonymous()) {
                let filter = self.log_filter(decoder, from_block, to_block);
                records.extend(self.query_events(decoder, &filter, None).await?);
            }
            records.sort_by_key(|(position, _)| *position);
            return Ok(records.into_iter().map(|(_, record)| record).collect());
        };

        let decoder = self.abi.event(name).ok_or_else(|| {
            Error::Validation(format!("Event '{}' not found in contract ABI", name))
        })?;

        let mut filter = self.log_filter(decoder, from_block, to_block);
        let arguments = match argument_filters.filter(|filters| !filters.is_empty()) {
            Some(filters) => Some(decoder.log_filter(filters)?),
            None => None,
        };
        if let Some(arguments) = &arguments {
            for (slot, topics) in &arguments.topics {
                filter.topics[*slot] = Topic::from(topics.clone());
            }
        }

        let records = self.query_events(decoder, &filter, arguments.as_ref()).await?;
        Ok(records.into_iter().map(|(_, record)| record).collect())
    }

    fn encode(&self, function_call: &FunctionCall) -> Result<(&Function, Bytes)> {
        utils::validate_function_name(&function_call.function_name)?;
        let arg_count = match &function_call.parameters {
            Value::Array(params) => params.len(),
            Value::Object(params) => params.len(),
            _ => 0,
        };
        let function = self.abi.function(&function_call.function_name, arg_count)?;
        let input = self.abi.encode_call(function, &function_call.parameters)?;
        Ok((function, input))
    }

    fn log_filter(&self, decoder: &EventDecoder, from_block: u64, to_block: BlockNumberOrTag) -> Filter {
        let filter = Filter::new()
            .address(self.address)
            .from_block(from_block)
            .to_block(to_block);
        if decoder.is_anonymous() {
            filter
        } else {
            filter.event_signature(decoder.selector())
        }
    }

    async fn query_events(
        &self,
        decoder: &EventDecoder,
        filter: &Filter,
        arguments: Option<&LogFilter>,
    ) -> Result<Vec<((u64, u64, u64), EventRecord)>> {
        let logs = self.provider.get_logs(filter).await?;
        debug!("Fetched {} '{}' logs", logs.len(), decoder.name());

        let mut records = Vec::with_capacity(logs.len());
        for log in logs {
            let args = decoder
                .decode(log.data())
                .map_err(|e| BlockchainError::new(ErrorKind::Decode, e))?;
            if arguments.map_or(true, |filter| filter.accepts(&args)) {
                records.push(event_record(decoder.name(), &log, args));
            }
        }
        Ok(records)
    }

    fn decode_receipt(&self, receipt: &TransactionReceipt) -> Response {
        let logs = receipt.inner.logs();
        let mut events = Vec::new();

        for decoder in self.abi.events() {
            for log in logs.iter().filter(|log| decoder.matches(log.topics())) {
                match decoder.decode(log.data()) {
                    Ok(event_results) => events.push(EventDetails {
                        event_name: decoder.name().to_string(),
                        event_results,
                    }),
                    Err(e) => warn!(
                        "Skipping log {} of {}: {}",
                        log.log_index.unwrap_or_default(),
                        to_hex(receipt.transaction_hash),
                        e
                    ),
                }
            }
        }

        Response {
            status: if receipt.status() { "1" } else { "0" }.to_string(),
            block: BlockDetails {
                block_hash: to_hex(receipt.block_hash.unwrap_or_default()),
                block_number: receipt.block_number.unwrap_or_default().to_string(),
            },
            transaction: TransactionDetails {
                transaction_hash: to_hex(receipt.transaction_hash),
                from_address: receipt.from.to_checksum(None),
                to_address: receipt.to.map(|to| to.to_checksum(None)),
                gas_used: receipt.gas_used.to_string(),
            },
            events,
        }
    }
}

impl std::fmt::Debug for Contract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contract")
            .field("address", &self.address)
            .field("node_url", &self.node_url)
            .field("events", &self.abi.event_names())
            .finish()
    }
}

fn parse_signer(private_key: &str) -> Result<PrivateKeySigner> {
    let private_key = private_key.trim();
    let private_key = private_key.strip_prefix("0x").unwrap_or(private_key);
    // The key itself must never end up in an error message.
    PrivateKeySigner::from_str(private_key)
        .map_err(|_| Error::Validation("Invalid private key".to_string()))
}

fn event_record(event_name: &str, log: &Log, event_args: Map<String, Value>) -> ((u64, u64, u64), EventRecord) {
    let block_number = log.block_number.unwrap_or_default();
    let transaction_index = log.transaction_index.unwrap_or_default();
    let log_index = log.log_index.unwrap_or_default();

    let record = EventRecord {
        address: log.address().to_checksum(None),
        block_hash: to_hex(log.block_hash.unwrap_or_default()),
        block_number: block_number.to_string(),
        event_name: event_name.to_string(),
        event_args,
        transaction_hash: to_hex(log.transaction_hash.unwrap_or_default()),
        transaction_index: transaction_index.to_string(),
        log_index: log_index.to_string(),
    };
    ((block_number, transaction_index, log_index), record)
}
