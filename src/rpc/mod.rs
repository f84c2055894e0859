//! Ethereum JSON-RPC backend
//!
//! `EthRpc` implements both the wallet-provider and the contract boundary on top of any
//! [`JsonRpc`] transport:
//!
//! | Boundary | Methods |
//! |----------|---------|
//! | wallet | `eth_requestAccounts` (falls back to `eth_accounts`), `eth_accounts`, `eth_chainId` |
//! | contract reads | `eth_call` |
//! | contract write | `eth_sendTransaction`, then `eth_getTransactionReceipt` polling |
//! | live events | `eth_blockNumber` + `eth_getLogs` polling from the last history head |
//!
//! Transports: `WsTransport` (native, tokio-tungstenite) and the browser's EIP-1193
//! provider (`wasm::Eip1193`).

#[cfg(feature = "native")]
mod ws;

#[cfg(feature = "native")]
pub use ws::{LinkState, WsTransport};

use crate::client::ClientConfig;
use crate::contract::abi::{self, ContractAbi};
use crate::contract::{FeedbackContract, RawFeedback, Receipt};
use crate::core::methods::eth;
use crate::core::{Account, ChainId, TxRef};
use crate::error::{ClientError, RpcError};
use crate::runtime;
use crate::session::{ProviderEvent, WalletProvider};
use alloy_primitives::B256;
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::LocalBoxStream;
use futures::StreamExt;
use serde_json::{json, Value};
use std::cell::Cell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, warn};

/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND: i64 = -32601;

/// One request/response call plus optional provider-pushed notifications.
#[async_trait(?Send)]
pub trait JsonRpc {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// Transports without push notifications leave the sink unused.
    fn listen(&self, sink: mpsc::UnboundedSender<ProviderEvent>) {
        let _ = sink;
    }
}

pub struct EthRpc<T> {
    transport: Rc<T>,
    contract: String,
    abi: ContractAbi,
    poll_interval: Duration,
    /// Head observed just before the latest history read. Logs after it may be missing
    /// from that history, so a fresh poller starts there.
    history_head: Rc<Cell<Option<u64>>>,
}

impl<T: JsonRpc + 'static> EthRpc<T> {
    pub fn new(transport: T, config: &ClientConfig) -> Result<Self, ClientError> {
        let contract = config.contract()?;
        Ok(Self {
            transport: Rc::new(transport),
            contract: contract.to_string().to_lowercase(),
            abi: ContractAbi::new(
                &config.abi.write_method,
                &config.abi.read_method,
                &config.abi.count_method,
            ),
            poll_interval: config.poll_interval,
            history_head: Rc::new(Cell::new(None)),
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn call(&self, data: Vec<u8>) -> Result<Vec<u8>, RpcError> {
        let params = json!([{"to": self.contract, "data": to_hex(&data)}, "latest"]);
        let value = self.transport.request(eth::CALL, params).await?;
        bytes(&value)
    }
}

#[async_trait(?Send)]
impl<T: JsonRpc + 'static> WalletProvider for EthRpc<T> {
    async fn request_accounts(&self) -> Result<Vec<Account>, RpcError> {
        match self.transport.request(eth::REQUEST_ACCOUNTS, json!([])).await {
            Ok(value) => accounts(value),
            // Dev nodes without a permission prompt.
            Err(RpcError::Rpc { code: METHOD_NOT_FOUND, .. }) => self.get_accounts().await,
            Err(e) => Err(e),
        }
    }

    async fn get_accounts(&self) -> Result<Vec<Account>, RpcError> {
        accounts(self.transport.request(eth::ACCOUNTS, json!([])).await?)
    }

    async fn chain_id(&self) -> Result<ChainId, RpcError> {
        chain_id(&self.transport.request(eth::CHAIN_ID, json!([])).await?)
    }

    fn listen(&self, sink: mpsc::UnboundedSender<ProviderEvent>) {
        self.transport.listen(sink);
    }
}

#[async_trait(?Send)]
impl<T: JsonRpc + 'static> FeedbackContract for EthRpc<T> {
    async fn fetch_all(&self) -> Result<Vec<RawFeedback>, RpcError> {
        let head = match self.transport.request(eth::BLOCK_NUMBER, json!([])).await {
            Ok(value) => quantity(&value).ok(),
            Err(e) => {
                debug!("no head before history read: {}", e);
                None
            }
        };
        let items = abi::decode_feedback_list(&self.call(self.abi.encode_read()).await?)?;
        if head.is_some() {
            self.history_head.set(head);
        }
        Ok(items)
    }

    async fn count(&self) -> Result<u64, RpcError> {
        abi::decode_count(&self.call(self.abi.encode_count()).await?)
    }

    async fn send(&self, from: &Account, message: &str) -> Result<TxRef, RpcError> {
        let tx = json!({
            "from": from.as_str(),
            "to": self.contract,
            "data": to_hex(&self.abi.encode_write(message)),
        });
        let hash = self.transport.request(eth::SEND_TRANSACTION, json!([tx])).await?;
        hash.as_str()
            .map(|h| TxRef(h.to_string()))
            .ok_or_else(|| RpcError::Decode(format!("transaction hash: {}", hash)))
    }

    async fn receipt(&self, tx: &TxRef) -> Result<Receipt, RpcError> {
        loop {
            let value = self.transport.request(eth::TRANSACTION_RECEIPT, json!([tx.0])).await?;
            if value.is_null() {
                runtime::sleep(self.poll_interval).await;
                continue;
            }
            // Receipts without `status` predate Byzantium and carry no failure flag.
            let success = match value.get("status") {
                Some(status) if !status.is_null() => quantity(status)? == 1,
                _ => true,
            };
            let block_number = value.get("blockNumber").and_then(|b| quantity(b).ok());
            return Ok(Receipt { tx: tx.clone(), success, block_number });
        }
    }

    fn new_entries(&self) -> LocalBoxStream<'static, RawFeedback> {
        // A new stream belongs to a new binding; the history read that follows re-anchors it.
        self.history_head.set(None);
        let poller = LogPoller {
            transport: self.transport.clone(),
            contract: self.contract.clone(),
            topic: to_hex(abi::event_topic().as_slice()),
            interval: self.poll_interval,
            history_head: self.history_head.clone(),
            cursor: None,
            buffered: VecDeque::new(),
        };
        futures::stream::unfold(poller, |mut poller| async move {
            let item = poller.next().await;
            Some((item, poller))
        })
        .boxed_local()
    }
}

/// Polls `eth_getLogs` for `NewFeedback`.
///
/// The first successful poll starts right after the head the history read saw, or at the
/// current head itself when no history was read yet. Either way the boundary overlaps
/// history and the store's dedup absorbs the repeats.
struct LogPoller<T> {
    transport: Rc<T>,
    contract: String,
    topic: String,
    interval: Duration,
    history_head: Rc<Cell<Option<u64>>>,
    cursor: Option<u64>,
    buffered: VecDeque<RawFeedback>,
}

impl<T: JsonRpc> LogPoller<T> {
    async fn next(&mut self) -> RawFeedback {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return item;
            }
            if let Err(e) = self.poll().await {
                warn!("log poll failed: {}", e);
            }
            if self.buffered.is_empty() {
                runtime::sleep(self.interval).await;
            }
        }
    }

    async fn poll(&mut self) -> Result<(), RpcError> {
        let head = quantity(&self.transport.request(eth::BLOCK_NUMBER, json!([])).await?)?;
        let from = match (self.cursor, self.history_head.get()) {
            (Some(cursor), _) => cursor,
            (None, Some(seen)) => (seen + 1).min(head),
            (None, None) => head,
        };
        self.cursor = Some(from);
        if from > head {
            return Ok(());
        }
        let filter = json!({
            "address": self.contract,
            "topics": [self.topic],
            "fromBlock": format!("{:#x}", from),
            "toBlock": format!("{:#x}", head),
        });
        let logs = self.transport.request(eth::GET_LOGS, json!([filter])).await?;
        let logs = logs
            .as_array()
            .ok_or_else(|| RpcError::Decode("eth_getLogs result is not an array".into()))?;
        for log in logs {
            if log.get("removed").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            match decode_log(log) {
                Ok(raw) => self.buffered.push_back(raw),
                Err(e) => warn!("skipping undecodable log: {}", e),
            }
        }
        debug!("blocks {}..={}: {} new entries", from, head, self.buffered.len());
        self.cursor = Some(head + 1);
        Ok(())
    }
}

fn decode_log(log: &Value) -> Result<RawFeedback, RpcError> {
    let topics = log
        .get("topics")
        .and_then(Value::as_array)
        .ok_or_else(|| RpcError::Decode("log without topics".into()))?
        .iter()
        .map(|t| {
            t.as_str()
                .and_then(|s| s.parse::<B256>().ok())
                .ok_or_else(|| RpcError::Decode(format!("topic: {}", t)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let data = bytes(log.get("data").unwrap_or(&Value::Null))?;
    abi::decode_log(&topics, &data)
}

fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn bytes(value: &Value) -> Result<Vec<u8>, RpcError> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcError::Decode(format!("expected hex string, got {}", value)))?;
    hex::decode(s.trim_start_matches("0x")).map_err(|e| RpcError::Decode(format!("hex: {}", e)))
}

fn quantity(value: &Value) -> Result<u64, RpcError> {
    let s = value
        .as_str()
        .ok_or_else(|| RpcError::Decode(format!("expected quantity, got {}", value)))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| RpcError::Decode(format!("quantity {}: {}", s, e)))
}

fn accounts(value: Value) -> Result<Vec<Account>, RpcError> {
    let list: Vec<String> = serde_json::from_value(value)?;
    Ok(list.iter().map(Account::new).collect())
}

fn chain_id(value: &Value) -> Result<ChainId, RpcError> {
    value
        .as_str()
        .and_then(ChainId::parse)
        .or_else(|| value.as_u64().map(ChainId))
        .ok_or_else(|| RpcError::Decode(format!("chain id: {}", value)))
}
