//! JSON-RPC over WebSocket - tokio-tungstenite
//!
//! Requests are correlated with responses by id. Node endpoints push no wallet
//! notifications, so `listen` polls `eth_accounts`/`eth_chainId` and reports changes.

use super::JsonRpc;
use crate::core::methods::eth;
use crate::core::{Account, ChainId};
use crate::error::RpcError;
use crate::runtime;
use crate::session::ProviderEvent;
use async_trait::async_trait;
use futures::channel::mpsc as events;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

/// Link state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Connected,
    Closed,
}

type Replies = HashMap<u64, oneshot::Sender<Result<Value, RpcError>>>;
type Pending = Arc<Mutex<Replies>>;

/// WebSocket JSON-RPC transport. Clones share one connection.
#[derive(Clone)]
pub struct WsTransport {
    url: String,
    state: Arc<RwLock<LinkState>>,
    tx: mpsc::Sender<String>,
    pending: Pending,
    next_id: Arc<AtomicU64>,
    poll_interval: Duration,
}

impl WsTransport {
    pub async fn connect(url: &str, poll_interval: Duration) -> Result<Self, RpcError> {
        let state = Arc::new(RwLock::new(LinkState::Connecting));
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| RpcError::Transport(format!("{}: {}", url, e)))?;
        let (mut write, mut read) = ws.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(32);
        let pending: Pending = Arc::default();
        set_state(&state, LinkState::Connected);
        debug!("connected to {}", url);

        // Writer task
        let state_w = state.clone();
        tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if write.send(Message::Text(msg)).await.is_err() {
                    break;
                }
            }
            set_state(&state_w, LinkState::Closed);
        });

        // Reader task
        let state_r = state.clone();
        let pending_r = pending.clone();
        tokio::spawn(async move {
            while let Some(Ok(msg)) = read.next().await {
                if let Message::Text(txt) = msg {
                    dispatch(&pending_r, &txt);
                }
            }
            set_state(&state_r, LinkState::Closed);
            let waiting: Vec<_> = lock(&pending_r).drain().collect();
            for (_, reply) in waiting {
                let _ = reply.send(Err(RpcError::Transport("connection closed".into())));
            }
        });

        Ok(Self {
            url: url.to_string(),
            state,
            tx: out_tx,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
            poll_interval,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> LinkState {
        self.state.read().map(|s| *s).unwrap_or(LinkState::Closed)
    }
}

#[async_trait(?Send)]
impl JsonRpc for WsTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        if self.state() == LinkState::Closed {
            return Err(RpcError::Transport("connection closed".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();
        lock(&self.pending).insert(id, reply_tx);

        let msg =
            json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string();
        if self.tx.send(msg).await.is_err() {
            lock(&self.pending).remove(&id);
            return Err(RpcError::Transport("connection closed".into()));
        }
        reply_rx
            .await
            .unwrap_or_else(|_| Err(RpcError::Transport("connection closed".into())))
    }

    fn listen(&self, sink: events::UnboundedSender<ProviderEvent>) {
        let transport = self.clone();
        runtime::spawn_local(async move {
            let mut seen: Option<(Vec<Account>, ChainId)> = None;
            while !sink.is_closed() && transport.state() != LinkState::Closed {
                match transport.snapshot().await {
                    Ok((accounts, chain)) => {
                        if let Some((prev_accounts, prev_chain)) = &seen {
                            if *prev_chain != chain {
                                let _ = sink.unbounded_send(ProviderEvent::ChainChanged(chain));
                            }
                            if *prev_accounts != accounts {
                                let changed = ProviderEvent::AccountsChanged(accounts.clone());
                                let _ = sink.unbounded_send(changed);
                            }
                        }
                        seen = Some((accounts, chain));
                    }
                    Err(e) => warn!("provider poll failed: {}", e),
                }
                runtime::sleep(transport.poll_interval).await;
            }
            debug!("provider poll stopped");
        });
    }
}

impl WsTransport {
    async fn snapshot(&self) -> Result<(Vec<Account>, ChainId), RpcError> {
        let accounts = self.request(eth::ACCOUNTS, json!([])).await?;
        let accounts: Vec<String> = serde_json::from_value(accounts)?;
        let chain = self.request(eth::CHAIN_ID, json!([])).await?;
        let chain = chain
            .as_str()
            .and_then(ChainId::parse)
            .ok_or_else(|| RpcError::Decode(format!("chain id: {}", chain)))?;
        Ok((accounts.iter().map(Account::new).collect(), chain))
    }
}

/// Route one incoming frame to the request waiting on its id.
fn dispatch(pending: &Pending, text: &str) {
    let Ok(frame) = serde_json::from_str::<Value>(text) else {
        warn!("unparseable frame: {}", text);
        return;
    };
    let Some(id) = frame.get("id").and_then(Value::as_u64) else {
        debug!("ignoring notification frame");
        return;
    };
    let Some(reply) = lock(pending).remove(&id) else {
        return;
    };
    let _ = reply.send(parse_response(frame));
}

fn parse_response(mut frame: Value) -> Result<Value, RpcError> {
    if let Some(error) = frame.get("error") {
        return Err(RpcError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    Ok(frame.get_mut("result").map(Value::take).unwrap_or(Value::Null))
}

fn lock(pending: &Pending) -> std::sync::MutexGuard<'_, Replies> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn set_state(state: &RwLock<LinkState>, value: LinkState) {
    if let Ok(mut s) = state.write() {
        *s = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_frames_keep_code() {
        let frame = json!({"id": 1, "error": {"code": 4001, "message": "User rejected"}});
        let err = parse_response(frame).unwrap_err();
        assert!(err.is_user_rejection());
        assert_eq!(parse_response(json!({"id": 2, "result": "0x1"})).unwrap(), json!("0x1"));
        assert_eq!(parse_response(json!({"id": 3})).unwrap(), Value::Null);
    }

    #[test]
    fn dispatch_resolves_matching_request_only() {
        let pending: Pending = Arc::default();
        let (tx, mut rx) = oneshot::channel();
        lock(&pending).insert(7, tx);

        dispatch(&pending, r#"{"jsonrpc":"2.0","id":8,"result":"0x0"}"#);
        dispatch(&pending, r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{}}"#);
        dispatch(&pending, "not json");
        assert!(rx.try_recv().is_err());

        dispatch(&pending, r#"{"jsonrpc":"2.0","id":7,"result":["0xabc"]}"#);
        assert_eq!(rx.try_recv().unwrap().unwrap(), json!(["0xabc"]));
        assert!(lock(&pending).is_empty());
    }
}
