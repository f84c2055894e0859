//! ContractGateway - typed reads, writes and the live event feed of the feedback contract
//!
//! # Operations
//!
//! | Operation | Kind | Errors |
//! |-----------|------|--------|
//! | `fetch_all` | bulk read | `ReadError` |
//! | `count` | read | `ReadError` |
//! | `submit` | write as the session account | `InvalidInput`, `SessionNotReady`, `UserRejected`, `SubmissionError` |
//! | `await_confirmation` | wait | `ConfirmationTimeout`, `ConfirmationError` |
//! | `subscribe_to_new_entries` | live feed | `SessionNotReady` |

pub mod abi;

pub use abi::ContractAbi;

use crate::core::{Account, Entry, TxRef};
use crate::error::{ClientError, Result, RpcError};
use crate::runtime;
use crate::session::WalletSession;
use async_trait::async_trait;
use futures::future::{AbortHandle, Abortable};
use futures::stream::LocalBoxStream;
use futures::StreamExt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// `(author, message, seconds)` exactly as the contract reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeedback {
    pub author: Account,
    pub message: String,
    pub timestamp: u64,
}

impl RawFeedback {
    pub fn into_entry(self) -> Option<Entry> {
        Entry::from_chain(self.author, self.message, self.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx: TxRef,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Contract ABI boundary. Implementations talk to the network; the gateway owns validation,
/// error mapping and timeouts.
#[async_trait(?Send)]
pub trait FeedbackContract {
    async fn fetch_all(&self) -> std::result::Result<Vec<RawFeedback>, RpcError>;
    async fn count(&self) -> std::result::Result<u64, RpcError>;
    async fn send(&self, from: &Account, message: &str) -> std::result::Result<TxRef, RpcError>;
    /// Resolves once the transaction is finalized. May never resolve.
    async fn receipt(&self, tx: &TxRef) -> std::result::Result<Receipt, RpcError>;
    /// Finalized append events, in delivery order. Dropping the stream stops delivery.
    fn new_entries(&self) -> LocalBoxStream<'static, RawFeedback>;
}

type Callback = Rc<dyn Fn(Entry)>;

struct LiveFeed {
    callback: Rc<RefCell<Callback>>,
    handle: SubscriptionHandle,
}

/// Disposable registration returned by `subscribe_to_new_entries`.
///
/// Clones refer to the same registration; disposing any of them stops delivery.
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: u64,
    active: Rc<Cell<bool>>,
    abort: AbortHandle,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn dispose(&self) {
        if self.active.replace(false) {
            debug!("subscription {} disposed", self.id);
        }
        self.abort.abort();
    }
}

pub struct ContractGateway {
    session: Rc<WalletSession>,
    contract: Rc<dyn FeedbackContract>,
    confirmation_timeout: Duration,
    live: RefCell<Option<LiveFeed>>,
    next_id: Cell<u64>,
}

impl ContractGateway {
    pub fn new(
        session: Rc<WalletSession>,
        contract: Rc<dyn FeedbackContract>,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            session,
            contract,
            confirmation_timeout,
            live: RefCell::new(None),
            next_id: Cell::new(0),
        }
    }

    pub fn session(&self) -> &Rc<WalletSession> {
        &self.session
    }

    /// Whole history in contract order. All-or-nothing.
    pub async fn fetch_all(&self) -> Result<Vec<Entry>> {
        let raw = self
            .contract
            .fetch_all()
            .await
            .map_err(|e| ClientError::ReadError(e.to_string()))?;
        let total = raw.len();
        let entries = raw
            .into_iter()
            .map(|r| {
                let ts = r.timestamp;
                r.into_entry()
                    .ok_or_else(|| ClientError::ReadError(format!("timestamp {} out of range", ts)))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("fetched {} entries", total);
        Ok(entries)
    }

    pub async fn count(&self) -> Result<u64> {
        self.contract.count().await.map_err(|e| ClientError::ReadError(e.to_string()))
    }

    /// Synchronous pre-flight for `submit`: input and session. Never touches the network.
    pub fn validate(&self, message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(ClientError::InvalidInput("feedback message is empty".into()));
        }
        if self.session.binding().is_none() {
            return Err(ClientError::SessionNotReady);
        }
        Ok(())
    }

    /// Send the trimmed message from the session's current account.
    pub async fn submit(&self, message: &str) -> Result<TxRef> {
        self.validate(message)?;
        let binding = self.session.binding().ok_or(ClientError::SessionNotReady)?;
        let message = message.trim();
        let tx = self
            .contract
            .send(&binding.account, message)
            .await
            .map_err(|e| e.classify(ClientError::SubmissionError))?;
        info!("transaction sent: {}", tx);
        Ok(tx)
    }

    /// Wait for finalization. Never re-submits.
    pub async fn await_confirmation(&self, tx: &TxRef) -> Result<Receipt> {
        match runtime::timeout(self.confirmation_timeout, self.contract.receipt(tx)).await {
            None => {
                warn!("transaction {} not confirmed within {:?}", tx, self.confirmation_timeout);
                Err(ClientError::ConfirmationTimeout(self.confirmation_timeout))
            }
            Some(Err(e)) => Err(ClientError::ConfirmationError(e.to_string())),
            Some(Ok(receipt)) if !receipt.success => {
                Err(ClientError::ConfirmationError(format!("transaction {} reverted", tx)))
            }
            Some(Ok(receipt)) => {
                info!("transaction confirmed: {}", tx);
                Ok(receipt)
            }
        }
    }

    /// Deliver each finalized append event to `callback`.
    ///
    /// Idempotent: while a registration is live, a second call swaps in the new callback and
    /// returns a handle to the same registration, so no event is delivered twice.
    pub fn subscribe_to_new_entries(
        &self,
        callback: impl Fn(Entry) + 'static,
    ) -> Result<SubscriptionHandle> {
        if self.session.binding().is_none() {
            return Err(ClientError::SessionNotReady);
        }
        let callback: Callback = Rc::new(callback);

        if let Some(live) = &*self.live.borrow() {
            if live.handle.is_active() {
                debug!("subscription {} already live, replacing callback", live.handle.id);
                *live.callback.borrow_mut() = callback;
                return Ok(live.handle.clone());
            }
        }

        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let (abort, registration) = AbortHandle::new_pair();
        let handle = SubscriptionHandle { id, active: Rc::new(Cell::new(true)), abort };
        let slot = Rc::new(RefCell::new(callback));

        let mut stream = self.contract.new_entries();
        let pump = {
            let slot = slot.clone();
            let active = handle.active.clone();
            async move {
                while let Some(raw) = stream.next().await {
                    if !active.get() {
                        break;
                    }
                    match raw.into_entry() {
                        Some(entry) => {
                            // Clone out so the callback may re-subscribe without a borrow conflict.
                            let callback = slot.borrow().clone();
                            callback(entry);
                        }
                        None => warn!("dropping event with out-of-range timestamp"),
                    }
                }
                debug!("subscription {} stream ended", id);
            }
        };
        runtime::spawn_local(async move {
            let _ = Abortable::new(pump, registration).await;
        });

        info!("subscribed to new entries (subscription {})", id);
        *self.live.borrow_mut() = Some(LiveFeed { callback: slot, handle: handle.clone() });
        Ok(handle)
    }

    /// Drop the live registration so the next subscribe recreates it for the new binding.
    pub fn rebind(&self) {
        if let Some(live) = self.live.borrow_mut().take() {
            live.handle.dispose();
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.live.borrow().as_ref().map(|l| l.handle.is_active()).unwrap_or(false)
    }
}
