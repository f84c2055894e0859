//! WalletSession - authenticated connection to the wallet provider
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Connected(account, chain)
//!      ▲                          │  ▲                 │
//!      │                        fail │ accountsChanged / chainChanged
//!      │                          ▼  └─────────────────┘
//!      └──────connect()/disconnect()── Error(reason)
//!
//! Connected ──accountsChanged([])──▶ Disconnected (full teardown)
//! ```
//!
//! Every connect/re-derive runs under an epoch. Anything that changes the session bumps
//! the epoch, so a slower in-flight sequence finds its epoch stale and its result is dropped.

use crate::core::{Account, ChainId, Watchers};
use crate::error::{ClientError, Result, RpcError};
use async_trait::async_trait;
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// Notification pushed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Account>),
    ChainChanged(ChainId),
}

/// Wallet provider boundary (EIP-1193 style).
#[async_trait(?Send)]
pub trait WalletProvider {
    /// Prompting account request.
    async fn request_accounts(&self) -> std::result::Result<Vec<Account>, RpcError>;
    /// Already-authorized accounts, never prompts.
    async fn get_accounts(&self) -> std::result::Result<Vec<Account>, RpcError>;
    async fn chain_id(&self) -> std::result::Result<ChainId, RpcError>;
    /// Register the notification sink. The session calls this at most once.
    fn listen(&self, sink: mpsc::UnboundedSender<ProviderEvent>);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    #[serde(rename_all = "camelCase")]
    Connected { account: Account, chain_id: ChainId },
    Error { reason: String },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected { .. } => "connected",
            SessionState::Error { .. } => "error",
        }
    }
}

/// Snapshot of the live account/chain binding. Dependents re-read it per operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub account: Account,
    pub chain_id: ChainId,
    pub epoch: u64,
}

/// What a provider notification did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    /// Provider reported no accounts; dependents must discard everything.
    TornDown,
    /// Account or chain changed; dependents must re-bind and re-hydrate.
    Rebound { binding: Binding, chain_changed: bool },
    /// Notification arrived while not connected.
    Ignored,
}

pub struct WalletSession {
    provider: Option<Rc<dyn WalletProvider>>,
    state: RefCell<SessionState>,
    epoch: Cell<u64>,
    sink: RefCell<Option<mpsc::UnboundedSender<ProviderEvent>>>,
    events: RefCell<Option<mpsc::UnboundedReceiver<ProviderEvent>>>,
    watchers: Watchers<SessionState>,
}

impl WalletSession {
    /// `None` models a browser without an injected provider.
    pub fn new(provider: Option<Rc<dyn WalletProvider>>) -> Self {
        let (tx, rx) = mpsc::unbounded();
        Self {
            provider,
            state: RefCell::new(SessionState::Disconnected),
            epoch: Cell::new(0),
            sink: RefCell::new(Some(tx)),
            events: RefCell::new(Some(rx)),
            watchers: Watchers::default(),
        }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn current_account(&self) -> Option<Account> {
        match &*self.state.borrow() {
            SessionState::Connected { account, .. } => Some(account.clone()),
            _ => None,
        }
    }

    pub fn current_chain(&self) -> Option<ChainId> {
        match &*self.state.borrow() {
            SessionState::Connected { chain_id, .. } => Some(*chain_id),
            _ => None,
        }
    }

    pub fn binding(&self) -> Option<Binding> {
        match &*self.state.borrow() {
            SessionState::Connected { account, chain_id } => Some(Binding {
                account: account.clone(),
                chain_id: *chain_id,
                epoch: self.epoch.get(),
            }),
            _ => None,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    pub fn watch(&self) -> mpsc::UnboundedReceiver<SessionState> {
        self.watchers.watch()
    }

    /// Provider notification stream. Handed out once; the owner drives `handle_event`.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ProviderEvent>> {
        self.events.borrow_mut().take()
    }

    /// Non-prompting check for an already-authorized account. Leaves the state untouched.
    pub async fn check_existing(&self) -> Result<Option<Account>> {
        let provider = self.provider.clone().ok_or(ClientError::ProviderAbsent)?;
        let accounts = provider
            .get_accounts()
            .await
            .map_err(|e| e.classify(ClientError::ProviderError))?;
        let first = accounts.into_iter().next();
        match &first {
            Some(account) => debug!("wallet detected: {}", account.short()),
            None => debug!("no wallet connected yet"),
        }
        Ok(first)
    }

    /// Request account access and bind to the provider's current chain.
    pub async fn connect(&self) -> Result<Binding> {
        let Some(provider) = self.provider.clone() else {
            warn!("connect: no wallet provider present");
            return Err(ClientError::ProviderAbsent);
        };
        let epoch = self.begin();
        self.ensure_listening(&*provider);

        let result = async {
            let accounts = provider
                .request_accounts()
                .await
                .map_err(|e| e.classify(ClientError::ProviderError))?;
            let account = accounts
                .into_iter()
                .next()
                .ok_or_else(|| ClientError::ProviderError("wallet returned no accounts".into()))?;
            let chain_id = provider
                .chain_id()
                .await
                .map_err(|e| e.classify(ClientError::ProviderError))?;
            Ok::<_, ClientError>((account, chain_id))
        }
        .await;

        self.finish(epoch, result)
    }

    /// Local teardown. Supersedes anything in flight.
    pub fn disconnect(&self) {
        self.epoch.set(self.epoch.get() + 1);
        self.set(SessionState::Disconnected);
    }

    /// Apply one provider notification, in arrival order.
    pub async fn handle_event(&self, event: ProviderEvent) -> Result<SessionChange> {
        let previous = match &*self.state.borrow() {
            SessionState::Connected { chain_id, .. } => Some(Some(*chain_id)),
            SessionState::Connecting => Some(None),
            _ => None,
        };
        let Some(previous_chain) = previous else {
            debug!("ignoring {:?} while not connected", event);
            return Ok(SessionChange::Ignored);
        };
        let Some(provider) = self.provider.clone() else {
            return Ok(SessionChange::Ignored);
        };

        let (account_hint, chain_hint) = match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.into_iter().next() {
                None => {
                    info!("wallet disconnected by provider");
                    self.disconnect();
                    return Ok(SessionChange::TornDown);
                }
                Some(account) => (Some(account), None),
            },
            ProviderEvent::ChainChanged(chain) => (None, Some(chain)),
        };

        let epoch = self.begin();
        let result = async {
            let account = match account_hint {
                Some(account) => account,
                None => provider
                    .get_accounts()
                    .await
                    .map_err(|e| e.classify(ClientError::ProviderError))?
                    .into_iter()
                    .next()
                    .ok_or(ClientError::SessionNotReady)?,
            };
            let chain_id = match chain_hint {
                Some(chain) => chain,
                None => provider
                    .chain_id()
                    .await
                    .map_err(|e| e.classify(ClientError::ProviderError))?,
            };
            Ok::<_, ClientError>((account, chain_id))
        }
        .await;

        match self.finish(epoch, result) {
            Ok(binding) => {
                let chain_changed = previous_chain != Some(binding.chain_id);
                Ok(SessionChange::Rebound { binding, chain_changed })
            }
            Err(ClientError::SessionNotReady) => {
                // Chain switched and the wallet no longer exposes an account.
                self.disconnect();
                Ok(SessionChange::TornDown)
            }
            Err(e) => Err(e),
        }
    }

    fn begin(&self) -> u64 {
        let epoch = self.epoch.get() + 1;
        self.epoch.set(epoch);
        self.set(SessionState::Connecting);
        epoch
    }

    fn finish(&self, epoch: u64, result: Result<(Account, ChainId)>) -> Result<Binding> {
        if self.epoch.get() != epoch {
            warn!("discarding stale session result (epoch {} < {})", epoch, self.epoch.get());
            return Err(ClientError::Superseded);
        }
        match result {
            Ok((account, chain_id)) => {
                info!("wallet connected: {} on chain {}", account.short(), chain_id);
                self.set(SessionState::Connected { account: account.clone(), chain_id });
                Ok(Binding { account, chain_id, epoch })
            }
            Err(ClientError::SessionNotReady) => Err(ClientError::SessionNotReady),
            Err(e) => {
                warn!("wallet connection failed: {}", e);
                self.set(SessionState::Error { reason: e.to_string() });
                Err(e)
            }
        }
    }

    fn ensure_listening(&self, provider: &dyn WalletProvider) {
        if let Some(sink) = self.sink.borrow_mut().take() {
            debug!("registering provider listeners");
            provider.listen(sink);
        }
    }

    fn set(&self, state: SessionState) {
        *self.state.borrow_mut() = state.clone();
        self.watchers.notify(&state);
    }
}
