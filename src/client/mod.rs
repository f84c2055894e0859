//! FeedbackClient - owns one of each component and wires the data flow
//!
//! ```text
//! WalletSession ──binding──▶ ContractGateway ──fetch_all──▶ FeedbackStore.hydrate
//!       │                          │
//!       │ provider events          └──new entries──▶ FeedbackStore.append
//!       ▼
//!   run() loop: TornDown → discard everything; Rebound → re-subscribe + re-hydrate
//!
//! SubmissionController ──submit / await_confirmation──▶ ContractGateway
//! ```

mod config;

pub use config::{
    load_dotenv, AbiConfig, ClientConfig, DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL,
};

use crate::contract::{ContractGateway, FeedbackContract};
use crate::error::{ClientError, Result};
use crate::session::{Binding, ProviderEvent, SessionChange, WalletSession, WalletProvider};
use crate::store::{FeedbackStore, HydrateOutcome};
use crate::submission::{SubmissionController, SubmissionState};
use futures::future::{select, Either};
use futures::StreamExt;
use std::rc::Rc;
use tracing::{debug, info, warn};

pub struct FeedbackClient {
    config: ClientConfig,
    session: Rc<WalletSession>,
    gateway: Rc<ContractGateway>,
    store: Rc<FeedbackStore>,
    submissions: Rc<SubmissionController>,
}

impl FeedbackClient {
    pub fn new(
        config: ClientConfig,
        provider: Option<Rc<dyn WalletProvider>>,
        contract: Rc<dyn FeedbackContract>,
    ) -> Self {
        let session = Rc::new(WalletSession::new(provider));
        let gateway = Rc::new(ContractGateway::new(
            session.clone(),
            contract,
            config.confirmation_timeout,
        ));
        let store = Rc::new(FeedbackStore::new(gateway.clone()));
        let submissions = Rc::new(SubmissionController::new(gateway.clone()));
        Self { config, session, gateway, store, submissions }
    }

    /// Native client over a WebSocket JSON-RPC endpoint.
    #[cfg(feature = "native")]
    pub async fn connect_ws(config: ClientConfig) -> Result<Self> {
        use crate::rpc::{EthRpc, WsTransport};

        config.validate()?;
        let url = config.require_network_url()?;
        let transport = WsTransport::connect(url, config.poll_interval)
            .await
            .map_err(|e| ClientError::ProviderError(e.to_string()))?;
        let eth = Rc::new(EthRpc::new(transport, &config)?);
        let provider: Rc<dyn WalletProvider> = eth.clone();
        Ok(Self::new(config, Some(provider), eth))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn session(&self) -> &Rc<WalletSession> {
        &self.session
    }

    pub fn gateway(&self) -> &Rc<ContractGateway> {
        &self.gateway
    }

    pub fn store(&self) -> &Rc<FeedbackStore> {
        &self.store
    }

    pub fn submissions(&self) -> &Rc<SubmissionController> {
        &self.submissions
    }

    /// Connect the wallet, then subscribe and hydrate.
    pub async fn connect(&self) -> Result<Binding> {
        let binding = self.session.connect().await?;
        self.bind().await?;
        Ok(binding)
    }

    /// Apply one provider notification and bring the dependents in line with it.
    ///
    /// If the session cannot re-derive its binding, the live feed is dropped with it, and
    /// after a chain change so is the history read on the previous chain.
    pub async fn on_provider_event(&self, event: ProviderEvent) -> Result<SessionChange> {
        let chain_event = matches!(event, ProviderEvent::ChainChanged(_));
        let change = match self.session.handle_event(event).await {
            Ok(change) => change,
            Err(ClientError::Superseded) => return Err(ClientError::Superseded),
            Err(e) => {
                warn!("session lost after provider event: {}", e);
                self.gateway.rebind();
                if chain_event {
                    self.store.clear();
                }
                return Err(e);
            }
        };
        match &change {
            SessionChange::TornDown => self.teardown(),
            SessionChange::Rebound { binding, chain_changed } => {
                info!("rebinding to {} on chain {}", binding.account.short(), binding.chain_id);
                if *chain_changed {
                    // History is chain-scoped: never show the old chain's entries.
                    self.store.clear();
                }
                self.bind().await?;
            }
            SessionChange::Ignored => {}
        }
        Ok(change)
    }

    /// Discard everything that was derived from the previous session.
    pub fn teardown(&self) {
        self.gateway.rebind();
        self.store.clear();
        let settled = matches!(
            self.submissions.state(),
            SubmissionState::Succeeded { .. } | SubmissionState::Failed { .. }
        );
        if settled {
            let _ = self.submissions.reset();
        }
    }

    /// Process provider notifications until the provider stream ends.
    ///
    /// A notification that arrives while the previous one is still being applied cancels
    /// it; the newer one always wins.
    pub async fn run(&self) -> Result<()> {
        let Some(mut events) = self.session.take_events() else {
            let reason = "provider event loop already running";
            return Err(ClientError::ProviderError(reason.into()));
        };
        let mut pending = events.next().await;
        while let Some(event) = pending.take() {
            debug!("provider event: {:?}", event);
            let handling = self.on_provider_event(event);
            futures::pin_mut!(handling);
            let superseded_by = match select(handling, events.next()).await {
                Either::Left((result, _)) => {
                    match result {
                        Ok(_) | Err(ClientError::Superseded) => {}
                        Err(e) => warn!("failed to apply provider event: {}", e),
                    }
                    None
                }
                Either::Right((next, _)) => {
                    debug!("provider event superseded by a newer one");
                    Some(next)
                }
            };
            pending = match superseded_by {
                Some(next) => next,
                None => events.next().await,
            };
        }
        debug!("provider event stream closed");
        Ok(())
    }

    async fn bind(&self) -> Result<HydrateOutcome> {
        self.gateway.rebind();
        let store = self.store.clone();
        self.gateway.subscribe_to_new_entries(move |entry| {
            if store.append(entry) {
                debug!("live entry appended");
            }
        })?;
        self.store.hydrate().await
    }
}
