//! SubmissionController - one outgoing entry at a time
//!
//! ```text
//! Idle ─compose─▶ Composing ─send─▶ Sending ─tx─▶ Confirming ─ok─▶ Succeeded ─reset─▶ Idle
//!                    ▲   │             │              │
//!                    │   └─rejected─▶ Failed(reason, draft) ◀──┘ ──reset─▶ Idle
//!                    └──────retry──────┘
//! ```
//!
//! Drafts that fail validation (empty, no session) never reach the network but still land
//! in `Failed`.
//!
//! A successful send never touches the store: the new entry arrives through the event feed.

use crate::contract::ContractGateway;
use crate::core::{TxRef, Watchers};
use crate::error::{ClientError, Result};
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SubmissionState {
    Idle,
    Composing { draft: String },
    Sending { draft: String },
    Confirming { draft: String, tx: TxRef },
    Succeeded { tx: TxRef },
    Failed { reason: String, draft: String },
}

impl SubmissionState {
    pub fn name(&self) -> &'static str {
        match self {
            SubmissionState::Idle => "idle",
            SubmissionState::Composing { .. } => "composing",
            SubmissionState::Sending { .. } => "sending",
            SubmissionState::Confirming { .. } => "confirming",
            SubmissionState::Succeeded { .. } => "succeeded",
            SubmissionState::Failed { .. } => "failed",
        }
    }

    pub fn in_flight(&self) -> bool {
        matches!(self, SubmissionState::Sending { .. } | SubmissionState::Confirming { .. })
    }

    /// The draft text, wherever the state keeps one.
    pub fn draft(&self) -> Option<&str> {
        match self {
            SubmissionState::Composing { draft }
            | SubmissionState::Sending { draft }
            | SubmissionState::Confirming { draft, .. }
            | SubmissionState::Failed { draft, .. } => Some(draft),
            SubmissionState::Idle | SubmissionState::Succeeded { .. } => None,
        }
    }
}

pub struct SubmissionController {
    gateway: Rc<ContractGateway>,
    state: RefCell<SubmissionState>,
    watchers: Watchers<SubmissionState>,
}

impl SubmissionController {
    pub fn new(gateway: Rc<ContractGateway>) -> Self {
        Self { gateway, state: RefCell::new(SubmissionState::Idle), watchers: Watchers::default() }
    }

    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> mpsc::UnboundedReceiver<SubmissionState> {
        self.watchers.watch()
    }

    /// Start (or edit) a draft.
    pub fn compose(&self, draft: impl Into<String>) -> Result<()> {
        self.require("compose", |s| {
            matches!(s, SubmissionState::Idle | SubmissionState::Composing { .. })
        })?;
        self.set(SubmissionState::Composing { draft: draft.into() });
        Ok(())
    }

    /// Submit the draft and wait for confirmation.
    ///
    /// Every failure, including a draft rejected before the network is touched, lands in
    /// `Failed` with the draft preserved.
    pub async fn send(&self) -> Result<TxRef> {
        let draft = match &*self.state.borrow() {
            SubmissionState::Composing { draft } => draft.clone(),
            s if s.in_flight() => return Err(ClientError::AlreadyInFlight),
            s => return Err(ClientError::InvalidTransition { action: "send", state: s.name() }),
        };
        if let Err(e) = self.gateway.validate(&draft) {
            warn!("submission rejected: {}", e);
            self.set(SubmissionState::Failed { reason: e.to_string(), draft });
            return Err(e);
        }

        self.set(SubmissionState::Sending { draft: draft.clone() });
        let mut guard = InFlight { controller: self, draft: Some(draft.clone()) };

        let tx = match self.gateway.submit(&draft).await {
            Ok(tx) => tx,
            Err(e) => return Err(guard.fail(e)),
        };
        self.set(SubmissionState::Confirming { draft, tx: tx.clone() });

        match self.gateway.await_confirmation(&tx).await {
            Ok(_) => {
                guard.disarm();
                info!("feedback confirmed in {}", tx);
                self.set(SubmissionState::Succeeded { tx: tx.clone() });
                Ok(tx)
            }
            Err(e) => Err(guard.fail(e)),
        }
    }

    pub fn reset(&self) -> Result<()> {
        self.require("reset", |s| {
            matches!(s, SubmissionState::Succeeded { .. } | SubmissionState::Failed { .. })
        })?;
        self.set(SubmissionState::Idle);
        Ok(())
    }

    /// Back to `Composing` with the draft a failed attempt preserved.
    pub fn retry(&self) -> Result<()> {
        let draft = match &*self.state.borrow() {
            SubmissionState::Failed { draft, .. } => draft.clone(),
            s => return Err(ClientError::InvalidTransition { action: "retry", state: s.name() }),
        };
        self.set(SubmissionState::Composing { draft });
        Ok(())
    }

    fn require(
        &self,
        action: &'static str,
        allowed: impl Fn(&SubmissionState) -> bool,
    ) -> Result<()> {
        let state = self.state.borrow();
        if allowed(&state) {
            Ok(())
        } else if state.in_flight() {
            Err(ClientError::AlreadyInFlight)
        } else {
            Err(ClientError::InvalidTransition { action, state: state.name() })
        }
    }

    fn set(&self, state: SubmissionState) {
        *self.state.borrow_mut() = state.clone();
        self.watchers.notify(&state);
    }
}

/// Moves the controller to `Failed` if the send future is dropped mid-flight.
struct InFlight<'a> {
    controller: &'a SubmissionController,
    draft: Option<String>,
}

impl InFlight<'_> {
    fn fail(&mut self, error: ClientError) -> ClientError {
        if let Some(draft) = self.draft.take() {
            warn!("submission failed: {}", error);
            self.controller.set(SubmissionState::Failed { reason: error.to_string(), draft });
        }
        error
    }

    fn disarm(&mut self) {
        self.draft = None;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.draft.is_some() {
            self.fail(ClientError::SubmissionError("submission cancelled".into()));
        }
    }
}
