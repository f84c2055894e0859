//! Feedback client: wallet session and contract lifecycle for an on-chain feedback log.
//!
//! # Architecture
//!
//! ```text
//! FeedbackClient (entry point)
//!   │
//!   ├── WalletSession (account + chain binding, epoch-guarded)
//!   │     └── WalletProvider ── EthRpc<WsTransport> | EthRpc<Eip1193>
//!   │
//!   ├── ContractGateway (reads, writes, live event feed)
//!   │     └── FeedbackContract ── same EthRpc
//!   │
//!   ├── FeedbackStore (ordered, deduplicated log; ticketed hydration)
//!   │
//!   └── SubmissionController (Idle → Composing → Sending → Confirming → Succeeded/Failed)
//! ```
//!
//! # Operations
//!
//! | Component | Operation | Description |
//! |-----------|-----------|-------------|
//! | session | `connect()` | Request accounts, bind to the current chain |
//! | session | `handle_event(e)` | Apply `accountsChanged` / `chainChanged` |
//! | gateway | `fetch_all()` | Whole history, contract order |
//! | gateway | `submit(msg)` / `await_confirmation(tx)` | Write and wait |
//! | gateway | `subscribe_to_new_entries(cb)` | Idempotent live feed |
//! | store | `hydrate()` / `append(e)` / `all()` | Merge history and live entries |
//! | submissions | `compose` / `send` / `reset` / `retry` | Outgoing entry lifecycle |
//!
//! # Features
//!
//! - `native` - tokio, WebSocket JSON-RPC, the `feedback` CLI
//! - `wasm` - browser build over the injected EIP-1193 provider
//!
//! # Usage
//!
//! ```ignore
//! use feedback_client::{ClientConfig, FeedbackClient};
//!
//! let config = ClientConfig::from_env()?;
//! let client = FeedbackClient::connect_ws(config).await?;
//! client.connect().await?;
//! client.submissions().compose("gm")?;
//! client.submissions().send().await?;
//! ```

// =============================================================================
// Shared modules (compile everywhere)
// =============================================================================
pub mod client;
pub mod contract;
pub mod core;
pub mod error;
pub mod rpc;
pub mod runtime;
pub mod session;
pub mod store;
pub mod submission;

// =============================================================================
// Native-only modules
// =============================================================================
#[cfg(feature = "native")]
pub mod logging;

// =============================================================================
// WASM-only modules (browser, wasm-bindgen)
// =============================================================================
#[cfg(feature = "wasm")]
pub mod wasm;

// =============================================================================
// Re-exports
// =============================================================================
pub use client::{ClientConfig, FeedbackClient};
pub use contract::{ContractGateway, FeedbackContract, RawFeedback, Receipt, SubscriptionHandle};
pub use core::{Account, ChainId, Entry, TxRef};
pub use error::{ClientError, Result, RpcError};
pub use rpc::{EthRpc, JsonRpc};
pub use session::{
    Binding, ProviderEvent, SessionChange, SessionState, WalletProvider, WalletSession,
};
pub use store::{FeedbackStore, HydrateOutcome};
pub use submission::{SubmissionController, SubmissionState};

#[cfg(feature = "native")]
pub use rpc::WsTransport;
#[cfg(feature = "native")]
pub use runtime::{install_signal_handlers, Shutdown};

#[cfg(feature = "wasm")]
pub use wasm::FeedbackApp;
