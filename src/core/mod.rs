//! Core types shared by the session, gateway, store and controller.

pub mod entry;
pub mod methods;
pub mod watch;

pub use entry::{format_address, Account, ChainId, Entry, TxRef};
pub use watch::Watchers;
