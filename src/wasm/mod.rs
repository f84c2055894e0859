//! WASM module: the feedback client in the browser
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          FeedbackApp (JS API)           │
//! │  connect, compose, send, onChange       │
//! └─────────────────┬───────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────┐
//! │     FeedbackClient (shared core)        │
//! │  session, gateway, store, submissions   │
//! └─────────────────┬───────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────┐
//! │     EthRpc<Eip1193> (window.ethereum)   │
//! └─────────────────────────────────────────┘
//! ```

mod app;
mod ethereum;

pub use app::FeedbackApp;
pub use ethereum::Eip1193;

use wasm_bindgen::prelude::*;

/// Initialize WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Log to browser console
pub fn console_log(s: &str) {
    web_sys::console::log_1(&JsValue::from_str(s));
}

macro_rules! log {
    ($($t:tt)*) => {
        crate::wasm::console_log(&format!($($t)*))
    }
}

pub(crate) use log;
