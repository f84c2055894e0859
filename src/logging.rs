//! Log output for the native binary
//!
//! Everything goes to stderr so stdout stays reserved for command output.

use crate::core::methods::env;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Used when `RUST_LOG` is unset. The WebSocket and TLS stacks are chatty at `info`.
const DEFAULT_FILTER: &str = "info,tungstenite=warn,tokio_tungstenite=warn,rustls=warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    /// `FEEDBACK_LOG_JSON=1` (or `true`) selects JSON lines.
    pub fn from_env() -> Self {
        Self::from_flag(std::env::var(env::LOG_JSON).ok().as_deref())
    }

    fn from_flag(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("1") | Some("true") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let output = match format {
        LogFormat::Json => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_writer(std::io::stderr).boxed(),
    };
    let _ = tracing_subscriber::registry().with(filter).with(output).try_init();
}
