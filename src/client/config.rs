//! Client Configuration - passed from the front end (CLI flags, env, JS constructor)

use crate::core::methods::{abi, env as keys};
use crate::error::{ClientError, Result};
use alloy_primitives::Address;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// ABI method names, pinned against the deployed contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiConfig {
    pub write_method: String,
    pub read_method: String,
    pub count_method: String,
}

impl Default for AbiConfig {
    fn default() -> Self {
        Self {
            write_method: abi::WRITE_METHOD.into(),
            read_method: abi::READ_METHOD.into(),
            count_method: abi::COUNT_METHOD.into(),
        }
    }
}

/// Client configuration. Front ends construct this.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// RPC endpoint. Required natively; the browser uses the injected provider instead.
    pub network_url: Option<String>,
    pub contract_address: String,
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    pub abi: AbiConfig,
}

impl ClientConfig {
    pub fn new(contract_address: impl Into<String>) -> Self {
        Self {
            network_url: None,
            contract_address: contract_address.into(),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            abi: AbiConfig::default(),
        }
    }

    pub fn with_network_url(mut self, url: impl Into<String>) -> Self {
        self.network_url = Some(url.into());
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_abi(mut self, abi: AbiConfig) -> Self {
        self.abi = abi;
        self
    }

    /// Read from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let contract = get(keys::CONTRACT_ADDRESS)
            .ok_or_else(|| ClientError::Config(format!("{} is not set", keys::CONTRACT_ADDRESS)))?;
        let mut config = Self::new(contract);
        config.network_url = get(keys::NETWORK_URL);
        if let Some(secs) = get(keys::CONFIRM_TIMEOUT_SECS) {
            let secs = parse_secs(keys::CONFIRM_TIMEOUT_SECS, &secs)?;
            config.confirmation_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = get(keys::POLL_SECS) {
            config.poll_interval = Duration::from_secs(parse_secs(keys::POLL_SECS, &secs)?);
        }
        if let Some(name) = get(keys::WRITE_METHOD) {
            config.abi.write_method = name;
        }
        if let Some(name) = get(keys::READ_METHOD) {
            config.abi.read_method = name;
        }
        if let Some(name) = get(keys::COUNT_METHOD) {
            config.abi.count_method = name;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.contract()?;
        if self.network_url.as_deref().is_some_and(|url| url.trim().is_empty()) {
            return Err(ClientError::Config("network URL is empty".into()));
        }
        if self.confirmation_timeout.is_zero() {
            return Err(ClientError::Config("confirmation timeout must be positive".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(ClientError::Config("poll interval must be positive".into()));
        }
        Ok(())
    }

    pub fn contract(&self) -> Result<Address> {
        let raw = self.contract_address.trim();
        if raw.is_empty() {
            return Err(ClientError::Config("contract address is not set".into()));
        }
        raw.parse::<Address>()
            .map_err(|e| ClientError::Config(format!("invalid contract address '{}': {}", raw, e)))
    }

    pub fn require_network_url(&self) -> Result<&str> {
        self.network_url
            .as_deref()
            .ok_or_else(|| ClientError::Config(format!("{} is not set", keys::NETWORK_URL)))
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value.parse().map_err(|_| {
        ClientError::Config(format!("{} must be a whole number of seconds, got '{}'", key, value))
    })
}

/// Load `KEY=value` lines into the process environment without overriding existing
/// variables. Returns how many were set; a missing file sets none.
pub fn load_dotenv(path: impl AsRef<Path>) -> usize {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return 0;
    };
    let mut set = 0;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            if !value.is_empty() && std::env::var(key.trim()).is_err() {
                std::env::set_var(key.trim(), value);
                set += 1;
            }
        }
    }
    set
}
