//! Method and variable name constants
//!
//! Centralized registry for JSON-RPC methods, ABI defaults and environment keys.

/// Ethereum JSON-RPC / EIP-1193 methods
pub mod eth {
    pub const REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
    pub const ACCOUNTS: &str = "eth_accounts";
    pub const CHAIN_ID: &str = "eth_chainId";
    pub const CALL: &str = "eth_call";
    pub const SEND_TRANSACTION: &str = "eth_sendTransaction";
    pub const TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";
    pub const BLOCK_NUMBER: &str = "eth_blockNumber";
    pub const GET_LOGS: &str = "eth_getLogs";
}

/// Provider-pushed notification names (EIP-1193 events)
pub mod events {
    pub const ACCOUNTS_CHANGED: &str = "accountsChanged";
    pub const CHAIN_CHANGED: &str = "chainChanged";
}

/// Default ABI method names of the deployed feedback contract
pub mod abi {
    pub const WRITE_METHOD: &str = "sendFeedback";
    pub const READ_METHOD: &str = "getAllFeedback";
    pub const COUNT_METHOD: &str = "getTotalFeedback";
}

/// Environment variables read by `ClientConfig::from_env`
pub mod env {
    pub const NETWORK_URL: &str = "FEEDBACK_NETWORK_URL";
    pub const CONTRACT_ADDRESS: &str = "FEEDBACK_CONTRACT_ADDRESS";
    pub const CONFIRM_TIMEOUT_SECS: &str = "FEEDBACK_CONFIRM_TIMEOUT_SECS";
    pub const POLL_SECS: &str = "FEEDBACK_POLL_SECS";
    pub const WRITE_METHOD: &str = "FEEDBACK_WRITE_METHOD";
    pub const READ_METHOD: &str = "FEEDBACK_READ_METHOD";
    pub const COUNT_METHOD: &str = "FEEDBACK_COUNT_METHOD";
    pub const LOG_JSON: &str = "FEEDBACK_LOG_JSON";
}
