//! Error taxonomy shared by every component.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("No wallet provider found. Install a wallet extension to use this app")]
    ProviderAbsent,
    #[error("Request rejected in the wallet")]
    UserRejected,
    #[error("Wallet provider error: {0}")]
    ProviderError(String),
    #[error("No wallet connected. Connect your wallet first")]
    SessionNotReady,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Failed to read feedback: {0}")]
    ReadError(String),
    #[error("Failed to submit feedback: {0}")]
    SubmissionError(String),
    #[error("Transaction failed: {0}")]
    ConfirmationError(String),
    #[error("Transaction not confirmed within {0:?}")]
    ConfirmationTimeout(std::time::Duration),
    #[error("A submission is already in flight")]
    AlreadyInFlight,
    #[error("Cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: &'static str },
    #[error("Superseded by a newer wallet change")]
    Superseded,
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Errors the user can act on by retrying the same operation.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ClientError::Config(_) | ClientError::InvalidTransition { .. })
    }

    /// Stable machine-readable name, used by the CLI and JS bindings.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::ProviderAbsent => "providerAbsent",
            ClientError::UserRejected => "userRejected",
            ClientError::ProviderError(_) => "providerError",
            ClientError::SessionNotReady => "sessionNotReady",
            ClientError::InvalidInput(_) => "invalidInput",
            ClientError::ReadError(_) => "readError",
            ClientError::SubmissionError(_) => "submissionError",
            ClientError::ConfirmationError(_) => "confirmationError",
            ClientError::ConfirmationTimeout(_) => "confirmationTimeout",
            ClientError::AlreadyInFlight => "alreadyInFlight",
            ClientError::InvalidTransition { .. } => "invalidTransition",
            ClientError::Superseded => "superseded",
            ClientError::Config(_) => "config",
        }
    }
}

/// JSON-RPC level failure, before it is mapped into [`ClientError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    Decode(String),
}

/// EIP-1193 "User Rejected Request".
pub const USER_REJECTED_CODE: i64 = 4001;

impl RpcError {
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, RpcError::Rpc { code, .. } if *code == USER_REJECTED_CODE)
    }

    /// Map into the taxonomy: user rejections become `UserRejected`, the rest go through
    /// `other`.
    pub fn classify(self, other: impl FnOnce(String) -> ClientError) -> ClientError {
        if self.is_user_rejection() {
            ClientError::UserRejected
        } else {
            other(self.to_string())
        }
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_rejection_is_classified() {
        let err = RpcError::Rpc { code: 4001, message: "User denied".into() };
        assert_eq!(err.classify(ClientError::SubmissionError), ClientError::UserRejected);

        let err = RpcError::Rpc { code: -32000, message: "nonce too low".into() };
        let classified = err.classify(ClientError::SubmissionError);
        assert!(matches!(classified, ClientError::SubmissionError(m) if m.contains("nonce")));
    }

    #[test]
    fn config_errors_are_not_retryable() {
        assert!(!ClientError::Config("missing url".into()).is_retryable());
        assert!(ClientError::ReadError("timeout".into()).is_retryable());
    }
}
