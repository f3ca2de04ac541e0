use alloy::primitives::TxHash;
use thiserror::Error;

use crate::repository::RepositoryError;

#[derive(Debug, Clone, Error)]
pub enum OperationError {
    /// The wallet holds less than the operation needs. Nothing was submitted.
    #[error("Insufficient {token} balance: required {required}, available {available}")]
    InsufficientBalance {
        token: String,
        required: String,
        available: String,
    },

    /// The node, the aggregator API or a contract call failed.
    #[error("RPC failure: {message}")]
    RpcFailure { message: String, transient: bool },

    /// A bounded wait ran out before the expected effect was observed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A symbol, pair or pool could not be resolved.
    #[error("Unknown token: {0}")]
    UnknownToken(String),

    /// The transaction was mined with a failed status.
    #[error("Transaction reverted: {0}")]
    Reverted(TxHash),

    /// Refused to sign a transaction whose fee or gas fields are still placeholders.
    #[error("Transaction not priced: {0}")]
    UnpricedTransaction(String),

    /// An amount that cannot be expressed in the token's units.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

impl OperationError {
    /// A failure that retrying the same request cannot fix.
    pub fn permanent(message: impl Into<String>) -> Self {
        OperationError::RpcFailure {
            message: message.into(),
            transient: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OperationError::RpcFailure {
                transient: true,
                ..
            }
        )
    }
}

impl From<RepositoryError> for OperationError {
    fn from(err: RepositoryError) -> Self {
        let transient = err.is_transient();
        match err {
            RepositoryError::RpcError(msg)
            | RepositoryError::NetworkError(msg)
            | RepositoryError::ContractError(msg) => OperationError::RpcFailure {
                message: format!("Failed to interact with blockchain: {msg}"),
                transient,
            },
            RepositoryError::ParseError(msg)
            | RepositoryError::SigningError(msg)
            | RepositoryError::Other(msg) => OperationError::RpcFailure {
                message: msg,
                transient,
            },
        }
    }
}

impl From<reqwest::Error> for OperationError {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout() || err.is_connect() || err.is_request();
        OperationError::RpcFailure {
            message: format!("Aggregator request failed: {err}"),
            transient,
        }
    }
}
