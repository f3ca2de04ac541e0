pub mod aggregator;
pub mod allowance;
pub mod bridge;
pub mod confirmation;
pub mod error;
pub mod error_log;
pub mod orchestrator;
pub mod retry;
pub mod session;
pub mod staker;
pub mod swapper;
pub mod token_registry;
pub mod transaction;
pub mod transfer;
pub mod types;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use confirmation::{ConfirmationPolicy, with_confirmation};
pub use error::OperationError;
pub use error_log::ErrorLog;
pub use orchestrator::{CycleActions, Orchestrator, RunReport, StopReason, Tier, WalletActions};
pub use retry::RetryPolicy;
pub use session::ChainSession;
pub use token_registry::TokenRegistry;
pub use transaction::{ReceiptPolicy, TransactionSubmitter};
pub use types::*;

pub(crate) type ServiceResult<T> = std::result::Result<T, OperationError>;
