use std::future::Future;
use std::time::Duration;

use alloy::primitives::U256;
use tokio::time::sleep;

use crate::service::error_log::ErrorLog;
use crate::service::session::ChainSession;
use crate::service::types::Asset;
use crate::service::{OperationError, ServiceResult};

/// How long to watch a balance after an operation before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub attempts: usize,
    pub interval: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_secs(5),
        }
    }
}

/// Runs a balance-changing operation and waits until the wallet's balance of
/// `watched` moves.
///
/// The balance is read before `op` runs and then re-read every
/// `policy.interval`, up to `policy.attempts` times. The first read that
/// differs from the snapshot is returned.
///
/// Failures never escape as panics. A failed snapshot, a failed operation or
/// an exhausted poll budget is written to `error_log` once, with the wallet
/// address, and returned as `Err`. An `InsufficientBalance` from `op` is an
/// expected early return and is only logged.
///
/// An operation whose true effect on `watched` is zero always times out.
pub async fn with_confirmation<F, Fut, T>(
    session: &ChainSession,
    error_log: &ErrorLog,
    policy: ConfirmationPolicy,
    label: &str,
    watched: Asset,
    op: F,
) -> ServiceResult<U256>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    let wallet = session.address();

    let before = match session.balance(watched).await {
        Ok(balance) => balance,
        Err(e) => {
            tracing::error!("{}: cannot read balance before running: {e}", label);
            error_log.record(wallet, label, &e).await;
            return Err(e);
        }
    };

    if let Err(e) = op().await {
        match &e {
            OperationError::InsufficientBalance { .. } => {
                tracing::error!("{}: {e}", label);
            }
            _ => {
                tracing::error!("{} failed: {e}", label);
                error_log.record(wallet, label, &e).await;
            }
        }
        return Err(e);
    }

    for attempt in 1..=policy.attempts {
        sleep(policy.interval).await;

        match session.balance(watched).await {
            Ok(after) if after != before => {
                tracing::info!(
                    "{}: balance changed from {} to {} after {} polls",
                    label,
                    before,
                    after,
                    attempt
                );
                return Ok(after);
            }
            Ok(_) => tracing::debug!("{}: balance unchanged at poll {}", label, attempt),
            Err(e) => tracing::warn!("{}: balance poll {} failed: {e}", label, attempt),
        }
    }

    let err = OperationError::Timeout(format!(
        "{label}: balance did not change after {} polls",
        policy.attempts
    ));
    tracing::error!("{err}");
    error_log.record(wallet, label, &err).await;
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryError;
    use crate::service::testing::{FakeChain, Fault};
    use serial_test::serial;
    use std::sync::Arc;

    fn temp_log(name: &str) -> ErrorLog {
        let path = std::env::temp_dir().join(format!("rollup-cycler-{name}.txt"));
        let _ = std::fs::remove_file(&path);
        ErrorLog::new(path)
    }

    fn log_content(log: &ErrorLog) -> String {
        std::fs::read_to_string(log.path()).unwrap_or_default()
    }

    #[tokio::test(start_paused = true)]
    #[serial]
    async fn test_returns_new_balance_once_it_changes() {
        let chain = Arc::new(FakeChain::new());
        let usdt = chain.add_token(6);
        let session = chain.session();
        let log = temp_log("confirm-ok");

        let balance = with_confirmation(
            &session,
            &log,
            ConfirmationPolicy::default(),
            "swap",
            Asset::Erc20(usdt),
            || async {
                chain.set_erc20_balance(usdt, U256::from(99_000_000u64));
                Ok(())
            },
        )
        .await
        .unwrap();

        assert_eq!(balance, U256::from(99_000_000u64));
        assert!(log_content(&log).is_empty());
    }

    #[tokio::test(start_paused = true)]
    #[serial]
    async fn test_unchanged_balance_times_out_after_exact_budget() {
        let chain = Arc::new(FakeChain::new());
        let usdt = chain.add_token(6);
        let session = chain.session();
        let log = temp_log("confirm-timeout");
        let start = tokio::time::Instant::now();

        let result = with_confirmation(
            &session,
            &log,
            ConfirmationPolicy::default(),
            "swap",
            Asset::Erc20(usdt),
            || async { Ok(()) },
        )
        .await;

        assert!(matches!(result, Err(OperationError::Timeout(_))));
        assert!(start.elapsed() >= Duration::from_secs(50));

        // one snapshot plus ten polls
        let reads = chain
            .calls()
            .into_iter()
            .filter(|c| *c == crate::service::testing::ChainCall::Erc20Balance)
            .count();
        assert_eq!(reads, 11);

        let content = log_content(&log);
        assert_eq!(content.matches(&FakeChain::WALLET.to_string()).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    #[serial]
    async fn test_failed_operation_is_logged_once_and_not_polled() {
        let chain = Arc::new(FakeChain::new());
        let session = chain.session();
        let log = temp_log("confirm-failed");

        let result = with_confirmation(
            &session,
            &log,
            ConfirmationPolicy::default(),
            "bridge",
            Asset::Native,
            || async { Err::<(), _>(OperationError::from(RepositoryError::NetworkError("connection reset".into()))) },
        )
        .await;

        assert!(matches!(result, Err(OperationError::RpcFailure { .. })));
        let content = log_content(&log);
        assert!(content.contains("bridge"));
        assert_eq!(content.matches(&FakeChain::WALLET.to_string()).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    #[serial]
    async fn test_insufficient_balance_is_not_recorded() {
        let chain = Arc::new(FakeChain::new());
        let session = chain.session();
        let log = temp_log("confirm-insufficient");

        let result = with_confirmation(
            &session,
            &log,
            ConfirmationPolicy::default(),
            "swap",
            Asset::Native,
            || async {
                Err::<(), _>(OperationError::InsufficientBalance {
                    token: "ETH".into(),
                    required: "1".into(),
                    available: "0".into(),
                })
            },
        )
        .await;

        assert!(matches!(result, Err(OperationError::InsufficientBalance { .. })));
        assert!(log_content(&log).is_empty());
    }

    #[tokio::test(start_paused = true)]
    #[serial]
    async fn test_poll_read_errors_count_as_unchanged() {
        let chain = Arc::new(FakeChain::new());
        let usdt = chain.add_token(6);
        let session = chain.session();
        let log = temp_log("confirm-poll-error");

        let policy = ConfirmationPolicy {
            attempts: 3,
            interval: Duration::from_secs(5),
        };
        let result = with_confirmation(&session, &log, policy, "swap", Asset::Erc20(usdt), || {
            let chain = chain.clone();
            async move {
                chain.fail_next(Fault::Balance, 2);
                chain.set_erc20_balance(usdt, U256::from(1u64));
                Ok(())
            }
        })
        .await;

        assert_eq!(result.unwrap(), U256::from(1u64));
    }
}
