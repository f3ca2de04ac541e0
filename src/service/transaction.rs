use std::time::Duration;

use alloy::primitives::{Bytes, TxHash, keccak256};
use tokio::time::sleep;
use tracing::instrument;

use crate::repository::{ReceiptSummary, RepositoryError};
use crate::service::retry::RetryPolicy;
use crate::service::session::ChainSession;
use crate::service::types::{ContractCall, TxIntent};
use crate::service::{OperationError, ServiceResult};

/// Builds, prices, signs and broadcasts every state-changing call.
///
/// A call is signed once per nonce. When the node answers a broadcast with a
/// rejection the next attempt reads a fresh pending nonce and signs again.
/// When the answer is lost in transit the same signed bytes are sent again,
/// and the call counts as sent as soon as the pending nonce moves past ours.
#[derive(Debug, Clone, Default)]
pub struct TransactionSubmitter {
    retry: RetryPolicy,
    explorer_tx_url: Option<String>,
}

/// A signed transaction waiting to be broadcast.
struct SignedTx {
    raw: Bytes,
    hash: TxHash,
    nonce: u64,
}

impl TransactionSubmitter {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            explorer_tx_url: None,
        }
    }

    /// Prefix used to print a block explorer link for each broadcast.
    pub fn with_explorer(mut self, explorer_tx_url: impl Into<String>) -> Self {
        let url: String = explorer_tx_url.into();
        self.explorer_tx_url = (!url.is_empty()).then_some(url);
        self
    }

    #[instrument(skip(self, session, call), fields(label = call.label), err)]
    pub async fn submit(&self, session: &ChainSession, call: &ContractCall) -> ServiceResult<TxHash> {
        self.retry
            .run(|attempt| self.submit_once(session, call, attempt))
            .await
    }

    async fn submit_once(
        &self,
        session: &ChainSession,
        call: &ContractCall,
        attempt: usize,
    ) -> ServiceResult<TxHash> {
        let signed = self.sign(session, call).await?;
        let tx_hash = self.broadcast(session, &signed).await?;

        match &self.explorer_tx_url {
            Some(url) => tracing::info!(
                "Sent {} (attempt {}, nonce {}): {}{}",
                call.label,
                attempt,
                signed.nonce,
                url,
                tx_hash
            ),
            None => tracing::info!(
                "Sent {} (attempt {}, nonce {}): {}",
                call.label,
                attempt,
                signed.nonce,
                tx_hash
            ),
        }

        Ok(tx_hash)
    }

    async fn sign(&self, session: &ChainSession, call: &ContractCall) -> ServiceResult<SignedTx> {
        let repository = session.repository();

        let nonce = repository.get_nonce(session.address()).await?;
        let mut intent = TxIntent::skeleton(session.address(), session.chain_id(), nonce, call);

        // Call data and value are final from here on; gas depends on both.
        let gas_price = repository.get_gas_price().await?;
        intent.apply_gas_price(gas_price);
        intent.gas_limit = repository.estimate_gas(&intent.to_request()).await?;

        if !intent.is_priced() {
            return Err(OperationError::UnpricedTransaction(format!(
                "{} (nonce {}, fee {}, gas {})",
                call.label, intent.nonce, intent.max_fee_per_gas, intent.gas_limit
            )));
        }

        let raw = repository.sign_transaction(intent.to_request()).await?;
        Ok(SignedTx {
            hash: keccak256(&raw),
            raw,
            nonce,
        })
    }

    /// Sends `signed` until the node answers.
    ///
    /// A lost answer is never retried with a new signature: the same bytes go
    /// out again, so at most one transaction can land for this nonce. Once the
    /// budget for lost answers is spent the error is final.
    async fn broadcast(&self, session: &ChainSession, signed: &SignedTx) -> ServiceResult<TxHash> {
        let repository = session.repository();
        let mut delay = self.retry.initial_backoff;
        let mut maybe_accepted = false;

        for attempt in 1..=self.retry.max_attempts {
            match repository.send_raw_transaction(signed.raw.clone()).await {
                Ok(tx_hash) => return Ok(tx_hash),
                Err(RepositoryError::NetworkError(message)) => {
                    maybe_accepted = true;
                    if self.nonce_consumed(session, signed).await {
                        return Ok(signed.hash);
                    }
                    tracing::warn!(
                        "Broadcast {}/{} of {} got no answer: {message}",
                        attempt,
                        self.retry.max_attempts,
                        signed.hash
                    );
                }
                // an earlier copy may have landed before this rejection
                Err(RepositoryError::RpcError(message)) if maybe_accepted => {
                    if message.contains("already known")
                        || self.nonce_consumed(session, signed).await
                    {
                        return Ok(signed.hash);
                    }
                    return Err(RepositoryError::RpcError(message).into());
                }
                // the node answered and did not take our hash
                Err(e) => return Err(e.into()),
            }

            if attempt < self.retry.max_attempts {
                sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }

        Err(OperationError::permanent(format!(
            "broadcast of {} (nonce {}) unanswered after {} attempts",
            signed.hash, signed.nonce, self.retry.max_attempts
        )))
    }

    /// Whether the pending nonce has moved past the one `signed` uses.
    async fn nonce_consumed(&self, session: &ChainSession, signed: &SignedTx) -> bool {
        match session.repository().get_nonce(session.address()).await {
            Ok(pending) if pending > signed.nonce => {
                tracing::info!(
                    "Nonce {} already used, treating {} as sent",
                    signed.nonce,
                    signed.hash
                );
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::warn!("Could not read pending nonce: {e}");
                false
            }
        }
    }
}

/// Bounded receipt polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptPolicy {
    pub attempts: usize,
    pub interval: Duration,
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self {
            attempts: 120,
            interval: Duration::from_secs(1),
        }
    }
}

/// Polls for the receipt of `tx_hash` until it is mined or the policy runs out.
///
/// A mined receipt with failed status is `Reverted`. Read errors while polling
/// count as an unanswered attempt.
pub async fn wait_for_receipt(
    session: &ChainSession,
    tx_hash: TxHash,
    policy: ReceiptPolicy,
) -> ServiceResult<ReceiptSummary> {
    for attempt in 1..=policy.attempts {
        match session.repository().get_transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) if receipt.success => {
                tracing::debug!(
                    "Receipt for {} in block {:?} after {} polls",
                    tx_hash,
                    receipt.block_number,
                    attempt
                );
                return Ok(receipt);
            }
            Ok(Some(_)) => return Err(OperationError::Reverted(tx_hash)),
            Ok(None) => {}
            Err(e) => tracing::warn!("Receipt poll {} for {} failed: {e}", attempt, tx_hash),
        }
        sleep(policy.interval).await;
    }

    Err(OperationError::Timeout(format!(
        "no receipt for {tx_hash} after {} polls",
        policy.attempts
    )))
}
