use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use alloy::sol_types::SolCall;
use tokio::time::sleep;
use tracing::instrument;

use crate::repository::contract::IERC20;
use crate::service::ServiceResult;
use crate::service::session::ChainSession;
use crate::service::transaction::{ReceiptPolicy, TransactionSubmitter, wait_for_receipt};
use crate::service::types::ContractCall;

/// Approves spenders before they pull tokens from the wallet.
///
/// Approvals are for `U256::MAX` rather than the amount needed, so a spender
/// is approved at most once per token. This leaves a standing unlimited
/// approval on every router the bot has used.
#[derive(Debug, Clone)]
pub struct AllowanceManager {
    submitter: TransactionSubmitter,
    receipts: ReceiptPolicy,
    grace: Duration,
}

impl AllowanceManager {
    pub fn new(submitter: TransactionSubmitter, receipts: ReceiptPolicy, grace: Duration) -> Self {
        Self {
            submitter,
            receipts,
            grace,
        }
    }

    /// Makes sure `spender` may move at least `required` of `token`.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - The current allowance already covers `required`
    /// * `Ok(Some(hash))` - An approval was mined and the grace period has passed
    /// * `Err(OperationError)` - Reading, submitting or mining the approval failed
    #[instrument(skip(self, session), err)]
    pub async fn ensure_allowance(
        &self,
        session: &ChainSession,
        token: Address,
        spender: Address,
        required: U256,
    ) -> ServiceResult<Option<TxHash>> {
        // Always re-read; anyone holding the key can change it.
        let current = session
            .repository()
            .get_allowance(token, session.address(), spender)
            .await?;

        if current >= required {
            tracing::debug!("Allowance {} of {} for {} is enough", current, token, spender);
            return Ok(None);
        }

        let input = IERC20::approveCall {
            spender,
            amount: U256::MAX,
        }
        .abi_encode();
        let call = ContractCall::new("approve", token, input);

        let tx_hash = self.submitter.submit(session, &call).await?;
        wait_for_receipt(session, tx_hash, self.receipts).await?;

        tracing::info!("Approved {} to spend {}: {}", spender, token, tx_hash);
        sleep(self.grace).await;

        Ok(Some(tx_hash))
    }
}
