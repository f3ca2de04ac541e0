use alloy::primitives::{TxHash, U256};
use alloy::sol_types::SolCall;
use tracing::instrument;

use crate::repository::contract::IERC20;
use crate::service::session::ChainSession;
use crate::service::transaction::TransactionSubmitter;
use crate::service::types::{Asset, ContractCall, Token};
use crate::service::utils::format_balance;
use crate::service::{OperationError, ServiceResult};

/// Sends the wallet's whole balance of an ERC20 token back to itself.
#[instrument(skip(session, submitter, token), fields(token = %token), err)]
pub async fn transfer_to_self(
    session: &ChainSession,
    submitter: &TransactionSubmitter,
    token: &Token,
) -> ServiceResult<TxHash> {
    let Asset::Erc20(address) = token.asset else {
        return Err(OperationError::UnknownToken(format!(
            "{token} is native; only ERC20 tokens are sent to self"
        )));
    };

    let balance = session.balance(token.asset).await?;
    if balance.is_zero() {
        return Err(OperationError::InsufficientBalance {
            token: token.symbol.clone(),
            required: "any".to_string(),
            available: "0".to_string(),
        });
    }

    let input = IERC20::transferCall {
        to: session.address(),
        amount: balance,
    }
    .abi_encode();
    let call = ContractCall::new("transfer to self", address, input);
    let tx_hash = submitter.submit(session, &call).await?;

    let decimals = session.decimals(token.asset).await?;
    tracing::info!(
        "Transferred {} {} to self",
        format_balance(balance, decimals),
        token
    );
    Ok(tx_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::FakeChain;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_transfers_full_balance_to_own_address() {
        let chain = Arc::new(FakeChain::new());
        let usdc = chain.add_token(6);
        chain.set_erc20_balance(usdc, U256::from(123_456_789u64));
        let session = chain.session();
        let token = Token {
            symbol: "USDC".into(),
            asset: Asset::Erc20(usdc),
        };

        transfer_to_self(&session, &TransactionSubmitter::default(), &token)
            .await
            .unwrap();

        let sent = chain.sent_requests();
        assert_eq!(sent.len(), 1);
        let decoded = IERC20::transferCall::abi_decode(sent[0].input.input().unwrap()).unwrap();
        assert_eq!(decoded.to, FakeChain::WALLET);
        assert_eq!(decoded.amount, U256::from(123_456_789u64));
    }

    #[tokio::test]
    async fn test_empty_balance_sends_nothing() {
        let chain = Arc::new(FakeChain::new());
        let usdc = chain.add_token(6);
        let session = chain.session();
        let token = Token {
            symbol: "USDC".into(),
            asset: Asset::Erc20(usdc),
        };

        let result = transfer_to_self(&session, &TransactionSubmitter::default(), &token).await;

        assert!(matches!(result, Err(OperationError::InsufficientBalance { .. })));
        assert_eq!(chain.sent_count(), 0);
    }
}
