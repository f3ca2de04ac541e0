use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::{SolCall, SolValue};
use rust_decimal::Decimal;
use tracing::instrument;

use crate::repository::contract::ISyncSwapRouter;
use crate::service::allowance::AllowanceManager;
use crate::service::session::ChainSession;
use crate::service::transaction::TransactionSubmitter;
use crate::service::types::{Asset, ContractCall, Token};
use crate::service::ServiceResult;

/// Amounts deposited by one stake, in human units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeAmounts {
    /// Deposited on the pool's ERC20 side.
    pub token: Decimal,
    /// Deposited on the pool's wrapped-native side, sent as value.
    pub native: Decimal,
}

/// Adds liquidity to a SyncSwap classic pool.
pub struct Staker {
    router: Address,
    pool: Address,
    amounts: StakeAmounts,
    submitter: TransactionSubmitter,
    allowances: AllowanceManager,
}

impl Staker {
    pub fn new(
        router: Address,
        pool: Address,
        amounts: StakeAmounts,
        submitter: TransactionSubmitter,
        allowances: AllowanceManager,
    ) -> Self {
        Self {
            router,
            pool,
            amounts,
            submitter,
            allowances,
        }
    }

    /// Deposits the configured amounts into the pool.
    ///
    /// Each leg is checked against the wallet balance before anything is
    /// approved or sent. A wrapped-native leg is paid as transaction value
    /// under the zero address; ERC20 legs are approved to the router first.
    #[instrument(skip(self, session), fields(pool = %self.pool), err)]
    pub async fn stake(&self, session: &ChainSession) -> ServiceResult<TxHash> {
        let (token0, token1) = session.repository().get_pool_tokens(self.pool).await?;
        let weth = session.wrapped_native();

        let mut legs = Vec::with_capacity(2);
        for address in [token0, token1] {
            let (token, amount) = if address == weth {
                (
                    Token {
                        symbol: "ETH".to_string(),
                        asset: Asset::Native,
                    },
                    self.amounts.native,
                )
            } else {
                (
                    Token {
                        symbol: address.to_string(),
                        asset: Asset::Erc20(address),
                    },
                    self.amounts.token,
                )
            };

            let amount = session.to_base_units(amount, token.asset).await?;
            session.ensure_balance(&token, amount).await?;
            legs.push((token.asset, amount));
        }

        let mut value = U256::ZERO;
        let mut inputs = Vec::with_capacity(legs.len());
        for (asset, amount) in legs {
            match asset {
                Asset::Native => {
                    value = amount;
                    inputs.push(ISyncSwapRouter::TokenInput {
                        token: Address::ZERO,
                        amount,
                    });
                }
                Asset::Erc20(token) => {
                    if !amount.is_zero() {
                        self.allowances
                            .ensure_allowance(session, token, self.router, amount)
                            .await?;
                    }
                    inputs.push(ISyncSwapRouter::TokenInput { token, amount });
                }
            }
        }

        let input = ISyncSwapRouter::addLiquidityCall {
            pool: self.pool,
            inputs,
            data: session.address().abi_encode().into(),
            minLiquidity: U256::ZERO,
            callback: Address::ZERO,
            callbackData: Bytes::new(),
        }
        .abi_encode();

        let call = ContractCall::new("syncswap stake", self.router, input).with_value(value);
        let tx_hash = self.submitter.submit(session, &call).await?;

        tracing::info!(
            "Added {} ETH and {} tokens to pool {}",
            self.amounts.native,
            self.amounts.token,
            self.pool
        );
        Ok(tx_hash)
    }
}
