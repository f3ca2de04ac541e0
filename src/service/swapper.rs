use std::time::Duration;

use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::{SolCall, SolValue};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use crate::repository::contract::{IMuteRouter, ISyncSwapRouter};
use crate::service::aggregator::AggregatorClient;
use crate::service::allowance::AllowanceManager;
use crate::service::session::ChainSession;
use crate::service::transaction::TransactionSubmitter;
use crate::service::types::{Asset, ContractCall, Token};
use crate::service::utils::calculate_minimum_output;
use crate::service::{OperationError, ServiceResult};

/// SyncSwap unwraps wrapped-native output back to the native coin in this mode.
const SYNC_SWAP_WITHDRAW_MODE: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Where stable-to-stable swaps are sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StableVenue {
    #[default]
    Aggregator,
    SyncSwap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DexAddresses {
    pub mute_router: Address,
    pub sync_swap_router: Address,
    pub sync_swap_factory: Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapSettings {
    /// Percentage, e.g. 1 for 1%.
    pub slippage_percent: Decimal,
    pub deadline: Duration,
}

impl SwapSettings {
    fn deadline(&self) -> U256 {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        U256::from(now + self.deadline.as_secs())
    }
}

/// Token swaps across the supported venues.
///
/// Any swap with a native leg goes through Mute. Swaps between two ERC20
/// tokens go to the configured [`StableVenue`].
pub struct Swapper {
    dex: DexAddresses,
    aggregator: Option<AggregatorClient>,
    stable_venue: StableVenue,
    settings: SwapSettings,
    submitter: TransactionSubmitter,
    allowances: AllowanceManager,
}

impl Swapper {
    pub fn new(
        dex: DexAddresses,
        aggregator: Option<AggregatorClient>,
        stable_venue: StableVenue,
        settings: SwapSettings,
        submitter: TransactionSubmitter,
        allowances: AllowanceManager,
    ) -> Self {
        Self {
            dex,
            aggregator,
            stable_venue,
            settings,
            submitter,
            allowances,
        }
    }

    /// Swaps `amount` (human units) of `from` into `to`.
    ///
    /// Fails with `InsufficientBalance` before anything is submitted when the
    /// wallet holds less than `amount`.
    #[instrument(skip(self, session, from, to), fields(from = %from, to = %to), err)]
    pub async fn swap(
        &self,
        session: &ChainSession,
        from: &Token,
        to: &Token,
        amount: Decimal,
    ) -> ServiceResult<TxHash> {
        let amount_in = session.to_base_units(amount, from.asset).await?;
        session.ensure_balance(from, amount_in).await?;

        let tx_hash = if from.asset.is_native() || to.asset.is_native() {
            self.mute_swap(session, from, to, amount_in).await?
        } else {
            match self.stable_venue {
                StableVenue::Aggregator => self.aggregator_swap(session, from, to, amount_in).await?,
                StableVenue::SyncSwap => self.sync_swap(session, from, to, amount_in).await?,
            }
        };

        tracing::info!("Swapped {} {} => {}", amount, from, to);
        Ok(tx_hash)
    }

    pub async fn mute_swap(
        &self,
        session: &ChainSession,
        from: &Token,
        to: &Token,
        amount_in: U256,
    ) -> ServiceResult<TxHash> {
        let router = self.dex.mute_router;
        let weth = session.wrapped_native();
        let path = vec![from.asset.route_address(weth), to.asset.route_address(weth)];

        let quote = session
            .repository()
            .get_mute_quote(router, amount_in, path[0], path[1])
            .await?;
        let amount_out_min = calculate_minimum_output(quote.amount_out, self.settings.slippage_percent);
        let deadline = self.settings.deadline();
        let stable = vec![quote.stable];
        let wallet = session.address();

        let call = match (from.asset, to.asset) {
            (Asset::Native, _) => {
                let input = IMuteRouter::swapExactETHForTokensSupportingFeeOnTransferTokensCall {
                    amountOutMin: amount_out_min,
                    path,
                    to: wallet,
                    deadline,
                    stable,
                }
                .abi_encode();
                ContractCall::new("mute swap", router, input).with_value(amount_in)
            }
            (Asset::Erc20(token), Asset::Native) => {
                self.allowances
                    .ensure_allowance(session, token, router, amount_in)
                    .await?;
                let input = IMuteRouter::swapExactTokensForETHSupportingFeeOnTransferTokensCall {
                    amountIn: amount_in,
                    amountOutMin: amount_out_min,
                    path,
                    to: wallet,
                    deadline,
                    stable,
                }
                .abi_encode();
                ContractCall::new("mute swap", router, input)
            }
            (Asset::Erc20(token), Asset::Erc20(_)) => {
                self.allowances
                    .ensure_allowance(session, token, router, amount_in)
                    .await?;
                let input = IMuteRouter::swapExactTokensForTokensSupportingFeeOnTransferTokensCall {
                    amountIn: amount_in,
                    amountOutMin: amount_out_min,
                    path,
                    to: wallet,
                    deadline,
                    stable,
                }
                .abi_encode();
                ContractCall::new("mute swap", router, input)
            }
        };

        self.submitter.submit(session, &call).await
    }

    pub async fn sync_swap(
        &self,
        session: &ChainSession,
        from: &Token,
        to: &Token,
        amount_in: U256,
    ) -> ServiceResult<TxHash> {
        let weth = session.wrapped_native();
        let token_in = from.asset.route_address(weth);
        let token_out = to.asset.route_address(weth);

        let pool = session
            .repository()
            .get_sync_swap_pool(self.dex.sync_swap_factory, token_in, token_out)
            .await?;
        if pool == Address::ZERO {
            return Err(OperationError::UnknownToken(format!(
                "no SyncSwap pool for {from}/{to}"
            )));
        }

        let quote = session
            .repository()
            .get_sync_swap_quote(pool, token_in, amount_in, session.address())
            .await?;
        let amount_out_min = calculate_minimum_output(quote, self.settings.slippage_percent);

        let step = ISyncSwapRouter::SwapStep {
            pool,
            data: (token_in, session.address(), SYNC_SWAP_WITHDRAW_MODE)
                .abi_encode_params()
                .into(),
            callback: Address::ZERO,
            callbackData: Bytes::new(),
        };

        let (path_token, value) = match from.asset {
            Asset::Native => (Address::ZERO, amount_in),
            Asset::Erc20(token) => {
                self.allowances
                    .ensure_allowance(session, token, self.dex.sync_swap_router, amount_in)
                    .await?;
                (token, U256::ZERO)
            }
        };

        let input = ISyncSwapRouter::swapCall {
            paths: vec![ISyncSwapRouter::SwapPath {
                steps: vec![step],
                tokenIn: path_token,
                amountIn: amount_in,
            }],
            amountOutMin: amount_out_min,
            deadline: self.settings.deadline(),
        }
        .abi_encode();

        let call = ContractCall::new("syncswap swap", self.dex.sync_swap_router, input).with_value(value);
        self.submitter.submit(session, &call).await
    }

    pub async fn aggregator_swap(
        &self,
        session: &ChainSession,
        from: &Token,
        to: &Token,
        amount_in: U256,
    ) -> ServiceResult<TxHash> {
        let aggregator = self
            .aggregator
            .as_ref()
            .ok_or_else(|| OperationError::permanent("No aggregator configured"))?;

        if let Asset::Erc20(token) = from.asset {
            let spender = aggregator.spender().await?;
            self.allowances
                .ensure_allowance(session, token, spender, amount_in)
                .await?;
        }

        let call = aggregator
            .swap_call(
                session.address(),
                from.asset,
                to.asset,
                amount_in,
                self.settings.slippage_percent,
            )
            .await?;

        self.submitter.submit(session, &call).await
    }
}
