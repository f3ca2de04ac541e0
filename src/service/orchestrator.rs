use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::service::bridge::OrbiterBridge;
use crate::service::confirmation::{ConfirmationPolicy, with_confirmation};
use crate::service::error_log::ErrorLog;
use crate::service::session::ChainSession;
use crate::service::staker::Staker;
use crate::service::swapper::Swapper;
use crate::service::token_registry::TokenRegistry;
use crate::service::transaction::TransactionSubmitter;
use crate::service::transfer::transfer_to_self;
use crate::service::types::Asset;
use crate::service::{OperationError, ServiceResult};

/// Account classification that sets how many cycles a wallet runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "TierRepr")]
pub enum Tier {
    Diamond,
    One,
    Two,
    Unrecognized,
}

impl Tier {
    pub fn cycles(self) -> u32 {
        match self {
            Tier::Diamond => 109,
            Tier::One => 40,
            Tier::Two => 20,
            Tier::Unrecognized => 0,
        }
    }
}

impl FromStr for Tier {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "diamond" => Tier::Diamond,
            "1" => Tier::One,
            "2" => Tier::Two,
            _ => Tier::Unrecognized,
        })
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Diamond => f.write_str("diamond"),
            Tier::One => f.write_str("1"),
            Tier::Two => f.write_str("2"),
            Tier::Unrecognized => f.write_str("unrecognized"),
        }
    }
}

/// YAML may spell a tier as `diamond`, `"1"` or a bare `1`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TierRepr {
    Name(String),
    Level(u64),
}

impl From<TierRepr> for Tier {
    fn from(repr: TierRepr) -> Self {
        match repr {
            TierRepr::Name(name) => name.parse().unwrap_or(Tier::Unrecognized),
            TierRepr::Level(level) => level.to_string().parse().unwrap_or(Tier::Unrecognized),
        }
    }
}

/// Which sequence a wallet runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Alternate between the two stable tokens for the tier's cycle count.
    #[default]
    Cycles,
    /// Consolidate into the primary token and bridge it out.
    Withdraw,
}

/// The steps a cycle is made of, by token symbol.
///
/// `swap`, `stake` and `bridge` return only once the effect is visible in the
/// wallet balance. `transfer_to_self` is fire-and-forget.
#[async_trait]
pub trait CycleActions: Send + Sync {
    async fn balance(&self, symbol: &str) -> ServiceResult<Decimal>;

    async fn transfer_to_self(&self, symbol: &str) -> ServiceResult<()>;

    async fn swap(&self, from: &str, to: &str, amount: Decimal) -> ServiceResult<U256>;

    async fn stake(&self) -> ServiceResult<U256>;

    async fn bridge(&self, symbol: &str, amount: Decimal) -> ServiceResult<U256>;

    /// Fixed pause between steps.
    async fn pace(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Every planned cycle ran.
    Completed,
    /// Both pair balances are zero.
    NothingToTrade,
    /// A step found too little balance and submitted nothing.
    InsufficientBalance(String),
    /// Shutdown was requested.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub cycles_completed: u32,
    pub stop: StopReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub primary: String,
    pub secondary: String,
    pub native: String,
    /// Bridge fee plus the safety buffer kept back from a withdrawal.
    pub bridge_holdback: Decimal,
    /// Native balance never swapped away during a withdrawal.
    pub native_reserve: Decimal,
}

/// Drives one wallet through its route.
///
/// Any error other than `InsufficientBalance` ends the wallet's run and is
/// returned; sibling wallets are unaffected.
pub struct Orchestrator<A: CycleActions> {
    actions: A,
    tier: Tier,
    settings: OrchestratorSettings,
    cancellation_token: CancellationToken,
}

impl<A: CycleActions> Orchestrator<A> {
    pub fn new(
        actions: A,
        tier: Tier,
        settings: OrchestratorSettings,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            actions,
            tier,
            settings,
            cancellation_token,
        }
    }

    pub fn actions(&self) -> &A {
        &self.actions
    }

    pub async fn run(&self, route: Route) -> ServiceResult<RunReport> {
        match route {
            Route::Cycles => self.run_cycles().await,
            Route::Withdraw => self.run_withdraw().await,
        }
    }

    pub async fn run_cycles(&self) -> ServiceResult<RunReport> {
        let planned = self.tier.cycles();
        let mut completed = 0;
        tracing::info!("Tier {} plans {} cycles", self.tier, planned);

        while completed < planned {
            if self.cancellation_token.is_cancelled() {
                tracing::warn!("Cancelled after {} of {} cycles", completed, planned);
                return Ok(report(completed, StopReason::Cancelled));
            }

            match self.cycle().await {
                Ok(true) => {
                    completed += 1;
                    tracing::info!("Cycle {}/{} done", completed, planned);
                }
                Ok(false) => {
                    tracing::warn!(
                        "No {} or {} left to trade",
                        self.settings.primary,
                        self.settings.secondary
                    );
                    return Ok(report(completed, StopReason::NothingToTrade));
                }
                Err(e) => return stop_on(e, completed),
            }
        }

        Ok(report(completed, StopReason::Completed))
    }

    /// One cycle: optional stake, then move the larger side of the pair into
    /// the smaller one. Returns `false` when there is nothing to move.
    async fn cycle(&self) -> ServiceResult<bool> {
        if self.tier == Tier::Diamond {
            self.actions.stake().await?;
        }

        let primary = &self.settings.primary;
        let secondary = &self.settings.secondary;
        let primary_balance = self.actions.balance(primary).await?;
        let secondary_balance = self.actions.balance(secondary).await?;

        if primary_balance.is_zero() && secondary_balance.is_zero() {
            return Ok(false);
        }

        let (from, to) = if primary_balance >= secondary_balance {
            (primary, secondary)
        } else {
            (secondary, primary)
        };

        if let Err(e) = self.actions.transfer_to_self(from).await {
            tracing::warn!("Transfer of {} to self failed: {e}", from);
        }
        self.actions.pace().await;

        let amount = self.actions.balance(from).await?;
        self.actions.swap(from, to, amount).await?;
        self.actions.pace().await;

        Ok(true)
    }

    /// Swap the secondary token and spare native coin into the primary token,
    /// then bridge the primary balance out minus the holdback.
    pub async fn run_withdraw(&self) -> ServiceResult<RunReport> {
        match self.withdraw().await {
            Ok(()) => Ok(report(0, StopReason::Completed)),
            Err(e) => stop_on(e, 0),
        }
    }

    async fn withdraw(&self) -> ServiceResult<()> {
        let primary = &self.settings.primary;
        let secondary = &self.settings.secondary;
        let native = &self.settings.native;

        let primary_balance = self.actions.balance(primary).await?;
        let secondary_balance = self.actions.balance(secondary).await?;
        if secondary_balance > primary_balance {
            self.actions
                .swap(secondary, primary, secondary_balance)
                .await?;
        }

        let native_balance = self.actions.balance(native).await?;
        let spare = native_balance - self.settings.native_reserve;
        if spare > Decimal::ZERO {
            self.actions.swap(native, primary, spare).await?;
        }
        self.actions.pace().await;

        let primary_balance = self.actions.balance(primary).await?;
        let amount = primary_balance - self.settings.bridge_holdback;
        if amount <= Decimal::ZERO {
            return Err(OperationError::InsufficientBalance {
                token: primary.clone(),
                required: self.settings.bridge_holdback.to_string(),
                available: primary_balance.to_string(),
            });
        }

        self.actions.bridge(primary, amount).await?;
        Ok(())
    }
}

fn report(cycles_completed: u32, stop: StopReason) -> RunReport {
    RunReport {
        cycles_completed,
        stop,
    }
}

fn stop_on(err: OperationError, completed: u32) -> ServiceResult<RunReport> {
    match err {
        OperationError::InsufficientBalance { .. } => {
            tracing::warn!("Stopping: {err}");
            Ok(report(completed, StopReason::InsufficientBalance(err.to_string())))
        }
        _ => Err(err),
    }
}

/// [`CycleActions`] backed by a live chain session.
pub struct WalletActions {
    pub session: ChainSession,
    pub registry: TokenRegistry,
    pub swapper: Swapper,
    pub staker: Option<Staker>,
    pub bridge: OrbiterBridge,
    pub submitter: TransactionSubmitter,
    pub error_log: ErrorLog,
    pub confirmation: ConfirmationPolicy,
    pub pacing: Duration,
}

#[async_trait]
impl CycleActions for WalletActions {
    async fn balance(&self, symbol: &str) -> ServiceResult<Decimal> {
        let token = self.registry.resolve(symbol)?;
        self.session.human_balance(token.asset).await
    }

    async fn transfer_to_self(&self, symbol: &str) -> ServiceResult<()> {
        let token = self.registry.resolve(symbol)?;
        transfer_to_self(&self.session, &self.submitter, &token).await?;
        Ok(())
    }

    async fn swap(&self, from: &str, to: &str, amount: Decimal) -> ServiceResult<U256> {
        let (from, to) = self.registry.resolve_pair(from, to)?;
        let label = format!("swap {from} => {to}");

        with_confirmation(
            &self.session,
            &self.error_log,
            self.confirmation,
            &label,
            to.asset,
            || self.swapper.swap(&self.session, &from, &to, amount),
        )
        .await
    }

    async fn stake(&self) -> ServiceResult<U256> {
        let staker = self.staker.as_ref().ok_or_else(|| {
            OperationError::UnknownToken("no SyncSwap staking pool configured".to_string())
        })?;

        with_confirmation(
            &self.session,
            &self.error_log,
            self.confirmation,
            "stake",
            Asset::Native,
            || staker.stake(&self.session),
        )
        .await
    }

    async fn bridge(&self, symbol: &str, amount: Decimal) -> ServiceResult<U256> {
        let token = self.registry.resolve(symbol)?;
        let label = format!("bridge {token}");

        with_confirmation(
            &self.session,
            &self.error_log,
            self.confirmation,
            &label,
            token.asset,
            || self.bridge.bridge(&self.session, &token, amount),
        )
        .await
    }

    async fn pace(&self) {
        tokio::time::sleep(self.pacing).await;
    }
}
