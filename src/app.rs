use std::sync::Arc;
use std::time::Duration;

use alloy::providers::ProviderBuilder;
use anyhow::{Context, bail};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{Config, WalletConfig, parse_address};
use crate::repository::AlloyChainRepository;
use crate::service::aggregator::AggregatorClient;
use crate::service::allowance::AllowanceManager;
use crate::service::bridge::OrbiterBridge;
use crate::service::orchestrator::OrchestratorSettings;
use crate::service::staker::{StakeAmounts, Staker};
use crate::service::swapper::{DexAddresses, SwapSettings, Swapper};
use crate::service::{
    ChainSession, ConfirmationPolicy, ErrorLog, Orchestrator, ReceiptPolicy, RetryPolicy,
    StopReason, TokenRegistry, TransactionSubmitter, WalletActions,
};

/// Everything a wallet runner needs that does not depend on the key.
struct Shared {
    config: Config,
    registry: TokenRegistry,
    dex: DexAddresses,
    aggregator: Option<AggregatorClient>,
    error_log: ErrorLog,
}

/// Loads shared state, then runs every configured wallet concurrently until
/// all of them stop or the token is cancelled.
///
/// A failing wallet never affects its siblings; its error is logged and the
/// remaining wallets keep going.
pub async fn run(config: Config, cancellation_token: CancellationToken) -> anyhow::Result<()> {
    if config.wallets.is_empty() {
        bail!("no wallets configured");
    }
    if config.bridge.suffix >= 10_000 {
        bail!("bridge.suffix must fit in four digits, got {}", config.bridge.suffix);
    }

    let shared = Arc::new(Shared::from_config(config)?);
    let route = shared.config.route;
    tracing::info!(
        "Starting {} wallet(s) on route {:?} with tokens {:?}",
        shared.config.wallets.len(),
        route,
        shared.registry.supported_tokens()
    );

    let mut tasks = JoinSet::new();
    for (index, wallet) in shared.config.wallets.iter().cloned().enumerate() {
        let orchestrator = match build_orchestrator(&shared, &wallet, cancellation_token.clone()).await
        {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                tracing::error!("Skipping wallet #{index}: {e:#}");
                continue;
            }
        };

        let span = tracing::info_span!("wallet", address = %orchestrator.actions().session.address());
        tasks.spawn(
            async move {
                match orchestrator.run(route).await {
                    Ok(report) => match report.stop {
                        StopReason::Completed => {
                            tracing::info!("Finished after {} cycles", report.cycles_completed)
                        }
                        reason => tracing::warn!(
                            "Stopped after {} cycles: {:?}",
                            report.cycles_completed,
                            reason
                        ),
                    },
                    Err(e) => tracing::error!("Wallet run failed: {e}"),
                }
            }
            .instrument(span),
        );
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!("Wallet task panicked: {e}");
        }
    }

    tracing::info!("All wallets done");
    Ok(())
}

impl Shared {
    fn from_config(config: Config) -> anyhow::Result<Self> {
        let native = parse_address(&config.native_token, "native_token")?;
        let registry = TokenRegistry::from_addresses(&config.tokens, native)
            .context("failed to build token registry")?;
        for symbol in [&config.pair.primary, &config.pair.secondary] {
            registry
                .resolve(symbol)
                .with_context(|| format!("pair token {symbol} is not in tokens"))?;
        }

        let dex = DexAddresses {
            mute_router: parse_address(&config.dex.mute_router, "dex.mute_router")?,
            sync_swap_router: parse_address(&config.dex.sync_swap_router, "dex.sync_swap_router")?,
            sync_swap_factory: parse_address(
                &config.dex.sync_swap_classic_factory,
                "dex.sync_swap_classic_factory",
            )?,
        };

        let aggregator = config
            .aggregator
            .as_ref()
            .map(|a| AggregatorClient::new(a.base_url.clone(), a.api_key.clone()))
            .transpose()
            .context("failed to build aggregator client")?;

        let error_log = ErrorLog::new(&config.error_log);

        Ok(Self {
            config,
            registry,
            dex,
            aggregator,
            error_log,
        })
    }

    fn native_symbol(&self) -> anyhow::Result<String> {
        let native = parse_address(&self.config.native_token, "native_token")?;
        self.config
            .tokens
            .iter()
            .find(|(_, address)| parse_address(address, "tokens").ok() == Some(native))
            .map(|(symbol, _)| symbol.to_uppercase())
            .context("tokens must list the native token")
    }
}

async fn build_orchestrator(
    shared: &Shared,
    wallet: &WalletConfig,
    cancellation_token: CancellationToken,
) -> anyhow::Result<Orchestrator<WalletActions>> {
    let config = &shared.config;
    let timing = &config.timing;

    let provider = ProviderBuilder::new().connect_http(
        config
            .rpc
            .url
            .parse()
            .with_context(|| format!("invalid rpc.url: {}", config.rpc.url))?,
    );
    let repository = AlloyChainRepository::new_with_wallet(Arc::new(provider), &wallet.private_key)
        .context("failed to load wallet key")?;

    let weth = parse_address(&config.weth, "weth")?;
    let session = ChainSession::connect(Arc::new(repository), config.rpc.chain_id, weth)
        .await
        .context("failed to connect chain session")?;
    tracing::info!(
        "Loaded wallet {} (tier {}) on chain {}",
        session.address(),
        wallet.tier,
        session.chain_id()
    );

    let retry = RetryPolicy::new(
        timing.retry_attempts,
        Duration::from_millis(timing.retry_backoff_ms),
    );
    let submitter = TransactionSubmitter::new(retry).with_explorer(config.rpc.explorer_tx_url.clone());
    let receipts = ReceiptPolicy {
        attempts: timing.receipt_attempts,
        interval: Duration::from_secs(timing.receipt_interval_secs),
    };
    let allowances = AllowanceManager::new(
        submitter.clone(),
        receipts,
        Duration::from_secs(timing.approval_grace_secs),
    );

    let swapper = Swapper::new(
        shared.dex,
        shared.aggregator.clone(),
        config.dex.stable_venue,
        SwapSettings {
            slippage_percent: config.trading.slippage_percent,
            deadline: Duration::from_secs(config.trading.deadline_minutes * 60),
        },
        submitter.clone(),
        allowances.clone(),
    );

    let staker = config
        .dex
        .sync_swap_stake_pool
        .as_deref()
        .map(|pool| parse_address(pool, "dex.sync_swap_stake_pool"))
        .transpose()?
        .map(|pool| {
            Staker::new(
                shared.dex.sync_swap_router,
                pool,
                StakeAmounts {
                    token: config.stake.primary_amount,
                    native: config.stake.native_amount,
                },
                submitter.clone(),
                allowances.clone(),
            )
        });

    let bridge = OrbiterBridge::new(
        parse_address(&config.bridge.maker, "bridge.maker")?,
        config.bridge.fee,
        config.bridge.suffix,
        submitter.clone(),
    );

    let settings = OrchestratorSettings {
        primary: config.pair.primary.clone(),
        secondary: config.pair.secondary.clone(),
        native: shared.native_symbol()?,
        bridge_holdback: bridge.fee() + config.bridge.buffer,
        native_reserve: config.bridge.native_reserve,
    };

    let actions = WalletActions {
        session,
        registry: shared.registry.clone(),
        swapper,
        staker,
        bridge,
        submitter,
        error_log: shared.error_log.clone(),
        confirmation: ConfirmationPolicy {
            attempts: timing.confirmation_attempts,
            interval: Duration::from_secs(timing.confirmation_interval_secs),
        },
        pacing: Duration::from_secs(timing.pacing_secs),
    };

    Ok(Orchestrator::new(actions, wallet.tier, settings, cancellation_token))
}
