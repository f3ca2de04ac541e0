use std::collections::HashMap;
use std::str::FromStr;
use std::{fs, path::Path};

use alloy::primitives::Address;
use anyhow::Context;
use dotenv::dotenv;
use envsubst::substitute;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::service::orchestrator::{Route, Tier};
use crate::service::swapper::StableVenue;
use crate::service::token_registry::DEFAULT_NATIVE_TOKEN;

/// Prefixes of environment variables that may be interpolated into the YAML.
const ENV_PREFIXES: [&str; 3] = ["WALLET_", "RPC_", "AGGREGATOR_"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcConfig,
    pub wallets: Vec<WalletConfig>,
    #[serde(default)]
    pub route: Route,
    pub tokens: HashMap<String, String>,
    #[serde(default = "default_native_token")]
    pub native_token: String,
    #[serde(default = "default_weth")]
    pub weth: String,
    #[serde(default)]
    pub pair: PairConfig,
    pub dex: DexConfig,
    #[serde(default)]
    pub aggregator: Option<AggregatorConfig>,
    #[serde(default)]
    pub stake: StakeConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default = "default_error_log")]
    pub error_log: String,
}

impl Config {
    pub async fn from_yaml(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        dotenv().ok();

        let path = path.as_ref();
        let file_content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file from path: {}", path.display()))?;

        let env_vars: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| ENV_PREFIXES.iter().any(|prefix| key.starts_with(prefix)))
            .collect();

        let interpolated = substitute(&file_content, &env_vars)
            .context("Failed to substitute environment variables in YAML")?;

        let config: Config =
            serde_yaml::from_str(&interpolated).context("Failed to parse YAML configuration")?;

        Ok(config)
    }
}

/// Parses a configured address, naming the key in the error.
pub fn parse_address(value: &str, key: &str) -> anyhow::Result<Address> {
    Address::from_str(value.trim()).with_context(|| format!("invalid address for {key}: {value}"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    /// Asked from the node when absent.
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub explorer_tx_url: String,
}

#[derive(Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key: String,
    pub tier: Tier,
}

// Keeps private keys out of logs.
impl std::fmt::Debug for WalletConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConfig")
            .field("private_key", &"<redacted>")
            .field("tier", &self.tier)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    pub primary: String,
    pub secondary: String,
}

impl Default for PairConfig {
    fn default() -> Self {
        Self {
            primary: "USDC".to_string(),
            secondary: "USDT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DexConfig {
    pub mute_router: String,
    pub sync_swap_router: String,
    pub sync_swap_classic_factory: String,
    #[serde(default)]
    pub sync_swap_stake_pool: Option<String>,
    #[serde(default)]
    pub stable_venue: StableVenue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StakeConfig {
    #[serde(default)]
    pub primary_amount: Decimal,
    #[serde(default = "default_stake_native")]
    pub native_amount: Decimal,
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            primary_amount: Decimal::ZERO,
            native_amount: default_stake_native(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_orbiter_maker")]
    pub maker: String,
    #[serde(default)]
    pub fee: Decimal,
    #[serde(default = "default_orbiter_suffix")]
    pub suffix: u16,
    #[serde(default = "default_bridge_buffer")]
    pub buffer: Decimal,
    #[serde(default = "default_native_reserve")]
    pub native_reserve: Decimal,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            maker: default_orbiter_maker(),
            fee: Decimal::ZERO,
            suffix: default_orbiter_suffix(),
            buffer: default_bridge_buffer(),
            native_reserve: default_native_reserve(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_slippage")]
    pub slippage_percent: Decimal,
    #[serde(default = "default_deadline_minutes")]
    pub deadline_minutes: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            slippage_percent: default_slippage(),
            deadline_minutes: default_deadline_minutes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub confirmation_attempts: usize,
    pub confirmation_interval_secs: u64,
    pub receipt_attempts: usize,
    pub receipt_interval_secs: u64,
    pub approval_grace_secs: u64,
    pub pacing_secs: u64,
    pub retry_attempts: usize,
    pub retry_backoff_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            confirmation_attempts: 10,
            confirmation_interval_secs: 5,
            receipt_attempts: 120,
            receipt_interval_secs: 1,
            approval_grace_secs: 5,
            pacing_secs: 10,
            retry_attempts: 3,
            retry_backoff_ms: 1000,
        }
    }
}

fn default_native_token() -> String {
    DEFAULT_NATIVE_TOKEN.to_string()
}

fn default_weth() -> String {
    "0x5AEa5775959fBC2557Cc8789bC1bf90A239D9a91".to_string()
}

fn default_error_log() -> String {
    "errors.txt".to_string()
}

fn default_stake_native() -> Decimal {
    Decimal::new(37, 5)
}

fn default_orbiter_maker() -> String {
    "0x80C67432656d59144cEFf962E8fAF8926599bCF8".to_string()
}

fn default_orbiter_suffix() -> u16 {
    9002
}

fn default_bridge_buffer() -> Decimal {
    Decimal::new(1, 1)
}

fn default_native_reserve() -> Decimal {
    Decimal::new(15, 4)
}

fn default_slippage() -> Decimal {
    Decimal::ONE
}

fn default_deadline_minutes() -> u64 {
    20
}
