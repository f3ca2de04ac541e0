use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256, address};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use crate::service::types::{Asset, ContractCall};
use crate::service::{OperationError, ServiceResult};

/// How 1inch-style aggregators address the native coin.
pub const AGGREGATOR_NATIVE: Address = address!("0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

#[derive(Debug, Deserialize)]
struct SpenderResponse {
    address: String,
}

#[derive(Debug, Deserialize)]
struct SwapTx {
    to: String,
    data: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    #[serde(alias = "toAmount")]
    to_token_amount: Option<String>,
    tx: SwapTx,
}

/// HTTP client for a 1inch-style swap API.
///
/// Only `to`, `data` and `value` are taken from the API's transaction; nonce
/// and gas are always filled in locally.
#[derive(Debug, Clone)]
pub struct AggregatorClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl AggregatorClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> ServiceResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
        })
    }

    pub fn token_address(asset: Asset) -> Address {
        match asset {
            Asset::Native => AGGREGATOR_NATIVE,
            Asset::Erc20(address) => address,
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ServiceResult<T> {
        let mut request = self
            .http
            .get(format!("{}/{}", self.base_url, path))
            .query(query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Address the aggregator router pulls tokens through.
    #[instrument(skip(self), err)]
    pub async fn spender(&self) -> ServiceResult<Address> {
        let response: SpenderResponse = self.get("approve/spender", &[]).await?;
        parse_address(&response.address)
    }

    /// Asks the aggregator for swap call data.
    ///
    /// # Arguments
    ///
    /// * `from` - Wallet that will send the transaction
    /// * `token_in` / `token_out` - Assets to swap
    /// * `amount_in` - Amount of `token_in` in base units
    /// * `slippage` - Slippage tolerance as a percentage
    #[instrument(skip(self), err)]
    pub async fn swap_call(
        &self,
        from: Address,
        token_in: Asset,
        token_out: Asset,
        amount_in: U256,
        slippage: Decimal,
    ) -> ServiceResult<ContractCall> {
        let query = [
            ("fromTokenAddress", Self::token_address(token_in).to_string()),
            ("toTokenAddress", Self::token_address(token_out).to_string()),
            ("amount", amount_in.to_string()),
            ("fromAddress", from.to_string()),
            ("slippage", slippage.to_string()),
        ];

        let response: SwapResponse = self.get("swap", &query).await?;
        if let Some(amount) = &response.to_token_amount {
            tracing::debug!("Aggregator quotes {} base units out", amount);
        }

        let call = swap_call_from_tx(response.tx)?;
        if !token_in.is_native() && !call.value.is_zero() {
            return Err(OperationError::permanent(format!(
                "Aggregator asked for value {} on a token swap",
                call.value
            )));
        }
        Ok(call)
    }
}

fn parse_address(s: &str) -> ServiceResult<Address> {
    Address::from_str(s.trim())
        .map_err(|e| OperationError::permanent(format!("Aggregator returned invalid address {s}: {e}")))
}

fn swap_call_from_tx(tx: SwapTx) -> ServiceResult<ContractCall> {
    let to = parse_address(&tx.to)?;
    let input = Bytes::from_str(&tx.data)
        .map_err(|e| OperationError::permanent(format!("Aggregator returned invalid call data: {e}")))?;
    if input.is_empty() {
        return Err(OperationError::permanent("Aggregator returned empty call data"));
    }
    let value = U256::from_str(&tx.value).map_err(|e| {
        OperationError::permanent(format!("Aggregator returned invalid value {}: {e}", tx.value))
    })?;

    Ok(ContractCall::new("aggregator swap", to, input).with_value(value))
}
