use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use tracing::instrument;

use crate::repository::ChainRepository;
use crate::service::types::{Asset, Token};
use crate::service::utils::{to_base_units, to_human_units};
use crate::service::{OperationError, ServiceResult};

/// Native coins on EVM chains carry 18 decimals by protocol definition.
pub const NATIVE_DECIMALS: u8 = 18;

/// One wallet's handle on one chain.
///
/// Owned by the wallet's task and passed by reference into every operation;
/// no other task shares it.
pub struct ChainSession {
    repository: Arc<dyn ChainRepository>,
    address: Address,
    chain_id: u64,
    wrapped_native: Address,
    decimals: Mutex<HashMap<(u64, Address), u8>>,
}

impl ChainSession {
    pub fn new(repository: Arc<dyn ChainRepository>, chain_id: u64, wrapped_native: Address) -> Self {
        let address = repository.wallet_address();
        Self {
            repository,
            address,
            chain_id,
            wrapped_native,
            decimals: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a session, asking the node for the chain id when none is configured.
    pub async fn connect(
        repository: Arc<dyn ChainRepository>,
        chain_id: Option<u64>,
        wrapped_native: Address,
    ) -> ServiceResult<Self> {
        let chain_id = match chain_id {
            Some(id) => id,
            None => repository.get_chain_id().await?,
        };
        Ok(Self::new(repository, chain_id, wrapped_native))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn wrapped_native(&self) -> Address {
        self.wrapped_native
    }

    pub fn repository(&self) -> &dyn ChainRepository {
        self.repository.as_ref()
    }

    /// Raw balance of `asset` held by this wallet.
    pub async fn balance(&self, asset: Asset) -> ServiceResult<U256> {
        let balance = match asset {
            Asset::Native => self.repository.get_native_balance(self.address).await?,
            Asset::Erc20(token) => {
                self.repository
                    .get_erc20_balance(token, self.address)
                    .await?
            }
        };
        Ok(balance)
    }

    /// Decimals of `asset`, queried once per (chain, token) and cached.
    #[instrument(skip(self), err)]
    pub async fn decimals(&self, asset: Asset) -> ServiceResult<u8> {
        let token = match asset {
            Asset::Native => return Ok(NATIVE_DECIMALS),
            Asset::Erc20(token) => token,
        };

        let key = (self.chain_id, token);
        if let Some(decimals) = self.cached_decimals(&key) {
            return Ok(decimals);
        }

        let decimals = self
            .repository
            .get_token_decimals(token)
            .await
            .map_err(|e| OperationError::RpcFailure {
                message: format!("Cannot resolve decimals of {token}: {e}"),
                transient: e.is_transient(),
            })?;

        if let Ok(mut cache) = self.decimals.lock() {
            cache.insert(key, decimals);
        }
        Ok(decimals)
    }

    fn cached_decimals(&self, key: &(u64, Address)) -> Option<u8> {
        self.decimals
            .lock()
            .ok()
            .and_then(|cache| cache.get(key).copied())
    }

    pub async fn to_base_units(&self, amount: Decimal, asset: Asset) -> ServiceResult<U256> {
        let decimals = self.decimals(asset).await?;
        to_base_units(amount, decimals)
    }

    pub async fn to_human_units(&self, value: U256, asset: Asset) -> ServiceResult<Decimal> {
        let decimals = self.decimals(asset).await?;
        to_human_units(value, decimals)
    }

    /// Balance of `asset` in human units.
    pub async fn human_balance(&self, asset: Asset) -> ServiceResult<Decimal> {
        let balance = self.balance(asset).await?;
        self.to_human_units(balance, asset).await
    }

    /// Reads the current balance and fails with `InsufficientBalance` if it
    /// is below `required` base units.
    pub async fn ensure_balance(&self, token: &Token, required: U256) -> ServiceResult<U256> {
        let available = self.balance(token.asset).await?;
        if required > available {
            let decimals = self.decimals(token.asset).await?;
            tracing::error!(
                "Not enough {} on wallet {}: required {}, available {}",
                token.symbol,
                self.address,
                required,
                available
            );
            return Err(OperationError::InsufficientBalance {
                token: token.symbol.clone(),
                required: crate::service::utils::format_balance(required, decimals),
                available: crate::service::utils::format_balance(available, decimals),
            });
        }
        Ok(available)
    }
}
