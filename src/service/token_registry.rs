use std::collections::HashMap;
use std::str::FromStr;

use alloy::primitives::Address;

use crate::service::types::{Asset, Token};
use crate::service::{OperationError, ServiceResult};

/// Native coin address on zkSync Era, used when config does not override it
pub const DEFAULT_NATIVE_TOKEN: &str = "0x000000000000000000000000000000000000800A";

/// Token registry for mapping symbols to assets
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    registry: HashMap<String, Asset>,
}

impl TokenRegistry {
    /// Build the registry from a symbol → address table.
    ///
    /// An address equal to `native_token` is registered as [`Asset::Native`].
    pub fn from_addresses(
        tokens: &HashMap<String, String>,
        native_token: Address,
    ) -> ServiceResult<Self> {
        let mut registry = HashMap::new();

        for (symbol, address) in tokens {
            let address = Address::from_str(address).map_err(|e| {
                OperationError::UnknownToken(format!("{symbol}: invalid address {address}: {e}"))
            })?;

            let asset = if address == native_token {
                Asset::Native
            } else {
                Asset::Erc20(address)
            };

            registry.insert(symbol.to_uppercase(), asset);
        }

        Ok(Self { registry })
    }

    /// Resolve a symbol or fail with `UnknownToken`.
    pub fn resolve(&self, symbol: &str) -> ServiceResult<Token> {
        let symbol = symbol.to_uppercase();
        match self.registry.get(&symbol) {
            Some(asset) => Ok(Token {
                symbol,
                asset: *asset,
            }),
            None => {
                tracing::error!("No address found for token {}", symbol);
                Err(OperationError::UnknownToken(format!(
                    "{} (Supported tokens: {})",
                    symbol,
                    self.supported_tokens().join(", ")
                )))
            }
        }
    }

    /// Resolve both sides of a pair; either one missing fails the pair.
    pub fn resolve_pair(&self, from: &str, to: &str) -> ServiceResult<(Token, Token)> {
        Ok((self.resolve(from)?, self.resolve(to)?))
    }

    /// Get list of all supported token symbols (sorted alphabetically)
    pub fn supported_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self.registry.keys().cloned().collect();
        tokens.sort();
        tokens
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}
