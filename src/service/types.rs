use std::fmt;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;

/// Something a wallet can hold a balance of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Asset {
    /// The chain's native coin, addressed through a sentinel in config.
    Native,
    Erc20(Address),
}

impl Asset {
    pub fn is_native(&self) -> bool {
        matches!(self, Asset::Native)
    }

    /// Address to use in router paths and pool lookups.
    ///
    /// Routers and pools know the native coin only through its wrapped token.
    pub fn route_address(&self, wrapped_native: Address) -> Address {
        match self {
            Asset::Native => wrapped_native,
            Asset::Erc20(address) => *address,
        }
    }
}

/// A registry entry: the symbol used in config and logs plus the asset it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub symbol: String,
    pub asset: Asset,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

/// A state-changing call with its final call data and value, before any
/// nonce or gas fields exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    /// Short label for logs, e.g. `"approve"` or `"mute swap"`.
    pub label: &'static str,
}

impl ContractCall {
    pub fn new(label: &'static str, to: Address, input: impl Into<Bytes>) -> Self {
        Self {
            to,
            value: U256::ZERO,
            input: input.into(),
            label,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Every field of an EIP-1559 transaction the bot fills in.
///
/// Starts from [`TxIntent::skeleton`] with zeroed fee and gas fields; those must
/// be replaced with live values before the intent may be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIntent {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    pub nonce: u64,
    pub chain_id: u64,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
    pub gas_limit: u64,
}

impl TxIntent {
    pub fn skeleton(from: Address, chain_id: u64, nonce: u64, call: &ContractCall) -> Self {
        Self {
            from,
            to: call.to,
            value: call.value,
            input: call.input.clone(),
            nonce,
            chain_id,
            max_fee_per_gas: 0,
            max_priority_fee_per_gas: 0,
            gas_limit: 0,
        }
    }

    /// Uses the current gas price for both the fee cap and the priority fee.
    pub fn apply_gas_price(&mut self, gas_price: u128) {
        self.max_fee_per_gas = gas_price;
        self.max_priority_fee_per_gas = gas_price;
    }

    pub fn is_priced(&self) -> bool {
        self.max_fee_per_gas > 0 && self.max_priority_fee_per_gas > 0 && self.gas_limit > 0
    }

    /// Converts to an RPC request. A zero gas limit is left unset so that
    /// estimation is not capped by the placeholder.
    pub fn to_request(&self) -> TransactionRequest {
        let request = TransactionRequest::default()
            .with_from(self.from)
            .with_to(self.to)
            .with_value(self.value)
            .with_input(self.input.clone())
            .with_nonce(self.nonce)
            .with_chain_id(self.chain_id)
            .with_max_fee_per_gas(self.max_fee_per_gas)
            .with_max_priority_fee_per_gas(self.max_priority_fee_per_gas);

        if self.gas_limit > 0 {
            request.with_gas_limit(self.gas_limit)
        } else {
            request
        }
    }
}
