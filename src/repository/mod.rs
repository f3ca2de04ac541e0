pub mod alloy;
pub mod contract;
pub mod error;

use ::alloy::primitives::{Address, Bytes, TxHash, U256};
use ::alloy::rpc::types::TransactionRequest;
pub use alloy::AlloyChainRepository;
use async_trait::async_trait;
pub use error::RepositoryError;

pub(crate) type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// The parts of a mined receipt the bot acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSummary {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
}

/// A Mute router quote for a single hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuteQuote {
    pub amount_out: U256,
    pub stable: bool,
}

/// Trait for rollup node access and signing.
///
/// This is the only layer that talks to the node or touches the private key.
/// Everything above it works against this trait so a wallet task can run on
/// any provider, and tests can substitute an in-memory chain.
#[async_trait]
pub trait ChainRepository: Send + Sync {
    /// Address derived from the signing key this repository was built with.
    fn wallet_address(&self) -> Address;

    /// Retrieves the chain id reported by the node.
    async fn get_chain_id(&self) -> RepoResult<u64>;

    /// Retrieves the native balance for a given address.
    ///
    /// # Arguments
    ///
    /// * `owner` - The address to query
    ///
    /// # Returns
    ///
    /// * `Ok(U256)` - The balance in wei
    /// * `Err(RepositoryError)` - If the RPC call fails
    async fn get_native_balance(&self, owner: Address) -> RepoResult<U256>;

    /// Retrieves the ERC20 balance of `owner`, in the token's base units.
    ///
    /// # Arguments
    ///
    /// * `token` - The ERC20 token contract address
    /// * `owner` - The address of the token holder
    ///
    /// # Returns
    ///
    /// * `Ok(U256)` - Raw balance
    /// * `Err(RepositoryError)` - If the contract call fails or the address is not an ERC20 contract
    async fn get_erc20_balance(&self, token: Address, owner: Address) -> RepoResult<U256>;

    /// Reads `decimals()` from an ERC20 contract.
    ///
    /// A non-contract address produces `ContractError`; callers must not
    /// substitute a default.
    async fn get_token_decimals(&self, token: Address) -> RepoResult<u8>;

    /// Reads the current allowance `owner` has granted `spender` on `token`.
    async fn get_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> RepoResult<U256>;

    /// Pending-block transaction count of `owner`.
    async fn get_nonce(&self, owner: Address) -> RepoResult<u64>;

    /// Retrieves the current gas price from the network.
    ///
    /// # Returns
    ///
    /// * `Ok(u128)` - The current gas price in wei
    /// * `Err(RepositoryError)` - If the RPC call fails
    async fn get_gas_price(&self) -> RepoResult<u128>;

    /// Estimates the gas limit of a fully populated transaction.
    async fn estimate_gas(&self, tx: &TransactionRequest) -> RepoResult<u64>;

    /// Signs a fully populated transaction and returns its EIP-2718 encoding.
    async fn sign_transaction(&self, tx: TransactionRequest) -> RepoResult<Bytes>;

    /// Broadcasts a signed transaction.
    ///
    /// # Returns
    ///
    /// * `Ok(TxHash)` - Hash of the accepted transaction
    /// * `Err(RepositoryError)` - If the node rejects it (nonce too low, underpriced, ...)
    async fn send_raw_transaction(&self, raw: Bytes) -> RepoResult<TxHash>;

    /// Returns `None` while the transaction is not yet mined.
    async fn get_transaction_receipt(&self, tx_hash: TxHash) -> RepoResult<Option<ReceiptSummary>>;

    /// Quotes a single Mute hop through `router`.
    async fn get_mute_quote(
        &self,
        router: Address,
        amount_in: U256,
        token_in: Address,
        token_out: Address,
    ) -> RepoResult<MuteQuote>;

    /// Resolves the SyncSwap classic pool for a pair.
    ///
    /// # Returns
    ///
    /// * `Ok(Address)` - The pool, or `Address::ZERO` when the pair has no pool
    /// * `Err(RepositoryError)` - If the factory call fails
    async fn get_sync_swap_pool(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> RepoResult<Address>;

    /// Returns `(token0, token1)` of a SyncSwap pool.
    async fn get_pool_tokens(&self, pool: Address) -> RepoResult<(Address, Address)>;

    /// Quotes swapping `amount_in` of `token_in` through a SyncSwap pool.
    async fn get_sync_swap_quote(
        &self,
        pool: Address,
        token_in: Address,
        amount_in: U256,
        sender: Address,
    ) -> RepoResult<U256>;
}
