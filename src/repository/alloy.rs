use std::str::FromStr;
use std::sync::Arc;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{Ethereum, EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;
use tracing::instrument;

use super::error::RepositoryError;
use crate::repository::contract::{
    IERC20, IMuteRouter, ISyncSwapClassicPoolFactory, ISyncSwapPool,
};
use crate::repository::{ChainRepository, MuteQuote, ReceiptSummary, RepoResult};

pub struct AlloyChainRepository<P> {
    provider: Arc<P>,
    wallet: EthereumWallet,
    address: Address,
}

impl<P: Provider + Clone + 'static> AlloyChainRepository<P> {
    pub fn new_with_wallet(provider: Arc<P>, private_key: &str) -> Result<Self, RepositoryError> {
        let signer = PrivateKeySigner::from_str(private_key)
            .map_err(|e| RepositoryError::ParseError(format!("Invalid private key: {e}")))?;

        let address = signer.address();
        let wallet = EthereumWallet::from(signer);

        Ok(Self {
            provider,
            wallet,
            address,
        })
    }
}

/// Splits transport failures (connection, timeout) from node-side rejections.
///
/// Node responses that mention a revert are contract failures and never worth
/// retrying; everything else the node says is reported as an RPC error.
fn map_transport_error(err: TransportError) -> RepositoryError {
    match &err {
        RpcError::Transport(_) => {
            if err.to_string().contains("429") {
                tracing::warn!("Rate limited by RPC provider");
            }
            RepositoryError::NetworkError(err.to_string())
        }
        RpcError::ErrorResp(payload) if payload.message.contains("revert") => {
            RepositoryError::ContractError(err.to_string())
        }
        _ => RepositoryError::RpcError(err.to_string()),
    }
}

/// Contract reads fail either in transport or in the contract itself; only
/// the former goes through the transport split.
fn map_contract_error(context: &str, err: alloy::contract::Error) -> RepositoryError {
    match err {
        alloy::contract::Error::TransportError(e) => map_transport_error(e),
        other => RepositoryError::ContractError(format!("{context}: {other}")),
    }
}

#[async_trait]
impl<P: Provider + Clone + Send + Sync + 'static> ChainRepository for AlloyChainRepository<P> {
    fn wallet_address(&self) -> Address {
        self.address
    }

    #[instrument(skip(self), err)]
    async fn get_chain_id(&self) -> RepoResult<u64> {
        self.provider
            .get_chain_id()
            .await
            .map_err(map_transport_error)
    }

    #[instrument(skip(self), err)]
    async fn get_native_balance(&self, owner: Address) -> RepoResult<U256> {
        self.provider
            .get_balance(owner)
            .await
            .map_err(map_transport_error)
    }

    #[instrument(skip(self), err)]
    async fn get_erc20_balance(&self, token: Address, owner: Address) -> RepoResult<U256> {
        let contract = IERC20::new(token, self.provider.clone());

        contract
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| map_contract_error(&format!("Failed to read balance of {token}"), e))
    }

    #[instrument(skip(self), err)]
    async fn get_token_decimals(&self, token: Address) -> RepoResult<u8> {
        let contract = IERC20::new(token, self.provider.clone());

        contract
            .decimals()
            .call()
            .await
            .map_err(|e| map_contract_error(&format!("Failed to read decimals of {token}"), e))
    }

    #[instrument(skip(self), err)]
    async fn get_allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> RepoResult<U256> {
        let contract = IERC20::new(token, self.provider.clone());

        contract
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| map_contract_error(&format!("Failed to read allowance on {token}"), e))
    }

    #[instrument(skip(self), err)]
    async fn get_nonce(&self, owner: Address) -> RepoResult<u64> {
        self.provider
            .get_transaction_count(owner)
            .pending()
            .await
            .map_err(map_transport_error)
    }

    #[instrument(skip(self), err)]
    async fn get_gas_price(&self) -> RepoResult<u128> {
        self.provider
            .get_gas_price()
            .await
            .map_err(map_transport_error)
    }

    #[instrument(skip(self, tx), err)]
    async fn estimate_gas(&self, tx: &TransactionRequest) -> RepoResult<u64> {
        self.provider
            .estimate_gas(tx.clone())
            .await
            .map_err(map_transport_error)
    }

    #[instrument(skip(self, tx), err)]
    async fn sign_transaction(&self, tx: TransactionRequest) -> RepoResult<Bytes> {
        let envelope = <TransactionRequest as TransactionBuilder<Ethereum>>::build(tx, &self.wallet)
            .await
            .map_err(|e| RepositoryError::SigningError(e.to_string()))?;

        Ok(Bytes::from(envelope.encoded_2718()))
    }

    #[instrument(skip(self, raw), err)]
    async fn send_raw_transaction(&self, raw: Bytes) -> RepoResult<TxHash> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(map_transport_error)?;

        Ok(*pending.tx_hash())
    }

    #[instrument(skip(self), err)]
    async fn get_transaction_receipt(&self, tx_hash: TxHash) -> RepoResult<Option<ReceiptSummary>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(map_transport_error)?;

        Ok(receipt.map(|r| ReceiptSummary {
            tx_hash: ReceiptResponse::transaction_hash(&r),
            block_number: ReceiptResponse::block_number(&r),
            success: ReceiptResponse::status(&r),
        }))
    }

    #[instrument(skip(self), err)]
    async fn get_mute_quote(
        &self,
        router: Address,
        amount_in: U256,
        token_in: Address,
        token_out: Address,
    ) -> RepoResult<MuteQuote> {
        let router = IMuteRouter::new(router, self.provider.clone());

        let quote = router
            .getAmountOut(amount_in, token_in, token_out)
            .call()
            .await
            .map_err(|e| map_contract_error("Failed to quote Mute", e))?;

        tracing::debug!(
            "Mute quote: amountOut={}, stable={}, fee={}",
            quote.amountOut,
            quote.stable,
            quote.fee
        );

        Ok(MuteQuote {
            amount_out: quote.amountOut,
            stable: quote.stable,
        })
    }

    #[instrument(skip(self), err)]
    async fn get_sync_swap_pool(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> RepoResult<Address> {
        let factory = ISyncSwapClassicPoolFactory::new(factory, self.provider.clone());

        factory
            .getPool(token_a, token_b)
            .call()
            .await
            .map_err(|e| map_contract_error("Failed to get pool", e))
    }

    #[instrument(skip(self), err)]
    async fn get_pool_tokens(&self, pool: Address) -> RepoResult<(Address, Address)> {
        let pool = ISyncSwapPool::new(pool, self.provider.clone());

        let token0 = pool
            .token0()
            .call()
            .await
            .map_err(|e| map_contract_error("Failed to get token0", e))?;

        let token1 = pool
            .token1()
            .call()
            .await
            .map_err(|e| map_contract_error("Failed to get token1", e))?;

        Ok((token0, token1))
    }

    #[instrument(skip(self), err)]
    async fn get_sync_swap_quote(
        &self,
        pool: Address,
        token_in: Address,
        amount_in: U256,
        sender: Address,
    ) -> RepoResult<U256> {
        let pool = ISyncSwapPool::new(pool, self.provider.clone());

        pool.getAmountOut(token_in, amount_in, sender)
            .call()
            .await
            .map_err(|e| map_contract_error("Failed to quote SyncSwap", e))
    }
}
