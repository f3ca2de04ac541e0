use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::SolCall;
use rust_decimal::Decimal;
use tracing::instrument;

use crate::repository::contract::IERC20;
use crate::service::ServiceResult;
use crate::service::session::ChainSession;
use crate::service::transaction::TransactionSubmitter;
use crate::service::types::{Asset, ContractCall, Token};

/// Orbiter reads the destination chain from the last four digits of the amount.
const SUFFIX_MODULUS: u64 = 10_000;

/// Replaces the low four base-unit digits of `amount` with `suffix`.
pub fn encode_amount(amount: U256, suffix: u16) -> U256 {
    let modulus = U256::from(SUFFIX_MODULUS);
    amount / modulus * modulus + U256::from(suffix as u64 % SUFFIX_MODULUS)
}

/// Cross-chain withdrawal through an Orbiter maker.
#[derive(Debug, Clone)]
pub struct OrbiterBridge {
    maker: Address,
    /// Maker fee, in human units of the bridged token.
    fee: Decimal,
    suffix: u16,
    submitter: TransactionSubmitter,
}

impl OrbiterBridge {
    pub fn new(maker: Address, fee: Decimal, suffix: u16, submitter: TransactionSubmitter) -> Self {
        Self {
            maker,
            fee,
            suffix,
            submitter,
        }
    }

    pub fn fee(&self) -> Decimal {
        self.fee
    }

    /// Sends `amount` plus the maker fee of `token` to the maker, with the
    /// destination code in the low digits.
    #[instrument(skip(self, session, token), fields(token = %token), err)]
    pub async fn bridge(
        &self,
        session: &ChainSession,
        token: &Token,
        amount: Decimal,
    ) -> ServiceResult<TxHash> {
        let total = session.to_base_units(amount + self.fee, token.asset).await?;
        let value = encode_amount(total, self.suffix);
        session.ensure_balance(token, value).await?;

        let call = match token.asset {
            Asset::Native => {
                ContractCall::new("orbiter bridge", self.maker, Bytes::new()).with_value(value)
            }
            Asset::Erc20(address) => {
                let input = IERC20::transferCall {
                    to: self.maker,
                    amount: value,
                }
                .abi_encode();
                ContractCall::new("orbiter bridge", address, input)
            }
        };

        let tx_hash = self.submitter.submit(session, &call).await?;
        tracing::info!("Bridged {} {} through Orbiter maker {}", amount, token, self.maker);
        Ok(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::OperationError;
    use crate::service::testing::FakeChain;
    use std::str::FromStr;
    use std::sync::Arc;

    const MAKER: Address = Address::repeat_byte(0x0b);

    #[test]
    fn test_encode_amount_replaces_low_digits() {
        assert_eq!(encode_amount(U256::from(12_345_678u64), 9002), U256::from(12_349_002u64));
        assert_eq!(encode_amount(U256::from(5_000u64), 9002), U256::from(9002u64));
        assert_eq!(encode_amount(U256::from(1_230_000u64), 7), U256::from(1_230_007u64));
    }

    #[tokio::test]
    async fn test_erc20_bridge_transfers_amount_plus_fee_to_maker() {
        let chain = Arc::new(FakeChain::new());
        let usdc = chain.add_token(6);
        chain.set_erc20_balance(usdc, U256::from(100_000_000u64));
        let session = chain.session();
        let token = Token {
            symbol: "USDC".into(),
            asset: Asset::Erc20(usdc),
        };

        let bridge = OrbiterBridge::new(
            MAKER,
            Decimal::from_str("1.5").unwrap(),
            9002,
            TransactionSubmitter::default(),
        );
        bridge
            .bridge(&session, &token, Decimal::from_str("50").unwrap())
            .await
            .unwrap();

        let sent = chain.sent_requests();
        assert_eq!(sent.len(), 1);
        let decoded = IERC20::transferCall::abi_decode(sent[0].input.input().unwrap()).unwrap();
        assert_eq!(decoded.to, MAKER);
        assert_eq!(decoded.amount, U256::from(51_509_002u64));
    }

    #[tokio::test]
    async fn test_bridge_more_than_balance_is_refused() {
        let chain = Arc::new(FakeChain::new());
        let usdc = chain.add_token(6);
        chain.set_erc20_balance(usdc, U256::from(10_000_000u64));
        let session = chain.session();
        let token = Token {
            symbol: "USDC".into(),
            asset: Asset::Erc20(usdc),
        };

        let bridge = OrbiterBridge::new(MAKER, Decimal::ONE, 9002, TransactionSubmitter::default());
        let result = bridge.bridge(&session, &token, Decimal::from(10)).await;

        assert!(matches!(result, Err(OperationError::InsufficientBalance { .. })));
        assert_eq!(chain.sent_count(), 0);
    }
}
