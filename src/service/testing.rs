//! In-memory doubles used by service tests.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::{Address, Bytes, TxHash, U256, keccak256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use crate::repository::contract::IERC20;
use crate::repository::{ChainRepository, MuteQuote, ReceiptSummary, RepoResult, RepositoryError};
use crate::service::orchestrator::CycleActions;
use crate::service::session::ChainSession;
use crate::service::{OperationError, ServiceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainCall {
    ChainId,
    NativeBalance,
    Erc20Balance,
    Decimals,
    Allowance,
    Nonce,
    GasPrice,
    EstimateGas,
    Sign,
    Send,
    Receipt,
    Quote,
}

/// Calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Balance,
    Allowance,
    Nonce,
    GasPrice,
    /// Fails like a reverting call, which is not transient.
    EstimateGas,
    /// Fails like a node rejecting the broadcast, which is transient.
    Send,
    /// The broadcast never reaches the node and the connection drops.
    SendDropped,
    /// The node takes the broadcast but the answer is lost.
    SendLost,
}

#[derive(Default)]
struct State {
    calls: Vec<ChainCall>,
    native_balance: U256,
    decimals: HashMap<Address, u8>,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    nonce: u64,
    gas_price: u128,
    faults: HashMap<Fault, usize>,
    estimated: Vec<TransactionRequest>,
    signed: Vec<TransactionRequest>,
    sent: Vec<TransactionRequest>,
    pending_sign: Vec<(Bytes, TransactionRequest)>,
    mined: HashSet<TxHash>,
    hold_receipts: bool,
    revert_receipts: bool,
    mute_quote: Option<MuteQuote>,
    pools: HashMap<(Address, Address), Address>,
    pool_tokens: HashMap<Address, (Address, Address)>,
    next_token: u8,
}

pub struct FakeChain {
    state: Mutex<State>,
}

impl FakeChain {
    pub const WALLET: Address = Address::repeat_byte(0xaa);
    pub const WETH: Address = Address::repeat_byte(0xee);
    pub const CHAIN_ID: u64 = 324;
    pub const GAS_ESTIMATE: u64 = 150_000;

    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                gas_price: 25_000_000,
                next_token: 1,
                ..State::default()
            }),
        }
    }

    pub fn session(self: &Arc<Self>) -> ChainSession {
        ChainSession::new(self.clone(), Self::CHAIN_ID, Self::WETH)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Deploys a token with `decimals` and returns its address.
    pub fn add_token(&self, decimals: u8) -> Address {
        let mut state = self.state();
        let address = Address::repeat_byte(state.next_token);
        state.next_token += 1;
        state.decimals.insert(address, decimals);
        state.balances.insert(address, U256::ZERO);
        address
    }

    pub fn set_native_balance(&self, balance: U256) {
        self.state().native_balance = balance;
    }

    pub fn set_erc20_balance(&self, token: Address, balance: U256) {
        self.state().balances.insert(token, balance);
    }

    pub fn set_allowance(&self, token: Address, spender: Address, amount: U256) {
        self.state().allowances.insert((token, spender), amount);
    }

    pub fn allowance(&self, token: Address, spender: Address) -> U256 {
        self.state()
            .allowances
            .get(&(token, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_gas_price(&self, gas_price: u128) {
        self.state().gas_price = gas_price;
    }

    pub fn set_mute_quote(&self, amount_out: U256, stable: bool) {
        self.state().mute_quote = Some(MuteQuote { amount_out, stable });
    }

    /// Registers a SyncSwap pool for `(token0, token1)`.
    pub fn add_pool(&self, token0: Address, token1: Address) -> Address {
        let mut state = self.state();
        let pool = Address::repeat_byte(0x70 + state.pools.len() as u8);
        state.pools.insert((token0, token1), pool);
        state.pools.insert((token1, token0), pool);
        state.pool_tokens.insert(pool, (token0, token1));
        pool
    }

    /// Makes the next `times` calls of `fault` fail.
    pub fn fail_next(&self, fault: Fault, times: usize) {
        self.state().faults.insert(fault, times);
    }

    /// While set, sent transactions never get a receipt.
    pub fn hold_receipts(&self, hold: bool) {
        self.state().hold_receipts = hold;
    }

    /// While set, receipts report a failed status.
    pub fn revert_receipts(&self, revert: bool) {
        self.state().revert_receipts = revert;
    }

    pub fn calls(&self) -> Vec<ChainCall> {
        self.state().calls.clone()
    }

    pub fn decimals_queries(&self) -> usize {
        self.count(ChainCall::Decimals)
    }

    fn count(&self, call: ChainCall) -> usize {
        self.state().calls.iter().filter(|c| **c == call).count()
    }

    pub fn estimated_requests(&self) -> Vec<TransactionRequest> {
        self.state().estimated.clone()
    }

    pub fn signed_requests(&self) -> Vec<TransactionRequest> {
        self.state().signed.clone()
    }

    pub fn sent_requests(&self) -> Vec<TransactionRequest> {
        self.state().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state().sent.len()
    }

    /// Sent transactions whose call data starts with `selector`.
    pub fn sent_with_selector(&self, selector: [u8; 4]) -> Vec<TransactionRequest> {
        self.state()
            .sent
            .iter()
            .filter(|tx| {
                tx.input
                    .input()
                    .is_some_and(|input| input.len() >= 4 && input[..4] == selector)
            })
            .cloned()
            .collect()
    }

    pub fn approvals_sent(&self) -> usize {
        self.sent_with_selector(IERC20::approveCall::SELECTOR).len()
    }

    fn record(&self, call: ChainCall) -> MutexGuard<'_, State> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }
}

impl State {
    fn take_fault(&mut self, fault: Fault) -> RepoResult<()> {
        let Some(remaining) = self.faults.get_mut(&fault) else {
            return Ok(());
        };
        if *remaining == 0 {
            return Ok(());
        }
        *remaining -= 1;

        Err(match fault {
            Fault::EstimateGas => {
                RepositoryError::ContractError("execution reverted: injected".to_string())
            }
            Fault::Send => RepositoryError::RpcError("nonce too low: injected".to_string()),
            Fault::SendDropped | Fault::SendLost => {
                RepositoryError::NetworkError("response lost: injected".to_string())
            }
            Fault::Balance | Fault::Allowance | Fault::Nonce | Fault::GasPrice => {
                RepositoryError::NetworkError("connection reset: injected".to_string())
            }
        })
    }

    /// Applies the on-chain effect of calls the fake understands.
    fn apply(&mut self, tx: &TransactionRequest) {
        let (Some(to), Some(input)) = (tx.to.and_then(|kind| kind.to().copied()), tx.input.input())
        else {
            return;
        };

        if let Ok(call) = IERC20::approveCall::abi_decode(input) {
            self.allowances.insert((to, call.spender), call.amount);
        }
    }
}

#[async_trait]
impl ChainRepository for FakeChain {
    fn wallet_address(&self) -> Address {
        Self::WALLET
    }

    async fn get_chain_id(&self) -> RepoResult<u64> {
        self.record(ChainCall::ChainId);
        Ok(Self::CHAIN_ID)
    }

    async fn get_native_balance(&self, _owner: Address) -> RepoResult<U256> {
        let mut state = self.record(ChainCall::NativeBalance);
        state.take_fault(Fault::Balance)?;
        Ok(state.native_balance)
    }

    async fn get_erc20_balance(&self, token: Address, _owner: Address) -> RepoResult<U256> {
        let mut state = self.record(ChainCall::Erc20Balance);
        state.take_fault(Fault::Balance)?;
        state
            .balances
            .get(&token)
            .copied()
            .ok_or_else(|| RepositoryError::ContractError(format!("{token} is not a contract")))
    }

    async fn get_token_decimals(&self, token: Address) -> RepoResult<u8> {
        let state = self.record(ChainCall::Decimals);
        state
            .decimals
            .get(&token)
            .copied()
            .ok_or_else(|| RepositoryError::ContractError(format!("{token} is not a contract")))
    }

    async fn get_allowance(
        &self,
        token: Address,
        _owner: Address,
        spender: Address,
    ) -> RepoResult<U256> {
        let mut state = self.record(ChainCall::Allowance);
        state.take_fault(Fault::Allowance)?;
        Ok(state
            .allowances
            .get(&(token, spender))
            .copied()
            .unwrap_or_default())
    }

    async fn get_nonce(&self, _owner: Address) -> RepoResult<u64> {
        let mut state = self.record(ChainCall::Nonce);
        state.take_fault(Fault::Nonce)?;
        Ok(state.nonce)
    }

    async fn get_gas_price(&self) -> RepoResult<u128> {
        let mut state = self.record(ChainCall::GasPrice);
        state.take_fault(Fault::GasPrice)?;
        Ok(state.gas_price)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> RepoResult<u64> {
        let mut state = self.record(ChainCall::EstimateGas);
        state.estimated.push(tx.clone());
        state.take_fault(Fault::EstimateGas)?;
        Ok(Self::GAS_ESTIMATE)
    }

    async fn sign_transaction(&self, tx: TransactionRequest) -> RepoResult<Bytes> {
        let mut state = self.record(ChainCall::Sign);
        if tx.gas.is_none() {
            return Err(RepositoryError::SigningError("missing gas limit".to_string()));
        }
        let raw = Bytes::from(vec![0x02, state.signed.len() as u8]);
        state.signed.push(tx.clone());
        state.pending_sign.push((raw.clone(), tx));
        Ok(raw)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> RepoResult<TxHash> {
        let mut state = self.record(ChainCall::Send);
        state.take_fault(Fault::Send)?;
        state.take_fault(Fault::SendDropped)?;

        let tx_hash = keccak256(&raw);
        if state.mined.contains(&tx_hash) {
            return Err(RepositoryError::RpcError("already known".to_string()));
        }
        let tx = state
            .pending_sign
            .iter()
            .find(|(signed, _)| *signed == raw)
            .map(|(_, tx)| tx.clone())
            .ok_or_else(|| RepositoryError::RpcError("unknown raw transaction".to_string()))?;

        state.apply(&tx);
        state.sent.push(tx);
        state.nonce += 1;
        state.mined.insert(tx_hash);

        state.take_fault(Fault::SendLost)?;
        Ok(tx_hash)
    }

    async fn get_transaction_receipt(&self, tx_hash: TxHash) -> RepoResult<Option<ReceiptSummary>> {
        let state = self.record(ChainCall::Receipt);
        if state.hold_receipts || !state.mined.contains(&tx_hash) {
            return Ok(None);
        }
        Ok(Some(ReceiptSummary {
            tx_hash,
            block_number: Some(1),
            success: !state.revert_receipts,
        }))
    }

    async fn get_mute_quote(
        &self,
        _router: Address,
        amount_in: U256,
        _token_in: Address,
        _token_out: Address,
    ) -> RepoResult<MuteQuote> {
        let state = self.record(ChainCall::Quote);
        Ok(state.mute_quote.unwrap_or(MuteQuote {
            amount_out: amount_in,
            stable: false,
        }))
    }

    async fn get_sync_swap_pool(
        &self,
        _factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> RepoResult<Address> {
        let state = self.record(ChainCall::Quote);
        Ok(state
            .pools
            .get(&(token_a, token_b))
            .copied()
            .unwrap_or(Address::ZERO))
    }

    async fn get_pool_tokens(&self, pool: Address) -> RepoResult<(Address, Address)> {
        let state = self.record(ChainCall::Quote);
        state
            .pool_tokens
            .get(&pool)
            .copied()
            .ok_or_else(|| RepositoryError::ContractError(format!("{pool} is not a pool")))
    }

    async fn get_sync_swap_quote(
        &self,
        _pool: Address,
        _token_in: Address,
        amount_in: U256,
        _sender: Address,
    ) -> RepoResult<U256> {
        let _state = self.record(ChainCall::Quote);
        Ok(amount_in)
    }
}

/// A step taken by [`RecordingActions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    TransferToSelf(String),
    Swap {
        from: String,
        to: String,
        amount: Decimal,
    },
    Stake,
    Bridge {
        symbol: String,
        amount: Decimal,
    },
    Pace,
}

/// Cycle steps over an in-memory balance book.
///
/// Swaps move the amount one-to-one and stakes and bridges only record
/// themselves, so orchestration can be checked without any chain.
#[derive(Default)]
pub struct RecordingActions {
    balances: Mutex<HashMap<String, Decimal>>,
    calls: Mutex<Vec<Action>>,
    swap_failure: Mutex<Option<OperationError>>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl RecordingActions {
    pub fn with_balances(balances: &[(&str, &str)]) -> Self {
        let balances = balances
            .iter()
            .map(|(symbol, amount)| (symbol.to_string(), Decimal::from_str(amount).unwrap()))
            .collect();
        Self {
            balances: Mutex::new(balances),
            ..Self::default()
        }
    }

    pub fn fail_swaps_with(&self, err: OperationError) {
        *self.swap_failure.lock().unwrap() = Some(err);
    }

    /// Cancels `token` once `swaps` swaps have been made.
    pub fn cancel_after_swaps(&self, swaps: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((swaps, token));
    }

    pub fn calls(&self) -> Vec<Action> {
        self.calls.lock().unwrap().clone()
    }

    pub fn swaps(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|action| match action {
                Action::Swap { from, to, .. } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, action: Action) {
        self.calls.lock().unwrap().push(action);
    }
}

#[async_trait]
impl CycleActions for RecordingActions {
    async fn balance(&self, symbol: &str) -> ServiceResult<Decimal> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or_default())
    }

    async fn transfer_to_self(&self, symbol: &str) -> ServiceResult<()> {
        self.record(Action::TransferToSelf(symbol.to_string()));
        Ok(())
    }

    async fn swap(&self, from: &str, to: &str, amount: Decimal) -> ServiceResult<U256> {
        self.record(Action::Swap {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        });

        if let Some(err) = self.swap_failure.lock().unwrap().clone() {
            return Err(err);
        }

        {
            let mut balances = self.balances.lock().unwrap();
            *balances.entry(from.to_string()).or_default() -= amount;
            *balances.entry(to.to_string()).or_default() += amount;
        }

        if let Some((swaps, token)) = self.cancel_after.lock().unwrap().as_ref()
            && self.swaps().len() >= *swaps
        {
            token.cancel();
        }

        Ok(U256::from(1u64))
    }

    async fn stake(&self) -> ServiceResult<U256> {
        self.record(Action::Stake);
        Ok(U256::from(1u64))
    }

    async fn bridge(&self, symbol: &str, amount: Decimal) -> ServiceResult<U256> {
        self.record(Action::Bridge {
            symbol: symbol.to_string(),
            amount,
        });
        Ok(U256::from(1u64))
    }

    async fn pace(&self) {
        self.record(Action::Pace);
    }
}
