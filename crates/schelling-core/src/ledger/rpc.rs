//! RPC client for an Ethereum JSON-RPC node hosting the Schelling Point contract.
//!
//! Transactions are sent from the participant's address without a local
//! signer, so the node must hold the participant's account and sign for it.

use super::traits::{LedgerClient, LedgerError, TxHandle};
use crate::crypto::{CommitDigest, Salt};
use crate::phase::Phase;
use crate::protocol::{Address, Amount, Round, RoundId};
use async_trait::async_trait;
use ethers::abi::Detokenize;
use ethers::prelude::{abigen, ContractCall, ContractError, Http, Middleware, Provider};
use ethers::types::{TransactionReceipt, H160, H256, U256, U64};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

abigen!(
    SchellingPointContract,
    r#"[
        function currentRoundId() external view returns (uint256)
        function getPhase(uint256 roundId) external view returns (uint8)
        function getRound(uint256 roundId) external view returns (string, uint256, uint256, uint256, uint256, uint256, bool)
        function hasCommitted(uint256 roundId, address player) external view returns (bool)
        function hasRevealed(uint256 roundId, address player) external view returns (bool)
        function commit(uint256 roundId, bytes32 commitHash) external payable
        function reveal(uint256 roundId, string answer, bytes32 salt) external
        function claim(uint256 roundId) external
    ]"#
);

/// Default time to wait for a receipt
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(120);

/// Delay between receipt polls
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// `getRound` return values in declaration order
type RoundFields = (String, U256, U256, U256, U256, U256, bool);

/// RPC client for the Schelling Point contract
pub struct RpcLedgerClient {
    provider: Arc<Provider<Http>>,
    contract: SchellingPointContract<Provider<Http>>,
    /// Participant the node signs for
    from: H160,
    confirm_timeout: Duration,
}

impl RpcLedgerClient {
    /// Create a new RPC client; fails only on a malformed URL
    pub fn new(rpc_url: &str, contract: Address, from: Address) -> Result<Self, LedgerError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| LedgerError::InvalidEndpoint(format!("{}: {}", rpc_url, e)))?;
        let provider = Arc::new(provider);
        let contract = SchellingPointContract::new(evm_address(&contract), provider.clone());
        Ok(Self {
            provider,
            contract,
            from: evm_address(&from),
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
        })
    }

    /// Override how long `confirm` waits for a receipt
    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    async fn submit<D: Detokenize>(
        &self,
        call: ContractCall<Provider<Http>, D>,
    ) -> Result<TxHandle, LedgerError> {
        let call = call.from(self.from);
        let pending = call.send().await.map_err(contract_error)?;
        let tx = TxHandle::from_bytes(pending.tx_hash().0);
        debug!(%tx, "transaction sent");
        Ok(tx)
    }
}

fn evm_address(address: &Address) -> H160 {
    H160::from(*address.as_bytes())
}

fn round_arg(round_id: RoundId) -> U256 {
    U256::from(round_id.get())
}

fn to_u64(value: U256, what: &str) -> Result<u64, LedgerError> {
    if value > U256::from(u64::MAX) {
        return Err(LedgerError::Decode(format!("{} {} does not fit in u64", what, value)));
    }
    Ok(value.as_u64())
}

fn to_amount(value: U256, what: &str) -> Result<Amount, LedgerError> {
    if value > U256::from(u128::MAX) {
        return Err(LedgerError::Decode(format!("{} {} does not fit in u128", what, value)));
    }
    Ok(Amount::from_wei(value.as_u128()))
}

fn contract_error(e: ContractError<Provider<Http>>) -> LedgerError {
    let message = e.to_string();
    if e.is_revert() {
        return LedgerError::Reverted(message);
    }
    match &e {
        ContractError::DecodingError(_)
        | ContractError::AbiError(_)
        | ContractError::DetokenizationError(_) => LedgerError::Decode(message),
        ContractError::MiddlewareError { .. } | ContractError::ProviderError { .. } => {
            LedgerError::NetworkError(message)
        }
        _ => LedgerError::Rpc(message),
    }
}

fn round_from_fields(round_id: RoundId, fields: RoundFields) -> Result<Round, LedgerError> {
    let (theme, entry_fee, commit_deadline, reveal_deadline, total_pot, player_count, settled) =
        fields;
    let round = Round {
        id: round_id,
        theme,
        entry_fee: to_amount(entry_fee, "entry fee")?,
        commit_deadline: to_u64(commit_deadline, "commit deadline")?,
        reveal_deadline: to_u64(reveal_deadline, "reveal deadline")?,
        total_pot: to_amount(total_pot, "total pot")?,
        player_count: to_u64(player_count, "player count")?,
        settled,
    };
    // The contract returns a zeroed struct for rounds it never created
    if round.commit_deadline == 0 && round.reveal_deadline == 0 {
        return Err(LedgerError::RoundNotFound(round_id));
    }
    Ok(round)
}

/// Interpret a receipt: `None` while pending, `Some(Ok)` on success
fn receipt_outcome(receipt: Option<&TransactionReceipt>) -> Option<Result<(), LedgerError>> {
    let receipt = receipt?;
    if receipt.status == Some(U64::zero()) {
        return Some(Err(LedgerError::Reverted(format!(
            "transaction {:#x} failed",
            receipt.transaction_hash
        ))));
    }
    Some(Ok(()))
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn current_round_id(&self) -> Result<RoundId, LedgerError> {
        let id = self
            .contract
            .current_round_id()
            .call()
            .await
            .map_err(contract_error)?;
        Ok(RoundId::new(to_u64(id, "round id")?))
    }

    async fn get_phase(&self, round_id: RoundId) -> Result<Phase, LedgerError> {
        let code = self
            .contract
            .get_phase(round_arg(round_id))
            .call()
            .await
            .map_err(contract_error)?;
        Phase::from_code(code).map_err(|e| LedgerError::Decode(e.to_string()))
    }

    async fn get_round(&self, round_id: RoundId) -> Result<Round, LedgerError> {
        let fields = self
            .contract
            .get_round(round_arg(round_id))
            .call()
            .await
            .map_err(contract_error)?;
        round_from_fields(round_id, fields)
    }

    async fn has_committed(
        &self,
        round_id: RoundId,
        participant: &Address,
    ) -> Result<bool, LedgerError> {
        self.contract
            .has_committed(round_arg(round_id), evm_address(participant))
            .call()
            .await
            .map_err(contract_error)
    }

    async fn has_revealed(
        &self,
        round_id: RoundId,
        participant: &Address,
    ) -> Result<bool, LedgerError> {
        self.contract
            .has_revealed(round_arg(round_id), evm_address(participant))
            .call()
            .await
            .map_err(contract_error)
    }

    async fn commit(
        &self,
        round_id: RoundId,
        digest: &CommitDigest,
        value: Amount,
    ) -> Result<TxHandle, LedgerError> {
        let call = self
            .contract
            .commit(round_arg(round_id), *digest.as_bytes())
            .value(U256::from(value.wei()));
        self.submit(call).await
    }

    async fn reveal(
        &self,
        round_id: RoundId,
        answer: &str,
        salt: &Salt,
    ) -> Result<TxHandle, LedgerError> {
        let call = self
            .contract
            .reveal(round_arg(round_id), answer.to_string(), *salt.as_bytes());
        self.submit(call).await
    }

    async fn claim(&self, round_id: RoundId) -> Result<TxHandle, LedgerError> {
        self.submit(self.contract.claim(round_arg(round_id))).await
    }

    async fn confirm(&self, tx: &TxHandle) -> Result<(), LedgerError> {
        let hash = H256::from(*tx.as_bytes());
        let deadline = tokio::time::Instant::now() + self.confirm_timeout;
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| LedgerError::NetworkError(e.to_string()))?;
            if let Some(outcome) = receipt_outcome(receipt.as_ref()) {
                return outcome;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(LedgerError::Timeout(*tx));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}
