//! Ledger client trait definition.

use crate::crypto::{CommitDigest, Salt};
use crate::phase::Phase;
use crate::protocol::{Address, Amount, Round, RoundId};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Errors from ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Round not found: {0}")]
    RoundNotFound(RoundId),

    #[error("Transaction reverted: {0}")]
    Reverted(String),

    #[error("Transaction not found: {0}")]
    UnknownTransaction(TxHandle),

    #[error("Timed out waiting for transaction {0}")]
    Timeout(TxHandle),

    #[error("Failed to decode ledger response: {0}")]
    Decode(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid RPC endpoint: {0}")]
    InvalidEndpoint(String),
}

impl LedgerError {
    /// Read failures worth retrying on the next poll
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::NetworkError(_) | LedgerError::Rpc(_) | LedgerError::Timeout(_)
        )
    }
}

/// Handle of a submitted transaction (its hash)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHandle([u8; 32]);

impl TxHandle {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHandle({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for TxHandle {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.to_string().serialize(s)
    }
}

impl<'de> Deserialize<'de> for TxHandle {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.strip_prefix("0x").unwrap_or(&s), &mut bytes)
            .map_err(serde::de::Error::custom)?;
        Ok(Self(bytes))
    }
}

/// Trait for the Schelling Point contract as seen by one participant
///
/// Reads are side-effect free. `commit`, `reveal` and `claim` submit a
/// transaction signed for the participant the client is bound to and return
/// as soon as it is accepted; `confirm` waits until it is final.
/// Implementations:
/// - MockLedgerClient for testing and demo mode
/// - RpcLedgerClient for an Ethereum JSON-RPC node
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Id of the latest round (0 when none was ever started)
    async fn current_round_id(&self) -> Result<RoundId, LedgerError>;

    /// Phase as enforced by the contract
    async fn get_phase(&self, round_id: RoundId) -> Result<Phase, LedgerError>;

    /// Round data; `RoundNotFound` when the round does not exist
    async fn get_round(&self, round_id: RoundId) -> Result<Round, LedgerError>;

    async fn has_committed(
        &self,
        round_id: RoundId,
        participant: &Address,
    ) -> Result<bool, LedgerError>;

    async fn has_revealed(
        &self,
        round_id: RoundId,
        participant: &Address,
    ) -> Result<bool, LedgerError>;

    /// Submit a commitment, paying `value` as entry fee
    async fn commit(
        &self,
        round_id: RoundId,
        digest: &CommitDigest,
        value: Amount,
    ) -> Result<TxHandle, LedgerError>;

    /// Submit the plaintext answer and salt
    async fn reveal(
        &self,
        round_id: RoundId,
        answer: &str,
        salt: &Salt,
    ) -> Result<TxHandle, LedgerError>;

    /// Claim the payout of a settled round
    async fn claim(&self, round_id: RoundId) -> Result<TxHandle, LedgerError>;

    /// Wait until the transaction is final; `Reverted` if it failed
    async fn confirm(&self, tx: &TxHandle) -> Result<(), LedgerError>;
}
