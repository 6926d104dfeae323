//! Schelling Point Core Library
//!
//! This crate provides the commit-reveal primitives, the ledger client
//! abstraction, durable commitment storage and the round session that ties
//! them together for a single participant.

pub mod clock;
pub mod crypto;
pub mod ledger;
pub mod phase;
pub mod protocol;
pub mod session;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{verify_encoded, CommitDigest, Salt};
pub use ledger::{LedgerClient, LedgerError, MockLedger, MockLedgerClient, RpcLedgerClient, TxHandle};
pub use phase::{Countdown, Phase, PhaseClock};
pub use protocol::{Address, Amount, Round, RoundId, UnixTime, ValidationError};
pub use session::{
    Action, ActionState, PendingActions, RevealForm, RoundSession, SessionError, SessionEvent,
    SessionView,
};
pub use store::{storage_key, Commitment, CommitmentStore, FileStore, MemoryStore, StoreError};
