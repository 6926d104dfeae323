//! Local validation failures, reported before any transaction is built.

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Answer must not be empty")]
    EmptyAnswer,

    #[error("Salt must not be empty")]
    EmptySalt,

    #[error("Malformed salt: expected 0x followed by 64 hex characters, got {0:?}")]
    MalformedSalt(String),

    #[error("Malformed address: {0:?}")]
    MalformedAddress(String),

    #[error("Answer and salt do not match the saved commitment")]
    DigestMismatch,

    #[error("Unknown phase code: {0}")]
    UnknownPhase(u8),
}
