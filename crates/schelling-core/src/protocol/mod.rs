//! Protocol types shared by the ledger adapters and the session.

mod types;
mod validation;

pub use types::{Address, Amount, Round, RoundId, UnixTime};
pub use validation::ValidationError;
