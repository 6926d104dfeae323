//! Ledger (contract) client abstraction.

mod mock;
mod rpc;
mod traits;

pub use mock::{MockLedger, MockLedgerClient};
pub use rpc::{RpcLedgerClient, DEFAULT_CONFIRM_TIMEOUT};
pub use traits::{LedgerClient, LedgerError, TxHandle};
