//! The Chain Adapter subsystem: everything that talks to the EVM RPC
//! endpoint, plus the error taxonomy and retry policy shared by its callers.

pub mod adapter;
pub mod backoff;
pub mod errors;
pub mod fake;
pub mod types;

pub use adapter::{ChainAdapter, JsonRpcChainAdapter};
pub use backoff::retry_transient;
pub use errors::{ChainError, PermanentChainError, TransientChainError};
pub use fake::FakeChainAdapter;
pub use types::{ChainCall, Log, LogTopic, TxReceipt, ViewState};
