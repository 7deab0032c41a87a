//! Chain Adapter error taxonomy.
//!
//! Split into two hand-rolled variants (not `anyhow`) because callers need
//! to branch on *which* kind occurred: transient errors are retried with
//! backoff, permanent errors are surfaced (or, for a revert that matches the
//! already-in-target-state message, treated as success by the Actor).

use std::fmt;

#[derive(Debug, Clone)]
pub enum TransientChainError {
    Timeout(String),
    RateLimited(String),
    Network(String),
}

impl fmt::Display for TransientChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(msg) => write!(f, "chain rpc timeout: {msg}"),
            Self::RateLimited(msg) => write!(f, "chain rpc rate-limited: {msg}"),
            Self::Network(msg) => write!(f, "chain rpc network error: {msg}"),
        }
    }
}

impl std::error::Error for TransientChainError {}

#[derive(Debug, Clone)]
pub enum PermanentChainError {
    Revert(String),
    Malformed(String),
    NonceExhausted(String),
}

impl PermanentChainError {
    /// True when the revert reason indicates the on-chain state already
    /// matches the target state (e.g. "already paused") — the Actor treats
    /// this as success rather than failure.
    pub fn is_idempotent_revert(&self) -> bool {
        match self {
            Self::Revert(msg) => {
                let m = msg.to_ascii_lowercase();
                m.contains("already paused")
                    || m.contains("already unpaused")
                    || m.contains("already blocked")
                    || m.contains("already unblocked")
            }
            _ => false,
        }
    }
}

impl fmt::Display for PermanentChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revert(msg) => write!(f, "chain revert: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed chain response: {msg}"),
            Self::NonceExhausted(msg) => write!(f, "nonce exhausted: {msg}"),
        }
    }
}

impl std::error::Error for PermanentChainError {}

#[derive(Debug, Clone)]
pub enum ChainError {
    Transient(TransientChainError),
    Permanent(PermanentChainError),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(e) => write!(f, "{e}"),
            Self::Permanent(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<TransientChainError> for ChainError {
    fn from(e: TransientChainError) -> Self {
        Self::Transient(e)
    }
}

impl From<PermanentChainError> for ChainError {
    fn from(e: PermanentChainError) -> Self {
        Self::Permanent(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_revert_detection() {
        let e = PermanentChainError::Revert("Error: already paused".to_string());
        assert!(e.is_idempotent_revert());

        let e = PermanentChainError::Revert("Error: insufficient funds".to_string());
        assert!(!e.is_idempotent_revert());
    }
}
