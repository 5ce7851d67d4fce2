//src/chain.rs

use std::fmt;

use num_bigint::BigInt;

/// Failure surfaced by the chain-state backend (store miss, codec error, ...).
/// The pool treats these as transient and never caches them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainError(pub String);

impl ChainError {
    pub fn new(msg: impl Into<String>) -> Self {
        ChainError(msg.into())
    }
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chain state error: {}", self.0)
    }
}

/// Committed per-account state as of the current tip.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountState {
    pub nonce: u64,
    pub balance: BigInt,
    /// Self-nominated and eligible to receive votes.
    pub is_candidate: bool,
}

/// Read-only view of committed chain state the pool consumes (your node
/// implements this). Calls are assumed short and must not re-enter the pool.
pub trait ChainStateView: Send + Sync {
    /// Highest confirmed nonce for the account (0 if none).
    fn nonce(&self, addr: &str) -> Result<u64, ChainError>;

    /// Confirmed balance.
    fn balance(&self, addr: &str) -> Result<BigInt, ChainError>;

    /// Full account record; vote validation reads `is_candidate` from it.
    fn state(&self, addr: &str) -> Result<AccountState, ChainError>;
}
