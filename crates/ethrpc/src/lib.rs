//! Fault-tolerant, read-only access to the chain.
//!
//! The [`pool::Pool`] fans a logical call out over a prioritized list of
//! JSON-RPC endpoints. Each endpoint carries a circuit breaker that sheds
//! load from an unhealthy upstream for a cooldown period; transient failures
//! are retried across endpoints, everything else propagates to the caller.
//! [`multicall::Multicall`] batches read-only contract calls through the
//! aggregator contract.

pub mod classify;
pub mod multicall;
pub mod pool;

pub use {
    contracts::Provider,
    pool::{Error, Pool, PoolConfig},
};
