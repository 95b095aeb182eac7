//! Batched read-only contract calls through the aggregator contract.

use {
    crate::pool::Pool,
    alloy::primitives::{Address, Bytes},
    contracts::IMulticall,
    std::{sync::Arc, time::Duration},
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("multicall is disabled")]
    Disabled,
    #[error("multicall batch timed out")]
    Timeout,
    #[error("multicall returned an empty payload")]
    Empty,
    #[error(transparent)]
    Rpc(#[from] crate::pool::Error),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub enabled: bool,
    pub address: Address,
    /// Maximum number of calls per aggregate transaction.
    pub max_batch_size: usize,
    /// Budget for each batch; one slow batch fails the whole execution.
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            address: contracts::deployments::MULTICALL,
            max_batch_size: 50,
            timeout: Duration::from_millis(3_000),
        }
    }
}

/// One read-only call to batch.
#[derive(Clone, Debug)]
pub struct Call {
    pub target: Address,
    pub call_data: Bytes,
}

/// Per-call outcome. `return_data` is left for the caller to decode.
#[derive(Clone, Debug, Default)]
pub struct CallResult {
    pub success: bool,
    pub return_data: Bytes,
}

pub struct Multicall {
    pool: Arc<Pool>,
    config: Config,
}

impl Multicall {
    pub fn new(pool: Arc<Pool>, config: Config) -> Self {
        Self { pool, config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Executes all calls in chunks of at most `max_batch_size`, preserving
    /// input order in the output.
    pub async fn execute(&self, calls: &[Call]) -> Result<Vec<CallResult>, Error> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }
        if !self.config.enabled {
            return Err(Error::Disabled);
        }
        let mut results = Vec::with_capacity(calls.len());
        for chunk in calls.chunks(self.config.max_batch_size.max(1)) {
            let batch: Vec<_> = chunk
                .iter()
                .map(|call| IMulticall::Call {
                    target: call.target,
                    callData: call.call_data.clone(),
                })
                .collect();
            let address = self.config.address;
            let execute = self.pool.call(move |provider| {
                let batch = batch.clone();
                async move {
                    let returned = IMulticall::new(address, provider)
                        .tryAggregate(false, batch)
                        .call()
                        .await?;
                    Ok(returned)
                }
            });
            let returned = tokio::time::timeout(self.config.timeout, execute)
                .await
                .map_err(|_| Error::Timeout)??;
            if returned.is_empty() {
                return Err(Error::Empty);
            }
            results.extend(normalize(chunk.len(), returned));
        }
        Ok(results)
    }
}

/// Pads a short payload with failure entries so every submitted call has an
/// entry, and converts to the caller-facing result type.
fn normalize(expected: usize, returned: Vec<IMulticall::Result>) -> Vec<CallResult> {
    let mut entries: Vec<CallResult> = returned
        .into_iter()
        .take(expected)
        .map(|entry| CallResult {
            success: entry.success,
            return_data: entry.returnData,
        })
        .collect();
    entries.resize_with(expected, CallResult::default);
    entries
}
