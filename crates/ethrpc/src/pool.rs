//! Prioritized endpoint pool with per-endpoint circuit breakers.

use {
    crate::classify::{Classification, Classifier},
    alloy::providers::{Provider as _, ProviderBuilder},
    contracts::Provider,
    std::{
        future::Future,
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    },
    url::Url,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No configured endpoint passed validation.
    #[error("no usable RPC endpoint")]
    Unavailable,
    /// [`Pool::initialize`] has not completed successfully yet.
    #[error("RPC pool is not initialized")]
    NotInitialized,
    /// Every endpoint failed transiently in every attempt.
    #[error("all RPC endpoints exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },
    /// A non-transient call error, propagated as-is.
    #[error(transparent)]
    Call(anyhow::Error),
}

#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Endpoints in priority order.
    pub urls: Vec<Url>,
    /// The chain every endpoint must report during validation.
    pub chain_id: u64,
    /// Per-call stall timeout.
    pub stall_timeout: Duration,
    /// Additional attempts after the first, each spanning all endpoints.
    pub retry_count: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Breaker cooldown after a transient failure.
    pub cooldown: Duration,
    /// Breaker cooldown after a rate-limited failure.
    pub rate_limit_cooldown: Duration,
}

impl PoolConfig {
    pub fn new(urls: Vec<Url>, chain_id: u64) -> Self {
        let cooldown = Duration::from_millis(30_000);
        Self {
            urls,
            chain_id,
            stall_timeout: Duration::from_millis(1_200),
            retry_count: 2,
            retry_delay: Duration::from_millis(200),
            cooldown,
            rate_limit_cooldown: (cooldown * 2).max(Duration::from_millis(60_000)),
        }
    }
}

/// One endpoint and its circuit breaker. While `failed_until` lies in the
/// future every call is rejected locally without touching the network.
struct Endpoint {
    url: Url,
    provider: Provider,
    failed_until: Mutex<Option<Instant>>,
}

impl Endpoint {
    fn new(url: Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(url.clone()).erased();
        Self {
            url,
            provider,
            failed_until: Mutex::new(None),
        }
    }

    fn host(&self) -> &str {
        self.url.host_str().unwrap_or("<unknown>")
    }

    fn cooling_down(&self, now: Instant) -> bool {
        self.failed_until
            .lock()
            .unwrap()
            .is_some_and(|until| now < until)
    }

    fn trip(&self, now: Instant, cooldown: Duration) {
        *self.failed_until.lock().unwrap() = Some(now + cooldown);
    }

    /// Clears the breaker. Returns whether it was tripped, so the pool can
    /// log the recovery.
    fn reset(&self) -> bool {
        self.failed_until.lock().unwrap().take().is_some()
    }
}

/// The composite provider. Calls go to the highest-priority endpoint that is
/// not cooling down; transient failures fall through to the next endpoint and
/// are retried up to `retry_count` more times across the whole list.
pub struct Pool {
    config: PoolConfig,
    classifier: Classifier,
    endpoints: Vec<Arc<Endpoint>>,
    validated: tokio::sync::Mutex<Option<Arc<[Arc<Endpoint>]>>>,
}

impl Pool {
    pub fn new(config: PoolConfig) -> Self {
        let endpoints = config
            .urls
            .iter()
            .map(|url| Arc::new(Endpoint::new(url.clone())))
            .collect();
        Self {
            config,
            classifier: Classifier::default(),
            endpoints,
            validated: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Validates every endpoint (chain id must match, block number must be
    /// fetchable) and drops the ones that fail. Idempotent after the first
    /// success; a failed run leaves the pool uninitialized so the next call
    /// re-validates.
    pub async fn initialize(&self) -> Result<(), Error> {
        let mut slot = self.validated.lock().await;
        if slot.is_some() {
            return Ok(());
        }
        let checks = self.endpoints.iter().map(|endpoint| self.validate(endpoint));
        let results = futures::future::join_all(checks).await;
        let validated: Vec<_> = self
            .endpoints
            .iter()
            .zip(results)
            .filter(|(_, healthy)| *healthy)
            .map(|(endpoint, _)| endpoint.clone())
            .collect();
        if validated.is_empty() {
            return Err(Error::Unavailable);
        }
        tracing::info!(
            healthy = validated.len(),
            configured = self.endpoints.len(),
            "RPC pool initialized"
        );
        *slot = Some(validated.into());
        Ok(())
    }

    async fn validate(&self, endpoint: &Endpoint) -> bool {
        let chain_id = tokio::time::timeout(
            self.config.stall_timeout,
            endpoint.provider.get_chain_id(),
        )
        .await;
        match chain_id {
            Ok(Ok(id)) if id == self.config.chain_id => {}
            Ok(Ok(id)) => {
                tracing::warn!(
                    host = endpoint.host(),
                    got = id,
                    want = self.config.chain_id,
                    "endpoint reports wrong chain id; dropping"
                );
                return false;
            }
            Ok(Err(err)) => {
                tracing::warn!(host = endpoint.host(), ?err, "chain id check failed; dropping");
                return false;
            }
            Err(_) => {
                tracing::warn!(host = endpoint.host(), "chain id check stalled; dropping");
                return false;
            }
        }
        matches!(
            tokio::time::timeout(
                self.config.stall_timeout,
                endpoint.provider.get_block_number(),
            )
            .await,
            Ok(Ok(_)),
        )
    }

    /// Runs one logical operation against the pool. The closure may be
    /// invoked several times, once per endpoint attempt.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, Error>
    where
        F: Fn(Provider) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let endpoints = self
            .validated
            .lock()
            .await
            .clone()
            .ok_or(Error::NotInitialized)?;
        let attempts = self.config.retry_count + 1;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            for (index, endpoint) in endpoints.iter().enumerate() {
                let now = Instant::now();
                if endpoint.cooling_down(now) {
                    // Local rejection; transient at the pool level.
                    continue;
                }
                match tokio::time::timeout(
                    self.config.stall_timeout,
                    op(endpoint.provider.clone()),
                )
                .await
                {
                    Err(_) => {
                        endpoint.trip(now, self.config.cooldown);
                        tracing::warn!(endpoint = index, "call stalled; cooling endpoint down");
                    }
                    Ok(Ok(value)) => {
                        if endpoint.reset() {
                            tracing::info!(endpoint = index, "endpoint recovered");
                        }
                        return Ok(value);
                    }
                    Ok(Err(err)) => match self.classifier.classify(&format!("{err:#}")) {
                        Classification::Transient { rate_limited } => {
                            let cooldown = if rate_limited {
                                self.config.rate_limit_cooldown
                            } else {
                                self.config.cooldown
                            };
                            endpoint.trip(now, cooldown);
                            tracing::warn!(
                                endpoint = index,
                                rate_limited,
                                ?err,
                                "transient call failure"
                            );
                        }
                        Classification::NonTransient => return Err(Error::Call(err)),
                    },
                }
            }
        }
        Err(Error::Exhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("http://localhost:8545".parse().unwrap())
    }

    #[test]
    fn breaker_trips_and_recovers() {
        let endpoint = endpoint();
        let now = Instant::now();
        assert!(!endpoint.cooling_down(now));

        endpoint.trip(now, Duration::from_secs(30));
        assert!(endpoint.cooling_down(now));
        assert!(endpoint.cooling_down(now + Duration::from_secs(29)));
        assert!(!endpoint.cooling_down(now + Duration::from_secs(31)));

        assert!(endpoint.reset());
        assert!(!endpoint.cooling_down(now));
        assert!(!endpoint.reset());
    }

    #[test]
    fn rate_limit_cooldown_default() {
        let config = PoolConfig::new(vec![], 369);
        assert_eq!(config.cooldown, Duration::from_secs(30));
        assert_eq!(config.rate_limit_cooldown, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn call_before_initialize_is_rejected() {
        let pool = Pool::new(PoolConfig::new(
            vec!["http://127.0.0.1:1".parse().unwrap()],
            369,
        ));
        let result = pool.call(|_| async { Ok(()) }).await;
        assert!(matches!(result, Err(Error::NotInitialized)));
    }

    #[tokio::test]
    async fn initialize_with_no_usable_endpoint_fails() {
        let mut config = PoolConfig::new(vec!["http://127.0.0.1:1".parse().unwrap()], 369);
        config.stall_timeout = Duration::from_millis(100);
        let pool = Pool::new(config);
        assert!(matches!(pool.initialize().await, Err(Error::Unavailable)));
        // Still uninitialized afterwards, so the next attempt re-validates.
        assert!(matches!(
            pool.call(|_| async { Ok(()) }).await,
            Err(Error::NotInitialized),
        ));
    }
}
