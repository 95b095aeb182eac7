//! USD pricing from on-chain pair reserves.
//!
//! The native (WPLS) price comes from the canonical (WPLS, USDC) pair,
//! preferring the V2 factory. Arbitrary tokens are priced through their
//! WPLS pair when one exists, falling back to a direct USDC pair. Successes
//! and failures are both cached; failures with a much shorter TTL.

use {
    crate::{
        config::{CacheConfig, TokenConfig, VenueConfig},
        infra::fetch_pair_state,
    },
    alloy::primitives::{Address, U256},
    contracts::{IERC20, IPulseXFactory},
    dashmap::DashMap,
    ethrpc::multicall::Multicall,
    std::{
        sync::{Arc, RwLock},
        time::{Duration, Instant},
    },
};

#[derive(Debug, thiserror::Error)]
#[error("price unavailable")]
pub struct PriceUnavailable;

/// Reserve amount as a decimal-adjusted float. Precision loss is fine here;
/// prices only feed gas estimation and split thresholds.
pub(crate) fn to_float(value: U256, decimals: u8) -> f64 {
    let value: f64 = value.to_string().parse().unwrap_or(f64::INFINITY);
    value / 10f64.powi(i32::from(decimals))
}

pub struct PriceOracle {
    pool: Arc<ethrpc::Pool>,
    multicall: Arc<Multicall>,
    wrapped_native: Address,
    usd_stable: Address,
    /// Factories in lookup priority order.
    factories: Vec<Address>,
    ttl: Duration,
    negative_ttl: Duration,
    native: RwLock<Option<(f64, Instant)>>,
    tokens: DashMap<Address, (f64, Instant)>,
    decimals: DashMap<Address, u8>,
    failures: DashMap<Address, Instant>,
}

impl PriceOracle {
    pub fn new(
        pool: Arc<ethrpc::Pool>,
        multicall: Arc<Multicall>,
        venues: &VenueConfig,
        tokens: &TokenConfig,
        cache: &CacheConfig,
    ) -> Self {
        Self {
            pool,
            multicall,
            wrapped_native: tokens.wrapped_native,
            usd_stable: tokens.usd_stable,
            factories: vec![venues.v2_factory, venues.v1_factory],
            ttl: cache.price_ttl,
            negative_ttl: cache.price_negative_ttl,
            native: RwLock::new(None),
            tokens: DashMap::new(),
            decimals: DashMap::new(),
            failures: DashMap::new(),
        }
    }

    /// USD per one native token.
    pub async fn native_price_usd(&self) -> Result<f64, PriceUnavailable> {
        if let Some((price, at)) = *self.native.read().unwrap() {
            if at.elapsed() < self.ttl {
                return Ok(price);
            }
        }
        for &factory in &self.factories {
            let Some(price) = self
                .pair_price(factory, self.wrapped_native, self.usd_stable)
                .await
            else {
                continue;
            };
            *self.native.write().unwrap() = Some((price, Instant::now()));
            return Ok(price);
        }
        Err(PriceUnavailable)
    }

    /// USD per one unit of `token`. Callers pass the wrapped form; the zero
    /// address is accepted as another spelling of native.
    pub async fn token_price_usd(&self, token: Address) -> Result<f64, PriceUnavailable> {
        if token == self.wrapped_native || token == Address::ZERO {
            return self.native_price_usd().await;
        }
        if token == self.usd_stable {
            self.tokens.insert(token, (1.0, Instant::now()));
            return Ok(1.0);
        }
        if let Some(entry) = self.tokens.get(&token) {
            let (price, at) = *entry;
            if at.elapsed() < self.ttl {
                return Ok(price);
            }
        }
        if let Some(failed_at) = self.failures.get(&token) {
            if failed_at.elapsed() < self.negative_ttl {
                return Err(PriceUnavailable);
            }
        }

        // A native pair gives price-in-WPLS; multiply through to USD.
        for &factory in &self.factories {
            let Some(in_native) = self.pair_price(factory, token, self.wrapped_native).await
            else {
                continue;
            };
            let Ok(native_usd) = self.native_price_usd().await else {
                break;
            };
            let price = in_native * native_usd;
            if price.is_finite() && price > 0.0 {
                self.tokens.insert(token, (price, Instant::now()));
                return Ok(price);
            }
        }
        for &factory in &self.factories {
            let Some(price) = self.pair_price(factory, token, self.usd_stable).await else {
                continue;
            };
            self.tokens.insert(token, (price, Instant::now()));
            return Ok(price);
        }

        self.failures.insert(token, Instant::now());
        Err(PriceUnavailable)
    }

    /// Spot price of `token` denominated in `denom`, read from the
    /// factory's pair reserves. `None` when there is no usable pair.
    async fn pair_price(&self, factory: Address, token: Address, denom: Address) -> Option<f64> {
        let (token_a, token_b) = (token, denom);
        let lookup = self
            .pool
            .call(move |provider| async move {
                Ok(IPulseXFactory::new(factory, provider)
                    .getPair(token_a, token_b)
                    .call()
                    .await?)
            })
            .await;
        let pair = match lookup {
            Ok(pair) if pair != Address::ZERO => pair,
            Ok(_) => return None,
            Err(err) => {
                tracing::debug!(?err, "oracle getPair failed");
                return None;
            }
        };
        let multicall = self.multicall.enabled().then_some(&*self.multicall);
        let state = match fetch_pair_state(&self.pool, multicall, pair).await {
            Ok(state) => state,
            Err(err) => {
                tracing::debug!(?err, "oracle pair read failed");
                return None;
            }
        };
        let (token_reserve, denom_reserve) = if state.token0 == token && state.token1 == denom {
            (state.reserve0, state.reserve1)
        } else if state.token0 == denom && state.token1 == token {
            (state.reserve1, state.reserve0)
        } else {
            return None;
        };
        let token_float = to_float(token_reserve, self.decimals_of(token).await?);
        let denom_float = to_float(denom_reserve, self.decimals_of(denom).await?);
        if token_float <= 0.0 {
            return None;
        }
        let price = denom_float / token_float;
        (price.is_finite() && price > 0.0).then_some(price)
    }

    pub(crate) async fn decimals_of(&self, token: Address) -> Option<u8> {
        if let Some(cached) = self.decimals.get(&token) {
            return Some(*cached);
        }
        let fetched = self
            .pool
            .call(move |provider| async move {
                Ok(IERC20::new(token, provider).decimals().call().await?)
            })
            .await;
        match fetched {
            Ok(decimals) => {
                self.decimals.insert(token, decimals);
                Some(decimals)
            }
            Err(err) => {
                tracing::debug!(?err, "decimals read failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, alloy::primitives::address, ethrpc::PoolConfig};

    const TOKEN: Address = address!("0x00000000000000000000000000000000000000aa");

    fn oracle() -> PriceOracle {
        let pool = Arc::new(ethrpc::Pool::new(PoolConfig::new(vec![], 369)));
        let multicall = Arc::new(Multicall::new(
            pool.clone(),
            ethrpc::multicall::Config {
                enabled: false,
                ..Default::default()
            },
        ));
        let venues = VenueConfig {
            v1_factory: address!("0x0000000000000000000000000000000000000001"),
            v2_factory: address!("0x0000000000000000000000000000000000000002"),
            v1_router: address!("0x0000000000000000000000000000000000000003"),
            v2_router: address!("0x0000000000000000000000000000000000000004"),
            stable_pool: None,
            v1_fee_bps: 29,
            v2_fee_bps: 29,
        };
        let tokens = TokenConfig {
            wrapped_native: contracts::deployments::WPLS,
            usd_stable: contracts::deployments::USDC,
            connectors: vec![contracts::deployments::WPLS, contracts::deployments::USDC],
            stable_tokens: vec![contracts::deployments::USDC],
        };
        let cache = CacheConfig {
            reserves_ttl: Duration::from_secs(15),
            stable_index_ttl: Duration::from_secs(300),
            price_ttl: Duration::from_secs(15),
            price_negative_ttl: Duration::from_secs(30),
        };
        PriceOracle::new(pool, multicall, &venues, &tokens, &cache)
    }

    #[test]
    fn float_conversion_adjusts_for_decimals() {
        assert_eq!(to_float(U256::from(1_500_000u64), 6), 1.5);
        assert_eq!(to_float(U256::from(2u64) * U256::from(10u64).pow(U256::from(18)), 18), 2.0);
        assert_eq!(to_float(U256::ZERO, 18), 0.0);
    }

    #[tokio::test]
    async fn usd_stable_is_always_one() {
        let oracle = oracle();
        let price = oracle
            .token_price_usd(contracts::deployments::USDC)
            .await
            .unwrap();
        assert_eq!(price, 1.0);
    }

    #[tokio::test]
    async fn failures_are_negatively_cached() {
        let oracle = oracle();
        // No usable RPC, so the lookup fails and lands in the failure cache.
        assert!(oracle.token_price_usd(TOKEN).await.is_err());
        assert!(oracle.failures.contains_key(&TOKEN));
        // The second call short-circuits on the negative entry.
        assert!(oracle.token_price_usd(TOKEN).await.is_err());
    }
}
