//! Cache and batched loader for CPMM pair reserves.
//!
//! Entries are keyed by venue and the unordered token pair, carry a TTL and
//! may be negative: a cached `None` means "no pair / unavailable" and is
//! served just like a hit until it expires.

use {
    crate::{
        config::VenueConfig,
        domain::Venue,
        infra::{PairState, Timed, fetch_pair_state, with_timeout},
    },
    alloy::{
        primitives::{Address, U256},
        sol_types::SolCall,
    },
    contracts::{IPulseXFactory, IPulseXPair},
    dashmap::DashMap,
    ethrpc::multicall::{Call, CallResult, Multicall},
    futures::StreamExt,
    std::{
        sync::Arc,
        time::{Duration, Instant},
    },
};

/// A CPMM leg to load reserves for: `(venue, token_in, token_out)`.
pub type PairQuery = (Venue, Address, Address);

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PairReserves {
    pub pair: Address,
    pub token0: Address,
    pub token1: Address,
    pub reserve0: U256,
    pub reserve1: U256,
}

/// Orients raw reserves by the requested trade direction. `None` when the
/// pair does not actually contain both tokens.
pub fn map_reserves(
    reserves: &PairReserves,
    token_in: Address,
    token_out: Address,
) -> Option<(U256, U256)> {
    if reserves.token0 == token_in && reserves.token1 == token_out {
        Some((reserves.reserve0, reserves.reserve1))
    } else if reserves.token0 == token_out && reserves.token1 == token_in {
        Some((reserves.reserve1, reserves.reserve0))
    } else {
        None
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
struct Key {
    venue: Venue,
    token0: Address,
    token1: Address,
}

impl Key {
    fn new(venue: Venue, a: Address, b: Address) -> Self {
        let (token0, token1) = if a <= b { (a, b) } else { (b, a) };
        Self {
            venue,
            token0,
            token1,
        }
    }
}

struct Entry {
    expires_at: Instant,
    value: Option<PairReserves>,
}

#[derive(Clone, Debug)]
pub struct ReservesConfig {
    pub ttl: Duration,
    /// Timeout for each individual chain read on the fallback path.
    pub call_timeout: Duration,
    /// Bound for concurrent fallback reads during prewarm.
    pub concurrency: usize,
}

pub struct Reserves {
    pool: Arc<ethrpc::Pool>,
    multicall: Arc<Multicall>,
    venues: VenueConfig,
    config: ReservesConfig,
    cache: DashMap<Key, Entry>,
}

impl Reserves {
    pub fn new(
        pool: Arc<ethrpc::Pool>,
        multicall: Arc<Multicall>,
        venues: VenueConfig,
        config: ReservesConfig,
    ) -> Self {
        Self {
            pool,
            multicall,
            venues,
            config,
            cache: DashMap::new(),
        }
    }

    /// Whether a live, positive entry exists. Used by candidate pre-scoring.
    pub fn is_cached(&self, venue: Venue, a: Address, b: Address) -> bool {
        matches!(self.live(Key::new(venue, a, b)), Some(Some(_)))
    }

    /// Reserves for a leg: live cache, then the batched loader, then
    /// per-endpoint reads. `None` means the pair does not exist or could
    /// not be loaded; that outcome is itself cached.
    pub async fn pair_reserves(
        &self,
        venue: Venue,
        token_in: Address,
        token_out: Address,
    ) -> Option<PairReserves> {
        let key = Key::new(venue, token_in, token_out);
        if let Some(cached) = self.live(key) {
            return cached;
        }
        if let Err(err) = self.load_batched(&[(venue, token_in, token_out)]).await {
            tracing::debug!(?err, "batched reserve load failed");
        }
        if let Some(cached) = self.live(key) {
            return cached;
        }
        self.load_direct(key).await;
        self.live(key).flatten()
    }

    /// Reserves oriented by the requested direction, together with the pair
    /// address.
    pub async fn oriented(
        &self,
        venue: Venue,
        token_in: Address,
        token_out: Address,
    ) -> Option<(Address, U256, U256)> {
        let reserves = self.pair_reserves(venue, token_in, token_out).await?;
        let (reserve_in, reserve_out) = map_reserves(&reserves, token_in, token_out)?;
        Some((reserves.pair, reserve_in, reserve_out))
    }

    /// Batched warm-up of every unique CPMM leg before simulation starts.
    /// Legs the multicall leaves unresolved fall back to per-endpoint reads
    /// under the concurrency bound, unless less than about a second of the
    /// quote budget remains.
    pub async fn prewarm(&self, legs: &[PairQuery], deadline: Instant) {
        let mut pending: Vec<PairQuery> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for &(venue, token_in, token_out) in legs {
            if !venue.is_cpmm() {
                continue;
            }
            let key = Key::new(venue, token_in, token_out);
            if seen.insert(key) && self.live(key).is_none() {
                pending.push((venue, token_in, token_out));
            }
        }
        if pending.is_empty() {
            return;
        }
        if let Err(err) = self.load_batched(&pending).await {
            tracing::debug!(?err, legs = pending.len(), "prewarm multicall failed");
        }
        let unresolved: Vec<Key> = pending
            .iter()
            .map(|&(venue, a, b)| Key::new(venue, a, b))
            .filter(|key| self.live(*key).is_none())
            .collect();
        if unresolved.is_empty() {
            return;
        }
        if deadline.saturating_duration_since(Instant::now()) < Duration::from_secs(1) {
            tracing::debug!(
                unresolved = unresolved.len(),
                "skipping prewarm RPC fallback, budget nearly drained"
            );
            return;
        }
        futures::stream::iter(unresolved)
            .for_each_concurrent(self.config.concurrency, |key| self.load_direct(key))
            .await;
    }

    fn live(&self, key: Key) -> Option<Option<PairReserves>> {
        let entry = self.cache.get(&key)?;
        (entry.expires_at > Instant::now()).then(|| entry.value.clone())
    }

    fn store(&self, key: Key, value: Option<PairReserves>) {
        self.cache.insert(
            key,
            Entry {
                expires_at: Instant::now() + self.config.ttl,
                value,
            },
        );
    }

    /// Two-stage multicall load: resolve `getPair` for every leg, then fetch
    /// metadata and reserves for the pairs that exist. Fully resolved legs
    /// are cached (negatively for missing pairs); partially resolved ones
    /// are left for the fallback path.
    async fn load_batched(&self, legs: &[PairQuery]) -> Result<(), ethrpc::multicall::Error> {
        if !self.multicall.enabled() {
            return Err(ethrpc::multicall::Error::Disabled);
        }
        let legs: Vec<(Key, Address)> = legs
            .iter()
            .filter_map(|&(venue, a, b)| {
                Some((Key::new(venue, a, b), self.venues.factory(venue)?))
            })
            .collect();
        let lookups: Vec<Call> = legs
            .iter()
            .map(|(key, factory)| Call {
                target: *factory,
                call_data: IPulseXFactory::getPairCall {
                    tokenA: key.token0,
                    tokenB: key.token1,
                }
                .abi_encode()
                .into(),
            })
            .collect();
        let resolved = self.multicall.execute(&lookups).await?;

        let mut pairs: Vec<(Key, Address)> = Vec::new();
        for ((key, _), result) in legs.iter().zip(resolved) {
            let Some(pair) = decode_pair(&result) else {
                continue;
            };
            if pair == Address::ZERO {
                self.store(*key, None);
            } else {
                pairs.push((*key, pair));
            }
        }
        if pairs.is_empty() {
            return Ok(());
        }

        let state_calls: Vec<Call> = pairs
            .iter()
            .flat_map(|(_, pair)| {
                [
                    Call {
                        target: *pair,
                        call_data: IPulseXPair::token0Call {}.abi_encode().into(),
                    },
                    Call {
                        target: *pair,
                        call_data: IPulseXPair::token1Call {}.abi_encode().into(),
                    },
                    Call {
                        target: *pair,
                        call_data: IPulseXPair::getReservesCall {}.abi_encode().into(),
                    },
                ]
            })
            .collect();
        let states = self.multicall.execute(&state_calls).await?;
        for ((key, pair), chunk) in pairs.iter().zip(states.chunks(3)) {
            let Some(state) = decode_pair_state(chunk) else {
                continue;
            };
            self.store(
                *key,
                Some(PairReserves {
                    pair: *pair,
                    token0: state.token0,
                    token1: state.token1,
                    reserve0: state.reserve0,
                    reserve1: state.reserve1,
                }),
            );
        }
        Ok(())
    }

    /// Per-endpoint fallback for one leg. Every step runs under the call
    /// timeout; any failure caches a negative entry so the next lookup
    /// within the TTL does not hammer a broken pair.
    async fn load_direct(&self, key: Key) {
        let Some(factory) = self.venues.factory(key.venue) else {
            return;
        };
        let (token_a, token_b) = (key.token0, key.token1);
        let lookup = self.pool.call(move |provider| async move {
            Ok(IPulseXFactory::new(factory, provider)
                .getPair(token_a, token_b)
                .call()
                .await?)
        });
        let pair = match with_timeout(self.config.call_timeout, lookup).await {
            Timed::Value(Ok(pair)) => pair,
            Timed::Value(Err(err)) => {
                tracing::debug!(?err, "getPair failed");
                self.store(key, None);
                return;
            }
            Timed::TimedOut => {
                self.store(key, None);
                return;
            }
        };
        if pair == Address::ZERO {
            self.store(key, None);
            return;
        }
        let state = with_timeout(
            self.config.call_timeout,
            fetch_pair_state(&self.pool, None, pair),
        )
        .await;
        match state {
            Timed::Value(Ok(state)) => self.store(
                key,
                Some(PairReserves {
                    pair,
                    token0: state.token0,
                    token1: state.token1,
                    reserve0: state.reserve0,
                    reserve1: state.reserve1,
                }),
            ),
            Timed::Value(Err(err)) => {
                tracing::debug!(?err, "pair state read failed");
                self.store(key, None);
            }
            Timed::TimedOut => self.store(key, None),
        }
    }
}

fn decode_pair(result: &CallResult) -> Option<Address> {
    if !result.success {
        return None;
    }
    IPulseXFactory::getPairCall::abi_decode_returns(&result.return_data).ok()
}

fn decode_pair_state(chunk: &[CallResult]) -> Option<PairState> {
    let [token0, token1, reserves] = chunk else {
        return None;
    };
    if !(token0.success && token1.success && reserves.success) {
        return None;
    }
    let token0 = IPulseXPair::token0Call::abi_decode_returns(&token0.return_data).ok()?;
    let token1 = IPulseXPair::token1Call::abi_decode_returns(&token1.return_data).ok()?;
    let reserves = IPulseXPair::getReservesCall::abi_decode_returns(&reserves.return_data).ok()?;
    Some(PairState {
        token0,
        token1,
        reserve0: reserves.reserve0.to::<U256>(),
        reserve1: reserves.reserve1.to::<U256>(),
    })
}

#[cfg(test)]
mod tests {
    use {super::*, alloy::primitives::address, ethrpc::PoolConfig};

    const A: Address = address!("0x00000000000000000000000000000000000000aa");
    const B: Address = address!("0x00000000000000000000000000000000000000bb");
    const PAIR: Address = address!("0x00000000000000000000000000000000000000ff");

    fn reserves_fixture() -> PairReserves {
        PairReserves {
            pair: PAIR,
            token0: A,
            token1: B,
            reserve0: U256::from(1_000),
            reserve1: U256::from(2_000),
        }
    }

    fn venue_config() -> VenueConfig {
        VenueConfig {
            v1_factory: address!("0x0000000000000000000000000000000000000001"),
            v2_factory: address!("0x0000000000000000000000000000000000000002"),
            v1_router: address!("0x0000000000000000000000000000000000000003"),
            v2_router: address!("0x0000000000000000000000000000000000000004"),
            stable_pool: None,
            v1_fee_bps: 29,
            v2_fee_bps: 29,
        }
    }

    fn loader(ttl: Duration) -> Reserves {
        let pool = Arc::new(ethrpc::Pool::new(PoolConfig::new(vec![], 369)));
        let multicall = Arc::new(Multicall::new(
            pool.clone(),
            ethrpc::multicall::Config {
                enabled: false,
                ..Default::default()
            },
        ));
        Reserves::new(
            pool,
            multicall,
            venue_config(),
            ReservesConfig {
                ttl,
                call_timeout: Duration::from_millis(100),
                concurrency: 2,
            },
        )
    }

    #[test]
    fn orientation_follows_request_direction() {
        let reserves = reserves_fixture();
        assert_eq!(
            map_reserves(&reserves, A, B),
            Some((U256::from(1_000), U256::from(2_000))),
        );
        assert_eq!(
            map_reserves(&reserves, B, A),
            Some((U256::from(2_000), U256::from(1_000))),
        );
        let other = address!("0x00000000000000000000000000000000000000ee");
        assert_eq!(map_reserves(&reserves, A, other), None);
    }

    #[test]
    fn key_is_direction_independent() {
        assert_eq!(Key::new(Venue::CpmmV2, A, B), Key::new(Venue::CpmmV2, B, A));
        assert_ne!(Key::new(Venue::CpmmV1, A, B), Key::new(Venue::CpmmV2, A, B));
    }

    #[tokio::test]
    async fn cache_hits_are_idempotent() {
        let loader = loader(Duration::from_secs(60));
        loader.store(Key::new(Venue::CpmmV2, A, B), Some(reserves_fixture()));

        let first = loader.pair_reserves(Venue::CpmmV2, A, B).await;
        let second = loader.pair_reserves(Venue::CpmmV2, B, A).await;
        assert_eq!(first, Some(reserves_fixture()));
        assert_eq!(first, second);
        assert!(loader.is_cached(Venue::CpmmV2, A, B));
    }

    #[tokio::test]
    async fn negative_entries_are_served() {
        let loader = loader(Duration::from_secs(60));
        loader.store(Key::new(Venue::CpmmV1, A, B), None);
        assert_eq!(loader.pair_reserves(Venue::CpmmV1, A, B).await, None);
        assert!(!loader.is_cached(Venue::CpmmV1, A, B));
    }

    #[tokio::test]
    async fn expired_entries_fall_through_to_loading() {
        let loader = loader(Duration::from_millis(0));
        loader.store(Key::new(Venue::CpmmV2, A, B), Some(reserves_fixture()));
        // The entry expires immediately and the loader has no usable RPC, so
        // the lookup degrades to a (cached) negative result.
        let result = loader.pair_reserves(Venue::CpmmV2, A, B).await;
        assert_eq!(result, None);
    }

    #[test]
    fn decode_pair_state_requires_all_calls() {
        let ok = CallResult {
            success: true,
            return_data: Default::default(),
        };
        let failed = CallResult {
            success: false,
            return_data: Default::default(),
        };
        assert!(decode_pair_state(&[ok.clone(), ok.clone(), failed]).is_none());
        assert!(decode_pair_state(&[ok.clone(), ok]).is_none());
    }
}
