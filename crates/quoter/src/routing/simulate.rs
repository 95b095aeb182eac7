//! Leg-by-leg route simulation.

use {
    crate::{
        config::VenueConfig,
        domain::{
            LegSummary, RouteCandidate, SimulatedRoute, Venue, cpmm, pack_stable_indices,
            ranking::Simulate, unpack_stable_indices,
        },
        infra::{reserves::Reserves, stable::StableQuoter},
    },
    alloy::primitives::{Address, Bytes, U256},
    std::sync::Arc,
};

/// Oriented reserve lookup, the simulator's view of the reserve cache.
#[async_trait::async_trait]
pub trait ReserveSource: Send + Sync {
    /// `(pair, reserve_in, reserve_out)` for a leg, or `None` when the pair
    /// is missing or unavailable.
    async fn oriented(
        &self,
        venue: Venue,
        token_in: Address,
        token_out: Address,
    ) -> Option<(Address, U256, U256)>;
}

#[async_trait::async_trait]
impl ReserveSource for Reserves {
    async fn oriented(
        &self,
        venue: Venue,
        token_in: Address,
        token_out: Address,
    ) -> Option<(Address, U256, U256)> {
        Reserves::oriented(self, venue, token_in, token_out).await
    }
}

/// The simulator's view of the stable pool.
#[async_trait::async_trait]
pub trait StableQuote: Send + Sync {
    fn pool_address(&self) -> Address;
    async fn indices(&self, token_in: Address, token_out: Address) -> Option<(u8, u8)>;
    async fn amount_out(&self, i: u8, j: u8, amount: U256) -> Option<U256>;
}

#[async_trait::async_trait]
impl StableQuote for StableQuoter {
    fn pool_address(&self) -> Address {
        StableQuoter::pool_address(self)
    }

    async fn indices(&self, token_in: Address, token_out: Address) -> Option<(u8, u8)> {
        let map = match self.index_map().await {
            Ok(map) => map,
            Err(err) => {
                tracing::debug!(%err, "stable index map unavailable");
                return None;
            }
        };
        Some((*map.get(&token_in)?, *map.get(&token_out)?))
    }

    async fn amount_out(&self, i: u8, j: u8, amount: U256) -> Option<U256> {
        match self.quote_by_indices(i, j, amount).await {
            Ok(out) => Some(out),
            Err(err) => {
                tracing::debug!(%err, i, j, "stable quote failed");
                None
            }
        }
    }
}

/// Evaluates a candidate by running its legs in order, threading the output
/// of each leg into the next. Any unavailable pool, failed quote or
/// non-positive intermediate amount rejects the whole route.
pub struct Simulator {
    reserves: Arc<dyn ReserveSource>,
    stable: Option<Arc<dyn StableQuote>>,
    venues: VenueConfig,
}

impl Simulator {
    pub fn new(
        reserves: Arc<dyn ReserveSource>,
        stable: Option<Arc<dyn StableQuote>>,
        venues: VenueConfig,
    ) -> Self {
        Self {
            reserves,
            stable,
            venues,
        }
    }

    pub async fn simulate(
        &self,
        candidate: &RouteCandidate,
        amount_in: U256,
    ) -> Option<SimulatedRoute> {
        if amount_in.is_zero() {
            return None;
        }
        let mut cursor = amount_in;
        let mut legs = Vec::with_capacity(candidate.legs.len());
        for leg in &candidate.legs {
            match leg.venue {
                Venue::Stable => {
                    let stable = self.stable.as_ref()?;
                    let (i, j) = match unpack_stable_indices(&leg.data) {
                        Some(indices) => indices,
                        None => stable.indices(leg.token_in, leg.token_out).await?,
                    };
                    cursor = stable.amount_out(i, j, cursor).await?;
                    if cursor.is_zero() {
                        return None;
                    }
                    legs.push(LegSummary {
                        venue: Venue::Stable,
                        token_in: leg.token_in,
                        token_out: leg.token_out,
                        pool: stable.pool_address(),
                        data: pack_stable_indices(i, j),
                    });
                }
                venue => {
                    let (pair, reserve_in, reserve_out) = self
                        .reserves
                        .oriented(venue, leg.token_in, leg.token_out)
                        .await?;
                    if reserve_in.is_zero() || reserve_out.is_zero() {
                        return None;
                    }
                    cursor =
                        cpmm::amount_out(cursor, reserve_in, reserve_out, self.venues.fee_bps(venue))
                            .ok()?;
                    if cursor.is_zero() {
                        return None;
                    }
                    legs.push(LegSummary {
                        venue,
                        token_in: leg.token_in,
                        token_out: leg.token_out,
                        pool: pair,
                        data: Bytes::new(),
                    });
                }
            }
        }
        Some(SimulatedRoute {
            candidate: candidate.clone(),
            amount_out: cursor,
            legs,
        })
    }
}

#[async_trait::async_trait]
impl Simulate for Simulator {
    async fn amount_out(&self, candidate: &RouteCandidate, amount_in: U256) -> Option<U256> {
        self.simulate(candidate, amount_in)
            .await
            .map(|route| route.amount_out)
    }
}
