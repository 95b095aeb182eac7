//! End-to-end quote orchestration.

use {
    crate::{
        api::ParsedRequest,
        config::Config,
        domain::{
            BPS, GasEstimate, QuoteOutcome, RouteCandidate, RouteLeg, RoutePortion, Routing,
            SimulatedRoute, Venue,
            ranking::{self, TOP_K},
        },
        infra::{
            Timed,
            oracle::{PriceOracle, to_float},
            reserves::{PairQuery, Reserves, ReservesConfig},
            stable::StableQuoter,
            with_timeout,
        },
        routing::{
            self,
            simulate::{ReserveSource, Simulator, StableQuote},
        },
    },
    alloy::{
        primitives::{Address, U256},
        providers::Provider as _,
    },
    contracts::IPulseXRouter,
    ethrpc::multicall::Multicall,
    futures::StreamExt,
    std::{
        collections::HashMap,
        sync::Arc,
        time::{Duration, Instant},
    },
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("amount must be positive")]
    AmountNonPositive,
    #[error("token address is not valid")]
    InvalidToken,
    #[error("no candidate routes for this token pair")]
    NoCandidates,
    #[error("no route could be simulated")]
    NoValidRoutes,
    #[error("quote timed out")]
    Timeout,
    #[error(transparent)]
    Rpc(#[from] ethrpc::Error),
}

/// Wall-clock budget for one quote.
#[derive(Clone, Copy, Debug)]
struct Deadline {
    at: Instant,
}

impl Deadline {
    fn new(total: Duration) -> Self {
        Self {
            at: Instant::now() + total,
        }
    }

    fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    fn exhausted(&self) -> bool {
        self.remaining().is_zero()
    }
}

/// Minimum slice of budget worth scheduling another simulation for.
const MIN_ROUTE_BUDGET: Duration = Duration::from_millis(200);

pub struct Quoter {
    config: Config,
    pool: Arc<ethrpc::Pool>,
    reserves: Arc<Reserves>,
    stable: Option<Arc<StableQuoter>>,
    oracle: Arc<PriceOracle>,
    simulator: Arc<Simulator>,
}

impl Quoter {
    pub fn new(config: Config, pool: Arc<ethrpc::Pool>) -> Self {
        let multicall = Arc::new(Multicall::new(pool.clone(), config.multicall_config()));
        let reserves = Arc::new(Reserves::new(
            pool.clone(),
            multicall.clone(),
            config.venues.clone(),
            ReservesConfig {
                ttl: config.cache.reserves_ttl,
                call_timeout: config.evaluation.timeout,
                concurrency: config.evaluation.concurrency,
            },
        ));
        let stable = config.venues.stable_pool.map(|address| {
            Arc::new(StableQuoter::new(
                pool.clone(),
                address,
                config.cache.stable_index_ttl,
            ))
        });
        let oracle = Arc::new(PriceOracle::new(
            pool.clone(),
            multicall,
            &config.venues,
            &config.tokens,
            &config.cache,
        ));
        let simulator = Arc::new(Simulator::new(
            reserves.clone() as Arc<dyn ReserveSource>,
            stable
                .clone()
                .map(|stable| stable as Arc<dyn StableQuote>),
            config.venues.clone(),
        ));
        Self {
            config,
            pool,
            reserves,
            stable,
            oracle,
            simulator,
        }
    }

    /// Runs the full quoting pipeline for one parsed request.
    pub async fn quote(&self, request: &ParsedRequest) -> Result<QuoteOutcome, Error> {
        if request.amount_in.is_zero() {
            return Err(Error::AmountNonPositive);
        }
        let deadline = Deadline::new(self.config.evaluation.total_budget);
        let token_in = request.token_in.wrapped;
        let token_out = request.token_out.wrapped;

        // Best effort: a failed index load only disables stable candidates.
        let stable_indices = self.load_stable_indices().await;

        let candidates =
            routing::enumerate(token_in, token_out, &self.config, stable_indices.as_ref());
        if candidates.is_empty() {
            return Err(Error::NoCandidates);
        }
        let has_stable = candidates.iter().any(|c| c.stable_leg_count() > 0);
        let selected = self.select_candidates(candidates, has_stable);

        let legs: Vec<PairQuery> = selected
            .iter()
            .flat_map(|candidate| {
                candidate
                    .legs
                    .iter()
                    .filter(|leg| leg.venue.is_cpmm())
                    .map(|leg| (leg.venue, leg.token_in, leg.token_out))
            })
            .collect();
        self.reserves.prewarm(&legs, deadline.at).await;
        if deadline.exhausted() {
            return Err(Error::Timeout);
        }

        let mut simulated = self.evaluate(&selected, request.amount_in, deadline).await;
        if simulated.is_empty() {
            simulated = self
                .direct_fallback(token_in, token_out, request.amount_in, deadline)
                .await;
        }
        if simulated.is_empty() {
            return Err(if deadline.exhausted() {
                Error::Timeout
            } else {
                Error::NoValidRoutes
            });
        }

        let endpoints_stable = self.config.tokens.is_stable(token_in)
            && self.config.tokens.is_stable(token_out);
        ranking::rank(&mut simulated, endpoints_stable);
        simulated.truncate(TOP_K);

        let routing = self.select_routing(&simulated, token_in, request.amount_in).await;
        let total_amount_out = routing
            .portions()
            .iter()
            .fold(U256::ZERO, |sum, portion| sum + portion.amount_out);
        let gas = self.estimate_gas(routing.leg_count()).await;

        Ok(QuoteOutcome {
            token_in,
            token_out,
            amount_in: request.amount_in,
            total_amount_out,
            routing,
            router: self.config.venues.v2_router,
            gas,
        })
    }

    async fn load_stable_indices(&self) -> Option<HashMap<Address, u8>> {
        if !self.config.routing.stable_routing_enabled {
            return None;
        }
        let stable = self.stable.as_ref()?;
        match stable.index_map().await {
            Ok(map) => Some(map),
            Err(err) => {
                tracing::warn!(%err, "stable index load failed; quoting without stable routes");
                None
            }
        }
    }

    /// Pre-scores, sorts and truncates the candidate set, keeping at least
    /// one stable candidate alive when any was enumerated.
    fn select_candidates(
        &self,
        candidates: Vec<RouteCandidate>,
        has_stable: bool,
    ) -> Vec<RouteCandidate> {
        let mut scored: Vec<(i64, RouteCandidate)> = candidates
            .into_iter()
            .map(|candidate| (self.pre_score(&candidate), candidate))
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.id().cmp(&b.1.id())));

        let max_routes = self.config.evaluation.max_routes;
        let mut selected = Vec::with_capacity(max_routes.min(scored.len()));
        let mut best_omitted_stable = None;
        for (_, candidate) in scored {
            if selected.len() < max_routes {
                selected.push(candidate);
            } else if best_omitted_stable.is_none() && candidate.stable_leg_count() > 0 {
                best_omitted_stable = Some(candidate);
            }
        }
        if has_stable && !selected.iter().any(|c| c.stable_leg_count() > 0) {
            if let (Some(stable), Some(last)) =
                (best_omitted_stable, selected.len().checked_sub(1))
            {
                selected[last] = stable;
            }
        }
        selected
    }

    /// Cheap static preference applied before any simulation: short routes
    /// through healthy venues and warm caches first.
    fn pre_score(&self, candidate: &RouteCandidate) -> i64 {
        let mut score: i64 = 1_000;
        score -= 50 * i64::from(candidate.hops() as u32);
        for leg in &candidate.legs {
            match leg.venue {
                Venue::CpmmV1 => score -= 25,
                Venue::CpmmV2 => {}
                Venue::Stable => score += 10,
            }
            if leg.venue.is_cpmm()
                && self
                    .reserves
                    .is_cached(leg.venue, leg.token_in, leg.token_out)
            {
                score += 5;
            }
        }
        let core = self.config.tokens.core_connectors();
        if candidate.node_path.len() > 2 {
            for node in &candidate.node_path[1..candidate.node_path.len() - 1] {
                if core.contains(node) {
                    score += 5;
                }
            }
        }
        score
    }

    /// Simulates the selected candidates under the concurrency bound. The
    /// per-route timeout shrinks as the total budget drains; routes that
    /// time out or produce nothing are dropped.
    async fn evaluate(
        &self,
        candidates: &[RouteCandidate],
        amount_in: U256,
        deadline: Deadline,
    ) -> Vec<SimulatedRoute> {
        let base_timeout = self.config.evaluation.timeout;
        futures::stream::iter(candidates.iter().map(|candidate| {
            let simulator = self.simulator.clone();
            async move {
                let remaining = deadline.remaining();
                if remaining < MIN_ROUTE_BUDGET {
                    return None;
                }
                let timeout = base_timeout.min((remaining / 2).max(MIN_ROUTE_BUDGET));
                match with_timeout(timeout, simulator.simulate(candidate, amount_in)).await {
                    Timed::Value(result) => result.filter(|route| !route.amount_out.is_zero()),
                    Timed::TimedOut => {
                        tracing::debug!(id = %candidate.id(), "route simulation timed out");
                        None
                    }
                }
            }
        }))
        .buffer_unordered(self.config.evaluation.concurrency)
        .filter_map(|result| async move { result })
        .collect()
        .await
    }

    /// Last-ditch candidates when the full evaluation produced nothing:
    /// the direct pair, then two CPMM hops through a core connector, then
    /// the routers' own `getAmountsOut` for the direct path. The first
    /// success wins.
    async fn direct_fallback(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        deadline: Deadline,
    ) -> Vec<SimulatedRoute> {
        const VENUES: [Venue; 2] = [Venue::CpmmV2, Venue::CpmmV1];
        let mut candidates = Vec::new();
        for venue in VENUES {
            candidates.push(RouteCandidate::new(
                vec![RouteLeg::cpmm(venue, token_in, token_out)],
                vec![token_in, token_out],
            ));
        }
        for &connector in self.config.tokens.core_connectors() {
            if connector == token_in || connector == token_out {
                continue;
            }
            for first in VENUES {
                for second in VENUES {
                    candidates.push(RouteCandidate::new(
                        vec![
                            RouteLeg::cpmm(first, token_in, connector),
                            RouteLeg::cpmm(second, connector, token_out),
                        ],
                        vec![token_in, connector, token_out],
                    ));
                }
            }
        }
        for candidate in &candidates {
            let remaining = deadline.remaining();
            if remaining < MIN_ROUTE_BUDGET {
                return Vec::new();
            }
            let timeout = self.config.evaluation.timeout.min(remaining);
            if let Timed::Value(Some(route)) =
                with_timeout(timeout, self.simulator.simulate(candidate, amount_in)).await
            {
                if !route.amount_out.is_zero() {
                    return vec![route];
                }
            }
        }
        // The routers can still answer when local reserve state is broken.
        for (router, venue) in [
            (self.config.venues.v2_router, Venue::CpmmV2),
            (self.config.venues.v1_router, Venue::CpmmV1),
        ] {
            if deadline.remaining() < MIN_ROUTE_BUDGET {
                break;
            }
            if let Some(route) = self
                .router_quote(router, venue, token_in, token_out, amount_in)
                .await
            {
                return vec![route];
            }
        }
        Vec::new()
    }

    async fn router_quote(
        &self,
        router: Address,
        venue: Venue,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Option<SimulatedRoute> {
        let amounts = self
            .pool
            .call(move |provider| async move {
                Ok(IPulseXRouter::new(router, provider)
                    .getAmountsOut(amount_in, vec![token_in, token_out])
                    .call()
                    .await?)
            })
            .await;
        let amounts = match amounts {
            Ok(amounts) => amounts,
            Err(err) => {
                tracing::debug!(?err, "router getAmountsOut failed");
                return None;
            }
        };
        let amount_out = *amounts.last()?;
        if amount_out.is_zero() {
            return None;
        }
        // The leg descriptor needs the pair address; without it the quote
        // cannot be executed.
        let reserves = self
            .reserves
            .pair_reserves(venue, token_in, token_out)
            .await?;
        let candidate = RouteCandidate::new(
            vec![RouteLeg::cpmm(venue, token_in, token_out)],
            vec![token_in, token_out],
        );
        Some(SimulatedRoute {
            legs: vec![crate::domain::LegSummary {
                venue,
                token_in,
                token_out,
                pool: reserves.pair,
                data: Default::default(),
            }],
            candidate,
            amount_out,
        })
    }

    /// Chooses between the best single route and a two-way split.
    async fn select_routing(
        &self,
        ranked: &[SimulatedRoute],
        token_in: Address,
        amount_in: U256,
    ) -> Routing {
        let best = &ranked[0];
        let single = Routing::Single(RoutePortion {
            share_bps: BPS,
            amount_in,
            amount_out: best.amount_out,
            legs: best.legs.clone(),
        });
        if !self.config.split.enabled || ranked.len() < 2 {
            return single;
        }
        let min_usd = self.config.split.min_usd_value;
        if min_usd > 0.0 {
            match self.input_usd(token_in, amount_in).await {
                Some(usd) if usd >= min_usd => {}
                // Unknown notional counts as too small; splitting stays an
                // optimisation for sizable trades.
                _ => return single,
            }
        }
        match ranking::best_split(ranked, amount_in, &self.config.split, &*self.simulator).await
        {
            Some(split) => Routing::Split(split.portions),
            None => single,
        }
    }

    async fn input_usd(&self, token_in: Address, amount_in: U256) -> Option<f64> {
        let price = self.oracle.token_price_usd(token_in).await.ok()?;
        let decimals = self.oracle.decimals_of(token_in).await?;
        Some(price * to_float(amount_in, decimals))
    }

    /// Fixed-cost gas model: base plus a per-leg increment, priced at the
    /// chain's current fee level. Failure leaves the quote without gas
    /// fields rather than failing it.
    async fn estimate_gas(&self, leg_count: usize) -> Option<GasEstimate> {
        let units = self
            .config
            .gas
            .base_units
            .saturating_add(self.config.gas.per_leg_units.saturating_mul(leg_count as u64));
        let price_wei = self.gas_price().await;
        let cost_native = U256::from(units) * U256::from(price_wei);
        let native_usd = self.oracle.native_price_usd().await.ok()?;
        Some(GasEstimate {
            units,
            cost_native,
            cost_usd: to_float(cost_native, 18) * native_usd,
        })
    }

    /// Gas price in wei: `eth_gasPrice`, then the EIP-1559 estimate, then a
    /// one-gwei floor.
    async fn gas_price(&self) -> u128 {
        let direct = self
            .pool
            .call(|provider| async move { Ok(provider.get_gas_price().await?) })
            .await;
        if let Ok(price) = direct {
            if price > 0 {
                return price;
            }
        }
        let estimated = self
            .pool
            .call(|provider| async move {
                let fees = provider.estimate_eip1559_fees().await?;
                Ok((fees.max_fee_per_gas, fees.max_priority_fee_per_gas))
            })
            .await;
        match estimated {
            Ok((max_fee, _)) if max_fee > 0 => max_fee,
            Ok((_, tip)) if tip > 0 => tip,
            _ => 1_000_000_000,
        }
    }
}
