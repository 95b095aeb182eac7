//! Process configuration. Every knob is overridable through the environment;
//! the [`Config`] handed to the engine is immutable after load.

use {
    crate::domain::{BPS, Venue},
    alloy::primitives::Address,
    contracts::deployments,
    std::{fmt, time::Duration},
    url::Url,
};

fn duration_from_millis(value: &str) -> Result<Duration, String> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|err| format!("invalid millisecond duration: {err}"))
}

#[derive(Debug, clap::Parser)]
pub struct Arguments {
    /// JSON-RPC endpoints in priority order.
    #[clap(long, env, use_value_delimiter = true)]
    pub rpc_urls: Vec<Url>,

    #[clap(long, env, default_value_t = deployments::CHAIN_ID)]
    pub chain_id: u64,

    #[clap(long, env, default_value = "1200", value_parser = duration_from_millis)]
    pub rpc_stall_timeout_ms: Duration,

    #[clap(long, env, default_value_t = 2)]
    pub rpc_retry_count: u32,

    #[clap(long, env, default_value = "200", value_parser = duration_from_millis)]
    pub rpc_retry_delay_ms: Duration,

    /// Circuit-breaker cooldown after a transient endpoint failure.
    #[clap(long, env, default_value = "30000", value_parser = duration_from_millis)]
    pub rpc_cooldown_ms: Duration,

    /// Cooldown after a rate-limited failure. Defaults to
    /// `max(2 * cooldown, 60s)`.
    #[clap(long, env, value_parser = duration_from_millis)]
    pub rpc_rate_limit_cooldown_ms: Option<Duration>,

    #[clap(long, env, default_value_t = deployments::PULSEX_V1_FACTORY)]
    pub cpmm_v1_factory: Address,

    #[clap(long, env, default_value_t = deployments::PULSEX_V2_FACTORY)]
    pub cpmm_v2_factory: Address,

    #[clap(long, env, default_value_t = deployments::PULSEX_V1_ROUTER)]
    pub cpmm_v1_router: Address,

    #[clap(long, env, default_value_t = deployments::PULSEX_V2_ROUTER)]
    pub cpmm_v2_router: Address,

    /// The three-coin stable pool. Stable routing is disabled when unset.
    #[clap(long, env)]
    pub stable_pool: Option<Address>,

    /// Connector tokens used to build multi-hop routes, in preference order.
    /// The first entry must be the wrapped native token.
    #[clap(
        long,
        env,
        use_value_delimiter = true,
        default_values_t = [
            deployments::WPLS,
            deployments::PLSX,
            deployments::USDC,
            deployments::USDT,
            deployments::DAI,
        ],
    )]
    pub connector_tokens: Vec<Address>,

    /// Stable-pool coins, a subset of the connectors. Must contain the
    /// canonical USD stablecoin.
    #[clap(
        long,
        env,
        use_value_delimiter = true,
        default_values_t = [deployments::USDC, deployments::USDT, deployments::DAI],
    )]
    pub stable_tokens: Vec<Address>,

    #[clap(long, env, default_value_t = deployments::USDC)]
    pub usd_stable: Address,

    #[clap(long, env, default_value_t = 29)]
    pub cpmm_v1_fee_bps: u32,

    #[clap(long, env, default_value_t = 29)]
    pub cpmm_v2_fee_bps: u32,

    /// Connector hops allowed between the traded tokens (0-3).
    #[clap(long, env, default_value_t = 1)]
    pub max_connector_hops: usize,

    #[clap(long, env, action = clap::ArgAction::Set, default_value = "true")]
    pub stable_routing_enabled: bool,

    /// Allow routes that cross the stable pool through a pivot coin when
    /// only one endpoint is stable.
    #[clap(long, env, action = clap::ArgAction::Set, default_value = "true")]
    pub stable_as_connector: bool,

    #[clap(long, env, default_value_t = 2)]
    pub max_stable_pivots: usize,

    #[clap(long, env, default_value = "15000", value_parser = duration_from_millis)]
    pub reserves_cache_ttl_ms: Duration,

    #[clap(long, env, default_value = "300000", value_parser = duration_from_millis)]
    pub stable_index_ttl_ms: Duration,

    #[clap(long, env, default_value = "15000", value_parser = duration_from_millis)]
    pub price_cache_ttl_ms: Duration,

    /// Per-RPC-call timeout during quote evaluation.
    #[clap(long, env, default_value = "3000", value_parser = duration_from_millis)]
    pub quote_timeout_ms: Duration,

    #[clap(long, env, default_value_t = 6)]
    pub quote_concurrency: usize,

    #[clap(long, env, default_value_t = 40)]
    pub quote_max_routes: usize,

    /// Wall-clock budget for a whole quote.
    #[clap(long, env, default_value = "6000", value_parser = duration_from_millis)]
    pub quote_total_timeout_ms: Duration,

    #[clap(long, env, action = clap::ArgAction::Set, default_value = "true")]
    pub split_routes_enabled: bool,

    /// Candidate split weights in basis points for the first half of a pair.
    #[clap(
        long,
        env,
        use_value_delimiter = true,
        default_values_t = [1000_u32, 2000, 3000, 4000, 5000, 6000, 7000, 8000, 9000],
    )]
    pub split_weights_bps: Vec<u32>,

    #[clap(long, env, default_value_t = 3)]
    pub split_max_routes: usize,

    #[clap(long, env, default_value_t = 0)]
    pub split_min_improvement_bps: u32,

    /// Minimum input notional (USD) before a split is even attempted.
    #[clap(long, env, default_value_t = 100.0)]
    pub split_min_usd_value: f64,

    #[clap(long, env, default_value_t = 100_000)]
    pub gas_base_units: u64,

    #[clap(long, env, default_value_t = 60_000)]
    pub gas_per_leg_units: u64,

    #[clap(long, env, action = clap::ArgAction::Set, default_value = "true")]
    pub multicall_enabled: bool,

    #[clap(long, env, default_value_t = deployments::MULTICALL)]
    pub multicall_address: Address,

    #[clap(long, env, default_value_t = 50)]
    pub multicall_max_batch: usize,

    #[clap(long, env, default_value = "3000", value_parser = duration_from_millis)]
    pub multicall_timeout_ms: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidConfig {
    #[error("at least one RPC endpoint must be configured")]
    NoEndpoints,
    #[error("the connector list must not be empty; its head is the wrapped native token")]
    EmptyConnectors,
    #[error("stable tokens must be a subset of the connectors")]
    StableNotConnector,
    #[error("the stable set must contain the canonical USD stablecoin")]
    MissingUsdStable,
    #[error("CPMM fees must lie in [0, {BPS}) basis points")]
    BadFee,
    #[error("max connector hops must be at most 3")]
    TooManyHops,
    #[error("split weights must lie strictly between 0 and {BPS} basis points")]
    BadSplitWeight,
}

/// Immutable engine configuration, validated once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub chain_id: u64,
    pub rpc: RpcConfig,
    pub venues: VenueConfig,
    pub tokens: TokenConfig,
    pub routing: RoutingConfig,
    pub cache: CacheConfig,
    pub evaluation: EvaluationConfig,
    pub split: SplitConfig,
    pub gas: GasConfig,
    pub multicall: MulticallConfig,
}

#[derive(Clone, Debug)]
pub struct RpcConfig {
    pub urls: Vec<Url>,
    pub stall_timeout: Duration,
    pub retry_count: u32,
    pub retry_delay: Duration,
    pub cooldown: Duration,
    pub rate_limit_cooldown: Duration,
}

#[derive(Clone, Debug)]
pub struct VenueConfig {
    pub v1_factory: Address,
    pub v2_factory: Address,
    pub v1_router: Address,
    pub v2_router: Address,
    pub stable_pool: Option<Address>,
    pub v1_fee_bps: u32,
    pub v2_fee_bps: u32,
}

impl VenueConfig {
    /// CPMM fee for the venue. Stable legs are priced on-chain and carry no
    /// local fee.
    pub fn fee_bps(&self, venue: Venue) -> u32 {
        match venue {
            Venue::CpmmV1 => self.v1_fee_bps,
            Venue::CpmmV2 => self.v2_fee_bps,
            Venue::Stable => 0,
        }
    }

    pub fn factory(&self, venue: Venue) -> Option<Address> {
        match venue {
            Venue::CpmmV1 => Some(self.v1_factory),
            Venue::CpmmV2 => Some(self.v2_factory),
            Venue::Stable => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TokenConfig {
    pub wrapped_native: Address,
    pub usd_stable: Address,
    pub connectors: Vec<Address>,
    pub stable_tokens: Vec<Address>,
}

impl TokenConfig {
    pub fn is_stable(&self, token: Address) -> bool {
        self.stable_tokens.contains(&token)
    }

    /// The connectors the direct fallback is allowed to pivot through.
    pub fn core_connectors(&self) -> &[Address] {
        &self.connectors[..self.connectors.len().min(3)]
    }
}

#[derive(Clone, Debug)]
pub struct RoutingConfig {
    pub max_connector_hops: usize,
    pub stable_routing_enabled: bool,
    pub stable_as_connector: bool,
    pub max_stable_pivots: usize,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub reserves_ttl: Duration,
    pub stable_index_ttl: Duration,
    pub price_ttl: Duration,
    pub price_negative_ttl: Duration,
}

#[derive(Clone, Debug)]
pub struct EvaluationConfig {
    pub timeout: Duration,
    pub concurrency: usize,
    pub max_routes: usize,
    pub total_budget: Duration,
}

#[derive(Clone, Debug)]
pub struct SplitConfig {
    pub enabled: bool,
    pub weights_bps: Vec<u32>,
    pub max_routes: usize,
    pub min_improvement_bps: u32,
    pub min_usd_value: f64,
}

#[derive(Clone, Debug)]
pub struct GasConfig {
    pub base_units: u64,
    pub per_leg_units: u64,
}

#[derive(Clone, Debug)]
pub struct MulticallConfig {
    pub enabled: bool,
    pub address: Address,
    pub max_batch_size: usize,
    pub timeout: Duration,
}

impl Config {
    pub fn from_arguments(args: Arguments) -> Result<Self, InvalidConfig> {
        if args.rpc_urls.is_empty() {
            return Err(InvalidConfig::NoEndpoints);
        }
        // The head of the connector list doubles as the wrapped native token.
        let Some(&wrapped_native) = args.connector_tokens.first() else {
            return Err(InvalidConfig::EmptyConnectors);
        };
        if !args
            .stable_tokens
            .iter()
            .all(|token| args.connector_tokens.contains(token))
        {
            return Err(InvalidConfig::StableNotConnector);
        }
        if !args.stable_tokens.contains(&args.usd_stable) {
            return Err(InvalidConfig::MissingUsdStable);
        }
        if args.cpmm_v1_fee_bps >= BPS || args.cpmm_v2_fee_bps >= BPS {
            return Err(InvalidConfig::BadFee);
        }
        if args.max_connector_hops > 3 {
            return Err(InvalidConfig::TooManyHops);
        }
        if args
            .split_weights_bps
            .iter()
            .any(|weight| *weight == 0 || *weight >= BPS)
        {
            return Err(InvalidConfig::BadSplitWeight);
        }

        Ok(Self {
            chain_id: args.chain_id,
            rpc: RpcConfig {
                urls: args.rpc_urls,
                stall_timeout: args.rpc_stall_timeout_ms,
                retry_count: args.rpc_retry_count,
                retry_delay: args.rpc_retry_delay_ms,
                cooldown: args.rpc_cooldown_ms,
                rate_limit_cooldown: args.rpc_rate_limit_cooldown_ms.unwrap_or_else(|| {
                    (args.rpc_cooldown_ms * 2).max(Duration::from_secs(60))
                }),
            },
            venues: VenueConfig {
                v1_factory: args.cpmm_v1_factory,
                v2_factory: args.cpmm_v2_factory,
                v1_router: args.cpmm_v1_router,
                v2_router: args.cpmm_v2_router,
                stable_pool: args.stable_pool,
                v1_fee_bps: args.cpmm_v1_fee_bps,
                v2_fee_bps: args.cpmm_v2_fee_bps,
            },
            tokens: TokenConfig {
                wrapped_native,
                usd_stable: args.usd_stable,
                connectors: args.connector_tokens,
                stable_tokens: args.stable_tokens,
            },
            routing: RoutingConfig {
                max_connector_hops: args.max_connector_hops,
                stable_routing_enabled: args.stable_routing_enabled
                    && args.stable_pool.is_some(),
                stable_as_connector: args.stable_as_connector,
                max_stable_pivots: args.max_stable_pivots,
            },
            cache: CacheConfig {
                reserves_ttl: args.reserves_cache_ttl_ms,
                stable_index_ttl: args.stable_index_ttl_ms,
                price_ttl: args.price_cache_ttl_ms,
                price_negative_ttl: Duration::from_secs(30),
            },
            evaluation: EvaluationConfig {
                timeout: args.quote_timeout_ms,
                concurrency: args.quote_concurrency.max(1),
                max_routes: args.quote_max_routes.max(1),
                total_budget: args.quote_total_timeout_ms,
            },
            split: SplitConfig {
                enabled: args.split_routes_enabled,
                weights_bps: args.split_weights_bps,
                max_routes: args.split_max_routes.max(2),
                min_improvement_bps: args.split_min_improvement_bps,
                min_usd_value: args.split_min_usd_value,
            },
            gas: GasConfig {
                base_units: args.gas_base_units,
                per_leg_units: args.gas_per_leg_units,
            },
            multicall: MulticallConfig {
                enabled: args.multicall_enabled,
                address: args.multicall_address,
                max_batch_size: args.multicall_max_batch,
                timeout: args.multicall_timeout_ms.min(args.quote_timeout_ms),
            },
        })
    }

    pub fn pool_config(&self) -> ethrpc::PoolConfig {
        ethrpc::PoolConfig {
            urls: self.rpc.urls.clone(),
            chain_id: self.chain_id,
            stall_timeout: self.rpc.stall_timeout,
            retry_count: self.rpc.retry_count,
            retry_delay: self.rpc.retry_delay,
            cooldown: self.rpc.cooldown,
            rate_limit_cooldown: self.rpc.rate_limit_cooldown,
        }
    }

    pub fn multicall_config(&self) -> ethrpc::multicall::Config {
        ethrpc::multicall::Config {
            enabled: self.multicall.enabled,
            address: self.multicall.address,
            max_batch_size: self.multicall.max_batch_size,
            timeout: self.multicall.timeout,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "chain={} endpoints={} hops={} stable_routing={} split={} max_routes={} \
             concurrency={} budget={:?}",
            self.chain_id,
            self.rpc.urls.len(),
            self.routing.max_connector_hops,
            self.routing.stable_routing_enabled,
            self.split.enabled,
            self.evaluation.max_routes,
            self.evaluation.concurrency,
            self.evaluation.total_budget,
        )
    }
}
