//! Shared fixtures for unit tests.

use {
    crate::config::{
        CacheConfig, Config, EvaluationConfig, GasConfig, MulticallConfig, RoutingConfig,
        RpcConfig, SplitConfig, TokenConfig, VenueConfig,
    },
    alloy::primitives::{Address, address},
    std::time::Duration,
};

pub(crate) const WPLS: Address = address!("0x0000000000000000000000000000000000000011");
pub(crate) const PLSX: Address = address!("0x0000000000000000000000000000000000000022");
pub(crate) const USDC: Address = address!("0x0000000000000000000000000000000000000033");
pub(crate) const USDT: Address = address!("0x0000000000000000000000000000000000000044");
pub(crate) const DAI: Address = address!("0x0000000000000000000000000000000000000055");
pub(crate) const TOKEN: Address = address!("0x0000000000000000000000000000000000000066");
pub(crate) const STABLE_POOL: Address = address!("0x0000000000000000000000000000000000000077");

pub(crate) fn config(max_hops: usize, stable_routing: bool) -> Config {
    Config {
        chain_id: 369,
        rpc: RpcConfig {
            urls: vec![],
            stall_timeout: Duration::from_millis(1_200),
            retry_count: 2,
            retry_delay: Duration::from_millis(200),
            cooldown: Duration::from_secs(30),
            rate_limit_cooldown: Duration::from_secs(60),
        },
        venues: VenueConfig {
            v1_factory: address!("0x0000000000000000000000000000000000000001"),
            v2_factory: address!("0x0000000000000000000000000000000000000002"),
            v1_router: address!("0x0000000000000000000000000000000000000003"),
            v2_router: address!("0x0000000000000000000000000000000000000004"),
            stable_pool: stable_routing.then_some(STABLE_POOL),
            v1_fee_bps: 29,
            v2_fee_bps: 29,
        },
        tokens: TokenConfig {
            wrapped_native: WPLS,
            usd_stable: USDC,
            connectors: vec![WPLS, PLSX, USDC, USDT, DAI],
            stable_tokens: vec![USDC, USDT, DAI],
        },
        routing: RoutingConfig {
            max_connector_hops: max_hops,
            stable_routing_enabled: stable_routing,
            stable_as_connector: true,
            max_stable_pivots: 2,
        },
        cache: CacheConfig {
            reserves_ttl: Duration::from_secs(15),
            stable_index_ttl: Duration::from_secs(300),
            price_ttl: Duration::from_secs(15),
            price_negative_ttl: Duration::from_secs(30),
        },
        evaluation: EvaluationConfig {
            timeout: Duration::from_secs(3),
            concurrency: 6,
            max_routes: 40,
            total_budget: Duration::from_secs(6),
        },
        split: SplitConfig {
            enabled: true,
            weights_bps: vec![5_000],
            max_routes: 3,
            min_improvement_bps: 0,
            min_usd_value: 0.0,
        },
        gas: GasConfig {
            base_units: 100_000,
            per_leg_units: 60_000,
        },
        multicall: MulticallConfig {
            enabled: false,
            address: Address::ZERO,
            max_batch_size: 50,
            timeout: Duration::from_secs(3),
        },
    }
}
