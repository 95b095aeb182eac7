//! Candidate route enumeration.
//!
//! Node paths are generated by DFS over the configured connector tokens and
//! expanded into per-venue leg sequences; stable-pool pivot variants are
//! added for trades touching the stable set.

pub mod simulate;

use {
    crate::{
        config::Config,
        domain::{RouteCandidate, RouteLeg, Venue},
    },
    alloy::primitives::Address,
    itertools::Itertools,
    std::collections::{HashMap, HashSet},
};

/// Bound on CPMM expansions attached to a stable pivot leg.
const MAX_STABLE_CONNECTOR_ROUTE_OPTIONS: usize = 4;

/// Enumerates all deduplicated route candidates for a trade.
pub fn enumerate(
    token_in: Address,
    token_out: Address,
    config: &Config,
    stable_indices: Option<&HashMap<Address, u8>>,
) -> Vec<RouteCandidate> {
    if token_in == token_out {
        return Vec::new();
    }
    let stable_legs_enabled =
        config.routing.stable_routing_enabled && config.venues.stable_pool.is_some();

    let mut candidates = Vec::new();
    let mut ids = HashSet::new();
    let mut push = |candidate: RouteCandidate, out: &mut Vec<RouteCandidate>| {
        if ids.insert(candidate.id()) {
            out.push(candidate);
        }
    };

    for path in node_paths(
        token_in,
        token_out,
        &config.tokens.connectors,
        config.routing.max_connector_hops,
        &[],
    ) {
        for candidate in expand(&path, config, stable_legs_enabled, stable_indices) {
            push(candidate, &mut candidates);
        }
    }

    // Stable pivot variants require a discovered coin set.
    let pivots_enabled =
        stable_legs_enabled && stable_indices.is_some_and(|map| !map.is_empty());
    if pivots_enabled {
        for candidate in stable_pivot_candidates(token_in, token_out, config, stable_indices) {
            push(candidate, &mut candidates);
        }
    }
    candidates
}

/// All token sequences `token_in → c₁ … cₖ → token_out` with at most
/// `max_hops` connectors, no repeated tokens, and no connector equal to
/// either endpoint.
fn node_paths(
    token_in: Address,
    token_out: Address,
    connectors: &[Address],
    max_hops: usize,
    exclude: &[Address],
) -> Vec<Vec<Address>> {
    let connectors: Vec<Address> = connectors
        .iter()
        .copied()
        .filter(|c| *c != token_in && *c != token_out && !exclude.contains(c))
        .collect();
    let mut paths = Vec::new();
    let mut current = vec![token_in];
    dfs(&mut current, &connectors, token_out, max_hops, &mut paths);
    paths
}

fn dfs(
    current: &mut Vec<Address>,
    connectors: &[Address],
    token_out: Address,
    hops_left: usize,
    paths: &mut Vec<Vec<Address>>,
) {
    let mut complete = current.clone();
    complete.push(token_out);
    paths.push(complete);
    if hops_left == 0 {
        return;
    }
    for &connector in connectors {
        if current.contains(&connector) {
            continue;
        }
        current.push(connector);
        dfs(current, connectors, token_out, hops_left - 1, paths);
        current.pop();
    }
}

/// Cartesian product of per-hop venue options.
fn expand(
    path: &[Address],
    config: &Config,
    stable_legs_enabled: bool,
    stable_indices: Option<&HashMap<Address, u8>>,
) -> Vec<RouteCandidate> {
    let per_pair: Vec<Vec<RouteLeg>> = path
        .windows(2)
        .map(|pair| leg_options(pair[0], pair[1], config, stable_legs_enabled, stable_indices))
        .collect();
    per_pair
        .into_iter()
        .multi_cartesian_product()
        .map(|legs| RouteCandidate::new(legs, path.to_vec()))
        .collect()
}

fn leg_options(
    token_in: Address,
    token_out: Address,
    config: &Config,
    stable_legs_enabled: bool,
    stable_indices: Option<&HashMap<Address, u8>>,
) -> Vec<RouteLeg> {
    let mut options = vec![
        RouteLeg::cpmm(Venue::CpmmV1, token_in, token_out),
        RouteLeg::cpmm(Venue::CpmmV2, token_in, token_out),
    ];
    if stable_legs_enabled
        && config.tokens.is_stable(token_in)
        && config.tokens.is_stable(token_out)
    {
        if let Some(pool) = config.venues.stable_pool {
            options.push(stable_leg(token_in, token_out, pool, stable_indices));
        }
    }
    options
}

fn stable_leg(
    token_in: Address,
    token_out: Address,
    pool: Address,
    stable_indices: Option<&HashMap<Address, u8>>,
) -> RouteLeg {
    let indices = stable_indices
        .and_then(|map| Some((*map.get(&token_in)?, *map.get(&token_out)?)));
    RouteLeg::stable(token_in, token_out, pool, indices)
}

/// Routes that bridge across the stable pool: a single stable leg when both
/// endpoints are stable, or a stable pivot plus CPMM expansions when exactly
/// one endpoint is.
fn stable_pivot_candidates(
    token_in: Address,
    token_out: Address,
    config: &Config,
    stable_indices: Option<&HashMap<Address, u8>>,
) -> Vec<RouteCandidate> {
    let Some(pool) = config.venues.stable_pool else {
        return Vec::new();
    };
    let in_stable = config.tokens.is_stable(token_in);
    let out_stable = config.tokens.is_stable(token_out);
    let mut candidates = Vec::new();

    if in_stable && out_stable {
        candidates.push(RouteCandidate::new(
            vec![stable_leg(token_in, token_out, pool, stable_indices)],
            vec![token_in, token_out],
        ));
        return candidates;
    }
    if in_stable == out_stable || !config.routing.stable_as_connector {
        return candidates;
    }

    let stable_endpoint = if in_stable { token_in } else { token_out };
    let pivots: Vec<Address> = config
        .tokens
        .stable_tokens
        .iter()
        .copied()
        .filter(|pivot| {
            *pivot != stable_endpoint
                && *pivot != token_in
                && *pivot != token_out
                && stable_indices.is_some_and(|map| map.contains_key(pivot))
        })
        .take(config.routing.max_stable_pivots)
        .collect();

    for pivot in pivots {
        if in_stable {
            let head = stable_leg(token_in, pivot, pool, stable_indices);
            for tail in cpmm_expansions(pivot, token_out, config, &[token_in]) {
                let mut legs = vec![head.clone()];
                legs.extend(tail.legs);
                let mut node_path = vec![token_in];
                node_path.extend(tail.node_path);
                candidates.push(RouteCandidate::new(legs, node_path));
            }
        } else {
            let tail = stable_leg(pivot, token_out, pool, stable_indices);
            for head in cpmm_expansions(token_in, pivot, config, &[token_out]) {
                let mut legs = head.legs;
                legs.push(tail.clone());
                let mut node_path = head.node_path;
                node_path.push(token_out);
                candidates.push(RouteCandidate::new(legs, node_path));
            }
        }
    }
    candidates
}

/// CPMM-only candidates for one side of a stable pivot, shortest and
/// lexicographically smallest first, truncated to the expansion bound.
fn cpmm_expansions(
    token_in: Address,
    token_out: Address,
    config: &Config,
    exclude: &[Address],
) -> Vec<RouteCandidate> {
    let mut expansions: Vec<RouteCandidate> = node_paths(
        token_in,
        token_out,
        &config.tokens.connectors,
        config.routing.max_connector_hops,
        exclude,
    )
    .iter()
    .flat_map(|path| expand(path, config, false, None))
    .collect();
    expansions.sort_by(|a, b| {
        a.legs
            .len()
            .cmp(&b.legs.len())
            .then_with(|| a.id().cmp(&b.id()))
    });
    expansions.truncate(MAX_STABLE_CONNECTOR_ROUTE_OPTIONS);
    expansions
}
