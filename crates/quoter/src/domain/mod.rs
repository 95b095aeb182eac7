//! Core domain types: venues, route candidates and quote outcomes.

pub mod cpmm;
pub mod ranking;

use alloy::primitives::{Address, Bytes, U256};

/// One basis point is 1/10000.
pub const BPS: u32 = 10_000;

/// Liquidity venue for a single swap leg. A tagged sum; the simulator
/// switches on it and the fee table keys on it.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Venue {
    CpmmV1,
    CpmmV2,
    Stable,
}

impl Venue {
    pub fn is_cpmm(self) -> bool {
        !matches!(self, Self::Stable)
    }

    /// Short tag used in route ids and cache keys. Stable across runs.
    pub fn tag(self) -> &'static str {
        match self {
            Self::CpmmV1 => "v1",
            Self::CpmmV2 => "v2",
            Self::Stable => "stable",
        }
    }

    /// Display name for the response.
    pub fn exchange_name(self) -> &'static str {
        match self {
            Self::CpmmV1 => "PulseX V1",
            Self::CpmmV2 => "PulseX V2",
            Self::Stable => "StableSwap",
        }
    }
}

/// Canonical lowercase form of an address, used for ids and cache keys.
/// Display elsewhere uses the EIP-55 checksum form.
pub fn lower(address: Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

/// Packs the two stable-pool coin indices into opaque leg data.
pub fn pack_stable_indices(i: u8, j: u8) -> Bytes {
    Bytes::copy_from_slice(&[i, j])
}

pub fn unpack_stable_indices(data: &Bytes) -> Option<(u8, u8)> {
    (data.len() == 2).then(|| (data[0], data[1]))
}

/// One swap step on one venue.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteLeg {
    pub venue: Venue,
    pub token_in: Address,
    pub token_out: Address,
    /// Pool address when known at enumeration time (stable legs).
    pub pool: Option<Address>,
    /// Venue-specific opaque data; stable legs carry packed coin indices.
    pub data: Bytes,
}

impl RouteLeg {
    pub fn cpmm(venue: Venue, token_in: Address, token_out: Address) -> Self {
        Self {
            venue,
            token_in,
            token_out,
            pool: None,
            data: Bytes::new(),
        }
    }

    pub fn stable(
        token_in: Address,
        token_out: Address,
        pool: Address,
        indices: Option<(u8, u8)>,
    ) -> Self {
        Self {
            venue: Venue::Stable,
            token_in,
            token_out,
            pool: Some(pool),
            data: indices
                .map(|(i, j)| pack_stable_indices(i, j))
                .unwrap_or_default(),
        }
    }
}

/// An ordered sequence of legs from the input token to the output token.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteCandidate {
    pub legs: Vec<RouteLeg>,
    /// The token sequence the candidate was expanded from.
    pub node_path: Vec<Address>,
}

impl RouteCandidate {
    pub fn new(legs: Vec<RouteLeg>, node_path: Vec<Address>) -> Self {
        Self { legs, node_path }
    }

    /// Derived identity: a pure, order-sensitive function of the legs.
    /// Candidates with equal ids are the same route.
    pub fn id(&self) -> String {
        self.legs
            .iter()
            .map(|leg| {
                format!(
                    "{}:{}->{}",
                    leg.venue.tag(),
                    lower(leg.token_in),
                    lower(leg.token_out),
                )
            })
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Number of connector hops, i.e. intermediate nodes.
    pub fn hops(&self) -> usize {
        self.node_path.len().saturating_sub(2)
    }

    pub fn stable_leg_count(&self) -> usize {
        self.legs
            .iter()
            .filter(|leg| leg.venue == Venue::Stable)
            .count()
    }
}

/// A leg after simulation, with the pool resolved.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LegSummary {
    pub venue: Venue,
    pub token_in: Address,
    pub token_out: Address,
    pub pool: Address,
    pub data: Bytes,
}

/// A candidate together with its simulated outcome.
#[derive(Clone, Debug)]
pub struct SimulatedRoute {
    pub candidate: RouteCandidate,
    pub amount_out: U256,
    pub legs: Vec<LegSummary>,
}

/// One executed path of the final quote. A single-route quote has one
/// portion with the full share; a split quote has two whose shares sum to
/// [`BPS`] and whose inputs sum to the request amount.
#[derive(Clone, Debug)]
pub struct RoutePortion {
    pub share_bps: u32,
    pub amount_in: U256,
    pub amount_out: U256,
    pub legs: Vec<LegSummary>,
}

#[derive(Clone, Debug)]
pub enum Routing {
    Single(RoutePortion),
    Split(Vec<RoutePortion>),
}

impl Routing {
    pub fn portions(&self) -> &[RoutePortion] {
        match self {
            Self::Single(portion) => std::slice::from_ref(portion),
            Self::Split(portions) => portions,
        }
    }

    pub fn leg_count(&self) -> usize {
        self.portions().iter().map(|p| p.legs.len()).sum()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GasEstimate {
    pub units: u64,
    /// Total cost in native wei.
    pub cost_native: U256,
    pub cost_usd: f64,
}

/// The engine's answer for one request, before response encoding.
#[derive(Clone, Debug)]
pub struct QuoteOutcome {
    /// Wrapped (routable) form of the traded tokens.
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub total_amount_out: U256,
    pub routing: Routing,
    /// The router the execution descriptor targets.
    pub router: Address,
    /// Absent when estimation failed; the quote is still valid.
    pub gas: Option<GasEstimate>,
}
