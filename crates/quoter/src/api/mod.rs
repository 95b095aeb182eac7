//! Request and response model for the quoting engine.
//!
//! The HTTP layer owns transport, validation errors and serialization of
//! failures; this module owns the translation between wire shapes and the
//! engine's domain, including native-token aliasing and slippage handling.

use {
    crate::{
        config::Config,
        domain::{BPS, QuoteOutcome},
        quote,
    },
    alloy::primitives::{Address, Bytes, U256},
    serde::{Deserialize, Serialize},
};

/// Quotes are valid for ten minutes after issuance.
pub const DEADLINE_SECS: u64 = 600;

/// Default allowed slippage in percent.
pub const DEFAULT_SLIPPAGE_PCT: f64 = 0.5;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    /// Token address, or `"native"` / `"0x0"` / the zero address for the
    /// chain's native token.
    pub token_in: String,
    pub token_out: String,
    /// Exact input amount in base units, as a decimal string.
    pub amount_in: String,
    /// Allowed slippage percentage, clamped to `[0, 100]`.
    #[serde(default)]
    pub allowed_slippage: Option<f64>,
    /// Recipient of the swap output; defaults to the configured router.
    #[serde(default)]
    pub account: Option<Address>,
}

/// A traded token after native normalisation. Routing always uses the
/// wrapped address; the response echoes the zero address for native.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TradedToken {
    pub wrapped: Address,
    pub is_native: bool,
}

impl TradedToken {
    /// The address echoed back to the caller.
    pub fn display_address(&self) -> Address {
        if self.is_native {
            Address::ZERO
        } else {
            self.wrapped
        }
    }
}

#[derive(Clone, Debug)]
pub struct ParsedRequest {
    pub token_in: TradedToken,
    pub token_out: TradedToken,
    pub amount_in: U256,
    pub slippage_bps: u32,
    pub recipient: Address,
}

impl QuoteRequest {
    pub fn parse(&self, config: &Config) -> Result<ParsedRequest, quote::Error> {
        let token_in = parse_token(&self.token_in, config)?;
        let token_out = parse_token(&self.token_out, config)?;
        let amount_in = self
            .amount_in
            .trim()
            .parse::<U256>()
            .map_err(|_| quote::Error::AmountNonPositive)?;
        if amount_in.is_zero() {
            return Err(quote::Error::AmountNonPositive);
        }
        let percent = self
            .allowed_slippage
            .unwrap_or(DEFAULT_SLIPPAGE_PCT)
            .clamp(0.0, 100.0);
        let slippage_bps = (percent * 100.0).round() as u32;
        Ok(ParsedRequest {
            token_in,
            token_out,
            amount_in,
            slippage_bps,
            recipient: self.account.unwrap_or(config.venues.v2_router),
        })
    }
}

fn parse_token(raw: &str, config: &Config) -> Result<TradedToken, quote::Error> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("native") || trimmed == "0x0" {
        return Ok(TradedToken {
            wrapped: config.tokens.wrapped_native,
            is_native: true,
        });
    }
    let address: Address = trimmed.parse().map_err(|_| quote::Error::InvalidToken)?;
    if address == Address::ZERO {
        return Ok(TradedToken {
            wrapped: config.tokens.wrapped_native,
            is_native: true,
        });
    }
    // An explicit wrapped-native address is treated as the ERC-20 it is;
    // only the aliases above mark the trade as native.
    Ok(TradedToken {
        wrapped: address,
        is_native: false,
    })
}

/// Produces execution calldata for the aggregation router. The schema is
/// fixed by the router contract; the engine treats the bytes as opaque.
pub trait SwapEncoder: Send + Sync {
    fn encode(&self, params: &EncodeParams<'_>) -> Bytes;
}

pub struct EncodeParams<'a> {
    pub outcome: &'a QuoteOutcome,
    pub min_amount_out: U256,
    pub deadline: u64,
    pub recipient: Address,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub calldata: Bytes,
    pub token_in_address: Address,
    pub token_out_address: Address,
    pub amount_in: String,
    pub min_amount_out: String,
    pub output_amount: String,
    /// Unix seconds.
    pub deadline: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_amount_estimated: Option<u64>,
    #[serde(rename = "gasUSDEstimated", skip_serializing_if = "Option::is_none")]
    pub gas_usd_estimated: Option<f64>,
    pub route: Vec<SwapGroup>,
}

/// One executed path with its percentage share of the input.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapGroup {
    pub percent: f64,
    pub legs: Vec<LegDescriptor>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegDescriptor {
    pub token_in: Address,
    pub token_out: Address,
    pub pool: Address,
    pub exchange: &'static str,
}

impl QuoteResponse {
    pub fn build(
        request: &ParsedRequest,
        outcome: &QuoteOutcome,
        encoder: &dyn SwapEncoder,
        issued_at_unix: u64,
    ) -> Self {
        let min_amount_out = outcome.total_amount_out
            * U256::from(BPS - request.slippage_bps.min(BPS))
            / U256::from(BPS);
        let deadline = issued_at_unix + DEADLINE_SECS;
        let calldata = encoder.encode(&EncodeParams {
            outcome,
            min_amount_out,
            deadline,
            recipient: request.recipient,
        });
        let route = outcome
            .routing
            .portions()
            .iter()
            .map(|portion| SwapGroup {
                percent: f64::from(portion.share_bps) / 100.0,
                legs: portion
                    .legs
                    .iter()
                    .map(|leg| LegDescriptor {
                        token_in: leg.token_in,
                        token_out: leg.token_out,
                        pool: leg.pool,
                        exchange: leg.venue.exchange_name(),
                    })
                    .collect(),
            })
            .collect();
        Self {
            calldata,
            token_in_address: request.token_in.display_address(),
            token_out_address: request.token_out.display_address(),
            amount_in: outcome.amount_in.to_string(),
            min_amount_out: min_amount_out.to_string(),
            output_amount: outcome.total_amount_out.to_string(),
            deadline,
            gas_amount_estimated: outcome.gas.map(|gas| gas.units),
            gas_usd_estimated: outcome.gas.map(|gas| gas.cost_usd),
            route,
        }
    }
}

/// Current time in unix seconds for response stamping.
pub fn now_unix() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            domain::{GasEstimate, LegSummary, RoutePortion, Routing, Venue},
            routing,
            test_util::{TOKEN, USDC, WPLS, config},
        },
        alloy::primitives::address,
    };

    fn request(token_in: &str, token_out: &str, amount: &str) -> QuoteRequest {
        QuoteRequest {
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in: amount.to_string(),
            allowed_slippage: None,
            account: None,
        }
    }

    struct FixedEncoder;

    impl SwapEncoder for FixedEncoder {
        fn encode(&self, _: &EncodeParams<'_>) -> Bytes {
            Bytes::from(vec![0xde, 0xad])
        }
    }

    fn outcome(total_out: u64) -> QuoteOutcome {
        QuoteOutcome {
            token_in: WPLS,
            token_out: USDC,
            amount_in: U256::from(1_000_000u64),
            total_amount_out: U256::from(total_out),
            routing: Routing::Single(RoutePortion {
                share_bps: BPS,
                amount_in: U256::from(1_000_000u64),
                amount_out: U256::from(total_out),
                legs: vec![LegSummary {
                    venue: Venue::CpmmV2,
                    token_in: WPLS,
                    token_out: USDC,
                    pool: address!("0x00000000000000000000000000000000000000f1"),
                    data: Bytes::new(),
                }],
            }),
            router: address!("0x0000000000000000000000000000000000000004"),
            gas: Some(GasEstimate {
                units: 160_000,
                cost_native: U256::from(1u64),
                cost_usd: 0.01,
            }),
        }
    }

    #[test]
    fn native_aliases_normalise_identically() {
        let config = config(1, false);
        let wpls = format!("{WPLS:?}");
        let aliases = ["native", "NATIVE", "0x0", "0x0000000000000000000000000000000000000000"];
        let baseline = request(&wpls, "0x0000000000000000000000000000000000000066", "100")
            .parse(&config)
            .unwrap();
        let base_candidates: Vec<String> =
            routing::enumerate(baseline.token_in.wrapped, TOKEN, &config, None)
                .iter()
                .map(|c| c.id())
                .collect();
        for alias in aliases {
            let parsed = request(alias, "0x0000000000000000000000000000000000000066", "100")
                .parse(&config)
                .unwrap();
            assert_eq!(parsed.token_in.wrapped, WPLS);
            let candidates: Vec<String> =
                routing::enumerate(parsed.token_in.wrapped, TOKEN, &config, None)
                    .iter()
                    .map(|c| c.id())
                    .collect();
            assert_eq!(candidates, base_candidates, "{alias}");
        }
    }

    #[test]
    fn native_request_echoes_zero_address() {
        let config = config(1, false);
        let parsed = request("native", "0x0000000000000000000000000000000000000066", "100")
            .parse(&config)
            .unwrap();
        assert!(parsed.token_in.is_native);
        assert_eq!(parsed.token_in.display_address(), Address::ZERO);
        assert_eq!(parsed.token_in.wrapped, WPLS);
    }

    #[test]
    fn amount_must_be_positive() {
        let config = config(1, false);
        for amount in ["0", "", "-5", "abc"] {
            let result =
                request("native", "0x0000000000000000000000000000000000000066", amount)
                    .parse(&config);
            assert!(
                matches!(result, Err(quote::Error::AmountNonPositive)),
                "{amount}",
            );
        }
    }

    #[test]
    fn slippage_is_clamped_and_defaulted() {
        let config = config(1, false);
        let mut req = request("native", "0x0000000000000000000000000000000000000066", "100");
        assert_eq!(req.parse(&config).unwrap().slippage_bps, 50);

        req.allowed_slippage = Some(250.0);
        assert_eq!(req.parse(&config).unwrap().slippage_bps, 10_000);

        req.allowed_slippage = Some(-3.0);
        assert_eq!(req.parse(&config).unwrap().slippage_bps, 0);

        req.allowed_slippage = Some(1.25);
        assert_eq!(req.parse(&config).unwrap().slippage_bps, 125);
    }

    #[test]
    fn response_invariants() {
        let config = config(1, false);
        let parsed = request("native", "0x0000000000000000000000000000000000000066", "1000000")
            .parse(&config)
            .unwrap();
        let outcome = outcome(2_000_000);
        let issued_at = 1_700_000_000;
        let response = QuoteResponse::build(&parsed, &outcome, &FixedEncoder, issued_at);

        assert_eq!(response.deadline, issued_at + DEADLINE_SECS);
        let min: U256 = response.min_amount_out.parse().unwrap();
        let out: U256 = response.output_amount.parse().unwrap();
        assert!(min <= out);
        // 0.5% default slippage.
        assert_eq!(min, U256::from(2_000_000u64 * 9_950 / 10_000));
        assert_eq!(response.token_in_address, Address::ZERO);
        assert_eq!(response.route.len(), 1);
        assert_eq!(response.route[0].percent, 100.0);
        assert_eq!(response.route[0].legs[0].exchange, "PulseX V2");
        assert_eq!(response.gas_amount_estimated, Some(160_000));
    }

    #[test]
    fn split_shares_render_as_percentages() {
        let config = config(1, false);
        let parsed = request("native", "0x0000000000000000000000000000000000000066", "1000000")
            .parse(&config)
            .unwrap();
        let mut outcome = outcome(2_000_000);
        let portion = RoutePortion {
            share_bps: 4_000,
            amount_in: U256::from(400_000u64),
            amount_out: U256::from(800_000u64),
            legs: vec![],
        };
        let other = RoutePortion {
            share_bps: 6_000,
            amount_in: U256::from(600_000u64),
            amount_out: U256::from(1_200_000u64),
            legs: vec![],
        };
        outcome.routing = Routing::Split(vec![portion, other]);
        let response = QuoteResponse::build(&parsed, &outcome, &FixedEncoder, 0);
        let percents: Vec<f64> = response.route.iter().map(|g| g.percent).collect();
        assert_eq!(percents, vec![40.0, 60.0]);
        let shares: u32 = outcome
            .routing
            .portions()
            .iter()
            .map(|p| p.share_bps)
            .sum();
        assert_eq!(shares, BPS);
    }

    #[test]
    fn response_serializes_camel_case() {
        let config = config(1, false);
        let parsed = request("native", "0x0000000000000000000000000000000000000066", "1000000")
            .parse(&config)
            .unwrap();
        let response = QuoteResponse::build(&parsed, &outcome(2_000_000), &FixedEncoder, 0);
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("minAmountOut").is_some());
        assert!(json.get("tokenInAddress").is_some());
        assert!(json.get("gasUSDEstimated").is_some());
        assert_eq!(json["calldata"], serde_json::json!("0xdead"));
    }
}
