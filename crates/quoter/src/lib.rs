//! DEX aggregation quoting engine for PulseChain.
//!
//! Given an exact-input swap request the engine enumerates candidate trade
//! paths across PulseX V1, PulseX V2 and the three-coin stable pool,
//! simulates them against on-chain reserves, optionally splits the input
//! across two paths, and returns the best route together with a compact
//! execution descriptor.
//!
//! The engine only reads chain state. Request parsing, HTTP transport and
//! calldata encoding live with the caller; the seams are
//! [`api::QuoteRequest`], [`api::QuoteResponse`] and [`api::SwapEncoder`].

pub mod api;
pub mod config;
pub mod domain;
pub mod infra;
pub mod quote;
pub mod routing;

#[cfg(test)]
pub(crate) mod test_util;

pub use {
    config::{Arguments, Config},
    quote::Quoter,
};
