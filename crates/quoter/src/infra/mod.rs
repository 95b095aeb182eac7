//! Chain-facing infrastructure: reserve loading, stable-pool quoting and the
//! price oracle.

pub mod oracle;
pub mod reserves;
pub mod stable;

use {
    alloy::primitives::{Address, U256},
    alloy::sol_types::SolCall,
    contracts::IPulseXPair,
    ethrpc::multicall::{Call, Multicall},
    std::{future::Future, time::Duration},
};

/// Timeout outcome as a value instead of an error, so a timed-out step can
/// reject a route without rejecting the quote.
pub enum Timed<T> {
    Value(T),
    TimedOut,
}

pub async fn with_timeout<F: Future>(limit: Duration, future: F) -> Timed<F::Output> {
    match tokio::time::timeout(limit, future).await {
        Ok(value) => Timed::Value(value),
        Err(_) => Timed::TimedOut,
    }
}

/// A pair's canonical tokens and raw reserves, in `token0`/`token1` order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PairState {
    pub token0: Address,
    pub token1: Address,
    pub reserve0: U256,
    pub reserve1: U256,
}

/// Loads a pair snapshot, preferring one multicall batch and falling back to
/// three individual reads when the batch fails or decodes badly.
pub(crate) async fn fetch_pair_state(
    pool: &ethrpc::Pool,
    multicall: Option<&Multicall>,
    pair: Address,
) -> anyhow::Result<PairState> {
    if let Some(multicall) = multicall {
        match batched_pair_state(multicall, pair).await {
            Ok(state) => return Ok(state),
            Err(err) => {
                tracing::debug!(?err, "pair multicall failed; reading individually");
            }
        }
    }
    individual_pair_state(pool, pair).await
}

async fn batched_pair_state(multicall: &Multicall, pair: Address) -> anyhow::Result<PairState> {
    let calls = [
        Call {
            target: pair,
            call_data: IPulseXPair::token0Call {}.abi_encode().into(),
        },
        Call {
            target: pair,
            call_data: IPulseXPair::token1Call {}.abi_encode().into(),
        },
        Call {
            target: pair,
            call_data: IPulseXPair::getReservesCall {}.abi_encode().into(),
        },
    ];
    let results = multicall.execute(&calls).await?;
    let [token0, token1, reserves] = results.as_slice() else {
        anyhow::bail!("unexpected multicall payload size");
    };
    if !(token0.success && token1.success && reserves.success) {
        anyhow::bail!("pair call reverted inside multicall");
    }
    let token0 = IPulseXPair::token0Call::abi_decode_returns(&token0.return_data)?;
    let token1 = IPulseXPair::token1Call::abi_decode_returns(&token1.return_data)?;
    let reserves = IPulseXPair::getReservesCall::abi_decode_returns(&reserves.return_data)?;
    Ok(PairState {
        token0,
        token1,
        reserve0: reserves.reserve0.to::<U256>(),
        reserve1: reserves.reserve1.to::<U256>(),
    })
}

async fn individual_pair_state(pool: &ethrpc::Pool, pair: Address) -> anyhow::Result<PairState> {
    let token0 = pool.call(move |provider| async move {
        Ok(IPulseXPair::new(pair, provider).token0().call().await?)
    });
    let token1 = pool.call(move |provider| async move {
        Ok(IPulseXPair::new(pair, provider).token1().call().await?)
    });
    let reserves = pool.call(move |provider| async move {
        Ok(IPulseXPair::new(pair, provider).getReserves().call().await?)
    });
    let (token0, token1, reserves) = futures::try_join!(token0, token1, reserves)?;
    Ok(PairState {
        token0,
        token1,
        reserve0: reserves.reserve0.to::<U256>(),
        reserve1: reserves.reserve1.to::<U256>(),
    })
}
