//! Quoting against the three-coin stable pool.
//!
//! The pool's coin set is discovered once and cached with a TTL; output
//! amounts come from the pool's own `get_dy` view so local math never drifts
//! from the contract.

use {
    alloy::primitives::{Address, U256},
    contracts::{IStableSwap, IStableSwapUint},
    std::{
        collections::HashMap,
        sync::Arc,
        time::{Duration, Instant},
    },
};

/// The pool holds exactly this many coins.
pub const STABLE_COIN_COUNT: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token is not part of the stable pool")]
    TokenUnsupported,
    #[error("stable coin discovery failed: {0}")]
    CoinDiscovery(String),
    #[error("stable pool quote failed (signed: {signed}; unsigned: {unsigned})")]
    Quote { signed: String, unsigned: String },
}

struct CachedMap {
    map: HashMap<Address, u8>,
    loaded_at: Instant,
}

pub struct StableQuoter {
    pool: Arc<ethrpc::Pool>,
    address: Address,
    ttl: Duration,
    cache: tokio::sync::RwLock<Option<CachedMap>>,
}

impl StableQuoter {
    pub fn new(pool: Arc<ethrpc::Pool>, address: Address, ttl: Duration) -> Self {
        Self {
            pool,
            address,
            ttl,
            cache: tokio::sync::RwLock::new(None),
        }
    }

    pub fn pool_address(&self) -> Address {
        self.address
    }

    /// The address → coin-index map, freshly loaded or from cache. When a
    /// refresh fails but a previous map exists, the stale map is served so
    /// an RPC blip does not take stable routing down.
    pub async fn index_map(&self) -> Result<HashMap<Address, u8>, Error> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.loaded_at.elapsed() < self.ttl {
                return Ok(cached.map.clone());
            }
        }
        match self.discover_coins().await {
            Ok(map) => {
                *self.cache.write().await = Some(CachedMap {
                    map: map.clone(),
                    loaded_at: Instant::now(),
                });
                Ok(map)
            }
            Err(err) => {
                if let Some(stale) = self.cache.read().await.as_ref() {
                    tracing::warn!(%err, "stable index refresh failed; serving stale map");
                    return Ok(stale.map.clone());
                }
                Err(err)
            }
        }
    }

    async fn discover_coins(&self) -> Result<HashMap<Address, u8>, Error> {
        let address = self.address;
        let mut map = HashMap::with_capacity(STABLE_COIN_COUNT);
        for index in 0..STABLE_COIN_COUNT {
            let coin_index = U256::from(index);
            let coin = self
                .pool
                .call(move |provider| async move {
                    Ok(IStableSwap::new(address, provider)
                        .coins(coin_index)
                        .call()
                        .await?)
                })
                .await
                .map_err(|err| Error::CoinDiscovery(err.to_string()))?;
            map.insert(coin, index as u8);
        }
        Ok(map)
    }

    /// Output amount for swapping coin `i` into coin `j`. Zero in, zero
    /// out; identical indices echo the input. Tries the signed `get_dy`
    /// signature first and falls back to the unsigned one.
    pub async fn quote_by_indices(&self, i: u8, j: u8, amount: U256) -> Result<U256, Error> {
        if amount.is_zero() {
            return Ok(U256::ZERO);
        }
        if i == j {
            return Ok(amount);
        }
        let address = self.address;
        let signed_i = i128::from(i);
        let signed_j = i128::from(j);
        let signed = self
            .pool
            .call(move |provider| async move {
                Ok(IStableSwap::new(address, provider)
                    .get_dy(signed_i, signed_j, amount)
                    .call()
                    .await?)
            })
            .await;
        let signed_err = match signed {
            Ok(dy) => return Ok(dy),
            Err(err) => err,
        };
        let (uint_i, uint_j) = (U256::from(i), U256::from(j));
        let unsigned = self
            .pool
            .call(move |provider| async move {
                Ok(IStableSwapUint::new(address, provider)
                    .get_dy(uint_i, uint_j, amount)
                    .call()
                    .await?)
            })
            .await;
        match unsigned {
            Ok(dy) => Ok(dy),
            Err(unsigned_err) => Err(Error::Quote {
                signed: signed_err.to_string(),
                unsigned: unsigned_err.to_string(),
            }),
        }
    }

    /// Like [`Self::quote_by_indices`] but resolving the coins through the
    /// index map first.
    pub async fn quote_by_addresses(
        &self,
        token_in: Address,
        token_out: Address,
        amount: U256,
    ) -> Result<U256, Error> {
        let map = self.index_map().await?;
        let i = *map.get(&token_in).ok_or(Error::TokenUnsupported)?;
        let j = *map.get(&token_out).ok_or(Error::TokenUnsupported)?;
        self.quote_by_indices(i, j, amount).await
    }
}
