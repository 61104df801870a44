pub mod price_feed;

use async_trait::async_trait;
use bnsl_types::PlanError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use thiserror::Error;

pub use price_feed::GoldPriceFeed;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price_per_gram: Decimal,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("insufficient price sources: {usable} usable, {required} required")]
    InsufficientSources { usable: usize, required: usize },
    #[error("source {source_name} failed: {reason}")]
    Source { source_name: String, reason: String },
    #[error("oracle offline: {0}")]
    Offline(String),
}

impl From<OracleError> for PlanError {
    fn from(err: OracleError) -> Self {
        PlanError::PriceUnavailable(err.to_string())
    }
}

/// Live gold spot price per gram. Implementations fail closed: no stale or
/// fallback price is ever returned in place of a fresh one.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn spot_price_per_gram(&self) -> Result<PriceQuote, OracleError>;
}

/// Manually driven oracle for tests and the simulator.
pub struct FixedPriceOracle {
    price: RwLock<Option<Decimal>>,
}

impl FixedPriceOracle {
    pub fn new(price_per_gram: Decimal) -> Self {
        Self {
            price: RwLock::new(Some(price_per_gram)),
        }
    }

    pub fn set_price(&self, price_per_gram: Decimal) {
        if let Ok(mut guard) = self.price.write() {
            *guard = Some(price_per_gram);
        }
    }

    /// Makes every subsequent query fail until a price is set again.
    pub fn go_offline(&self) {
        if let Ok(mut guard) = self.price.write() {
            *guard = None;
        }
    }
}

#[async_trait]
impl PriceOracle for FixedPriceOracle {
    async fn spot_price_per_gram(&self) -> Result<PriceQuote, OracleError> {
        let price = self
            .price
            .read()
            .map_err(|_| OracleError::Offline("price lock poisoned".to_string()))?
            .ok_or_else(|| OracleError::Offline("fixed oracle has no price".to_string()))?;
        Ok(PriceQuote {
            price_per_gram: price,
            timestamp: Utc::now(),
            source: "fixed".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn fixed_oracle_follows_updates() {
        let oracle = FixedPriceOracle::new(dec!(75));
        assert_eq!(oracle.spot_price_per_gram().await.unwrap().price_per_gram, dec!(75));

        oracle.set_price(dec!(80.5));
        assert_eq!(oracle.spot_price_per_gram().await.unwrap().price_per_gram, dec!(80.5));

        oracle.go_offline();
        let err: PlanError = oracle.spot_price_per_gram().await.unwrap_err().into();
        assert_eq!(err.code(), "price_unavailable");
    }
}
