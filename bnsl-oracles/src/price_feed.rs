//! Multi-source gold spot feed.
//!
//! Every configured HTTP source is queried, quotes are normalised to USD per
//! gram, outliers beyond the configured deviation from the median are dropped
//! and the median of the survivors is returned. Too few survivors is an error.

use crate::{OracleError, PriceOracle, PriceQuote};
use async_trait::async_trait;
use bnsl_config::{OracleConfig, PriceSourceConfig, PriceUnit};
use chrono::Utc;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const GRAMS_PER_TROY_OUNCE: Decimal = dec!(31.1034768);

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSample {
    pub source: String,
    pub price_per_gram: Decimal,
}

pub struct GoldPriceFeed {
    client: Client,
    sources: Vec<PriceSourceConfig>,
    min_sources: usize,
    max_deviation_percent: Decimal,
}

impl GoldPriceFeed {
    pub fn new(config: &OracleConfig) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Offline(format!("http client: {e}")))?;
        Ok(Self {
            client,
            sources: config.sources.clone(),
            min_sources: config.min_sources,
            max_deviation_percent: config.max_deviation_percent,
        })
    }

    async fn fetch_source(&self, source: &PriceSourceConfig) -> Result<SourceSample, OracleError> {
        let fail = |reason: String| OracleError::Source {
            source_name: source.name.clone(),
            reason,
        };
        let body: Value = self
            .client
            .get(&source.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fail(e.to_string()))?
            .json()
            .await
            .map_err(|e| fail(e.to_string()))?;
        let price_per_gram = extract_price(&body, &source.pointer, source.unit).map_err(fail)?;
        Ok(SourceSample {
            source: source.name.clone(),
            price_per_gram,
        })
    }
}

#[async_trait]
impl PriceOracle for GoldPriceFeed {
    async fn spot_price_per_gram(&self) -> Result<PriceQuote, OracleError> {
        let mut samples = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match self.fetch_source(source).await {
                Ok(sample) => {
                    debug!(source = %sample.source, price = %sample.price_per_gram, "gold quote");
                    samples.push(sample);
                }
                Err(e) => warn!("Gold price source unavailable: {}", e),
            }
        }
        aggregate(&samples, self.min_sources, self.max_deviation_percent)
    }
}

/// Reads the quote at `pointer` and converts it to USD per gram.
pub fn extract_price(body: &Value, pointer: &str, unit: PriceUnit) -> Result<Decimal, String> {
    let raw = body
        .pointer(pointer)
        .ok_or_else(|| format!("no value at {pointer}"))?;
    let price = match raw {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map_err(|e| format!("unparseable price {text}: {e}"))?
        }
        Value::String(s) => Decimal::from_str(s.trim()).map_err(|e| format!("unparseable price {s:?}: {e}"))?,
        other => return Err(format!("price at {pointer} is not numeric: {other}")),
    };
    if price <= Decimal::ZERO {
        return Err(format!("non-positive price {price}"));
    }
    Ok(match unit {
        PriceUnit::Gram => price,
        PriceUnit::TroyOunce => price / GRAMS_PER_TROY_OUNCE,
    })
}

fn median(sorted: &[Decimal]) -> Decimal {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / dec!(2)
    } else {
        sorted[mid]
    }
}

/// Median-of-survivors aggregation. Fails closed when fewer than `min_sources`
/// quotes sit within `max_deviation_percent` of the raw median.
pub fn aggregate(
    samples: &[SourceSample],
    min_sources: usize,
    max_deviation_percent: Decimal,
) -> Result<PriceQuote, OracleError> {
    if samples.is_empty() || samples.len() < min_sources {
        return Err(OracleError::InsufficientSources {
            usable: samples.len(),
            required: min_sources,
        });
    }

    let mut prices: Vec<Decimal> = samples.iter().map(|s| s.price_per_gram).collect();
    prices.sort();
    let raw_median = median(&prices);
    let limit = raw_median * max_deviation_percent / Decimal::ONE_HUNDRED;

    let survivors: Vec<&SourceSample> = samples
        .iter()
        .filter(|s| (s.price_per_gram - raw_median).abs() <= limit)
        .collect();
    if survivors.len() < min_sources {
        return Err(OracleError::InsufficientSources {
            usable: survivors.len(),
            required: min_sources,
        });
    }

    let mut kept: Vec<Decimal> = survivors.iter().map(|s| s.price_per_gram).collect();
    kept.sort();

    // fingerprint of the quotes behind this price, kept for audit
    let mut hasher = blake3::Hasher::new();
    for s in &survivors {
        hasher.update(s.source.as_bytes());
        hasher.update(s.price_per_gram.to_string().as_bytes());
    }
    let names: Vec<&str> = survivors.iter().map(|s| s.source.as_str()).collect();

    Ok(PriceQuote {
        price_per_gram: median(&kept),
        timestamp: Utc::now(),
        source: format!(
            "median({})#{}",
            names.join(","),
            &hex::encode(hasher.finalize().as_bytes())[..16]
        ),
    })
}
