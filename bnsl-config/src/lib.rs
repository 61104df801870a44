//! Platform configuration for the BNSL engine.
//!
//! One immutable structure, loaded from JSON and validated once at startup,
//! then handed to the controller and settlement calls explicitly. Percent
//! fields are plain percent (`2.5` means 2.5%), gram fields are grams of fine
//! gold, and decimal values are written as JSON strings.

mod defaults;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub use defaults::default_price_sources;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlatformConfig {
    pub fees: FeeSchedule,
    pub plans: PlanLimits,
    pub oracle: OracleConfig,
    pub lifecycle: LifecycleConfig,
    pub sweep: SweepConfig,
    pub api: ApiConfig,
    pub gateways: GatewayConfig,
}

/// Charges applied when a holder exits before maturity (percent of base value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    pub admin_fee_percent: Decimal,
    pub early_withdrawal_penalty_percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanLimits {
    pub min_principal_grams: Decimal,
    pub max_principal_grams: Decimal,
    pub tenors: Vec<TenorOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenorOption {
    pub tenor_months: u32,
    pub annual_rate_percent: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceUnit {
    Gram,
    TroyOunce,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSourceConfig {
    pub name: String,
    pub url: String,
    /// RFC 6901 pointer to the price inside the JSON response.
    pub pointer: String,
    pub unit: PriceUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub sources: Vec<PriceSourceConfig>,
    pub min_sources: usize,
    pub max_deviation_percent: Decimal,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub max_conflict_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub wallet_url: String,
    pub approval_url: String,
    pub timeout_secs: u64,
}

impl PlatformConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: PlatformConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let hundred = Decimal::ONE_HUNDRED;
        let fees = &self.fees;
        for (name, value) in [
            ("fees.admin_fee_percent", fees.admin_fee_percent),
            ("fees.early_withdrawal_penalty_percent", fees.early_withdrawal_penalty_percent),
        ] {
            if value < Decimal::ZERO || value > hundred {
                return invalid(format!("{name} must be within [0, 100], got {value}"));
            }
        }
        if fees.admin_fee_percent + fees.early_withdrawal_penalty_percent >= hundred {
            return invalid("fees must leave a positive share of the base value".to_string());
        }

        let plans = &self.plans;
        if plans.min_principal_grams <= Decimal::ZERO {
            return invalid("plans.min_principal_grams must be positive".to_string());
        }
        if plans.max_principal_grams < plans.min_principal_grams {
            return invalid("plans.max_principal_grams is below the minimum".to_string());
        }
        if plans.tenors.is_empty() {
            return invalid("plans.tenors must offer at least one tenor".to_string());
        }
        for tenor in &plans.tenors {
            if tenor.tenor_months < 3 || tenor.tenor_months % 3 != 0 {
                return invalid(format!(
                    "tenor of {} months is not a whole number of quarters",
                    tenor.tenor_months
                ));
            }
            if tenor.annual_rate_percent <= Decimal::ZERO || tenor.annual_rate_percent > hundred {
                return invalid(format!(
                    "rate for {}-month tenor must be within (0, 100]",
                    tenor.tenor_months
                ));
            }
        }
        let mut months: Vec<u32> = plans.tenors.iter().map(|t| t.tenor_months).collect();
        months.sort_unstable();
        months.dedup();
        if months.len() != plans.tenors.len() {
            return invalid("plans.tenors lists the same tenor twice".to_string());
        }

        if self.oracle.min_sources == 0 {
            return invalid("oracle.min_sources must be at least 1".to_string());
        }
        if self.oracle.max_deviation_percent <= Decimal::ZERO {
            return invalid("oracle.max_deviation_percent must be positive".to_string());
        }
        if self.sweep.interval_secs == 0 {
            return invalid("sweep.interval_secs must be positive".to_string());
        }
        Ok(())
    }

    /// Agreed annual rate for a tenor, if the platform offers it.
    pub fn rate_for_tenor(&self, tenor_months: u32) -> Option<Decimal> {
        self.plans
            .tenors
            .iter()
            .find(|t| t.tenor_months == tenor_months)
            .map(|t| t.annual_rate_percent)
    }
}

fn invalid(msg: String) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(msg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_config_is_valid() {
        let config = PlatformConfig::default();
        config.validate().unwrap();
        assert_eq!(config.rate_for_tenor(12), Some(dec!(8)));
        assert_eq!(config.rate_for_tenor(18), None);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = PlatformConfig::from_json_str(
            r#"{ "fees": { "admin_fee_percent": "1.5", "early_withdrawal_penalty_percent": "4" } }"#,
        )
        .unwrap();
        assert_eq!(config.fees.admin_fee_percent, dec!(1.5));
        assert_eq!(config.plans, PlanLimits::default());
    }

    #[test]
    fn rejects_fees_that_consume_everything() {
        let mut config = PlatformConfig::default();
        config.fees.admin_fee_percent = dec!(60);
        config.fees.early_withdrawal_penalty_percent = dec!(40);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_tenor_that_is_not_quarterly() {
        let mut config = PlatformConfig::default();
        config.plans.tenors.push(TenorOption {
            tenor_months: 10,
            annual_rate_percent: dec!(5),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_tenors() {
        let mut config = PlatformConfig::default();
        let first = config.plans.tenors[0].clone();
        config.plans.tenors.push(first);
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let err = PlatformConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
