use crate::{
    ApiConfig, FeeSchedule, GatewayConfig, LifecycleConfig, OracleConfig, PlanLimits,
    PriceSourceConfig, PriceUnit, SweepConfig, TenorOption,
};
use rust_decimal_macros::dec;

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            admin_fee_percent: dec!(2),
            early_withdrawal_penalty_percent: dec!(5),
        }
    }
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            min_principal_grams: dec!(10),
            max_principal_grams: dec!(100000),
            tenors: vec![
                TenorOption {
                    tenor_months: 12,
                    annual_rate_percent: dec!(8),
                },
                TenorOption {
                    tenor_months: 24,
                    annual_rate_percent: dec!(10),
                },
                TenorOption {
                    tenor_months: 36,
                    annual_rate_percent: dec!(12),
                },
            ],
        }
    }
}

/// Public spot feeds quoting XAU/USD per troy ounce.
pub fn default_price_sources() -> Vec<PriceSourceConfig> {
    vec![
        PriceSourceConfig {
            name: "gold-api".to_string(),
            url: "https://api.gold-api.com/price/XAU".to_string(),
            pointer: "/price".to_string(),
            unit: PriceUnit::TroyOunce,
        },
        PriceSourceConfig {
            name: "goldprice-org".to_string(),
            url: "https://data-asg.goldprice.org/dbXRates/USD".to_string(),
            pointer: "/items/0/xauPrice".to_string(),
            unit: PriceUnit::TroyOunce,
        },
    ]
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            sources: default_price_sources(),
            min_sources: 1,
            max_deviation_percent: dec!(2),
            timeout_secs: 10,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self { interval_secs: 3600 }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            wallet_url: "http://localhost:4000".to_string(),
            approval_url: "http://localhost:4001".to_string(),
            timeout_secs: 10,
        }
    }
}
