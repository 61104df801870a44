use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Append-only audit entry stored alongside the plan row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEvent {
    pub at: DateTime<Utc>,
    pub kind: PlanEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanEventKind {
    Created {
        principal_gold_grams: Decimal,
        locked_in_price_per_gram: Decimal,
    },
    Activated {
        locked_principal_value_usd: Decimal,
        distribution_count: u32,
    },
    DistributionPaid {
        sequence_number: u32,
        monetary_value_usd: Decimal,
        market_price_per_gram: Decimal,
        gold_credited_grams: Decimal,
    },
    Matured {
        gold_returned_grams: Decimal,
        receipt_id: String,
    },
    EarlyTerminated {
        payout_usd: Decimal,
        payout_gold_grams: Decimal,
        forfeited: Vec<u32>,
        requested_by: String,
        receipt_id: String,
    },
}
