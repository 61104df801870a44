use crate::plan::Distribution;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Principal returned at full term. Valued at the locked-in price, never re-priced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaturitySettlement {
    pub gold_returned_grams: Decimal,
    pub usd_equivalent: Decimal,
}

/// Result of exiting a plan before maturity. Also served as a read-only quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyTerminationSettlement {
    pub spot_price_per_gram: Decimal,
    /// Lesser of the locked principal value and the principal at spot.
    pub base_value_usd: Decimal,
    pub admin_fee_percent: Decimal,
    pub penalty_percent: Decimal,
    pub after_fees_usd: Decimal,
    pub first_distribution_clawback_usd: Decimal,
    pub payout_usd: Decimal,
    pub payout_gold_grams: Decimal,
    pub forfeited_distributions: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SettlementKind {
    Maturity(MaturitySettlement),
    EarlyTermination(EarlyTerminationSettlement),
}

/// Settlement as booked against the holder's wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub kind: SettlementKind,
    pub receipt_id: String,
    pub settled_at: DateTime<Utc>,
    pub requested_by: Option<String>,
}

/// Payout computed and persisted before the wallet is credited. Until it is
/// completed, every replay credits exactly these amounts under the same key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PendingPayout {
    Distribution(Distribution),
    Maturity(MaturitySettlement),
    EarlyTermination {
        settlement: EarlyTerminationSettlement,
        requested_by: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCredit {
    pub prepared_at: DateTime<Utc>,
    pub payout: PendingPayout,
}
