use crate::error::PlanError;
use crate::event::{PlanEvent, PlanEventKind};
use crate::settlement::{PendingCredit, SettlementRecord};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type UserId = String;

/// Opaque plan identifier: BLAKE3 digest of the creating holder, creation
/// instant and a caller nonce. Travels as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlanId(pub [u8; 32]);

impl PlanId {
    pub fn derive(user_id: &str, created_at: DateTime<Utc>, nonce: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(user_id.as_bytes());
        hasher.update(&created_at.timestamp_micros().to_le_bytes());
        hasher.update(&nonce.to_le_bytes());
        PlanId(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PlanId {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut bytes)
            .map_err(|e| PlanError::invalid(format!("malformed plan id {s:?}: {e}")))?;
        Ok(PlanId(bytes))
    }
}

impl TryFrom<String> for PlanId {
    type Error = PlanError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PlanId> for String {
    fn from(id: PlanId) -> Self {
        id.to_hex()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanStatus {
    Pending,
    Active,
    Completed,
    EarlyTerminated,
}

impl PlanStatus {
    /// Transitions are one-directional; terminal states have no way out.
    pub fn can_transition_to(self, next: PlanStatus) -> bool {
        matches!(
            (self, next),
            (PlanStatus::Pending, PlanStatus::Active)
                | (PlanStatus::Active, PlanStatus::Completed)
                | (PlanStatus::Active, PlanStatus::EarlyTerminated)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::EarlyTerminated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionStatus {
    Upcoming,
    Paid,
    Forfeited,
}

/// One scheduled quarterly payout: fixed USD value, grams decided at payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub sequence_number: u32,
    pub scheduled_date: NaiveDate,
    pub monetary_value_usd: Decimal,
    pub market_price_used_per_gram: Option<Decimal>,
    pub gold_credited_grams: Option<Decimal>,
    pub paid_at: Option<DateTime<Utc>>,
    pub status: DistributionStatus,
}

impl Distribution {
    pub fn upcoming(sequence_number: u32, scheduled_date: NaiveDate, monetary_value_usd: Decimal) -> Self {
        Self {
            sequence_number,
            scheduled_date,
            monetary_value_usd,
            market_price_used_per_gram: None,
            gold_credited_grams: None,
            paid_at: None,
            status: DistributionStatus::Upcoming,
        }
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.status == DistributionStatus::Upcoming && self.scheduled_date <= today
    }
}

/// Terms agreed when the plan is opened. Immutable for the plan's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTerms {
    pub principal_gold_grams: Decimal,
    pub locked_in_price_per_gram: Decimal,
    pub tenor_months: u32,
    pub annual_rate_percent: Decimal,
}

/// Values fixed at activation: principal valuation and the plan calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activation {
    pub locked_principal_value_usd: Decimal,
    pub start_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub activated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub user_id: UserId,
    pub terms: PlanTerms,
    pub status: PlanStatus,
    pub activation: Option<Activation>,
    pub distributions: Vec<Distribution>,
    pub total_distributions_paid_gold: Decimal,
    pub monetary_value_distributed_usd: Decimal,
    pub settlement: Option<SettlementRecord>,
    /// Payout prepared but not yet confirmed by the wallet.
    pub pending: Option<PendingCredit>,
    pub events: Vec<PlanEvent>,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by the ledger on every save.
    pub version: u64,
}

impl Plan {
    pub fn new_pending(user_id: UserId, terms: PlanTerms, created_at: DateTime<Utc>, nonce: u64) -> Self {
        let id = PlanId::derive(&user_id, created_at, nonce);
        let mut plan = Self {
            id,
            user_id,
            terms,
            status: PlanStatus::Pending,
            activation: None,
            distributions: Vec::new(),
            total_distributions_paid_gold: Decimal::ZERO,
            monetary_value_distributed_usd: Decimal::ZERO,
            settlement: None,
            pending: None,
            events: Vec::new(),
            created_at,
            version: 0,
        };
        plan.record(
            created_at,
            PlanEventKind::Created {
                principal_gold_grams: plan.terms.principal_gold_grams,
                locked_in_price_per_gram: plan.terms.locked_in_price_per_gram,
            },
        );
        plan
    }

    /// Activation data of a plan that is currently Active.
    pub fn active_terms(&self) -> Result<&Activation, PlanError> {
        match (&self.status, &self.activation) {
            (PlanStatus::Active, Some(activation)) => Ok(activation),
            _ => Err(PlanError::NotActive {
                plan_id: self.id,
                status: self.status,
            }),
        }
    }

    pub fn transition(&mut self, next: PlanStatus) -> Result<(), PlanError> {
        if !self.status.can_transition_to(next) {
            return Err(PlanError::InvalidTransition {
                plan_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn record(&mut self, at: DateTime<Utc>, kind: PlanEventKind) {
        self.events.push(PlanEvent { at, kind });
    }

    pub fn unpaid_count(&self) -> usize {
        self.distributions
            .iter()
            .filter(|d| d.status != DistributionStatus::Paid)
            .count()
    }

    pub fn next_distribution_date(&self) -> Option<NaiveDate> {
        self.distributions
            .iter()
            .find(|d| d.status == DistributionStatus::Upcoming)
            .map(|d| d.scheduled_date)
    }

    pub fn has_reached_maturity(&self, today: NaiveDate) -> bool {
        self.activation
            .as_ref()
            .is_some_and(|a| today >= a.maturity_date)
    }

    /// Whether a sweep on `today` has work to do for this plan. An unfinished
    /// payout always counts.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.status == PlanStatus::Active
            && (self.pending.is_some()
                || self.distributions.iter().any(|d| d.is_due(today))
                || self.has_reached_maturity(today))
    }

    /// Stores a realized distribution and advances the running totals.
    pub fn apply_paid_distribution(&mut self, realized: Distribution) -> Result<(), PlanError> {
        let slot = self
            .distributions
            .iter_mut()
            .find(|d| d.sequence_number == realized.sequence_number)
            .ok_or_else(|| {
                PlanError::invalid(format!("plan has no distribution #{}", realized.sequence_number))
            })?;
        if slot.status != DistributionStatus::Upcoming {
            return Err(PlanError::AlreadyPaid {
                sequence_number: slot.sequence_number,
            });
        }
        let (Some(grams), Some(price), Some(paid_at)) = (
            realized.gold_credited_grams,
            realized.market_price_used_per_gram,
            realized.paid_at,
        ) else {
            return Err(PlanError::invalid("distribution has not been realized"));
        };

        *slot = realized;
        self.total_distributions_paid_gold += grams;
        self.monetary_value_distributed_usd += slot.monetary_value_usd;
        let sequence_number = slot.sequence_number;
        let monetary_value_usd = slot.monetary_value_usd;
        self.record(
            paid_at,
            PlanEventKind::DistributionPaid {
                sequence_number,
                monetary_value_usd,
                market_price_per_gram: price,
                gold_credited_grams: grams,
            },
        );
        Ok(())
    }

    /// Marks every Upcoming distribution Forfeited, returning their sequence numbers.
    pub fn forfeit_upcoming(&mut self) -> Vec<u32> {
        self.distributions
            .iter_mut()
            .filter(|d| d.status == DistributionStatus::Upcoming)
            .map(|d| {
                d.status = DistributionStatus::Forfeited;
                d.sequence_number
            })
            .collect()
    }

    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            id: self.id,
            user_id: self.user_id.clone(),
            status: self.status,
            principal_gold_grams: self.terms.principal_gold_grams,
            locked_in_price_per_gram: self.terms.locked_in_price_per_gram,
            locked_principal_value_usd: self.activation.as_ref().map(|a| a.locked_principal_value_usd),
            tenor_months: self.terms.tenor_months,
            annual_rate_percent: self.terms.annual_rate_percent,
            start_date: self.activation.as_ref().map(|a| a.start_date),
            maturity_date: self.activation.as_ref().map(|a| a.maturity_date),
            distributions: self.distributions.clone(),
            total_distributions_paid_gold: self.total_distributions_paid_gold,
            monetary_value_distributed_usd: self.monetary_value_distributed_usd,
            next_distribution_date: if self.status == PlanStatus::Active {
                self.next_distribution_date()
            } else {
                None
            },
            settlement: self.settlement.clone(),
            pending: self.pending.clone(),
        }
    }
}

/// Read-only view handed to presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub id: PlanId,
    pub user_id: UserId,
    pub status: PlanStatus,
    pub principal_gold_grams: Decimal,
    pub locked_in_price_per_gram: Decimal,
    pub locked_principal_value_usd: Option<Decimal>,
    pub tenor_months: u32,
    pub annual_rate_percent: Decimal,
    pub start_date: Option<NaiveDate>,
    pub maturity_date: Option<NaiveDate>,
    pub distributions: Vec<Distribution>,
    pub total_distributions_paid_gold: Decimal,
    pub monetary_value_distributed_usd: Decimal,
    pub next_distribution_date: Option<NaiveDate>,
    pub settlement: Option<SettlementRecord>,
    pub pending: Option<PendingCredit>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn pending_plan() -> Plan {
        let created = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        Plan::new_pending(
            "user-1".to_string(),
            PlanTerms {
                principal_gold_grams: dec!(100),
                locked_in_price_per_gram: dec!(50),
                tenor_months: 12,
                annual_rate_percent: dec!(8),
            },
            created,
            7,
        )
    }

    #[test]
    fn plan_id_hex_round_trips() {
        let plan = pending_plan();
        let parsed: PlanId = plan.id.to_hex().parse().unwrap();
        assert_eq!(parsed, plan.id);
        assert!("zz".parse::<PlanId>().is_err());
    }

    #[test]
    fn plan_id_depends_on_nonce() {
        let at = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        assert_ne!(PlanId::derive("u", at, 1), PlanId::derive("u", at, 2));
    }

    #[test]
    fn status_transitions_are_one_directional() {
        use PlanStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(Active.can_transition_to(EarlyTerminated));
        assert!(!Completed.can_transition_to(Active));
        assert!(!EarlyTerminated.can_transition_to(Active));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Active.can_transition_to(Pending));
    }

    #[test]
    fn pending_plan_is_not_active() {
        let plan = pending_plan();
        assert!(matches!(plan.active_terms(), Err(PlanError::NotActive { .. })));
        assert_eq!(plan.events.len(), 1);
        assert!(!plan.is_due(NaiveDate::from_ymd_opt(2030, 1, 1).unwrap()));
    }

    #[test]
    fn invalid_transition_is_reported() {
        let mut plan = pending_plan();
        let err = plan.transition(PlanStatus::Completed).unwrap_err();
        assert_eq!(err.code(), "invalid_transition");
        assert_eq!(plan.status, PlanStatus::Pending);
    }

    #[test]
    fn plan_survives_bincode_and_json() {
        let plan = pending_plan();
        let bytes = bincode::serialize(&plan).unwrap();
        let decoded: Plan = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, plan);

        let json = serde_json::to_string(&plan.snapshot()).unwrap();
        assert!(json.contains(&plan.id.to_hex()));
    }

    #[test]
    fn pending_credit_makes_active_plan_due_and_persists() {
        use crate::settlement::{MaturitySettlement, PendingCredit, PendingPayout};

        let mut plan = pending_plan();
        let start = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let maturity = NaiveDate::from_ymd_opt(2027, 1, 15).unwrap();
        plan.activation = Some(Activation {
            locked_principal_value_usd: dec!(5000),
            start_date: start,
            maturity_date: maturity,
            activated_at: Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap(),
        });
        plan.distributions = vec![Distribution::upcoming(1, maturity, dec!(400))];
        plan.transition(PlanStatus::Active).unwrap();
        let quiet_day = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        assert!(!plan.is_due(quiet_day));

        plan.pending = Some(PendingCredit {
            prepared_at: Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap(),
            payout: PendingPayout::Maturity(MaturitySettlement {
                gold_returned_grams: dec!(100),
                usd_equivalent: dec!(5000),
            }),
        });
        assert!(plan.is_due(quiet_day));

        let decoded: Plan = bincode::deserialize(&bincode::serialize(&plan).unwrap()).unwrap();
        assert_eq!(decoded.pending, plan.pending);
    }
}
