use crate::{LedgerError, PlanLedger};
use async_trait::async_trait;
use bnsl_types::{Plan, PlanId};
use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Process-local ledger used by tests, the simulator and single-node setups.
#[derive(Default)]
pub struct InMemoryPlanLedger {
    plans: RwLock<HashMap<PlanId, Plan>>,
}

impl InMemoryPlanLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.plans.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.plans.read().await.is_empty()
    }
}

#[async_trait]
impl PlanLedger for InMemoryPlanLedger {
    async fn insert(&self, plan: &Plan) -> Result<(), LedgerError> {
        let mut plans = self.plans.write().await;
        if plans.contains_key(&plan.id) {
            return Err(LedgerError::AlreadyExists(plan.id));
        }
        let mut stored = plan.clone();
        stored.version = 0;
        plans.insert(plan.id, stored);
        debug!(plan = %plan.id, user = %plan.user_id, "Plan inserted");
        Ok(())
    }

    async fn load(&self, id: &PlanId) -> Result<Plan, LedgerError> {
        self.plans
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(LedgerError::NotFound(*id))
    }

    async fn save(&self, plan: &Plan) -> Result<u64, LedgerError> {
        let mut plans = self.plans.write().await;
        let stored = plans.get_mut(&plan.id).ok_or(LedgerError::NotFound(plan.id))?;
        if stored.version != plan.version {
            warn!(plan = %plan.id, expected = plan.version, found = stored.version, "Stale plan save refused");
            return Err(LedgerError::VersionConflict {
                plan_id: plan.id,
                expected: plan.version,
                found: stored.version,
            });
        }
        let next = plan.version + 1;
        *stored = plan.clone();
        stored.version = next;
        debug!(plan = %plan.id, version = next, status = ?plan.status, "Plan saved");
        Ok(next)
    }

    async fn find_due_plans(&self, today: NaiveDate) -> Result<Vec<Plan>, LedgerError> {
        let plans = self.plans.read().await;
        let mut due: Vec<Plan> = plans.values().filter(|p| p.is_due(today)).cloned().collect();
        due.sort_by_key(|p| p.created_at);
        Ok(due)
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Plan>, LedgerError> {
        let plans = self.plans.read().await;
        let mut owned: Vec<Plan> = plans
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|p| p.created_at);
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bnsl_types::{Activation, Distribution, PlanError, PlanStatus, PlanTerms};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn plan(user: &str, nonce: u64) -> Plan {
        Plan::new_pending(
            user.to_string(),
            PlanTerms {
                principal_gold_grams: dec!(100),
                locked_in_price_per_gram: dec!(50),
                tenor_months: 12,
                annual_rate_percent: dec!(8),
            },
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            nonce,
        )
    }

    fn activate(plan: &mut Plan) {
        let start = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        plan.activation = Some(Activation {
            locked_principal_value_usd: dec!(5000),
            start_date: start,
            maturity_date: NaiveDate::from_ymd_opt(2027, 1, 15).unwrap(),
            activated_at: Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap(),
        });
        plan.distributions = vec![Distribution::upcoming(
            1,
            NaiveDate::from_ymd_opt(2026, 4, 15).unwrap(),
            dec!(100),
        )];
        plan.status = PlanStatus::Active;
    }

    #[tokio::test]
    async fn insert_then_load() {
        let ledger = InMemoryPlanLedger::new();
        let p = plan("alice", 1);
        ledger.insert(&p).await.unwrap();
        assert_eq!(ledger.load(&p.id).await.unwrap(), p);
        assert!(matches!(ledger.insert(&p).await, Err(LedgerError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn missing_plan_maps_to_not_found() {
        let ledger = InMemoryPlanLedger::new();
        let p = plan("alice", 1);
        let err: PlanError = ledger.load(&p.id).await.unwrap_err().into();
        assert_eq!(err, PlanError::NotFound(p.id));
    }

    #[tokio::test]
    async fn stale_save_is_a_conflict() {
        let ledger = InMemoryPlanLedger::new();
        let mut p = plan("alice", 1);
        ledger.insert(&p).await.unwrap();

        let stale = p.clone();
        p.version = ledger.save(&p).await.unwrap();
        assert_eq!(p.version, 1);

        let err: PlanError = ledger.save(&stale).await.unwrap_err().into();
        assert_eq!(
            err,
            PlanError::ConcurrentModification {
                plan_id: p.id,
                expected: 0,
                found: 1
            }
        );
    }

    #[tokio::test]
    async fn due_plans_and_user_listing() {
        let ledger = InMemoryPlanLedger::new();
        let pending = plan("alice", 1);
        let mut active = plan("alice", 2);
        activate(&mut active);
        let other = plan("bob", 3);
        for p in [&pending, &active, &other] {
            ledger.insert(p).await.unwrap();
        }

        let before = ledger
            .find_due_plans(NaiveDate::from_ymd_opt(2026, 4, 14).unwrap())
            .await
            .unwrap();
        assert!(before.is_empty());

        let due = ledger
            .find_due_plans(NaiveDate::from_ymd_opt(2026, 4, 15).unwrap())
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, active.id);

        assert_eq!(ledger.list_by_user("alice").await.unwrap().len(), 2);
        assert_eq!(ledger.list_by_user("carol").await.unwrap().len(), 0);
        assert_eq!(ledger.len().await, 3);
    }
}
