//! The single authority over plan status.
//!
//! Each transition runs under the plan's lock. A transition that pays the
//! holder is two-phase: the computed payout is first persisted on the row as
//! a pending credit, then the wallet is credited under a stable idempotency
//! key, then the payout is folded into the plan in a second versioned save.
//! Any later transition on the plan completes an unfinished payout before
//! doing its own work, so a lost save never re-prices or re-pays anything.
//! A version conflict reloads and replays the transition a bounded number of
//! times; every other failure is returned as is.

use crate::collaborators::{ApprovalGate, CreditReason, CreditRequest, WalletCredit, WalletError};
use crate::locks::PlanLocks;
use bnsl_config::PlatformConfig;
use bnsl_oracles::PriceOracle;
use bnsl_settlement::portfolio::{summarize, PortfolioSummary};
use bnsl_settlement::{
    compute_distribution_schedule, compute_locked_principal, compute_maturity_settlement,
    maturity_date, quote_early_termination, realize_distribution,
};
use bnsl_storage::PlanLedger;
use bnsl_types::{
    Activation, EarlyTerminationSettlement, PendingCredit, PendingPayout, Plan, PlanError,
    PlanEventKind, PlanId, PlanSnapshot, PlanStatus, PlanTerms, SettlementKind, SettlementRecord,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of one `process_due_distributions` pass.
#[derive(Debug, Clone)]
pub struct DistributionRun {
    pub plan: Plan,
    pub paid: Vec<u32>,
}

pub struct LifecycleController {
    ledger: Arc<dyn PlanLedger>,
    oracle: Arc<dyn PriceOracle>,
    wallet: Arc<dyn WalletCredit>,
    approvals: Arc<dyn ApprovalGate>,
    config: Arc<PlatformConfig>,
    locks: PlanLocks,
    nonce: AtomicU64,
}

impl LifecycleController {
    pub fn new(
        ledger: Arc<dyn PlanLedger>,
        oracle: Arc<dyn PriceOracle>,
        wallet: Arc<dyn WalletCredit>,
        approvals: Arc<dyn ApprovalGate>,
        config: Arc<PlatformConfig>,
    ) -> Self {
        Self {
            ledger,
            oracle,
            wallet,
            approvals,
            config,
            locks: PlanLocks::new(),
            nonce: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn ledger(&self) -> Arc<dyn PlanLedger> {
        Arc::clone(&self.ledger)
    }

    async fn spot_price(&self) -> Result<Decimal, PlanError> {
        Ok(self.oracle.spot_price_per_gram().await?.price_per_gram)
    }

    async fn commit(&self, plan: &mut Plan) -> Result<(), PlanError> {
        plan.version = self.ledger.save(plan).await?;
        Ok(())
    }

    async fn retrying<T, F, Fut>(&self, plan_id: PlanId, mut attempt: F) -> Result<T, PlanError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PlanError>>,
    {
        let mut conflicts = 0u32;
        loop {
            match attempt().await {
                Err(PlanError::ConcurrentModification { expected, found, .. })
                    if conflicts < self.config.lifecycle.max_conflict_retries =>
                {
                    conflicts += 1;
                    warn!(
                        plan = %plan_id,
                        expected,
                        found,
                        attempt = conflicts,
                        "Plan changed underneath transition, replaying"
                    );
                }
                result => return result,
            }
        }
    }

    fn credit_request(plan: &Plan, payout: &PendingPayout) -> CreditRequest {
        let (gold_grams, usd_equivalent, reason, sequence) = match payout {
            PendingPayout::Distribution(d) => (
                d.gold_credited_grams.unwrap_or(Decimal::ZERO),
                d.monetary_value_usd,
                CreditReason::DistributionPayout,
                Some(d.sequence_number),
            ),
            PendingPayout::Maturity(m) => (
                m.gold_returned_grams,
                m.usd_equivalent,
                CreditReason::MaturityReturn,
                None,
            ),
            PendingPayout::EarlyTermination { settlement, .. } => (
                settlement.payout_gold_grams,
                settlement.payout_usd,
                CreditReason::EarlyTerminationPayout,
                None,
            ),
        };
        CreditRequest {
            user_id: plan.user_id.clone(),
            gold_grams,
            usd_equivalent,
            reason,
            idempotency_key: CreditRequest::idempotency_key(&plan.id, reason, sequence),
        }
    }

    /// Persists `payout` as the plan's pending credit, then completes it.
    async fn pay_out(&self, plan: &mut Plan, payout: PendingPayout, now: DateTime<Utc>) -> Result<(), PlanError> {
        plan.pending = Some(PendingCredit {
            prepared_at: now,
            payout,
        });
        self.commit(plan).await?;
        self.complete_pending(plan, now).await?;
        Ok(())
    }

    /// Credits the wallet for the plan's pending payout, if any, and folds it
    /// into the plan. The credited amounts are the ones frozen when the
    /// payout was prepared. A rejected credit drops the pending payout; an
    /// unreachable wallet leaves it in place for the next attempt.
    async fn complete_pending(&self, plan: &mut Plan, now: DateTime<Utc>) -> Result<Option<PendingPayout>, PlanError> {
        let Some(pending) = plan.pending.clone() else {
            return Ok(None);
        };
        let request = Self::credit_request(plan, &pending.payout);
        let receipt_id = match self.wallet.credit(request).await {
            Ok(receipt_id) => receipt_id,
            Err(err @ WalletError::Rejected(_)) => {
                warn!("Plan {} payout rejected by wallet, dropping it: {}", plan.id, err);
                plan.pending = None;
                self.commit(plan).await?;
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        plan.pending = None;
        match &pending.payout {
            PendingPayout::Distribution(realized) => {
                plan.apply_paid_distribution(realized.clone())?;
                self.commit(plan).await?;
                info!(
                    "Plan {} distribution #{} paid: {} USD as {:?} g at {:?} USD/g",
                    plan.id,
                    realized.sequence_number,
                    realized.monetary_value_usd,
                    realized.gold_credited_grams,
                    realized.market_price_used_per_gram
                );
            }
            PendingPayout::Maturity(settlement) => {
                plan.transition(PlanStatus::Completed)?;
                plan.record(
                    now,
                    PlanEventKind::Matured {
                        gold_returned_grams: settlement.gold_returned_grams,
                        receipt_id: receipt_id.clone(),
                    },
                );
                plan.settlement = Some(SettlementRecord {
                    kind: SettlementKind::Maturity(settlement.clone()),
                    receipt_id,
                    settled_at: now,
                    requested_by: None,
                });
                self.commit(plan).await?;
                info!(
                    "Plan {} completed: {} g returned ({} USD at locked price)",
                    plan.id, settlement.gold_returned_grams, settlement.usd_equivalent
                );
            }
            PendingPayout::EarlyTermination {
                settlement,
                requested_by,
            } => {
                let forfeited = plan.forfeit_upcoming();
                plan.transition(PlanStatus::EarlyTerminated)?;
                plan.record(
                    now,
                    PlanEventKind::EarlyTerminated {
                        payout_usd: settlement.payout_usd,
                        payout_gold_grams: settlement.payout_gold_grams,
                        forfeited: forfeited.clone(),
                        requested_by: requested_by.clone(),
                        receipt_id: receipt_id.clone(),
                    },
                );
                plan.settlement = Some(SettlementRecord {
                    kind: SettlementKind::EarlyTermination(settlement.clone()),
                    receipt_id,
                    settled_at: now,
                    requested_by: Some(requested_by.clone()),
                });
                self.commit(plan).await?;
                info!(
                    "Plan {} terminated early by {}: payout {} USD / {} g, forfeited {:?}",
                    plan.id, requested_by, settlement.payout_usd, settlement.payout_gold_grams, forfeited
                );
            }
        }
        Ok(Some(pending.payout))
    }

    /// Opens a Pending plan at the current spot price and the tenor's rate.
    pub async fn create_plan(
        &self,
        user_id: &str,
        gold_grams: Decimal,
        tenor_months: u32,
        now: DateTime<Utc>,
    ) -> Result<Plan, PlanError> {
        if user_id.trim().is_empty() {
            return Err(PlanError::invalid("user id is required"));
        }
        let limits = &self.config.plans;
        if gold_grams < limits.min_principal_grams || gold_grams > limits.max_principal_grams {
            return Err(PlanError::invalid(format!(
                "principal of {gold_grams} g is outside [{}, {}] g",
                limits.min_principal_grams, limits.max_principal_grams
            )));
        }
        let annual_rate_percent = self
            .config
            .rate_for_tenor(tenor_months)
            .ok_or_else(|| PlanError::invalid(format!("no plan offered for a {tenor_months}-month tenor")))?;

        let locked_price = self.spot_price().await?;
        compute_locked_principal(gold_grams, locked_price)?;

        let plan = Plan::new_pending(
            user_id.to_string(),
            PlanTerms {
                principal_gold_grams: gold_grams,
                locked_in_price_per_gram: locked_price,
                tenor_months,
                annual_rate_percent,
            },
            now,
            self.nonce.fetch_add(1, Ordering::Relaxed),
        );
        self.ledger.insert(&plan).await?;
        info!(
            "Plan {} created for {}: {} g at {} USD/g, {} months @ {}%",
            plan.id, plan.user_id, gold_grams, locked_price, tenor_months, annual_rate_percent
        );
        Ok(plan)
    }

    /// Pending → Active. Fixes the principal value and the payout calendar.
    pub async fn activate(&self, plan_id: PlanId, now: DateTime<Utc>) -> Result<Plan, PlanError> {
        let _guard = self.locks.lock(plan_id).await;
        self.retrying(plan_id, || self.try_activate(plan_id, now)).await
    }

    async fn try_activate(&self, plan_id: PlanId, now: DateTime<Utc>) -> Result<Plan, PlanError> {
        let mut plan = self.ledger.load(&plan_id).await?;
        if plan.status != PlanStatus::Pending {
            return Err(PlanError::InvalidTransition {
                plan_id,
                from: plan.status,
                to: PlanStatus::Active,
            });
        }
        if !self.approvals.is_approved(&plan_id).await? {
            return Err(PlanError::NotApproved(plan_id));
        }

        let terms = &plan.terms;
        let principal = compute_locked_principal(terms.principal_gold_grams, terms.locked_in_price_per_gram)?;
        let start_date = now.date_naive();
        let distributions =
            compute_distribution_schedule(principal, terms.annual_rate_percent, terms.tenor_months, start_date)?;
        let maturity = maturity_date(start_date, terms.tenor_months)?;

        let count = distributions.len() as u32;
        plan.distributions = distributions;
        plan.activation = Some(Activation {
            locked_principal_value_usd: principal,
            start_date,
            maturity_date: maturity,
            activated_at: now,
        });
        plan.transition(PlanStatus::Active)?;
        plan.record(
            now,
            PlanEventKind::Activated {
                locked_principal_value_usd: principal,
                distribution_count: count,
            },
        );
        self.commit(&mut plan).await?;
        info!(
            "Plan {} active: principal {} USD, {} distributions, matures {}",
            plan_id, principal, count, maturity
        );
        Ok(plan)
    }

    /// Pays every Upcoming distribution scheduled on or before `now`, after
    /// finishing any payout left pending. Already-paid entries are skipped.
    pub async fn process_due_distributions(
        &self,
        plan_id: PlanId,
        now: DateTime<Utc>,
    ) -> Result<DistributionRun, PlanError> {
        let _guard = self.locks.lock(plan_id).await;
        self.retrying(plan_id, || self.try_process_due(plan_id, now)).await
    }

    async fn try_process_due(&self, plan_id: PlanId, now: DateTime<Utc>) -> Result<DistributionRun, PlanError> {
        let mut plan = self.ledger.load(&plan_id).await?;
        plan.active_terms()?;
        let mut paid = Vec::new();
        if let Some(PendingPayout::Distribution(resumed)) = self.complete_pending(&mut plan, now).await? {
            paid.push(resumed.sequence_number);
        }
        if plan.status != PlanStatus::Active {
            return Ok(DistributionRun { plan, paid });
        }

        let today = now.date_naive();
        let due: Vec<u32> = plan
            .distributions
            .iter()
            .filter(|d| d.is_due(today))
            .map(|d| d.sequence_number)
            .collect();
        if due.is_empty() {
            return Ok(DistributionRun { plan, paid });
        }

        let spot = self.spot_price().await?;
        for seq in due {
            let Some(distribution) = plan.distributions.iter().find(|d| d.sequence_number == seq).cloned() else {
                continue;
            };
            let realized = realize_distribution(&distribution, spot, today, now)?;
            self.pay_out(&mut plan, PendingPayout::Distribution(realized), now).await?;
            paid.push(seq);
        }
        Ok(DistributionRun { plan, paid })
    }

    /// Active → Completed. Returns the locked grams to the holder.
    pub async fn mature_plan(&self, plan_id: PlanId, now: DateTime<Utc>) -> Result<Plan, PlanError> {
        let _guard = self.locks.lock(plan_id).await;
        self.retrying(plan_id, || self.try_mature(plan_id, now)).await
    }

    async fn try_mature(&self, plan_id: PlanId, now: DateTime<Utc>) -> Result<Plan, PlanError> {
        let mut plan = self.ledger.load(&plan_id).await?;
        plan.active_terms()?;
        if let Some(PendingPayout::Maturity(_)) = self.complete_pending(&mut plan, now).await? {
            return Ok(plan);
        }
        let maturity = plan.active_terms()?.maturity_date;
        let today = now.date_naive();
        let unpaid = plan.unpaid_count();
        if today < maturity || unpaid > 0 {
            return Err(PlanError::PrematureMaturity {
                maturity_date: maturity,
                today,
                unpaid,
            });
        }

        let settlement = compute_maturity_settlement(&plan)?;
        self.pay_out(&mut plan, PendingPayout::Maturity(settlement), now).await?;
        Ok(plan)
    }

    /// Active → EarlyTerminated. One way; upcoming distributions are forfeited.
    pub async fn terminate_early(
        &self,
        plan_id: PlanId,
        now: DateTime<Utc>,
        requested_by: &str,
    ) -> Result<Plan, PlanError> {
        let _guard = self.locks.lock(plan_id).await;
        self.retrying(plan_id, || self.try_terminate(plan_id, now, requested_by))
            .await
    }

    async fn try_terminate(
        &self,
        plan_id: PlanId,
        now: DateTime<Utc>,
        requested_by: &str,
    ) -> Result<Plan, PlanError> {
        let mut plan = self.ledger.load(&plan_id).await?;
        plan.active_terms()?;
        if let Some(PendingPayout::EarlyTermination { .. }) = self.complete_pending(&mut plan, now).await? {
            return Ok(plan);
        }
        ensure_before_maturity(plan.active_terms()?, now.date_naive())?;

        let spot = self.spot_price().await?;
        let settlement = quote_early_termination(&plan, spot, &self.config.fees)?;
        self.pay_out(
            &mut plan,
            PendingPayout::EarlyTermination {
                settlement,
                requested_by: requested_by.to_string(),
            },
            now,
        )
        .await?;
        Ok(plan)
    }

    /// Read-only early exit preview at the live price. Nothing is persisted.
    /// Refused once the plan has reached maturity, like the exit itself.
    pub async fn quote_early_termination(
        &self,
        plan_id: PlanId,
        now: DateTime<Utc>,
    ) -> Result<EarlyTerminationSettlement, PlanError> {
        let plan = self.ledger.load(&plan_id).await?;
        ensure_before_maturity(plan.active_terms()?, now.date_naive())?;
        let spot = self.spot_price().await?;
        quote_early_termination(&plan, spot, &self.config.fees)
    }

    pub async fn snapshot(&self, plan_id: PlanId) -> Result<PlanSnapshot, PlanError> {
        Ok(self.ledger.load(&plan_id).await?.snapshot())
    }

    /// Holder-level totals, recomputed from the ledger on every call.
    pub async fn portfolio(&self, user_id: &str) -> Result<PortfolioSummary, PlanError> {
        let plans = self.ledger.list_by_user(user_id).await?;
        let spot = match self.spot_price().await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("Portfolio for {} served without market figures: {}", user_id, e);
                None
            }
        };
        Ok(summarize(user_id, &plans, spot, &self.config.fees))
    }
}

fn ensure_before_maturity(activation: &Activation, today: NaiveDate) -> Result<(), PlanError> {
    let maturity = activation.maturity_date;
    if today >= maturity {
        return Err(PlanError::invalid(format!(
            "plan reached maturity on {maturity}; it settles through maturity, not early exit"
        )));
    }
    Ok(())
}
