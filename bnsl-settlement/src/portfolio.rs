//! Read-side aggregation over a holder's plans.
//!
//! Totals are recomputed from the plan rows on every request; nothing here is
//! cached or mutated.

use crate::quote_early_termination;
use bnsl_config::FeeSchedule;
use bnsl_types::{Plan, PlanStatus, UserId};
use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub user_id: UserId,
    pub plan_count: usize,
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub early_terminated: usize,
    pub active_principal_grams: Decimal,
    pub active_locked_principal_usd: Decimal,
    pub total_distributions_paid_gold: Decimal,
    pub monetary_value_distributed_usd: Decimal,
    pub next_distribution_date: Option<NaiveDate>,
    /// Spot price used for the market figures below, when one was available.
    pub spot_price_per_gram: Option<Decimal>,
    pub active_market_value_usd: Option<Decimal>,
    /// What the holder would receive exiting every active plan today.
    pub early_exit_value_usd: Option<Decimal>,
}

#[derive(Default)]
struct Totals {
    pending: usize,
    active: usize,
    completed: usize,
    early_terminated: usize,
    active_principal_grams: Decimal,
    active_locked_principal_usd: Decimal,
    paid_gold: Decimal,
    distributed_usd: Decimal,
    next_distribution_date: Option<NaiveDate>,
    early_exit_value_usd: Decimal,
}

impl Totals {
    fn of(plan: &Plan, spot: Option<Decimal>, fees: &FeeSchedule) -> Self {
        let mut totals = Totals {
            paid_gold: plan.total_distributions_paid_gold,
            distributed_usd: plan.monetary_value_distributed_usd,
            ..Default::default()
        };
        match plan.status {
            PlanStatus::Pending => totals.pending = 1,
            PlanStatus::Completed => totals.completed = 1,
            PlanStatus::EarlyTerminated => totals.early_terminated = 1,
            PlanStatus::Active => {
                totals.active = 1;
                totals.active_principal_grams = plan.terms.principal_gold_grams;
                if let Some(activation) = &plan.activation {
                    totals.active_locked_principal_usd = activation.locked_principal_value_usd;
                }
                totals.next_distribution_date = plan.next_distribution_date();
                if let Some(spot) = spot {
                    if let Ok(quote) = quote_early_termination(plan, spot, fees) {
                        totals.early_exit_value_usd = quote.payout_usd;
                    }
                }
            }
        }
        totals
    }

    fn merge(self, other: Totals) -> Totals {
        Totals {
            pending: self.pending + other.pending,
            active: self.active + other.active,
            completed: self.completed + other.completed,
            early_terminated: self.early_terminated + other.early_terminated,
            active_principal_grams: self.active_principal_grams + other.active_principal_grams,
            active_locked_principal_usd: self.active_locked_principal_usd
                + other.active_locked_principal_usd,
            paid_gold: self.paid_gold + other.paid_gold,
            distributed_usd: self.distributed_usd + other.distributed_usd,
            next_distribution_date: match (self.next_distribution_date, other.next_distribution_date) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
            early_exit_value_usd: self.early_exit_value_usd + other.early_exit_value_usd,
        }
    }
}

/// Summarises `plans` for one holder. `spot` is optional: without a live price
/// the market-dependent figures are left empty rather than guessed.
pub fn summarize(
    user_id: &str,
    plans: &[Plan],
    spot: Option<Decimal>,
    fees: &FeeSchedule,
) -> PortfolioSummary {
    let totals = plans
        .par_iter()
        .map(|plan| Totals::of(plan, spot, fees))
        .reduce(Totals::default, Totals::merge);

    PortfolioSummary {
        user_id: user_id.to_string(),
        plan_count: plans.len(),
        pending: totals.pending,
        active: totals.active,
        completed: totals.completed,
        early_terminated: totals.early_terminated,
        active_principal_grams: totals.active_principal_grams,
        active_locked_principal_usd: totals.active_locked_principal_usd,
        total_distributions_paid_gold: totals.paid_gold,
        monetary_value_distributed_usd: totals.distributed_usd,
        next_distribution_date: totals.next_distribution_date,
        spot_price_per_gram: spot,
        active_market_value_usd: spot.and_then(|s| totals.active_principal_grams.checked_mul(s)),
        early_exit_value_usd: spot.map(|_| totals.early_exit_value_usd),
    }
}
