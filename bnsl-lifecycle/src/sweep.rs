use crate::controller::LifecycleController;
use bnsl_types::{PlanError, PlanStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub distributions_paid: usize,
    pub matured: usize,
    /// Plans left for the next cycle because no live price was available.
    pub skipped_price_unavailable: usize,
    pub failed: usize,
}

/// Periodic job paying due distributions and settling matured plans.
pub struct SweepService {
    controller: Arc<LifecycleController>,
    interval: Duration,
}

impl SweepService {
    pub fn new(controller: Arc<LifecycleController>, interval: Duration) -> Self {
        Self { controller, interval }
    }

    /// One pass over every plan due on `now`. Failures are per plan: a plan
    /// that cannot be priced is skipped and picked up again next cycle.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, PlanError> {
        let today = now.date_naive();
        let due = self.controller.ledger().find_due_plans(today).await?;
        let mut report = SweepReport {
            examined: due.len(),
            ..Default::default()
        };

        for plan in due {
            let run = match self.controller.process_due_distributions(plan.id, now).await {
                Ok(run) => run,
                Err(PlanError::PriceUnavailable(reason)) => {
                    warn!("Sweep skipped plan {}: price unavailable ({})", plan.id, reason);
                    report.skipped_price_unavailable += 1;
                    continue;
                }
                Err(e) => {
                    error!("Sweep failed paying distributions for plan {}: {}", plan.id, e);
                    report.failed += 1;
                    continue;
                }
            };
            report.distributions_paid += run.paid.len();

            let settled = &run.plan;
            // a pending maturity payout was completed while paying
            if settled.status == PlanStatus::Completed {
                report.matured += 1;
                continue;
            }
            if settled.status == PlanStatus::Active
                && settled.has_reached_maturity(today)
                && settled.unpaid_count() == 0
            {
                match self.controller.mature_plan(plan.id, now).await {
                    Ok(_) => report.matured += 1,
                    Err(e) => {
                        error!("Sweep failed maturing plan {}: {}", plan.id, e);
                        report.failed += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    pub async fn run(self) {
        info!("Starting BNSL sweep every {:?}", self.interval);
        let mut interval = tokio::time::interval(self.interval);
        loop {
            interval.tick().await;
            match self.run_once(Utc::now()).await {
                Ok(report) if report.examined > 0 => info!(
                    "Sweep: examined {}, paid {} distributions, matured {}, skipped {}, failed {}",
                    report.examined,
                    report.distributions_paid,
                    report.matured,
                    report.skipped_price_unavailable,
                    report.failed
                ),
                Ok(_) => {}
                Err(e) => error!("Sweep could not list due plans: {}", e),
            }
        }
    }
}
