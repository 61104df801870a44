use crate::plan::{PlanId, PlanStatus};
use chrono::NaiveDate;
use thiserror::Error;

/// Every failure a BNSL plan operation can report.
///
/// Variants carry enough context for the API layer to tell the holder exactly
/// why a financial action was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("distribution #{sequence_number} is already paid")]
    AlreadyPaid { sequence_number: u32 },

    #[error("distribution #{sequence_number} was forfeited and can no longer be paid")]
    DistributionForfeited { sequence_number: u32 },

    #[error("distribution #{sequence_number} is not due until {scheduled_date} (today is {today})")]
    DistributionNotDue {
        sequence_number: u32,
        scheduled_date: NaiveDate,
        today: NaiveDate,
    },

    #[error("cannot settle maturity: {unpaid} distribution(s) still unpaid")]
    IncompleteDistributions { unpaid: usize },

    #[error("cannot mature plan: matures on {maturity_date}, today is {today}, {unpaid} distribution(s) unpaid")]
    PrematureMaturity {
        maturity_date: NaiveDate,
        today: NaiveDate,
        unpaid: usize,
    },

    #[error("cannot proceed: plan {plan_id} is not active (status {status:?})")]
    NotActive { plan_id: PlanId, status: PlanStatus },

    #[error("plan {plan_id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        plan_id: PlanId,
        from: PlanStatus,
        to: PlanStatus,
    },

    #[error("plan {0} has not been approved for activation")]
    NotApproved(PlanId),

    #[error("approval service unavailable: {0}")]
    ApprovalUnavailable(String),

    #[error("plan {0} not found")]
    NotFound(PlanId),

    #[error("plan {plan_id} was modified concurrently (expected version {expected}, found {found})")]
    ConcurrentModification {
        plan_id: PlanId,
        expected: u64,
        found: u64,
    },

    #[error("gold spot price unavailable: {0}")]
    PriceUnavailable(String),

    #[error("wallet credit failed: {0}")]
    WalletCredit(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl PlanError {
    /// Stable machine-readable code, used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            PlanError::InvalidInput(_) => "invalid_input",
            PlanError::AlreadyPaid { .. } => "already_paid",
            PlanError::DistributionForfeited { .. } => "distribution_forfeited",
            PlanError::DistributionNotDue { .. } => "distribution_not_due",
            PlanError::IncompleteDistributions { .. } => "incomplete_distributions",
            PlanError::PrematureMaturity { .. } => "premature_maturity",
            PlanError::NotActive { .. } => "not_active",
            PlanError::InvalidTransition { .. } => "invalid_transition",
            PlanError::NotApproved(_) => "not_approved",
            PlanError::ApprovalUnavailable(_) => "approval_unavailable",
            PlanError::NotFound(_) => "not_found",
            PlanError::ConcurrentModification { .. } => "concurrent_modification",
            PlanError::PriceUnavailable(_) => "price_unavailable",
            PlanError::WalletCredit(_) => "wallet_credit_failed",
            PlanError::Storage(_) => "storage_failure",
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        PlanError::InvalidInput(msg.into())
    }
}
