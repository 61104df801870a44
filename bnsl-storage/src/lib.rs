//! Persistence boundary for BNSL plans.
//!
//! A plan is stored as one row, its audit events included, so a save either
//! commits the whole transition or nothing. Every save carries the version the
//! caller loaded; a mismatch is reported as a concurrent modification.

#[cfg(feature = "rocksdb")]
pub mod db;
pub mod memory;

use async_trait::async_trait;
use bnsl_types::{Plan, PlanError, PlanId};
use chrono::NaiveDate;
use thiserror::Error;

pub use memory::InMemoryPlanLedger;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("plan {0} not found")]
    NotFound(PlanId),
    #[error("plan {0} already exists")]
    AlreadyExists(PlanId),
    #[error("plan {plan_id}: expected version {expected}, stored version is {found}")]
    VersionConflict {
        plan_id: PlanId,
        expected: u64,
        found: u64,
    },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl From<LedgerError> for PlanError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => PlanError::NotFound(id),
            LedgerError::VersionConflict {
                plan_id,
                expected,
                found,
            } => PlanError::ConcurrentModification {
                plan_id,
                expected,
                found,
            },
            other => PlanError::Storage(other.to_string()),
        }
    }
}

#[async_trait]
pub trait PlanLedger: Send + Sync {
    /// Stores a brand-new plan at version 0.
    async fn insert(&self, plan: &Plan) -> Result<(), LedgerError>;

    async fn load(&self, id: &PlanId) -> Result<Plan, LedgerError>;

    /// Full-row upsert guarded by `plan.version`. Returns the new version.
    async fn save(&self, plan: &Plan) -> Result<u64, LedgerError>;

    /// Active plans with a distribution or maturity falling on or before `today`.
    async fn find_due_plans(&self, today: NaiveDate) -> Result<Vec<Plan>, LedgerError>;

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Plan>, LedgerError>;
}
