pub mod error;
pub mod event;
pub mod plan;
pub mod settlement;

pub use error::PlanError;
pub use event::{PlanEvent, PlanEventKind};
pub use plan::{
    Activation, Distribution, DistributionStatus, Plan, PlanId, PlanSnapshot, PlanStatus,
    PlanTerms, UserId,
};
pub use settlement::{
    EarlyTerminationSettlement, MaturitySettlement, PendingCredit, PendingPayout, SettlementKind,
    SettlementRecord,
};
