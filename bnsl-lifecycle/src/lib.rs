pub mod collaborators;
pub mod controller;
pub mod locks;
pub mod sweep;

pub use collaborators::{
    ApprovalGate, CreditReason, CreditRequest, InMemoryWallet, StaticApprovalGate, WalletCredit,
    WalletError,
};
pub use controller::{DistributionRun, LifecycleController};
pub use locks::PlanLocks;
pub use sweep::{SweepReport, SweepService};
