//! External services the lifecycle depends on but does not own.

use async_trait::async_trait;
use bnsl_types::{PlanError, PlanId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditReason {
    DistributionPayout,
    MaturityReturn,
    EarlyTerminationPayout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditRequest {
    pub user_id: UserId,
    pub gold_grams: Decimal,
    pub usd_equivalent: Decimal,
    pub reason: CreditReason,
    /// Same key for the same economic event, so a retried transition never
    /// credits twice.
    pub idempotency_key: String,
}

impl CreditRequest {
    pub fn idempotency_key(plan_id: &PlanId, reason: CreditReason, sequence: Option<u32>) -> String {
        let tag = match reason {
            CreditReason::DistributionPayout => "distribution",
            CreditReason::MaturityReturn => "maturity",
            CreditReason::EarlyTerminationPayout => "early-termination",
        };
        match sequence {
            Some(seq) => format!("{plan_id}:{tag}:{seq}"),
            None => format!("{plan_id}:{tag}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet rejected credit: {0}")]
    Rejected(String),
    #[error("wallet unreachable: {0}")]
    Unavailable(String),
}

impl From<WalletError> for PlanError {
    fn from(err: WalletError) -> Self {
        PlanError::WalletCredit(err.to_string())
    }
}

#[async_trait]
pub trait WalletCredit: Send + Sync {
    /// Credits gold to the holder; returns the wallet's receipt id.
    async fn credit(&self, request: CreditRequest) -> Result<String, WalletError>;
}

#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn is_approved(&self, plan_id: &PlanId) -> Result<bool, PlanError>;
}

#[derive(Default)]
struct WalletBook {
    receipts: HashMap<String, String>,
    credits: Vec<CreditRequest>,
    failing: bool,
    rejecting: bool,
}

/// Wallet double that records credits and honours idempotency keys.
#[derive(Default)]
pub struct InMemoryWallet {
    book: Mutex<WalletBook>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every credit after this call fails until re-enabled.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut book) = self.book.lock() {
            book.failing = failing;
        }
    }

    /// Every credit after this call is refused outright until re-enabled.
    pub fn set_rejecting(&self, rejecting: bool) {
        if let Ok(mut book) = self.book.lock() {
            book.rejecting = rejecting;
        }
    }

    pub fn credits(&self) -> Vec<CreditRequest> {
        self.book.lock().map(|b| b.credits.clone()).unwrap_or_default()
    }

    pub fn balance_grams(&self, user_id: &str) -> Decimal {
        self.credits()
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.gold_grams)
            .sum()
    }
}

#[async_trait]
impl WalletCredit for InMemoryWallet {
    async fn credit(&self, request: CreditRequest) -> Result<String, WalletError> {
        let mut book = self
            .book
            .lock()
            .map_err(|_| WalletError::Unavailable("wallet book poisoned".to_string()))?;
        if book.failing {
            return Err(WalletError::Unavailable("wallet offline".to_string()));
        }
        if book.rejecting {
            return Err(WalletError::Rejected("account closed".to_string()));
        }
        if let Some(receipt) = book.receipts.get(&request.idempotency_key) {
            return Ok(receipt.clone());
        }
        let receipt = format!("rcpt-{:06}", book.credits.len() + 1);
        book.receipts.insert(request.idempotency_key.clone(), receipt.clone());
        book.credits.push(request);
        Ok(receipt)
    }
}

/// Approval gate backed by an explicit allow list, or open to every plan.
pub struct StaticApprovalGate {
    allow_all: bool,
    approved: Mutex<HashSet<PlanId>>,
}

impl StaticApprovalGate {
    pub fn allow_all() -> Self {
        Self {
            allow_all: true,
            approved: Mutex::new(HashSet::new()),
        }
    }

    pub fn allow_list() -> Self {
        Self {
            allow_all: false,
            approved: Mutex::new(HashSet::new()),
        }
    }

    pub fn approve(&self, plan_id: PlanId) {
        if let Ok(mut approved) = self.approved.lock() {
            approved.insert(plan_id);
        }
    }
}

#[async_trait]
impl ApprovalGate for StaticApprovalGate {
    async fn is_approved(&self, plan_id: &PlanId) -> Result<bool, PlanError> {
        if self.allow_all {
            return Ok(true);
        }
        self.approved
            .lock()
            .map(|approved| approved.contains(plan_id))
            .map_err(|_| PlanError::Storage("approval list poisoned".to_string()))
    }
}
