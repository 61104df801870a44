//! HTTP adapters for the wallet and approval services.

use async_trait::async_trait;
use bnsl_config::GatewayConfig;
use bnsl_lifecycle::{ApprovalGate, CreditRequest, WalletCredit, WalletError};
use bnsl_types::{PlanError, PlanId};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct CreditReceipt {
    receipt_id: String,
}

#[derive(Debug, Deserialize)]
struct ApprovalResponse {
    approved: bool,
}

fn client(config: &GatewayConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
}

fn join(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path)
}

/// Posts credits to `<wallet_url>/credits`. The idempotency key is also sent
/// as a header so the wallet can deduplicate replays.
pub struct HttpWalletCredit {
    client: Client,
    url: String,
}

impl HttpWalletCredit {
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: client(config)?,
            url: join(&config.wallet_url, "credits"),
        })
    }
}

#[async_trait]
impl WalletCredit for HttpWalletCredit {
    async fn credit(&self, request: CreditRequest) -> Result<String, WalletError> {
        let response = self
            .client
            .post(&self.url)
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| WalletError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(WalletError::Rejected(format!("{status}: {detail}")));
        }
        if !status.is_success() {
            return Err(WalletError::Unavailable(format!("wallet answered {status}")));
        }
        let receipt: CreditReceipt = response
            .json()
            .await
            .map_err(|e| WalletError::Unavailable(format!("unreadable receipt: {e}")))?;
        Ok(receipt.receipt_id)
    }
}

/// Asks `<approval_url>/approvals/<plan id>`. An unknown plan (404) or an
/// explicit `{"approved": false}` keeps the plan pending; an unreachable or
/// failing service is reported as `ApprovalUnavailable`.
pub struct HttpApprovalGate {
    client: Client,
    base: String,
}

impl HttpApprovalGate {
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: client(config)?,
            base: join(&config.approval_url, "approvals"),
        })
    }

    fn url_for(&self, plan_id: &PlanId) -> String {
        join(&self.base, &plan_id.to_string())
    }
}

fn approval_unavailable(plan_id: &PlanId, reason: String) -> PlanError {
    warn!("Approval service failed for plan {}: {}", plan_id, reason);
    PlanError::ApprovalUnavailable(reason)
}

#[async_trait]
impl ApprovalGate for HttpApprovalGate {
    async fn is_approved(&self, plan_id: &PlanId) -> Result<bool, PlanError> {
        let response = self
            .client
            .get(self.url_for(plan_id))
            .send()
            .await
            .map_err(|e| approval_unavailable(plan_id, e.to_string()))?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(approval_unavailable(plan_id, format!("approval service answered {status}")));
        }
        let body: ApprovalResponse = response
            .json()
            .await
            .map_err(|e| approval_unavailable(plan_id, format!("unreadable approval: {e}")))?;
        Ok(body.approved)
    }
}
