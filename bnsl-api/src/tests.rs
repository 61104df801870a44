use super::*;
use axum::body::{to_bytes, Body};
use axum::http::Request;
use bnsl_config::PlatformConfig;
use bnsl_lifecycle::{InMemoryWallet, StaticApprovalGate};
use bnsl_oracles::FixedPriceOracle;
use bnsl_storage::InMemoryPlanLedger;
use bnsl_types::PlanStatus;
use chrono::TimeZone;
use rust_decimal_macros::dec;
use std::sync::Mutex;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    oracle: Arc<FixedPriceOracle>,
    today: Arc<Mutex<DateTime<Utc>>>,
}

impl TestApp {
    fn new() -> Self {
        let oracle = Arc::new(FixedPriceOracle::new(dec!(50)));
        let controller = Arc::new(LifecycleController::new(
            Arc::new(InMemoryPlanLedger::new()),
            oracle.clone(),
            Arc::new(InMemoryWallet::new()),
            Arc::new(StaticApprovalGate::allow_all()),
            Arc::new(PlatformConfig::default()),
        ));
        let today = Arc::new(Mutex::new(Utc.with_ymd_and_hms(2026, 1, 15, 9, 0, 0).unwrap()));
        let clock_source = today.clone();
        let state = AppState::new(controller)
            .with_clock(Arc::new(move || *clock_source.lock().unwrap()));
        Self {
            router: router(state),
            oracle,
            today,
        }
    }

    fn set_today(&self, y: i32, m: u32, d: u32) {
        *self.today.lock().unwrap() = Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap();
    }

    async fn call(&self, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => request
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn create(&self, grams: &str) -> PlanSnapshot {
        let (status, body) = self
            .call(
                "POST",
                "/plans",
                Some(serde_json::json!({ "user_id": "alice", "gold_grams": grams, "tenor_months": 12 })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        serde_json::from_slice(&body).unwrap()
    }
}

fn error_code(body: &[u8]) -> String {
    let value: serde_json::Value = serde_json::from_slice(body).unwrap();
    value["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn create_and_fetch_plan() {
    let app = TestApp::new();
    let created = app.create("100").await;
    assert_eq!(created.status, PlanStatus::Pending);
    assert_eq!(created.locked_in_price_per_gram, dec!(50));

    let (status, body) = app.call("GET", &format!("/plans/{}", created.id), None).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: PlanSnapshot = serde_json::from_slice(&body).unwrap();
    assert_eq!(fetched.id, created.id);
}

#[tokio::test]
async fn lookup_errors_map_to_status_codes() {
    let app = TestApp::new();

    let (status, body) = app.call("GET", "/plans/not-hex", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_input");

    let missing = PlanId([7u8; 32]);
    let (status, body) = app.call("POST", &format!("/plans/{missing}/activate"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "not_found");

    let (status, body) = app
        .call(
            "POST",
            "/plans",
            Some(serde_json::json!({ "user_id": "alice", "gold_grams": "100", "tenor_months": 7 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_input");
}

#[tokio::test]
async fn missing_price_is_service_unavailable() {
    let app = TestApp::new();
    app.oracle.go_offline();
    let (status, body) = app
        .call(
            "POST",
            "/plans",
            Some(serde_json::json!({ "user_id": "alice", "gold_grams": "100", "tenor_months": 12 })),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(error_code(&body), "price_unavailable");
}

#[test]
fn gateway_failures_are_bad_gateway() {
    for err in [
        PlanError::WalletCredit("wallet unreachable".to_string()),
        PlanError::ApprovalUnavailable("approval service answered 503".to_string()),
    ] {
        assert_eq!(ApiError(err).status(), StatusCode::BAD_GATEWAY);
    }
}

#[tokio::test]
async fn quote_is_refused_once_plan_matures() {
    let app = TestApp::new();
    let plan = app.create("100").await;
    let base = format!("/plans/{}", plan.id);
    let (status, _) = app.call("POST", &format!("{base}/activate"), None).await;
    assert_eq!(status, StatusCode::OK);

    app.set_today(2027, 1, 15);
    let (status, body) = app.call("GET", &format!("{base}/termination-quote"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_input");
}

#[tokio::test]
async fn plan_lifecycle_over_http() {
    let app = TestApp::new();
    let plan = app.create("100").await;
    let base = format!("/plans/{}", plan.id);

    let (status, body) = app.call("POST", &format!("{base}/activate"), None).await;
    assert_eq!(status, StatusCode::OK);
    let active: PlanSnapshot = serde_json::from_slice(&body).unwrap();
    assert_eq!(active.locked_principal_value_usd, Some(dec!(5000)));

    app.set_today(2026, 4, 15);
    let (status, body) = app.call("POST", &format!("{base}/distributions"), None).await;
    assert_eq!(status, StatusCode::OK);
    let run: DistributionRunResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(run.paid, vec![1]);

    let (status, _) = app.call("POST", &format!("{base}/mature"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    app.oracle.set_price(dec!(40));
    let (status, body) = app.call("GET", &format!("{base}/termination-quote"), None).await;
    assert_eq!(status, StatusCode::OK);
    let quote: EarlyTerminationSettlement = serde_json::from_slice(&body).unwrap();
    assert_eq!(quote.payout_usd, dec!(3620));

    let terminate = serde_json::json!({ "requested_by": "alice" });
    let (status, body) = app
        .call("POST", &format!("{base}/terminate"), Some(terminate.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    let closed: PlanSnapshot = serde_json::from_slice(&body).unwrap();
    assert_eq!(closed.status, PlanStatus::EarlyTerminated);

    let (status, body) = app.call("POST", &format!("{base}/terminate"), Some(terminate)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), "not_active");

    let (status, body) = app.call("GET", "/users/alice/portfolio", None).await;
    assert_eq!(status, StatusCode::OK);
    let summary: PortfolioSummary = serde_json::from_slice(&body).unwrap();
    assert_eq!(summary.early_terminated, 1);

    let (status, body) = app.call("GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("bnsl_plan_actions_total"));
    assert!(text.contains(r#"action="terminate",outcome="ok""#));
    assert!(text.contains(r#"action="terminate",outcome="not_active""#));
}
