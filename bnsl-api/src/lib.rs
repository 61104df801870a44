pub mod error;
pub mod metrics;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bnsl_lifecycle::LifecycleController;
use bnsl_settlement::portfolio::PortfolioSummary;
use bnsl_types::{EarlyTerminationSettlement, PlanError, PlanId, PlanSnapshot};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use error::ApiError;
pub use metrics::ApiMetrics;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<LifecycleController>,
    pub metrics: Arc<ApiMetrics>,
    pub clock: Clock,
}

impl AppState {
    pub fn new(controller: Arc<LifecycleController>) -> Self {
        Self {
            controller,
            metrics: Arc::new(ApiMetrics::new()),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn observe<T>(&self, action: &str, result: Result<T, PlanError>) -> Result<T, ApiError> {
        match result {
            Ok(value) => {
                self.metrics.observe(action, "ok");
                Ok(value)
            }
            Err(e) => {
                self.metrics.observe(action, e.code());
                Err(ApiError(e))
            }
        }
    }
}

/// Amounts travel as decimal strings, e.g. `"gold_grams": "100.5"`.
#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub user_id: String,
    pub gold_grams: Decimal,
    pub tenor_months: u32,
}

#[derive(Debug, Deserialize)]
pub struct TerminateRequest {
    pub requested_by: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DistributionRunResponse {
    pub paid: Vec<u32>,
    pub plan: PlanSnapshot,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/plans", post(create_plan))
        .route("/plans/:id", get(get_plan))
        .route("/plans/:id/activate", post(activate_plan))
        .route("/plans/:id/distributions", post(process_distributions))
        .route("/plans/:id/mature", post(mature_plan))
        .route("/plans/:id/termination-quote", get(termination_quote))
        .route("/plans/:id/terminate", post(terminate_plan))
        .route("/users/:user_id/portfolio", get(portfolio))
        .route("/metrics", get(metrics))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(state: AppState, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("API listening on {}", addr);
    axum::serve(listener, router(state)).await
}

async fn root() -> &'static str {
    "BNSL plan service v0.1"
}

fn plan_id(raw: &str) -> Result<PlanId, ApiError> {
    raw.parse().map_err(ApiError)
}

async fn create_plan(
    State(state): State<AppState>,
    Json(req): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<PlanSnapshot>), ApiError> {
    let result = state
        .controller
        .create_plan(&req.user_id, req.gold_grams, req.tenor_months, state.now())
        .await;
    let plan = state.observe("create", result)?;
    Ok((StatusCode::CREATED, Json(plan.snapshot())))
}

async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlanSnapshot>, ApiError> {
    let id = plan_id(&id)?;
    Ok(Json(state.controller.snapshot(id).await?))
}

async fn activate_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlanSnapshot>, ApiError> {
    let id = plan_id(&id)?;
    let result = state.controller.activate(id, state.now()).await;
    Ok(Json(state.observe("activate", result)?.snapshot()))
}

async fn process_distributions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DistributionRunResponse>, ApiError> {
    let id = plan_id(&id)?;
    let result = state.controller.process_due_distributions(id, state.now()).await;
    let run = state.observe("distribute", result)?;
    Ok(Json(DistributionRunResponse {
        paid: run.paid,
        plan: run.plan.snapshot(),
    }))
}

async fn mature_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PlanSnapshot>, ApiError> {
    let id = plan_id(&id)?;
    let result = state.controller.mature_plan(id, state.now()).await;
    Ok(Json(state.observe("mature", result)?.snapshot()))
}

async fn termination_quote(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EarlyTerminationSettlement>, ApiError> {
    let id = plan_id(&id)?;
    Ok(Json(state.controller.quote_early_termination(id, state.now()).await?))
}

async fn terminate_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<TerminateRequest>,
) -> Result<Json<PlanSnapshot>, ApiError> {
    let id = plan_id(&id)?;
    let result = state
        .controller
        .terminate_early(id, state.now(), &req.requested_by)
        .await;
    Ok(Json(state.observe("terminate", result)?.snapshot()))
}

async fn portfolio(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PortfolioSummary>, ApiError> {
    Ok(Json(state.controller.portfolio(&user_id).await?))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

#[cfg(test)]
mod tests;
