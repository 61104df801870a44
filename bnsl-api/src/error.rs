use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bnsl_types::PlanError;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Domain failure rendered as `{ "error": code, "message": text }`.
#[derive(Debug)]
pub struct ApiError(pub PlanError);

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PlanError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PlanError::NotFound(_) => StatusCode::NOT_FOUND,
            PlanError::AlreadyPaid { .. }
            | PlanError::DistributionForfeited { .. }
            | PlanError::DistributionNotDue { .. }
            | PlanError::IncompleteDistributions { .. }
            | PlanError::PrematureMaturity { .. }
            | PlanError::NotActive { .. }
            | PlanError::InvalidTransition { .. }
            | PlanError::NotApproved(_)
            | PlanError::ConcurrentModification { .. } => StatusCode::CONFLICT,
            PlanError::PriceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PlanError::WalletCredit(_) | PlanError::ApprovalUnavailable(_) => StatusCode::BAD_GATEWAY,
            PlanError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.0.code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
