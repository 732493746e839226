use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use plants_core::PlantsError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit status codes
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP status through the `anyhow::Error` chain for
/// failures that have no `PlantsError` variant.
#[derive(Debug)]
struct StatusError {
    status: StatusCode,
    message: String,
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StatusError {}

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn with_status(status: StatusCode, msg: impl Into<String>) -> Self {
        Self(
            StatusError {
                status,
                message: msg.into(),
            }
            .into(),
        )
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::CONFLICT, msg)
    }

    /// A feature the deployment has not configured.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::with_status(StatusCode::SERVICE_UNAVAILABLE, msg)
    }

    fn status(&self) -> StatusCode {
        if let Some(s) = self.0.downcast_ref::<StatusError>() {
            return s.status;
        }
        let Some(e) = self.0.downcast_ref::<PlantsError>() else {
            return StatusCode::INTERNAL_SERVER_ERROR;
        };
        match e {
            PlantsError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            PlantsError::UserNotFound(_)
            | PlantsError::PlantNotFound(_)
            | PlantsError::SpeciesNotFound(_)
            | PlantsError::ClaimTokenNotFound(_)
            | PlantsError::MessageNotFound(_)
            | PlantsError::JobNotFound(_) => StatusCode::NOT_FOUND,
            PlantsError::ClaimTokenRedeemed(_) => StatusCode::CONFLICT,
            PlantsError::PlanLimitReached { .. } => StatusCode::PAYMENT_REQUIRED,
            PlantsError::InvalidValue { .. } | PlantsError::InvalidPhone(_) => StatusCode::BAD_REQUEST,
            PlantsError::Unauthorized(_) | PlantsError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            PlantsError::Messaging(_) | PlantsError::Billing(_) => StatusCode::BAD_GATEWAY,
            PlantsError::JobDb(_)
            | PlantsError::Io(_)
            | PlantsError::Yaml(_)
            | PlantsError::Json(_)
            | PlantsError::Sql(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
