use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bujo_core::error::CoreError;
use bujo_events::RegistryError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`RegistryError`] for
/// subscription failures. Implements [`IntoResponse`] to produce consistent
/// JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `bujo_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A subscription could not be claimed.
    #[error(transparent)]
    Subscription(#[from] RegistryError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            },

            // --- Subscription errors ---
            AppError::Subscription(err) => {
                let (status, code) = match err {
                    RegistryError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                    RegistryError::AlreadyStreaming(_) => {
                        (StatusCode::CONFLICT, "ALREADY_STREAMING")
                    }
                    RegistryError::Closed(_) => (StatusCode::GONE, "SUBSCRIPTION_CLOSED"),
                    RegistryError::AlreadyRegistered(_) => (StatusCode::CONFLICT, "CONFLICT"),
                };
                (status, code, err.to_string())
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
