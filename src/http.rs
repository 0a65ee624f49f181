//! HTTP surface for device registration.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::RegistrationError;
use crate::models::RegisterRequest;
use crate::processor::registration::register_device;
use crate::processor::AlertContext;

pub fn build_router(state: Arc<AlertContext>) -> Router {
    Router::new()
        .route("/registerDevice", post(register_device_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

impl IntoResponse for RegistrationError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            RegistrationError::InvalidArgument(_) => {
                (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT")
            }
            RegistrationError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };
        let message = match &self {
            RegistrationError::InvalidArgument(msg) => msg.clone(),
            RegistrationError::Store(_) => "Failed to register device".to_string(),
        };
        (
            status,
            Json(json!({ "error": { "status": code, "message": message } })),
        )
            .into_response()
    }
}

/// Takes the raw body so malformed JSON maps onto the same error shape as
/// a missing field.
async fn register_device_handler(
    State(state): State<Arc<AlertContext>>,
    body: Bytes,
) -> Result<impl IntoResponse, RegistrationError> {
    let request: RegisterRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejected malformed registration body: {e}");
        RegistrationError::InvalidArgument(format!("Malformed request body: {e}"))
    })?;

    match register_device(state.registrations.as_ref(), request, Utc::now()).await {
        Ok(response) => Ok((StatusCode::OK, Json(response))),
        Err(e) => {
            if matches!(e, RegistrationError::Store(_)) {
                error!("Registration failed: {e}");
            }
            Err(e)
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}
