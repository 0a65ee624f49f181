use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::db::registrations::token_prefix;
use crate::db::RegistrationStore;
use crate::error::RegistrationError;
use crate::models::RegisterRequest;

#[derive(Debug, Serialize, PartialEq)]
pub struct RegisterResponse {
    pub success: bool,
}

pub async fn register_device(
    store: &dyn RegistrationStore,
    request: RegisterRequest,
    now: DateTime<Utc>,
) -> Result<RegisterResponse, RegistrationError> {
    let update = request.normalize()?;

    store.upsert(&update.token, &update.locations, now).await?;

    if update.locations.is_empty() {
        info!("Unregistered device {}", token_prefix(&update.token));
    } else {
        info!(
            "Registered device {} with {} location(s)",
            token_prefix(&update.token),
            update.locations.len()
        );
    }

    Ok(RegisterResponse { success: true })
}
