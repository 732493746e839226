use axum::{extract::State, Json};
use plants_core::config::MessagingConfig;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/health
pub async fn health(State(app): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let messaging = match &app.config.messaging {
        MessagingConfig::Log => "log",
        MessagingConfig::Twilio { .. } => "twilio",
    };
    let species = app.with_store(|s| Ok(s.list_species()?.len())).await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "name": app.config.app.name,
        "version": env!("CARGO_PKG_VERSION"),
        "messaging": messaging,
        "species": species,
    })))
}
