use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use plants_core::claim::{claim_url, qr_svg, validate_token_format};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MintBody {
    pub count: u32,
    #[serde(default)]
    pub species_id: Option<String>,
    #[serde(default)]
    pub batch: Option<String>,
}

/// POST /api/admin/claim-tokens
pub async fn mint_tokens(
    State(app): State<AppState>,
    Json(body): Json<MintBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let now = Utc::now();
    let tokens = app
        .with_store(move |s| {
            s.mint_claim_tokens(body.count, body.species_id.as_deref(), body.batch.as_deref(), now)
        })
        .await?;
    let base = &app.config.app.base_url;
    let list: Vec<serde_json::Value> = tokens
        .iter()
        .map(|t| {
            serde_json::json!({
                "token": t.token,
                "species_id": t.species_id,
                "batch": t.batch,
                "claim_url": claim_url(base, &t.token),
                "qr_svg": format!("/api/admin/claim-tokens/{}/qr.svg", t.token),
            })
        })
        .collect();
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "tokens": list }))))
}

/// GET /api/admin/claim-tokens/{token}/qr.svg
pub async fn token_qr(
    State(app): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    validate_token_format(&token)?;
    let lookup = token.clone();
    app.with_store(move |s| s.get_claim_token(&lookup)).await?;
    let svg = qr_svg(&claim_url(&app.config.app.base_url, &token))?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg))
}
