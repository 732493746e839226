use axum::{extract::State, Json};
use plants_core::species::Species;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/species
pub async fn list_species(State(app): State<AppState>) -> Result<Json<Vec<Species>>, AppError> {
    let species = app.with_store(|s| s.list_species()).await?;
    Ok(Json(species))
}
