use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use plants_core::claim::{claim_url, validate_token_format};
use plants_core::personality::{render, MessageContext, MessageKind};
use plants_core::store::{RedeemOptions, User};
use plants_core::PlantsError;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::messaging::deliver;
use crate::routes::plants::{reschedule, PlantView};
use crate::state::AppState;
use crate::worker::queue_welcome;

/// GET /api/claim/{token}
///
/// Public: the landing page behind a sticker shows what the sticker is for
/// and whether it is still claimable. Who claimed it is never revealed.
pub async fn get_claim(
    State(app): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    validate_token_format(&token)?;
    let lookup = token.clone();
    let (claim, species) = app
        .with_store(move |s| {
            let claim = s.get_claim_token(&lookup)?;
            let species = claim
                .species_id
                .as_deref()
                .map(|id| s.get_species(id))
                .transpose()?;
            Ok((claim, species))
        })
        .await?;
    Ok(Json(serde_json::json!({
        "token": claim.token,
        "claimed": claim.is_redeemed(),
        "species": species,
        "claim_url": claim_url(&app.config.app.base_url, &token),
    })))
}

/// POST /api/claim/{token}
///
/// Creates the plant, burns the token, then queues the welcome message and
/// the first reminder.
pub async fn redeem_claim(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(token): Path<String>,
    Json(options): Json<RedeemOptions>,
) -> Result<(StatusCode, Json<PlantView>), AppError> {
    validate_token_format(&token)?;
    let limit = app.plan_limit(&user.id).await?;
    let user_id = user.id.clone();
    let now = Utc::now();
    let redeemed = app
        .with_store(move |s| {
            let plant = s.redeem_claim_token(&token, &user_id, &options, limit, now)?;
            s.get_plant_detail(&plant.id)
        })
        .await;
    let detail = match redeemed {
        Ok(d) => d,
        Err(e) => {
            if let Some(PlantsError::PlanLimitReached { .. }) = e.downcast_ref::<PlantsError>() {
                notify_plan_limit(&app, &user).await;
            }
            return Err(e.into());
        }
    };
    tracing::info!(user_id = %user.id, plant_id = %detail.plant.id, "claim token redeemed");

    queue_welcome(&app, &detail.plant.id).await?;
    reschedule(&app, &detail.plant.id).await;
    Ok((StatusCode::CREATED, Json(PlantView::new(detail, &user, now))))
}

/// Tell the owner on WhatsApp why the sticker did not work. Best effort.
async fn notify_plan_limit(app: &AppState, user: &User) {
    if user.phone.is_none() {
        return;
    }
    let ctx = MessageContext {
        owner: user.first_name(),
        ..Default::default()
    };
    let body = render(user.personality, MessageKind::PlanLimit, &ctx, 0);
    if let Err(e) = deliver(app, user, None, &body).await {
        tracing::warn!(user_id = %user.id, error = %e, "could not send plan limit notice");
    }
}
