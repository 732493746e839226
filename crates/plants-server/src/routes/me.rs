use axum::{extract::State, Json};
use chrono::Utc;
use plants_core::store::{ProfileUpdate, User};
use plants_core::types::PlanTier;
use serde::Serialize;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::routes::plants::reschedule;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MeView {
    #[serde(flatten)]
    pub user: User,
    pub tier: PlanTier,
    pub plant_count: u32,
    /// `None` when the plan is unlimited.
    pub plant_limit: Option<u32>,
}

async fn me_view(app: &AppState, user: User) -> Result<MeView, AppError> {
    let user_id = user.id.clone();
    let now = Utc::now();
    let (tier, plant_count) = app
        .with_store(move |s| Ok((s.effective_tier(&user_id, now)?, s.count_active_plants(&user_id)?)))
        .await?;
    let plant_limit = match tier {
        PlanTier::Free => Some(app.config.plans.free_plant_limit),
        PlanTier::Pro => None,
    };
    Ok(MeView {
        user,
        tier,
        plant_count,
        plant_limit,
    })
}

/// GET /api/me
pub async fn get_me(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<MeView>, AppError> {
    Ok(Json(me_view(&app, user).await?))
}

/// PUT /api/me
///
/// The whole body is validated before anything is written. Changing the
/// reminder hour, offset or hemisphere moves every plant's reminder, so all
/// plants are rescheduled afterwards.
pub async fn update_me(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<MeView>, AppError> {
    let user_id = user.id.clone();
    let now = Utc::now();
    let (updated, plant_ids) = app
        .with_store(move |s| {
            let updated = s.update_profile(&user_id, &body, now)?;
            let ids: Vec<String> = s.list_plants(&user_id)?.into_iter().map(|p| p.id).collect();
            Ok((updated, ids))
        })
        .await?;
    for id in &plant_ids {
        reschedule(&app, id).await;
    }
    Ok(Json(me_view(&app, updated).await?))
}
