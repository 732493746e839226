use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use plants_core::care::Schedule;
use plants_core::health::{report, HealthReport};
use plants_core::species::Species;
use plants_core::store::{Plant, PlantDetail, PlantUpdate, User};
use plants_core::types::{FeedbackKind, WateringSource};
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;
use crate::worker::schedule_reminder;

/// A plant as the API returns it: the stored row plus its species and the
/// schedule as of the request.
#[derive(Debug, Serialize)]
pub struct PlantView {
    #[serde(flatten)]
    pub plant: Plant,
    pub species: Species,
    pub last_watered: Option<DateTime<Utc>>,
    pub watering_count: u32,
    pub schedule: Schedule,
}

impl PlantView {
    pub fn new(detail: PlantDetail, owner: &User, now: DateTime<Utc>) -> Self {
        let schedule = detail.schedule(owner, now);
        Self {
            plant: detail.plant,
            species: detail.species,
            last_watered: detail.last_watered,
            watering_count: detail.watering_count,
            schedule,
        }
    }
}

/// Load one of the caller's plants with its schedule inputs.
pub(crate) async fn owned_detail(app: &AppState, user: &User, id: &str) -> Result<PlantDetail, AppError> {
    let (user_id, id) = (user.id.clone(), id.to_string());
    let detail = app
        .with_store(move |s| {
            s.get_user_plant(&user_id, &id)?;
            s.get_plant_detail(&id)
        })
        .await?;
    Ok(detail)
}

/// Queue the next reminder after anything that moves the schedule. Failure to
/// queue never fails the request; the daily sweep catches up.
pub(crate) async fn reschedule(app: &AppState, plant_id: &str) {
    if let Err(e) = schedule_reminder(app, plant_id, Utc::now()).await {
        tracing::warn!(plant_id, error = %e, "could not schedule reminder");
    }
}

// ---------------------------------------------------------------------------
// List / get
// ---------------------------------------------------------------------------

/// GET /api/plants
pub async fn list_plants(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<PlantView>>, AppError> {
    let user_id = user.id.clone();
    let details = app.with_store(move |s| s.list_plant_details(&user_id)).await?;
    let now = Utc::now();
    Ok(Json(
        details
            .into_iter()
            .map(|d| PlantView::new(d, &user, now))
            .collect(),
    ))
}

/// GET /api/plants/{id}
pub async fn get_plant(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<PlantView>, AppError> {
    let detail = owned_detail(&app, &user, &id).await?;
    Ok(Json(PlantView::new(detail, &user, Utc::now())))
}

// ---------------------------------------------------------------------------
// Update / archive
// ---------------------------------------------------------------------------

/// PATCH /api/plants/{id}
pub async fn update_plant(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<PlantUpdate>,
) -> Result<Json<PlantView>, AppError> {
    let (user_id, plant_id) = (user.id.clone(), id.clone());
    let detail = app
        .with_store(move |s| {
            s.update_plant(&user_id, &plant_id, &body, Utc::now())?;
            s.get_plant_detail(&plant_id)
        })
        .await?;
    reschedule(&app, &id).await;
    Ok(Json(PlantView::new(detail, &user, Utc::now())))
}

/// DELETE /api/plants/{id}
pub async fn archive_plant(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (user_id, plant_id) = (user.id.clone(), id.clone());
    app.with_store(move |s| s.archive_plant(&user_id, &plant_id, Utc::now()))
        .await?;
    Ok(Json(serde_json::json!({ "archived": true, "id": id })))
}

// ---------------------------------------------------------------------------
// Care events
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct WaterBody {
    /// Defaults to now. Future instants are rejected.
    #[serde(default)]
    pub at: Option<DateTime<Utc>>,
}

/// POST /api/plants/{id}/water
pub async fn water_plant(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<WaterBody>,
) -> Result<Json<PlantView>, AppError> {
    let now = Utc::now();
    let at = body.at.unwrap_or(now);
    if at > now + chrono::Duration::minutes(5) {
        return Err(AppError::bad_request("watering time is in the future"));
    }
    let (user_id, plant_id) = (user.id.clone(), id.clone());
    let detail = app
        .with_store(move |s| {
            s.get_user_plant(&user_id, &plant_id)?;
            s.record_watering(&plant_id, at, WateringSource::Web)?;
            s.get_plant_detail(&plant_id)
        })
        .await?;
    reschedule(&app, &id).await;
    Ok(Json(PlantView::new(detail, &user, now)))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackBody {
    pub kind: FeedbackKind,
}

/// POST /api/plants/{id}/feedback
pub async fn plant_feedback(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(body): Json<FeedbackBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (user_id, plant_id) = (user.id.clone(), id.clone());
    let kind = body.kind;
    let (bias, detail) = app
        .with_store(move |s| {
            s.get_user_plant(&user_id, &plant_id)?;
            let bias = s.record_feedback(&plant_id, kind, Utc::now())?;
            Ok((bias, s.get_plant_detail(&plant_id)?))
        })
        .await?;
    reschedule(&app, &id).await;
    Ok(Json(serde_json::json!({
        "moisture_bias": bias,
        "schedule": detail.schedule(&user, Utc::now()),
    })))
}

// ---------------------------------------------------------------------------
// Derived views
// ---------------------------------------------------------------------------

/// GET /api/plants/{id}/schedule
pub async fn plant_schedule(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Schedule>, AppError> {
    let detail = owned_detail(&app, &user, &id).await?;
    Ok(Json(detail.schedule(&user, Utc::now())))
}

/// GET /api/plants/{id}/health
pub async fn plant_health(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<HealthReport>, AppError> {
    let detail = owned_detail(&app, &user, &id).await?;
    let plant_id = id.clone();
    let waterings = app.with_store(move |s| s.list_waterings(&plant_id)).await?;
    let events: Vec<DateTime<Utc>> = waterings.iter().map(|w| w.watered_at).collect();
    let schedule = detail.schedule(&user, Utc::now());
    Ok(Json(report(
        &events,
        schedule.interval_days,
        schedule.status.days_overdue(),
    )))
}
