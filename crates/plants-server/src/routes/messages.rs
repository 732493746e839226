use axum::{
    extract::{Query, State},
    Json,
};
use plants_core::store::{Message, MESSAGE_PAGE};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    pub plant_id: Option<String>,
    pub limit: Option<u32>,
}

/// GET /api/messages?plant_id=&limit=
///
/// Newest first. Filtering by a plant the caller does not own is a 404.
pub async fn list_messages(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Message>>, AppError> {
    let limit = query.limit.unwrap_or(MESSAGE_PAGE).clamp(1, MESSAGE_PAGE);
    let user_id = user.id.clone();
    let messages = app
        .with_store(move |s| {
            if let Some(pid) = &query.plant_id {
                s.get_user_plant(&user_id, pid)?;
            }
            s.list_messages(&user_id, query.plant_id.as_deref(), limit)
        })
        .await?;
    Ok(Json(messages))
}
