use axum::{extract::State, Json};
use chrono::Utc;
use plants_core::types::BillingProvider;
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::billing::{create_checkout, Checkout};
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/billing/subscription
pub async fn get_subscription(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = user.id.clone();
    let now = Utc::now();
    let (subscription, tier) = app
        .with_store(move |s| Ok((s.get_subscription(&user_id)?, s.effective_tier(&user_id, now)?)))
        .await?;
    let mut providers = Vec::new();
    if app.config.billing.stripe.is_some() {
        providers.push(BillingProvider::Stripe);
    }
    if app.config.billing.lemon_squeezy.is_some() {
        providers.push(BillingProvider::LemonSqueezy);
    }
    Ok(Json(serde_json::json!({
        "tier": tier,
        "subscription": subscription,
        "providers": providers,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub provider: BillingProvider,
}

/// POST /api/billing/checkout
pub async fn checkout(
    State(app): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<CheckoutBody>,
) -> Result<Json<Checkout>, AppError> {
    Ok(Json(create_checkout(&app, &user, body.provider).await?))
}
