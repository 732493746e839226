//! Signed inbound webhooks.
//!
//! Every handler takes the raw body so the signature is checked over the exact
//! bytes that were sent, and only then parses it.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use chrono::Utc;
use plants_core::paths::normalize_phone;
use plants_core::signature::{verify_hex, verify_stripe};
use plants_core::store::{IdentityProfile, NewMessage};
use serde::Deserialize;
use serde_json::json;

use crate::billing::{
    apply_billing_change, parse_lemon_squeezy_event, parse_stripe_event, ApplyOutcome, BillingChange,
};
use crate::error::AppError;
use crate::state::AppState;
use crate::worker::queue_inbound;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::unauthorized(format!("missing {name} header")))
}

fn secret<'a>(value: &'a Option<String>, env: &str) -> Result<&'a [u8], AppError> {
    value
        .as_deref()
        .map(str::as_bytes)
        .ok_or_else(|| AppError::unavailable(format!("{env} is not set")))
}

// ---------------------------------------------------------------------------
// WhatsApp
// ---------------------------------------------------------------------------

/// Inbound WhatsApp message as relayed by the messaging provider. Twilio's
/// field names are accepted as aliases.
#[derive(Debug, Deserialize)]
pub struct InboundWhatsapp {
    #[serde(alias = "From")]
    pub from: String,
    #[serde(alias = "Body", default)]
    pub body: String,
    #[serde(alias = "MessageSid", default)]
    pub message_sid: Option<String>,
}

/// POST /webhooks/whatsapp
pub async fn whatsapp(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let key = secret(&app.secrets.webhook_secret, "PLANTS_WEBHOOK_SECRET")?;
    verify_hex(key, &body, header(&headers, "x-webhook-signature")?)?;
    let inbound: InboundWhatsapp =
        serde_json::from_slice(&body).map_err(|e| AppError::bad_request(format!("invalid payload: {e}")))?;

    let raw_from = inbound.from.trim();
    let phone = normalize_phone(raw_from.strip_prefix("whatsapp:").unwrap_or(raw_from))?;
    let now = Utc::now();
    let stored = app
        .with_store(move |s| {
            let Some(user) = s.find_user_by_phone(&phone)? else {
                return Ok(Err("unknown sender"));
            };
            if let Some(sid) = inbound.message_sid.as_deref() {
                if s.find_message_by_remote_sid(sid)?.is_some() {
                    return Ok(Err("duplicate"));
                }
            }
            let record = NewMessage::inbound(&user.id, inbound.body, inbound.message_sid);
            Ok(Ok(s.insert_message(&record, now)?))
        })
        .await?;

    match stored {
        Ok(message) => {
            let job = queue_inbound(&app, &message.id).await?;
            Ok(Json(json!({
                "status": "queued",
                "message_id": message.id,
                "job_id": job.id,
            })))
        }
        Err(reason) => {
            tracing::info!(reason, "ignored inbound whatsapp message");
            Ok(Json(json!({ "status": "ignored", "reason": reason })))
        }
    }
}

// ---------------------------------------------------------------------------
// Identity provider
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct IdentityEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: IdentityProfile,
}

/// POST /webhooks/identity
///
/// `user.created` and `user.updated` sync the profile; `user.deleted`
/// removes the user and everything they own.
pub async fn identity(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let key = secret(&app.secrets.webhook_secret, "PLANTS_WEBHOOK_SECRET")?;
    verify_hex(key, &body, header(&headers, "x-webhook-signature")?)?;
    let event: IdentityEvent =
        serde_json::from_slice(&body).map_err(|e| AppError::bad_request(format!("invalid payload: {e}")))?;

    let default_hour = app.config.reminders.default_hour;
    let now = Utc::now();
    let user_id = event.data.id.clone();
    let status = match event.kind.as_str() {
        "user.created" | "user.updated" => {
            let profile = event.data;
            app.with_store(move |s| s.upsert_user(&profile, default_hour, now))
                .await?;
            "synced"
        }
        "user.deleted" => {
            let id = user_id.clone();
            let deleted = app.with_store(move |s| s.delete_user(&id)).await?;
            if deleted {
                "deleted"
            } else {
                "unknown user"
            }
        }
        other => {
            tracing::debug!(kind = other, "ignored identity event");
            "ignored"
        }
    };
    tracing::info!(user_id = %user_id, kind = %event.kind, status, "identity event");
    Ok(Json(json!({ "status": status })))
}

// ---------------------------------------------------------------------------
// Billing
// ---------------------------------------------------------------------------

async fn apply(app: &AppState, change: Option<BillingChange>) -> Result<Json<serde_json::Value>, AppError> {
    let Some(change) = change else {
        return Ok(Json(json!({ "status": "ignored" })));
    };
    let now = Utc::now();
    let event_id = change.event_id.clone();
    let outcome = app
        .with_store(move |s| apply_billing_change(s, &change, now))
        .await?;
    let status = match &outcome {
        ApplyOutcome::Applied(_) => "applied",
        ApplyOutcome::Duplicate => "duplicate",
        ApplyOutcome::UnknownUser => "unknown user",
    };
    Ok(Json(json!({ "status": status, "event_id": event_id })))
}

/// POST /webhooks/stripe
pub async fn stripe(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let key = secret(&app.secrets.stripe_webhook_secret, "PLANTS_STRIPE_WEBHOOK_SECRET")?;
    verify_stripe(key, header(&headers, "stripe-signature")?, &body, Utc::now().timestamp())?;
    let change = parse_stripe_event(&body).map_err(|e| AppError::bad_request(e.to_string()))?;
    apply(&app, change).await
}

/// POST /webhooks/lemonsqueezy
pub async fn lemon_squeezy(
    State(app): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let key = secret(
        &app.secrets.lemon_squeezy_webhook_secret,
        "PLANTS_LEMON_SQUEEZY_WEBHOOK_SECRET",
    )?;
    verify_hex(key, &body, header(&headers, "x-signature")?)?;
    let change = parse_lemon_squeezy_event(&body).map_err(|e| AppError::bad_request(e.to_string()))?;
    apply(&app, change).await
}
