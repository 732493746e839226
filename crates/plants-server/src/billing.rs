//! Payment processors.
//!
//! Both processors are reduced to the same shape: a checkout URL going out,
//! and a [`BillingChange`] coming back from their webhooks. Webhook events are
//! applied at most once per `(provider, event_id)`.

use chrono::{DateTime, TimeZone, Utc};
use plants_core::store::{BillingEventOutcome, SqliteStore, Subscription, SubscriptionUpdate, User};
use plants_core::types::{BillingProvider, SubscriptionStatus};
use plants_core::PlantsError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Checkout {
    pub provider: BillingProvider,
    pub url: String,
    /// Processor-side session id, when the processor creates one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Deserialize)]
struct StripeSession {
    id: String,
    url: Option<String>,
}

pub async fn create_checkout(
    state: &AppState,
    user: &User,
    provider: BillingProvider,
) -> Result<Checkout, AppError> {
    match provider {
        BillingProvider::Stripe => stripe_checkout(state, user).await,
        BillingProvider::LemonSqueezy => lemon_squeezy_checkout(state, user),
    }
}

async fn stripe_checkout(state: &AppState, user: &User) -> Result<Checkout, AppError> {
    let Some(cfg) = state.config.billing.stripe.as_ref() else {
        return Err(AppError::unavailable("stripe billing is not configured"));
    };
    let Some(secret_key) = state.secrets.stripe_secret_key.as_deref() else {
        return Err(AppError::unavailable("PLANTS_STRIPE_SECRET_KEY is not set"));
    };

    let url = format!("{}/v1/checkout/sessions", cfg.api_base.trim_end_matches('/'));
    let mut form: Vec<(&str, &str)> = vec![
        ("mode", "subscription"),
        ("line_items[0][price]", cfg.price_id.as_str()),
        ("line_items[0][quantity]", "1"),
        ("success_url", cfg.success_url.as_str()),
        ("cancel_url", cfg.cancel_url.as_str()),
        ("client_reference_id", user.id.as_str()),
        ("subscription_data[metadata][user_id]", user.id.as_str()),
    ];
    if let Some(email) = user.email.as_deref() {
        form.push(("customer_email", email));
    }

    let resp = state
        .http
        .post(&url)
        .bearer_auth(secret_key)
        .form(&form)
        .send()
        .await
        .map_err(|e| PlantsError::Billing(format!("stripe checkout: {e}")))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(PlantsError::Billing(format!("stripe checkout returned {status}: {body}")).into());
    }
    let session: StripeSession = resp
        .json()
        .await
        .map_err(|e| PlantsError::Billing(format!("stripe checkout: bad response: {e}")))?;
    let Some(checkout_url) = session.url else {
        return Err(PlantsError::Billing("stripe checkout session has no url".into()).into());
    };
    tracing::info!(user_id = %user.id, session_id = %session.id, "stripe checkout created");
    Ok(Checkout {
        provider: BillingProvider::Stripe,
        url: checkout_url,
        session_id: Some(session.id),
    })
}

fn lemon_squeezy_checkout(state: &AppState, user: &User) -> Result<Checkout, AppError> {
    let Some(cfg) = state.config.billing.lemon_squeezy.as_ref() else {
        return Err(AppError::unavailable("lemon squeezy billing is not configured"));
    };
    let base = format!(
        "https://{}.lemonsqueezy.com/checkout/buy/{}",
        cfg.store_slug, cfg.variant_id
    );
    let mut params = vec![("checkout[custom][user_id]", user.id.as_str())];
    if let Some(email) = user.email.as_deref() {
        params.push(("checkout[email]", email));
    }
    let url = reqwest::Url::parse_with_params(&base, &params)
        .map_err(|e| PlantsError::Billing(format!("lemon squeezy checkout url: {e}")))?;
    Ok(Checkout {
        provider: BillingProvider::LemonSqueezy,
        url: url.to_string(),
        session_id: None,
    })
}

// ---------------------------------------------------------------------------
// Webhook parsing
// ---------------------------------------------------------------------------

/// A subscription change reported by a processor webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingChange {
    pub provider: BillingProvider,
    pub event_id: String,
    pub event_type: String,
    /// Our user id when the processor echoed it back; otherwise the
    /// subscription is looked up by `external_id`.
    pub user_id: Option<String>,
    pub external_id: String,
    pub customer_id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
}

fn str_at<'a>(v: &'a Value, pointer: &str) -> Option<&'a str> {
    v.pointer(pointer).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Ids arrive as strings from Stripe and as numbers from Lemon Squeezy.
fn id_at(v: &Value, pointer: &str) -> Option<String> {
    match v.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn missing(field: &str) -> PlantsError {
    PlantsError::Billing(format!("webhook payload is missing {field}"))
}

pub fn stripe_status(raw: &str) -> Option<SubscriptionStatus> {
    match raw {
        "active" => Some(SubscriptionStatus::Active),
        "trialing" => Some(SubscriptionStatus::Trialing),
        "past_due" | "unpaid" | "incomplete" => Some(SubscriptionStatus::PastDue),
        "canceled" | "incomplete_expired" => Some(SubscriptionStatus::Canceled),
        _ => None,
    }
}

pub fn lemon_squeezy_status(raw: &str) -> Option<SubscriptionStatus> {
    match raw {
        "active" => Some(SubscriptionStatus::Active),
        "on_trial" => Some(SubscriptionStatus::Trialing),
        "past_due" | "unpaid" | "paused" => Some(SubscriptionStatus::PastDue),
        "cancelled" | "expired" => Some(SubscriptionStatus::Canceled),
        _ => None,
    }
}

/// Parse a Stripe event. Event types we do not act on yield `Ok(None)`.
pub fn parse_stripe_event(body: &[u8]) -> plants_core::Result<Option<BillingChange>> {
    let event: Value = serde_json::from_slice(body)?;
    let event_id = str_at(&event, "/id").ok_or_else(|| missing("id"))?.to_string();
    let event_type = str_at(&event, "/type").ok_or_else(|| missing("type"))?.to_string();
    let object = event.pointer("/data/object").ok_or_else(|| missing("data.object"))?;

    let change = match event_type.as_str() {
        "checkout.session.completed" => {
            if str_at(object, "/mode") != Some("subscription") {
                return Ok(None);
            }
            BillingChange {
                provider: BillingProvider::Stripe,
                event_id,
                user_id: str_at(object, "/client_reference_id")
                    .or_else(|| str_at(object, "/metadata/user_id"))
                    .map(str::to_string),
                external_id: str_at(object, "/subscription")
                    .ok_or_else(|| missing("subscription"))?
                    .to_string(),
                customer_id: str_at(object, "/customer").map(str::to_string),
                status: SubscriptionStatus::Active,
                current_period_end: None,
                event_type: event_type.clone(),
            }
        }
        "customer.subscription.created"
        | "customer.subscription.updated"
        | "customer.subscription.deleted" => {
            let status = if event_type == "customer.subscription.deleted" {
                SubscriptionStatus::Canceled
            } else {
                let raw = str_at(object, "/status").ok_or_else(|| missing("status"))?;
                match stripe_status(raw) {
                    Some(s) => s,
                    None => {
                        tracing::debug!(status = raw, "ignoring stripe subscription status");
                        return Ok(None);
                    }
                }
            };
            let period_end = object
                .pointer("/current_period_end")
                .and_then(Value::as_i64)
                .and_then(|t| Utc.timestamp_opt(t, 0).single());
            BillingChange {
                provider: BillingProvider::Stripe,
                event_id,
                user_id: str_at(object, "/metadata/user_id").map(str::to_string),
                external_id: str_at(object, "/id").ok_or_else(|| missing("subscription id"))?.to_string(),
                customer_id: str_at(object, "/customer").map(str::to_string),
                status,
                current_period_end: period_end,
                event_type: event_type.clone(),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(change))
}

/// Parse a Lemon Squeezy subscription webhook. Lemon Squeezy sends no event
/// id, so one is derived from the event name, subscription id and its
/// `updated_at` stamp.
pub fn parse_lemon_squeezy_event(body: &[u8]) -> plants_core::Result<Option<BillingChange>> {
    let event: Value = serde_json::from_slice(body)?;
    let event_type = str_at(&event, "/meta/event_name")
        .ok_or_else(|| missing("meta.event_name"))?
        .to_string();
    if !matches!(
        event_type.as_str(),
        "subscription_created"
            | "subscription_updated"
            | "subscription_cancelled"
            | "subscription_expired"
            | "subscription_resumed"
    ) {
        return Ok(None);
    }

    let external_id = id_at(&event, "/data/id").ok_or_else(|| missing("data.id"))?;
    let attributes = event
        .pointer("/data/attributes")
        .ok_or_else(|| missing("data.attributes"))?;
    let raw_status = str_at(attributes, "/status").ok_or_else(|| missing("status"))?;
    let Some(status) = lemon_squeezy_status(raw_status) else {
        tracing::debug!(status = raw_status, "ignoring lemon squeezy subscription status");
        return Ok(None);
    };
    let period_field = if status == SubscriptionStatus::Canceled {
        "/ends_at"
    } else {
        "/renews_at"
    };
    let current_period_end = str_at(attributes, period_field)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc));
    let updated_at = str_at(attributes, "/updated_at").unwrap_or("");

    Ok(Some(BillingChange {
        provider: BillingProvider::LemonSqueezy,
        event_id: format!("{event_type}:{external_id}:{updated_at}"),
        user_id: str_at(&event, "/meta/custom_data/user_id").map(str::to_string),
        customer_id: id_at(attributes, "/customer_id"),
        external_id,
        status,
        current_period_end,
        event_type,
    }))
}

// ---------------------------------------------------------------------------
// Applying changes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied(Subscription),
    /// The event id was seen before.
    Duplicate,
    /// Neither the payload nor an existing subscription names a known user.
    UnknownUser,
}

pub fn apply_billing_change(
    store: &mut SqliteStore,
    change: &BillingChange,
    now: DateTime<Utc>,
) -> plants_core::Result<ApplyOutcome> {
    let user_id = match &change.user_id {
        Some(id) => Some(id.clone()),
        None => store
            .find_subscription_by_external(change.provider, &change.external_id)?
            .map(|s| s.user_id),
    };
    let user_id = match user_id {
        Some(id) => match store.get_user(&id) {
            Ok(_) => Some(id),
            Err(PlantsError::UserNotFound(_)) => None,
            Err(e) => return Err(e),
        },
        None => None,
    };

    let update = user_id.map(|user_id| SubscriptionUpdate {
        user_id,
        provider: change.provider,
        external_id: change.external_id.clone(),
        customer_id: change.customer_id.clone(),
        status: change.status,
        current_period_end: change.current_period_end,
    });
    match store.record_billing_event(change.provider, &change.event_id, update.as_ref(), now)? {
        BillingEventOutcome::Duplicate => {
            tracing::debug!(provider = %change.provider, event_id = %change.event_id, "duplicate billing event");
            Ok(ApplyOutcome::Duplicate)
        }
        BillingEventOutcome::Recorded => {
            tracing::warn!(
                provider = %change.provider,
                event_id = %change.event_id,
                external_id = %change.external_id,
                "billing event for unknown user"
            );
            Ok(ApplyOutcome::UnknownUser)
        }
        BillingEventOutcome::Applied(sub) => Ok(ApplyOutcome::Applied(sub)),
    }
}
