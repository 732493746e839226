use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use plants_core::signature::verify_session;
use plants_core::store::{IdentityProfile, User};

use crate::error::AppError;
use crate::state::AppState;

/// The signed-in owner, resolved from an `Authorization: Bearer <session>`
/// header. Session tokens are minted by the identity provider with the shared
/// session secret; the first request from a new subject creates the user.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, app: &AppState) -> Result<Self, Self::Rejection> {
        let Some(secret) = app.secrets.session_secret.clone() else {
            return Err(AppError::unavailable("sessions are not configured"));
        };
        let token = bearer_token(parts).ok_or_else(|| AppError::unauthorized("missing bearer token"))?;
        let claims = verify_session(secret.as_bytes(), token, chrono::Utc::now().timestamp())?;

        let profile = IdentityProfile {
            id: claims.sub,
            email: claims.email,
            display_name: claims.name,
            phone: None,
        };
        let default_hour = app.config.reminders.default_hour;
        let now = chrono::Utc::now();
        let user = app
            .with_store(move |s| s.upsert_user(&profile, default_hour, now))
            .await?;
        Ok(CurrentUser(user))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

/// Gates `/api/admin/*` behind the `X-Admin-Token` header. With no admin
/// token configured every admin request is refused.
pub async fn admin_middleware(State(app): State<AppState>, req: Request, next: Next) -> Response {
    let Some(expected) = app.secrets.admin_token.as_deref() else {
        return AppError::unavailable("admin token is not configured").into_response();
    };
    let provided = req
        .headers()
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        return AppError::unauthorized("invalid admin token").into_response();
    }
    next.run(req).await
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::LogMessenger;
    use crate::state::test_support::state_with;
    use axum::http::{header, StatusCode};
    use plants_core::signature::{mint_session, SessionClaims};
    use std::sync::Arc;

    fn parts_with(auth: Option<&str>) -> Parts {
        let mut builder = axum::http::Request::builder().uri("/api/me");
        if let Some(a) = auth {
            builder = builder.header(header::AUTHORIZATION, a);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn session(secret: &str, sub: &str, exp: i64) -> String {
        let claims = SessionClaims {
            sub: sub.into(),
            email: Some(format!("{sub}@example.com")),
            name: Some("Robin Fern".into()),
            exp,
        };
        mint_session(secret.as_bytes(), &claims).unwrap()
    }

    #[tokio::test]
    async fn valid_session_creates_user() {
        let (_dir, state) = state_with(Arc::new(LogMessenger));
        let token = session("test-session-secret", "u-1", chrono::Utc::now().timestamp() + 600);
        let mut parts = parts_with(Some(&format!("Bearer {token}")));

        let CurrentUser(user) = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(user.id, "u-1");
        assert_eq!(user.display_name.as_deref(), Some("Robin Fern"));
        assert_eq!(user.reminder_hour, state.config.reminders.default_hour);
    }

    #[tokio::test]
    async fn missing_or_bad_tokens_are_rejected() {
        let (_dir, state) = state_with(Arc::new(LogMessenger));

        let mut parts = parts_with(None);
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.err().unwrap();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);

        let forged = session("some-other-secret", "u-1", chrono::Utc::now().timestamp() + 600);
        let mut parts = parts_with(Some(&format!("Bearer {forged}")));
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.err().unwrap();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);

        let expired = session("test-session-secret", "u-1", chrono::Utc::now().timestamp() - 10);
        let mut parts = parts_with(Some(&format!("Bearer {expired}")));
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.err().unwrap();
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(bearer_token(&parts_with(Some("Bearer abc"))), Some("abc"));
        assert_eq!(bearer_token(&parts_with(Some("Basic abc"))), None);
        assert_eq!(bearer_token(&parts_with(Some("Bearer   "))), None);
    }

    #[test]
    fn constant_time_eq_compares_content_and_length() {
        assert!(constant_time_eq(b"token", b"token"));
        assert!(!constant_time_eq(b"token", b"tokem"));
        assert!(!constant_time_eq(b"token", b"token2"));
    }
}
