//! HMAC-SHA256 signatures for webhooks and session tokens.
//!
//! * Plain body signatures: lowercase hex, optionally prefixed `sha256=`.
//! * Stripe: `t=<unix>,v1=<hex>` over `"{t}.{body}"`.
//! * Session tokens: `v1.<payload>.<sig>`, both parts URL-safe base64.

use crate::error::{PlantsError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SESSION_VERSION_V1: &str = "v1";
const MAX_SESSION_TOKEN_LEN: usize = 2048;

/// Stripe's default replay window.
pub const STRIPE_TOLERANCE_SECS: i64 = 300;

fn mac(secret: &[u8]) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret).map_err(|e| PlantsError::InvalidSignature(e.to_string()))
}

// ---------------------------------------------------------------------------
// Body signatures
// ---------------------------------------------------------------------------

pub fn sign_hex(secret: &[u8], body: &[u8]) -> Result<String> {
    let mut m = mac(secret)?;
    m.update(body);
    Ok(hex::encode(m.finalize().into_bytes()))
}

pub fn verify_hex(secret: &[u8], body: &[u8], signature: &str) -> Result<()> {
    let sig = signature.trim();
    let sig = sig.strip_prefix("sha256=").unwrap_or(sig);
    let expected = hex::decode(sig)
        .map_err(|_| PlantsError::InvalidSignature("signature is not hex".into()))?;
    let mut m = mac(secret)?;
    m.update(body);
    m.verify_slice(&expected)
        .map_err(|_| PlantsError::InvalidSignature("signature mismatch".into()))
}

// ---------------------------------------------------------------------------
// Stripe
// ---------------------------------------------------------------------------

pub fn sign_stripe(secret: &[u8], timestamp: i64, body: &[u8]) -> Result<String> {
    let mut m = mac(secret)?;
    m.update(format!("{timestamp}.").as_bytes());
    m.update(body);
    Ok(format!(
        "t={timestamp},v1={}",
        hex::encode(m.finalize().into_bytes())
    ))
}

pub fn verify_stripe(secret: &[u8], header: &str, body: &[u8], now_unix: i64) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse().ok(),
            Some(("v1", v)) => candidates.push(v.to_string()),
            _ => {}
        }
    }
    let Some(ts) = timestamp else {
        return Err(PlantsError::InvalidSignature("missing timestamp".into()));
    };
    if (now_unix - ts).abs() > STRIPE_TOLERANCE_SECS {
        return Err(PlantsError::InvalidSignature(
            "timestamp outside tolerance".into(),
        ));
    }
    for candidate in &candidates {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let mut m = mac(secret)?;
        m.update(format!("{ts}.").as_bytes());
        m.update(body);
        if m.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }
    Err(PlantsError::InvalidSignature("no matching v1 signature".into()))
}

// ---------------------------------------------------------------------------
// Session tokens
// ---------------------------------------------------------------------------

/// Claims carried by a session token minted by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Expiry, unix seconds.
    pub exp: i64,
}

pub fn mint_session(secret: &[u8], claims: &SessionClaims) -> Result<String> {
    let payload = serde_json::to_vec(claims)?;
    let payload_part = URL_SAFE_NO_PAD.encode(payload);
    let mut m = mac(secret)?;
    m.update(payload_part.as_bytes());
    let sig_part = URL_SAFE_NO_PAD.encode(m.finalize().into_bytes());
    Ok(format!("{SESSION_VERSION_V1}.{payload_part}.{sig_part}"))
}

pub fn verify_session(secret: &[u8], token: &str, now_unix: i64) -> Result<SessionClaims> {
    if token.len() > MAX_SESSION_TOKEN_LEN {
        return Err(PlantsError::Unauthorized("session token too long".into()));
    }
    let mut parts = token.split('.');
    let (Some(version), Some(payload_part), Some(sig_part), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(PlantsError::Unauthorized("malformed session token".into()));
    };
    if version != SESSION_VERSION_V1 {
        return Err(PlantsError::Unauthorized(
            "unsupported session token version".into(),
        ));
    }

    let expected = URL_SAFE_NO_PAD
        .decode(sig_part)
        .map_err(|_| PlantsError::Unauthorized("malformed session signature".into()))?;
    let mut m = mac(secret)?;
    m.update(payload_part.as_bytes());
    m.verify_slice(&expected)
        .map_err(|_| PlantsError::Unauthorized("session signature mismatch".into()))?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_part)
        .map_err(|_| PlantsError::Unauthorized("malformed session payload".into()))?;
    let claims: SessionClaims = serde_json::from_slice(&payload)
        .map_err(|_| PlantsError::Unauthorized("malformed session payload".into()))?;
    if claims.exp <= now_unix {
        return Err(PlantsError::Unauthorized("session expired".into()));
    }
    if claims.sub.trim().is_empty() {
        return Err(PlantsError::Unauthorized("session has no subject".into()));
    }
    Ok(claims)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test";

    #[test]
    fn hex_signature_round_trip_and_prefix() {
        let body = br#"{"from":"whatsapp:+15551234567","body":"watered"}"#;
        let sig = sign_hex(SECRET, body).unwrap();
        verify_hex(SECRET, body, &sig).unwrap();
        verify_hex(SECRET, body, &format!("sha256={sig}")).unwrap();
    }

    #[test]
    fn hex_signature_rejects_tampering() {
        let sig = sign_hex(SECRET, b"original").unwrap();
        assert!(verify_hex(SECRET, b"tampered", &sig).is_err());
        assert!(verify_hex(SECRET, b"original", "not-hex").is_err());
        assert!(verify_hex(b"other", b"original", &sig).is_err());
    }

    #[test]
    fn stripe_signature_within_tolerance() {
        let body = br#"{"id":"evt_1"}"#;
        let header = sign_stripe(SECRET, 1_700_000_000, body).unwrap();
        verify_stripe(SECRET, &header, body, 1_700_000_100).unwrap();
    }

    #[test]
    fn stripe_signature_rejects_replay_and_mismatch() {
        let body = br#"{"id":"evt_1"}"#;
        let header = sign_stripe(SECRET, 1_700_000_000, body).unwrap();
        assert!(verify_stripe(SECRET, &header, body, 1_700_000_301).is_err());
        assert!(verify_stripe(SECRET, &header, b"{}", 1_700_000_000).is_err());
        assert!(verify_stripe(SECRET, "v1=abcd", body, 1_700_000_000).is_err());
    }

    #[test]
    fn stripe_accepts_any_matching_v1() {
        let body = b"payload";
        let good = sign_stripe(SECRET, 42, body).unwrap();
        let v1 = good.split_once(",v1=").unwrap().1;
        let header = format!("t=42,v1=deadbeef,v1={v1}");
        verify_stripe(SECRET, &header, body, 42).unwrap();
    }

    fn claims(exp: i64) -> SessionClaims {
        SessionClaims {
            sub: "user_123".into(),
            email: Some("sam@example.com".into()),
            name: None,
            exp,
        }
    }

    #[test]
    fn session_round_trip() {
        let token = mint_session(SECRET, &claims(2_000)).unwrap();
        let back = verify_session(SECRET, &token, 1_000).unwrap();
        assert_eq!(back, claims(2_000));
    }

    #[test]
    fn session_rejects_expired_and_forged() {
        let token = mint_session(SECRET, &claims(2_000)).unwrap();
        assert!(matches!(
            verify_session(SECRET, &token, 2_000),
            Err(PlantsError::Unauthorized(_))
        ));
        assert!(verify_session(b"wrong", &token, 1_000).is_err());
        assert!(verify_session(SECRET, "v1.abc", 1_000).is_err());
        let v2 = token.replacen("v1.", "v2.", 1);
        assert!(verify_session(SECRET, &v2, 1_000).is_err());
    }
}
