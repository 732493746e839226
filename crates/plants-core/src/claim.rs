//! Claim tokens printed on QR stickers.

use crate::error::{PlantsError, Result};
use qrcode::render::{svg, unicode};
use qrcode::QrCode;

pub const TOKEN_LEN: usize = 24;

/// Generate a random alphanumeric claim token.
pub fn generate_token() -> String {
    use rand::{distributions::Alphanumeric, Rng};
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

pub fn validate_token_format(token: &str) -> Result<()> {
    if token.len() != TOKEN_LEN || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(PlantsError::ClaimTokenNotFound(token.to_string()));
    }
    Ok(())
}

pub fn claim_url(base_url: &str, token: &str) -> String {
    format!("{}/claim/{token}", base_url.trim_end_matches('/'))
}

/// SVG sticker artwork for a claim URL.
pub fn qr_svg(url: &str) -> Result<String> {
    let code = QrCode::new(url.as_bytes()).map_err(|e| PlantsError::invalid("qr payload", e.to_string()))?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build())
}

/// Terminal rendering, used by `plants tokens mint --qr`.
pub fn qr_unicode(url: &str) -> Result<String> {
    let code = QrCode::new(url.as_bytes()).map_err(|e| PlantsError::invalid("qr payload", e.to_string()))?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Dark)
        .light_color(unicode::Dense1x2::Light)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_valid_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        validate_token_format(&a).unwrap();
        validate_token_format(&b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_tokens_are_not_found() {
        assert!(validate_token_format("short").is_err());
        assert!(validate_token_format(&"a-".repeat(12)).is_err());
    }

    #[test]
    fn claim_url_trims_trailing_slash() {
        assert_eq!(
            claim_url("https://plants.example/", "abc"),
            "https://plants.example/claim/abc"
        );
    }

    #[test]
    fn svg_renders() {
        let svg = qr_svg("https://plants.example/claim/abc").unwrap();
        assert!(svg.contains("<svg"));
    }
}
