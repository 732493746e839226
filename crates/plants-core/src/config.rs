use crate::error::{PlantsError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// AppConfig / ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Public origin used to build claim URLs printed on stickers.
    pub base_url: String,
}

fn default_app_name() -> String {
    "Text From Your Plants".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// RemindersConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    /// Local hour reminders go out for users who never picked one.
    #[serde(default = "default_hour")]
    pub default_hour: u32,
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
    /// UTC hour of the daily catch-up sweep.
    #[serde(default = "default_sweep_hour")]
    pub daily_sweep_hour: u32,
    #[serde(default = "default_overdue_nudge_days")]
    pub overdue_nudge_days: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_seconds")]
    pub retry_base_seconds: u64,
}

fn default_hour() -> u32 {
    9
}

fn default_tick_seconds() -> u64 {
    15
}

fn default_sweep_hour() -> u32 {
    8
}

fn default_overdue_nudge_days() -> u32 {
    2
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_seconds() -> u64 {
    30
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            default_hour: default_hour(),
            tick_seconds: default_tick_seconds(),
            daily_sweep_hour: default_sweep_hour(),
            overdue_nudge_days: default_overdue_nudge_days(),
            max_attempts: default_max_attempts(),
            retry_base_seconds: default_retry_base_seconds(),
        }
    }
}

// ---------------------------------------------------------------------------
// PlansConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlansConfig {
    #[serde(default = "default_free_plant_limit")]
    pub free_plant_limit: u32,
}

fn default_free_plant_limit() -> u32 {
    2
}

impl Default for PlansConfig {
    fn default() -> Self {
        Self {
            free_plant_limit: default_free_plant_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// MessagingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum MessagingConfig {
    /// Messages are written to the log and recorded, never sent.
    Log,
    Twilio {
        account_sid: String,
        /// Sender number in E.164, without the `whatsapp:` prefix.
        whatsapp_from: String,
        #[serde(default = "default_conversations_api")]
        api_base: String,
        #[serde(default = "default_messages_api")]
        messages_api_base: String,
    },
}

fn default_conversations_api() -> String {
    "https://conversations.twilio.com".to_string()
}

fn default_messages_api() -> String {
    "https://api.twilio.com".to_string()
}

impl Default for MessagingConfig {
    fn default() -> Self {
        MessagingConfig::Log
    }
}

// ---------------------------------------------------------------------------
// BillingConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeConfig {
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    #[serde(default = "default_stripe_api")]
    pub api_base: String,
}

fn default_stripe_api() -> String {
    "https://api.stripe.com".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LemonSqueezyConfig {
    pub store_slug: String,
    pub variant_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe: Option<StripeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lemon_squeezy: Option<LemonSqueezyConfig>,
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Credentials read from the environment. Never serialized to disk.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub session_secret: Option<String>,
    pub admin_token: Option<String>,
    pub webhook_secret: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub lemon_squeezy_webhook_secret: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }
        Self {
            session_secret: var("PLANTS_SESSION_SECRET"),
            admin_token: var("PLANTS_ADMIN_TOKEN"),
            webhook_secret: var("PLANTS_WEBHOOK_SECRET"),
            twilio_auth_token: var("PLANTS_TWILIO_AUTH_TOKEN"),
            stripe_secret_key: var("PLANTS_STRIPE_SECRET_KEY"),
            stripe_webhook_secret: var("PLANTS_STRIPE_WEBHOOK_SECRET"),
            lemon_squeezy_webhook_secret: var("PLANTS_LEMON_SQUEEZY_WEBHOOK_SECRET"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: u32,
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
    #[serde(default)]
    pub plans: PlansConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub billing: BillingConfig,
}

impl Config {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            version: 1,
            app: AppConfig {
                name: default_app_name(),
                base_url: base_url.into(),
            },
            server: ServerConfig::default(),
            reminders: RemindersConfig::default(),
            plans: PlansConfig::default(),
            messaging: MessagingConfig::default(),
            billing: BillingConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(PlantsError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        let base = self.app.base_url.trim();
        if base.is_empty() {
            push(WarnLevel::Error, "app.base_url is empty; claim URLs cannot be built".into());
        } else if !base.starts_with("http://") && !base.starts_with("https://") {
            push(
                WarnLevel::Error,
                format!("app.base_url '{base}' must start with http:// or https://"),
            );
        }

        if self.reminders.default_hour > 23 {
            push(
                WarnLevel::Error,
                format!("reminders.default_hour={} is not a valid hour", self.reminders.default_hour),
            );
        }
        if self.reminders.daily_sweep_hour > 23 {
            push(
                WarnLevel::Error,
                format!(
                    "reminders.daily_sweep_hour={} is not a valid hour",
                    self.reminders.daily_sweep_hour
                ),
            );
        }
        if self.reminders.tick_seconds == 0 {
            push(WarnLevel::Error, "reminders.tick_seconds must be at least 1".into());
        }
        if self.reminders.max_attempts == 0 {
            push(WarnLevel::Warning, "reminders.max_attempts=0 means jobs never run".into());
        } else if self.reminders.max_attempts > 10 {
            push(
                WarnLevel::Warning,
                format!("reminders.max_attempts={} (>10 is unusual)", self.reminders.max_attempts),
            );
        }

        if self.plans.free_plant_limit == 0 {
            push(
                WarnLevel::Warning,
                "plans.free_plant_limit=0: free users cannot claim any plant".into(),
            );
        }

        if let MessagingConfig::Twilio {
            account_sid,
            whatsapp_from,
            ..
        } = &self.messaging
        {
            if account_sid.trim().is_empty() {
                push(WarnLevel::Error, "messaging.account_sid is empty".into());
            }
            if crate::paths::normalize_phone(whatsapp_from).is_err() {
                push(
                    WarnLevel::Error,
                    format!("messaging.whatsapp_from '{whatsapp_from}' is not E.164"),
                );
            }
        }

        if let Some(stripe) = &self.billing.stripe {
            if stripe.price_id.trim().is_empty() {
                push(WarnLevel::Error, "billing.stripe.price_id is empty".into());
            }
        }

        warnings
    }

    /// Warnings about secrets missing for the features this config enables.
    pub fn validate_secrets(&self, secrets: &Secrets) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut missing = |name: &str, what: &str| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("{name} is not set; {what} will be rejected"),
            });
        };
        if secrets.session_secret.is_none() {
            missing("PLANTS_SESSION_SECRET", "authenticated API requests");
        }
        if secrets.admin_token.is_none() {
            missing("PLANTS_ADMIN_TOKEN", "admin API requests");
        }
        if secrets.webhook_secret.is_none() {
            missing("PLANTS_WEBHOOK_SECRET", "WhatsApp and identity webhooks");
        }
        if matches!(self.messaging, MessagingConfig::Twilio { .. }) && secrets.twilio_auth_token.is_none() {
            missing("PLANTS_TWILIO_AUTH_TOKEN", "outbound WhatsApp messages");
        }
        if self.billing.stripe.is_some() {
            if secrets.stripe_secret_key.is_none() {
                missing("PLANTS_STRIPE_SECRET_KEY", "Stripe checkouts");
            }
            if secrets.stripe_webhook_secret.is_none() {
                missing("PLANTS_STRIPE_WEBHOOK_SECRET", "Stripe webhooks");
            }
        }
        if self.billing.lemon_squeezy.is_some() && secrets.lemon_squeezy_webhook_secret.is_none() {
            missing("PLANTS_LEMON_SQUEEZY_WEBHOOK_SECRET", "Lemon Squeezy webhooks");
        }
        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(PlantsError::NotInitialized)
        ));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("https://plants.example");
        cfg.plans.free_plant_limit = 5;
        cfg.save(dir.path()).unwrap();
        let back = Config::load(dir.path()).unwrap();
        assert_eq!(back.app.base_url, "https://plants.example");
        assert_eq!(back.plans.free_plant_limit, 5);
        assert_eq!(back.messaging, MessagingConfig::Log);
    }

    #[test]
    fn minimal_yaml_gets_defaults() {
        let yaml = "version: 1\napp:\n  base_url: https://plants.example\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.server.port, 3000);
        assert_eq!(cfg.reminders.default_hour, 9);
        assert_eq!(cfg.reminders.overdue_nudge_days, 2);
        assert_eq!(cfg.plans.free_plant_limit, 2);
        assert!(cfg.billing.stripe.is_none());
    }

    #[test]
    fn twilio_messaging_parses_with_default_bases() {
        let yaml = r#"
version: 1
app:
  base_url: https://plants.example
messaging:
  provider: twilio
  account_sid: AC123
  whatsapp_from: "+14155238886"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        match &cfg.messaging {
            MessagingConfig::Twilio { api_base, .. } => {
                assert_eq!(api_base, "https://conversations.twilio.com")
            }
            other => panic!("expected twilio, got {other:?}"),
        }
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_flags_bad_values() {
        let mut cfg = Config::new("plants.example");
        cfg.reminders.default_hour = 24;
        cfg.reminders.tick_seconds = 0;
        cfg.messaging = MessagingConfig::Twilio {
            account_sid: "".into(),
            whatsapp_from: "12345".into(),
            api_base: default_conversations_api(),
            messages_api_base: default_messages_api(),
        };
        let warnings = cfg.validate();
        let errors = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .count();
        assert_eq!(errors, 5, "{warnings:?}");
    }

    #[test]
    fn validate_secrets_reports_enabled_features_only() {
        let cfg = Config::new("https://plants.example");
        let warnings = cfg.validate_secrets(&Secrets::default());
        assert_eq!(warnings.len(), 3);
        let full = Secrets {
            session_secret: Some("s".into()),
            admin_token: Some("a".into()),
            webhook_secret: Some("w".into()),
            ..Secrets::default()
        };
        assert!(cfg.validate_secrets(&full).is_empty());
    }
}
