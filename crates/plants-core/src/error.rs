use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlantsError {
    #[error("not initialized: run 'plants init'")]
    NotInitialized,

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("plant not found: {0}")]
    PlantNotFound(String),

    #[error("species not found: {0}")]
    SpeciesNotFound(String),

    #[error("claim token not found: {0}")]
    ClaimTokenNotFound(String),

    #[error("claim token already redeemed: {0}")]
    ClaimTokenRedeemed(String),

    #[error("plan limit reached: the free plan allows {limit} plants")]
    PlanLimitReached { limit: u32 },

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("invalid {field} '{value}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("invalid phone number '{0}': expected E.164 format like +15551234567")]
    InvalidPhone(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("job database error: {0}")]
    JobDb(String),

    #[error("messaging error: {0}")]
    Messaging(String),

    #[error("billing error: {0}")]
    Billing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sql(#[from] rusqlite::Error),
}

impl PlantsError {
    pub fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        PlantsError::InvalidValue {
            field,
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlantsError>;
