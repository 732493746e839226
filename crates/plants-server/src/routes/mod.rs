pub mod admin;
pub mod billing;
pub mod claim;
pub mod health;
pub mod me;
pub mod messages;
pub mod plants;
pub mod species;
pub mod webhooks;
