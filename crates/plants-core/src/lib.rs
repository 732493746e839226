pub mod care;
pub mod claim;
pub mod config;
pub mod dates;
pub mod error;
pub mod health;
pub mod inbound;
pub mod io;
pub mod jobs;
pub mod paths;
pub mod personality;
pub mod signature;
pub mod species;
pub mod store;
pub mod types;

pub use error::{PlantsError, Result};
