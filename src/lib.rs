pub mod agents;
pub mod cards;
pub mod config;
pub mod config_store;
pub mod daemon;
pub mod db;
pub mod error;
pub mod goals;
pub mod interfaces;
pub mod logging;
pub mod oauth;
pub mod providers;
pub mod router;
pub mod runtime_paths;
pub mod scheduler;
pub mod services;
pub mod suggestions;
pub mod vault;
pub mod youtube;

pub type Result<T> = std::result::Result<T, error::CreatorPilotError>;

pub const GIT_SHA: &str = env!("CREATOR_PILOT_GIT_SHA");
