pub mod analytics;
pub mod providers;
pub mod scheduler;
