pub mod account;
pub mod aggregator;
pub mod auth;
pub mod config;
pub mod constants;
pub mod database;
pub mod gateway;
pub mod jobs;
pub mod models;
pub mod reports;
pub mod routes;
pub mod scheduler;
pub mod utils;

// Re-export types at crate root for convenient importing
pub use crate::database::Db;
pub use crate::gateway::{Gateway, GatewayError};
pub use crate::scheduler::{Job, JobHealth, Scheduler};

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    /// Datastore access, shared with the scheduler
    pub gateway: Gateway,
    /// Outcome of the most recent scheduled job runs
    pub job_health: JobHealth,
    /// Days between a deletion request and the account's removal
    pub deletion_grace_days: i64,
}
