use time::{Time, macros::format_description};

use crate::constants::*;
use crate::scheduler::Schedule;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("SESSION_SECRET must be at least {min} bytes", min = MIN_SESSION_SECRET_LENGTH)]
    SessionSecretTooShort,

    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: String,
    pub data_path: String,
    pub session_secret: String,
    pub production: bool,
    pub frontend_origin: String,
    pub schedule: Schedule,
    pub deletion_grace_days: i64,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source; `lookup` returns
    /// `None` for unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let session_secret =
            lookup("SESSION_SECRET").ok_or(ConfigError::Missing("SESSION_SECRET"))?;
        if session_secret.len() < MIN_SESSION_SECRET_LENGTH {
            return Err(ConfigError::SessionSecretTooShort);
        }

        let port = var("PORT", DEFAULT_PORT);
        port.parse::<u16>().map_err(|e| ConfigError::Invalid {
            name: "PORT",
            value: port.clone(),
            reason: e.to_string(),
        })?;

        let deletion_grace_days = var(
            "ACCOUNT_DELETION_GRACE_DAYS",
            &DEFAULT_ACCOUNT_DELETION_GRACE_DAYS.to_string(),
        );
        let deletion_grace_days = deletion_grace_days
            .parse::<i64>()
            .ok()
            .filter(|days| (0..=MAX_ACCOUNT_DELETION_GRACE_DAYS).contains(days))
            .ok_or_else(|| ConfigError::Invalid {
                name: "ACCOUNT_DELETION_GRACE_DAYS",
                value: deletion_grace_days.clone(),
                reason: format!(
                    "expected a number of days between 0 and {}",
                    MAX_ACCOUNT_DELETION_GRACE_DAYS
                ),
            })?;

        let schedule = Schedule {
            deletion_sweep_at: parse_time_of_day(
                "DELETION_SWEEP_AT",
                &var("DELETION_SWEEP_AT", DEFAULT_DELETION_SWEEP_AT),
            )?,
            recurring_payments_at: parse_time_of_day(
                "RECURRING_PAYMENTS_AT",
                &var("RECURRING_PAYMENTS_AT", DEFAULT_RECURRING_PAYMENTS_AT),
            )?,
        };

        Ok(Config {
            host: var("HOST", DEFAULT_HOST),
            port,
            data_path: var("DATABASE_PATH", DEFAULT_DATA_PATH),
            session_secret,
            production: var("PRODUCTION", "false").eq_ignore_ascii_case("true"),
            frontend_origin: var("FRONTEND_ORIGIN", DEFAULT_FRONTEND_ORIGIN),
            schedule,
            deletion_grace_days,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parses an `HH:MM` time of day.
fn parse_time_of_day(name: &'static str, value: &str) -> Result<Time, ConfigError> {
    Time::parse(value.trim(), format_description!("[hour]:[minute]")).map_err(|e| {
        ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: e.to_string(),
        }
    })
}
