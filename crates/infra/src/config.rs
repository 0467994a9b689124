//! Process configuration from environment variables.
//!
//! | variable | default |
//! |---|---|
//! | `HTTP_ADDR` | `0.0.0.0:8080` |
//! | `DATABASE_URL` | unset → in-memory stores |
//! | `REDIS_URL` | unset → in-memory sessions |
//! | `JWT_SECRET` | insecure dev secret (logged as a warning) |
//! | `JWT_ACCESS_TTL_SECS` | `3600` |
//! | `JWT_REFRESH_TTL_SECS` | `604800` |
//! | `JOB_INTERVAL_SECS` | `3600` (`0` disables the scheduler) |
//! | `MAIL_FROM` | `no-reply@spadesk.local` |

use std::net::SocketAddr;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;
use tracing::warn;

const DEV_JWT_SECRET: &str = "spadesk-dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: SocketAddr,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// `None` when scheduled jobs are disabled.
    pub job_interval: Option<std::time::Duration>,
    pub mail_from: String,
}

impl AppConfig {
    /// Read the process environment, after loading `.env` when present.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is the normal case in deployments.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let http_addr = parse_or(&get, "HTTP_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?;

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let access_secs: i64 = parse_or(&get, "JWT_ACCESS_TTL_SECS", 3600)?;
        let refresh_secs: i64 = parse_or(&get, "JWT_REFRESH_TTL_SECS", 604_800)?;
        if access_secs <= 0 {
            return Err(invalid("JWT_ACCESS_TTL_SECS", access_secs));
        }
        if refresh_secs < access_secs {
            return Err(invalid("JWT_REFRESH_TTL_SECS", refresh_secs));
        }

        let job_secs: u64 = parse_or(&get, "JOB_INTERVAL_SECS", 3600)?;

        Ok(Self {
            http_addr,
            database_url: get("DATABASE_URL"),
            redis_url: get("REDIS_URL"),
            jwt_secret,
            access_ttl: Duration::seconds(access_secs),
            refresh_ttl: Duration::seconds(refresh_secs),
            job_interval: (job_secs > 0).then(|| std::time::Duration::from_secs(job_secs)),
            mail_from: get("MAIL_FROM").unwrap_or_else(|| "no-reply@spadesk.local".to_string()),
        })
    }

    /// In-memory everything, jobs disabled. Used by tests and local runs.
    pub fn for_tests() -> Self {
        Self {
            http_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: None,
            redis_url: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            access_ttl: Duration::hours(1),
            refresh_ttl: Duration::days(7),
            job_interval: None,
            mail_from: "no-reply@spadesk.local".to_string(),
        }
    }
}

fn invalid(key: &'static str, value: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        Some(raw) => raw.parse().map_err(|_| invalid(key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.http_addr.port(), 8080);
        assert!(cfg.database_url.is_none());
        assert_eq!(cfg.access_ttl, Duration::hours(1));
        assert_eq!(cfg.refresh_ttl, Duration::days(7));
        assert_eq!(cfg.job_interval, Some(std::time::Duration::from_secs(3600)));
    }

    #[test]
    fn zero_interval_disables_jobs_and_bad_numbers_are_rejected() {
        let cfg = config(&[("JOB_INTERVAL_SECS", "0"), ("DATABASE_URL", " postgres://x ")]).unwrap();
        assert!(cfg.job_interval.is_none());
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://x"));

        let err = config(&[("JWT_ACCESS_TTL_SECS", "soon")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "JWT_ACCESS_TTL_SECS",
                value: "soon".to_string()
            }
        );
        assert!(config(&[("HTTP_ADDR", "not-an-addr")]).is_err());
    }
}
