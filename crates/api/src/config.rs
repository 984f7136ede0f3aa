use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use bujo_core::producers::SUBSCRIBER_BULLET_JOURNAL;
use bujo_events::{HubConfig, OverflowPolicy};
use chrono_tz::Tz;

/// Zone job runs are stamped in unless `JOB_TIMEZONE` says otherwise.
const DEFAULT_JOB_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background work to finish (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Notification and job settings.
    pub daemon: DaemonConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default   |
    /// |------------------------|-----------|
    /// | `HOST`                 | `0.0.0.0` |
    /// | `PORT`                 | `3000`    |
    /// | `CORS_ORIGINS`         | (none)    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`      |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`      |
    ///
    /// Panics on malformed values; misconfiguration should fail at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_or("PORT", 3000);

        let cors_origins = parse_list(&std::env::var("CORS_ORIGINS").unwrap_or_default());
        for origin in &cors_origins {
            if let Err(e) = origin.parse::<HeaderValue>() {
                panic!("Invalid CORS origin '{origin}': {e}");
            }
        }

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30),
            daemon: DaemonConfig::from_env(),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Subscriber layout, channel sizing and job cadence.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Buffered events per channel.
    pub channel_capacity: usize,
    /// What producers do when their channel is full.
    pub overflow_policy: OverflowPolicy,
    /// Identities registered at startup, each with every default producer.
    pub subscriber_ids: Vec<String>,
    /// Days between producer job runs.
    pub job_interval_days: u32,
    /// Trashed projects older than this are cleaned up.
    pub max_retention_days: i64,
    /// Zone used to timestamp job runs.
    pub timezone: Tz,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        let hub = HubConfig::default();
        Self {
            channel_capacity: hub.channel_capacity,
            overflow_policy: hub.overflow_policy,
            subscriber_ids: vec![SUBSCRIBER_BULLET_JOURNAL.to_string()],
            job_interval_days: 1,
            max_retention_days: 30,
            timezone: DEFAULT_JOB_TIMEZONE,
        }
    }
}

impl DaemonConfig {
    /// | Env Var                | Default               |
    /// |------------------------|-----------------------|
    /// | `CHANNEL_CAPACITY`     | `100`                 |
    /// | `OVERFLOW_POLICY`      | `drop_oldest`         |
    /// | `SUBSCRIBER_IDS`       | `bulletJournal`       |
    /// | `JOB_INTERVAL_DAYS`    | `1`                   |
    /// | `MAX_RETENTION_DAYS`   | `30`                  |
    /// | `JOB_TIMEZONE`         | `America/Los_Angeles` |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let subscriber_ids = std::env::var("SUBSCRIBER_IDS")
            .map(|raw| parse_list(&raw))
            .unwrap_or(defaults.subscriber_ids);
        if subscriber_ids.is_empty() {
            panic!("SUBSCRIBER_IDS must name at least one subscriber");
        }

        let job_interval_days: u32 = env_or("JOB_INTERVAL_DAYS", defaults.job_interval_days);
        if job_interval_days == 0 {
            panic!("JOB_INTERVAL_DAYS must be at least 1");
        }

        Self {
            channel_capacity: env_or("CHANNEL_CAPACITY", defaults.channel_capacity),
            overflow_policy: env_or("OVERFLOW_POLICY", defaults.overflow_policy),
            subscriber_ids,
            job_interval_days,
            max_retention_days: env_or("MAX_RETENTION_DAYS", defaults.max_retention_days),
            timezone: env_or("JOB_TIMEZONE", defaults.timezone),
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            channel_capacity: self.channel_capacity,
            overflow_policy: self.overflow_policy,
        }
    }

    pub fn job_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.job_interval_days) * 24 * 60 * 60)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read and parse `key`, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|e| panic!("{key} is invalid ('{raw}'): {e}")),
        Err(_) => default,
    }
}

/// Split a comma-separated value, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
