// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Tracked accounts live in a separate JSON file (see [`crate::models::account`])
//! because the list is longer than is pleasant to keep in an env var.

use std::env;
use std::time::Duration;

/// Activities requested per history page.
pub const PAGE_SIZE: u32 = 100;

/// Maximum number of detail reports fetched concurrently during discovery.
pub const DISCOVERY_CONCURRENCY: usize = 16;

/// Players committed per store write during discovery.
pub const PLAYER_CHUNK_SIZE: usize = 250;

/// How often readiness waits re-check their signal.
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Delay between attempts to load remote metadata at startup.
pub const METADATA_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Header carrying the shared secret on `/tasks/*` routes.
pub const TRIGGER_TOKEN_HEADER: &str = "x-waterfall-trigger-token";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bungie API key (sent as `X-API-Key`)
    pub bungie_api_key: String,
    /// Platform API base URL
    pub bungie_base_url: String,
    /// Stats host base URL (post game carnage reports)
    pub bungie_stats_base_url: String,
    /// Discord webhook for flag notifications; `None` disables delivery
    pub discord_webhook_url: Option<String>,
    /// GCP project ID; `None` selects the in-memory store
    pub gcp_project_id: Option<String>,
    /// Server port
    pub port: u16,
    /// Shared secret for trigger routes; `None` rejects all trigger calls
    pub trigger_token: Option<String>,
    /// Path of the tracked accounts JSON file
    pub accounts_file: String,
    /// Cadence of the in-process scheduler
    pub job_interval: Duration,
    /// Run the flagger on every record a crawl persists
    pub flag_new_activities: bool,
    /// Flag thresholds
    pub thresholds: Thresholds,
}

/// Per-participant statistic limits; reaching either one flags the participant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub kills: f64,
    pub deaths: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            kills: 10.0,
            deaths: 10.0,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let job_interval_hours: u64 = parse_or("JOB_INTERVAL_HOURS", 24)?;
        if job_interval_hours == 0 {
            return Err(ConfigError::Invalid(
                "JOB_INTERVAL_HOURS",
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            bungie_api_key: env::var("BUNGIE_API_KEY")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("BUNGIE_API_KEY"))?,
            bungie_base_url: env::var("BUNGIE_BASE_URL")
                .unwrap_or_else(|_| "https://www.bungie.net/Platform".to_string()),
            bungie_stats_base_url: env::var("BUNGIE_STATS_BASE_URL")
                .unwrap_or_else(|_| "https://stats.bungie.net/Platform".to_string()),
            discord_webhook_url: non_empty("DISCORD_WEBHOOK_URL"),
            gcp_project_id: non_empty("GCP_PROJECT_ID"),
            port: parse_or("PORT", 8080)?,
            trigger_token: non_empty("TRIGGER_TOKEN"),
            accounts_file: env::var("ACCOUNTS_FILE")
                .unwrap_or_else(|_| "data/accounts.json".to_string()),
            job_interval: Duration::from_secs(job_interval_hours * 60 * 60),
            flag_new_activities: parse_or("FLAG_NEW_ACTIVITIES", false)?,
            thresholds: Thresholds {
                kills: parse_or("KILLS_THRESHOLD", 10.0)?,
                deaths: parse_or("DEATHS_THRESHOLD", 10.0)?,
            },
        })
    }

    /// Deterministic configuration for tests.
    pub fn test_default() -> Self {
        Self {
            bungie_api_key: "test_api_key".to_string(),
            bungie_base_url: "http://localhost:9999/Platform".to_string(),
            bungie_stats_base_url: "http://localhost:9999/Platform".to_string(),
            discord_webhook_url: None,
            gcp_project_id: None,
            port: 8080,
            trigger_token: Some("test_trigger_token".to_string()),
            accounts_file: "data/accounts.json".to_string(),
            job_interval: Duration::from_secs(24 * 60 * 60),
            flag_new_activities: false,
            thresholds: Thresholds::default(),
        }
    }
}

fn non_empty(key: &'static str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::Invalid(key, e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),

    #[error("Failed to read accounts file {path}: {reason}")]
    Accounts { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("BUNGIE_API_KEY", " test_key ");
        env::set_var("KILLS_THRESHOLD", "12");
        env::remove_var("DEATHS_THRESHOLD");
        env::remove_var("JOB_INTERVAL_HOURS");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.bungie_api_key, "test_key");
        assert_eq!(config.thresholds.kills, 12.0);
        assert_eq!(config.thresholds.deaths, 10.0);
        assert_eq!(config.job_interval, Duration::from_secs(86_400));

        env::remove_var("KILLS_THRESHOLD");
    }

    #[test]
    fn test_thresholds_default_to_ten() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.kills, 10.0);
        assert_eq!(thresholds.deaths, 10.0);
    }
}
