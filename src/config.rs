// Copyright 2026 rdvwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration: target URL, browser options, anti-detection policy.
//!
//! Defaults match the rdv-prefecture deployment. Every knob can be
//! overridden through `RDV_*` environment variables; CLI flags win over
//! both (applied in `main`).

use serde::{Deserialize, Serialize};

/// Booking portal entry page. The watcher lands here, clicks through to the
/// slot page, and keeps refreshing that.
pub const DEFAULT_URL: &str =
    "https://www.rdv-prefecture.interieur.gouv.fr/rdvpref/reservation/demarche/3720/";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub monitoring: MonitoringConfig,
    pub chrome: ChromeConfig,
    pub anti_detection: AntiDetectionPolicy,
}

/// What to watch and how patiently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Entry page of the booking flow.
    pub url: String,
    /// Page load timeout in seconds. An elapsed timeout is not an error;
    /// the watcher classifies whatever state the page rendered into.
    pub page_load_timeout_secs: u64,
}

/// Chromium launch options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromeConfig {
    /// Window size passed as `--window-size`.
    pub window_size: String,
    /// Disable image loading to cut bandwidth and speed up refreshes.
    pub disable_images: bool,
    /// User agent pool. The session starts with the first entry and
    /// advances through the pool on every rotation.
    pub user_agents: Vec<String>,
}

/// Pacing and rotation policy. Read-only to the monitoring core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiDetectionPolicy {
    /// Fixed inter-check interval used when random delays are disabled.
    pub base_interval_secs: u64,
    /// Lower bound of the jittered delay.
    pub jitter_min_secs: u64,
    /// Upper bound of the jittered delay.
    pub jitter_max_secs: u64,
    /// Rotate the browser session once this many requests have been made.
    /// Zero disables rotation.
    pub rotation_request_threshold: u64,
    /// Sample delays uniformly from the jitter range instead of using the
    /// base interval.
    pub random_delays_enabled: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            page_load_timeout_secs: 30,
        }
    }
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            window_size: "1920,1080".to_string(),
            disable_images: true,
            user_agents: default_user_agents(),
        }
    }
}

impl Default for AntiDetectionPolicy {
    fn default() -> Self {
        Self {
            base_interval_secs: 20,
            jitter_min_secs: 5,
            jitter_max_secs: 10,
            rotation_request_threshold: 50,
            random_delays_enabled: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            monitoring: MonitoringConfig::default(),
            chrome: ChromeConfig::default(),
            anti_detection: AntiDetectionPolicy::default(),
        }
    }
}

impl Config {
    /// Build a configuration from defaults plus `RDV_*` environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(url) = read_env_string("RDV_URL") {
            config.monitoring.url = url;
        }
        config.monitoring.page_load_timeout_secs = read_env_u64(
            "RDV_PAGE_LOAD_TIMEOUT_SECS",
            config.monitoring.page_load_timeout_secs,
        );
        config.anti_detection.base_interval_secs = read_env_u64(
            "RDV_INTERVAL_SECS",
            config.anti_detection.base_interval_secs,
        );
        config.anti_detection.jitter_min_secs =
            read_env_u64("RDV_JITTER_MIN_SECS", config.anti_detection.jitter_min_secs);
        config.anti_detection.jitter_max_secs =
            read_env_u64("RDV_JITTER_MAX_SECS", config.anti_detection.jitter_max_secs);
        config.anti_detection.rotation_request_threshold = read_env_u64(
            "RDV_ROTATION_THRESHOLD",
            config.anti_detection.rotation_request_threshold,
        );
        if let Some(raw) = read_env_string("RDV_RANDOM_DELAYS") {
            config.anti_detection.random_delays_enabled = parse_bool(&raw);
        }

        config
    }
}

fn default_user_agents() -> Vec<String> {
    [
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
    ]
    .iter()
    .map(|ua| ua.to_string())
    .collect()
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn read_env_u64(name: &str, default: u64) -> u64 {
    read_env_string(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let config = Config::default();
        assert!(config.monitoring.url.starts_with("https://"));
        assert!(config.anti_detection.jitter_min_secs <= config.anti_detection.jitter_max_secs);
        assert!(config.anti_detection.rotation_request_threshold > 0);
        assert!(!config.chrome.user_agents.is_empty());
    }

    #[test]
    fn test_parse_bool_accepts_common_forms() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool(" yes "));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("off"));
        assert!(!parse_bool("nonsense"));
    }

    #[test]
    fn test_env_override_rotation_threshold() {
        std::env::set_var("RDV_ROTATION_THRESHOLD", "7");
        let config = Config::from_env();
        assert_eq!(config.anti_detection.rotation_request_threshold, 7);
        std::env::remove_var("RDV_ROTATION_THRESHOLD");
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.monitoring.url, config.monitoring.url);
        assert_eq!(
            parsed.anti_detection.base_interval_secs,
            config.anti_detection.base_interval_secs
        );
    }
}
