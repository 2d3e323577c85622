//! # Operator Configuration
//!
//! Operator-level settings loaded from environment variables.

use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Operator-level configuration
///
/// All settings have defaults and can be overridden via environment variables.
/// `POD_NAMESPACE` and `POD_NAME` are expected from the downward API.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace the operator and its workload run in
    pub namespace: String,
    /// Pod hosting both the operator and the workload container
    pub pod_name: String,
    /// Deployed application name; names the SiteManager resource, peers ConfigMap and Lease
    pub app_name: String,
    /// Container running the workload
    pub workload_container: String,
    /// Pebble API base URL
    pub pebble_url: String,
    /// Site Manager API base URL
    pub workload_url: String,
    /// Metrics and probe server port
    pub metrics_port: u16,
    /// Log format (json, text)
    pub log_format: LogFormat,
    /// Pebble poll interval (seconds)
    pub pebble_poll_interval_secs: u64,
    /// Watch stream restart delay after errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Lease used for leader election
    pub lease_name: String,
    /// HTTP server startup timeout (seconds)
    pub startup_timeout_secs: u64,
    /// HTTP server readiness poll interval (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            namespace: "default".to_string(),
            pod_name: "site-manager-0".to_string(),
            app_name: "site-manager".to_string(),
            workload_container: WORKLOAD_CONTAINER.to_string(),
            pebble_url: DEFAULT_PEBBLE_URL.to_string(),
            workload_url: DEFAULT_WORKLOAD_URL.to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: LogFormat::Text,
            pebble_poll_interval_secs: DEFAULT_PEBBLE_POLL_INTERVAL_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            lease_name: "site-manager-leader".to_string(),
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        let app_name = env_var_or_default_str("APP_NAME", "site-manager");
        Self {
            namespace: env_var_or_default_str("POD_NAMESPACE", "default"),
            pod_name: env_var_or_default_str("POD_NAME", "site-manager-0"),
            lease_name: env_var_or_default_str("LEASE_NAME", &format!("{app_name}-leader")),
            app_name,
            workload_container: env_var_or_default_str("WORKLOAD_CONTAINER", WORKLOAD_CONTAINER),
            pebble_url: env_var_or_default_str("PEBBLE_URL", DEFAULT_PEBBLE_URL),
            workload_url: env_var_or_default_str("WORKLOAD_URL", DEFAULT_WORKLOAD_URL),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_format: LogFormat::parse(&env_var_or_default_str("LOG_FORMAT", "text")),
            pebble_poll_interval_secs: env_var_or_default(
                "PEBBLE_POLL_INTERVAL_SECS",
                DEFAULT_PEBBLE_POLL_INTERVAL_SECS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
        }
    }

    /// Name of the ConfigMap backing the peer fact bag
    #[must_use]
    pub fn peers_config_map(&self) -> String {
        format!("{}-peers", self.app_name)
    }

    /// Get Pebble poll interval duration
    #[must_use]
    pub fn pebble_poll_interval(&self) -> Duration {
        Duration::from_secs(self.pebble_poll_interval_secs)
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Text);
    }

    #[test]
    fn test_peers_config_map_name() {
        let config = OperatorConfig {
            app_name: "msm".to_string(),
            ..OperatorConfig::default()
        };
        assert_eq!(config.peers_config_map(), "msm-peers");
    }
}
