mod analytics;
mod bus;
mod scheduler;
mod server;
mod store;

pub use analytics::*;
pub use bus::*;
pub use scheduler::*;
pub use server::*;
pub use store::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Admin
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Environment variable holding the admin bearer token.
    /// If the env var is unset, admin endpoints are **disabled** (403).
    #[serde(default = "d_admin_token_env")]
    pub token_env: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            token_env: d_admin_token_env(),
        }
    }
}

fn d_admin_token_env() -> String {
    "AGENTMESH_ADMIN_TOKEN".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good. Callers at the
    /// binary boundary should treat any `ConfigSeverity::Error` entry as
    /// fatal (exit code 1).
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)"
                    .into(),
            });
        }

        if let Some(rl) = &self.server.rate_limit {
            if rl.requests_per_second == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.requests_per_second".into(),
                    message: "requests_per_second must be greater than 0".into(),
                });
            }
            if rl.burst_size == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "server.rate_limit.burst_size".into(),
                    message: "burst_size must be greater than 0".into(),
                });
            }
        }

        match &self.store {
            StoreConfig::Embedded(e) => {
                if e.path.is_empty() {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: "store.path".into(),
                        message: "embedded store path must not be empty".into(),
                    });
                }
            }
            StoreConfig::Clustered(c) => {
                if c.endpoint.is_empty() {
                    errors.push(ConfigError {
                        severity: ConfigSeverity::Error,
                        field: "store.endpoint".into(),
                        message: "clustered store endpoint must not be empty".into(),
                    });
                }
            }
        }

        if self.bus.shard_count == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "bus.shard_count".into(),
                message: "shard_count must be greater than 0".into(),
            });
        }

        let s = &self.scheduler;
        if s.max_retries == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "scheduler.max_retries".into(),
                message: "max_retries is 0: runs will dead-letter on first failure".into(),
            });
        }
        if s.initial_retry_delay_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "scheduler.initial_retry_delay_ms".into(),
                message: "initial_retry_delay_ms must be greater than 0".into(),
            });
        }
        if s.max_retry_delay_ms < s.initial_retry_delay_ms {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "scheduler.max_retry_delay_ms".into(),
                message: "max_retry_delay_ms must be >= initial_retry_delay_ms".into(),
            });
        }
        if s.queue_concurrency == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "scheduler.queue_concurrency".into(),
                message: "queue_concurrency must be greater than 0".into(),
            });
        }
        if s.queue_rate_max == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "scheduler.queue_rate_max".into(),
                message: "queue_rate_max must be greater than 0".into(),
            });
        }
        if s.coalesce_window_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "scheduler.coalesce_window_ms".into(),
                message: "coalesce_window_ms is 0: no runs will be coalesced".into(),
            });
        }
        if s.imminent_window_ms < s.hydration_interval_ms {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "scheduler.imminent_window_ms".into(),
                message: "imminent_window_ms is smaller than hydration_interval_ms: schedules may be hydrated late".into(),
            });
        }
        if !s.agent_callback_url_template.contains("{agent_id}") {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "scheduler.agent_callback_url_template".into(),
                message: "must contain the literal placeholder \"{agent_id}\"".into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_errors() {
        let issues = Config::default().validate();
        let errors: Vec<_> = issues
            .iter()
            .filter(|e| e.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = Config::default();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "server.port" && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn server_host_empty_is_error() {
        let mut cfg = Config::default();
        cfg.server.host = String::new();
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "server.host" && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = Config::default();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        let issue = issues
            .iter()
            .find(|e| e.field == "server.cors.allowed_origins")
            .expect("expected CORS wildcard warning");
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn clustered_store_without_endpoint_is_error() {
        let mut cfg = Config::default();
        cfg.store = StoreConfig::Clustered(ClusteredStoreConfig {
            endpoint: String::new(),
            request_timeout_ms: 2_000,
        });
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "store.endpoint" && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn max_retry_delay_below_initial_is_error() {
        let mut cfg = Config::default();
        cfg.scheduler.initial_retry_delay_ms = 10_000;
        cfg.scheduler.max_retry_delay_ms = 1_000;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "scheduler.max_retry_delay_ms"
                && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn zero_shard_count_is_error() {
        let mut cfg = Config::default();
        cfg.bus.shard_count = 0;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|e| e.field == "bus.shard_count" && e.severity == ConfigSeverity::Error));
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(
            format!("{err}"),
            "[ERROR] server.port: port must be greater than 0"
        );
    }
}
