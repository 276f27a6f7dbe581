//! scalewatch.toml configuration parser.
//!
//! Adapter sections (`[metrics]`, `[scorer]`, `[target]`, `[notify]`,
//! `[secrets]`) are tagged by `kind`. String fields documented as
//! "reference-capable" may hold `secret://KEY`, which the daemon resolves
//! through the secret resolver when wiring components.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::time::parse_duration;
use crate::types::ScalingBounds;

/// Prefix marking a value that must be read from the secret store.
pub const SECRET_REF_PREFIX: &str = "secret://";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default)]
    pub cycle: CycleConfig,
    #[serde(default)]
    pub bounds: BoundsConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
    pub metrics: MetricsConfig,
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    /// Time between scheduled cycles.
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Length of the metrics window each cycle aggregates.
    #[serde(default = "default_interval")]
    pub window: String,
    /// Upper bound on every external call.
    #[serde(default = "default_call_timeout")]
    pub call_timeout: String,
    /// Topic notifications are published to.
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default)]
    pub notify_on: NotifyPolicy,
    /// Score one sample per instance and derive severity from the batch.
    #[serde(default = "default_true")]
    pub batch: bool,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            window: default_interval(),
            call_timeout: default_call_timeout(),
            topic: default_topic(),
            notify_on: NotifyPolicy::default(),
            batch: true,
        }
    }
}

/// Which cycles publish a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Every completed cycle.
    #[default]
    Always,
    /// Only cycles with an anomalous verdict.
    Anomaly,
    /// Only cycles that changed the desired count.
    Change,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundsConfig {
    #[serde(default = "default_min")]
    pub min: u32,
    #[serde(default = "default_max")]
    pub max: u32,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            min: default_min(),
            max: default_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub id: String,
    pub min: Option<u32>,
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricsConfig {
    /// Readings pushed in-process or through the API.
    Push {
        /// How long pushed readings are kept.
        #[serde(default = "default_retention")]
        retention: String,
    },
    /// Newest `container_metrics_*.csv` export in a directory.
    Csv { dir: PathBuf },
    /// JSON metrics endpoint.
    Http {
        /// Reference-capable.
        address: String,
        #[serde(default = "default_metrics_path")]
        path: String,
        /// Reference-capable bearer token.
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScorerConfig {
    /// Remote inference endpoint.
    Http {
        /// Reference-capable.
        address: String,
        #[serde(default = "default_scorer_path")]
        path: String,
        /// Reference-capable bearer token.
        token: Option<String>,
    },
    /// Pre-trained model artifact evaluated in-process.
    IsolationForest { model: PathBuf },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetConfig {
    /// Desired counts kept in the local state store.
    #[default]
    Local,
    /// Orchestrator API.
    Http {
        /// Reference-capable.
        address: String,
        #[serde(default = "default_target_path")]
        path: String,
        /// Reference-capable bearer token.
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotifyConfig {
    /// Structured log line per event.
    #[default]
    Log,
    /// JSON POST per event.
    Webhook {
        /// Reference-capable.
        address: String,
        #[serde(default = "default_webhook_path")]
        path: String,
        /// Reference-capable bearer token.
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretsConfig {
    /// Environment variables named `{prefix}{KEY}`; read-only.
    Env {
        #[serde(default = "default_env_prefix")]
        prefix: String,
    },
    /// Secrets table of the local state store.
    Local,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self::Env {
            prefix: default_env_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_interval() -> String {
    "5m".to_string()
}
fn default_true() -> bool {
    true
}
fn default_call_timeout() -> String {
    "10s".to_string()
}
fn default_topic() -> String {
    "scalewatch.decisions".to_string()
}
fn default_min() -> u32 {
    1
}
fn default_max() -> u32 {
    10
}
fn default_retention() -> String {
    "1h".to_string()
}
fn default_metrics_path() -> String {
    "/api/v1/metrics".to_string()
}
fn default_scorer_path() -> String {
    "/invocations".to_string()
}
fn default_target_path() -> String {
    "/api/v1/services".to_string()
}
fn default_webhook_path() -> String {
    "/hooks/scalewatch".to_string()
}
fn default_env_prefix() -> String {
    "SCALEWATCH_".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/scalewatch")
}

impl WatchConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.interval()?;
        self.window()?;
        self.call_timeout()?;
        if let MetricsConfig::Push { retention } = &self.metrics {
            duration_field("metrics.retention", retention)?;
        }

        if self.cycle.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("cycle.topic must not be empty".into()));
        }
        if self.services.is_empty() {
            return Err(ConfigError::Invalid("at least one [[services]] entry is required".into()));
        }

        ScalingBounds::new(self.bounds.min, self.bounds.max)?;
        let mut seen = HashSet::new();
        for svc in &self.services {
            if svc.id.trim().is_empty() {
                return Err(ConfigError::Invalid("service id must not be empty".into()));
            }
            if !seen.insert(svc.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate service id: {}", svc.id)));
            }
            self.bounds_for(&svc.id)?;
        }

        for (section, address) in self.http_addresses() {
            if address.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{section}.address must not be empty")));
            }
        }
        Ok(())
    }

    /// Effective bounds for a service: per-service override over the global default.
    pub fn bounds_for(&self, service_id: &str) -> Result<ScalingBounds, ConfigError> {
        let svc = self.services.iter().find(|s| s.id == service_id);
        let min = svc.and_then(|s| s.min).unwrap_or(self.bounds.min);
        let max = svc.and_then(|s| s.max).unwrap_or(self.bounds.max);
        ScalingBounds::new(min, max)
    }

    pub fn service_ids(&self) -> Vec<String> {
        self.services.iter().map(|s| s.id.clone()).collect()
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        duration_field("cycle.interval", &self.cycle.interval)
    }

    pub fn window(&self) -> Result<Duration, ConfigError> {
        duration_field("cycle.window", &self.cycle.window)
    }

    pub fn call_timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("cycle.call_timeout", &self.cycle.call_timeout)
    }

    fn http_addresses(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::new();
        if let MetricsConfig::Http { address, .. } = &self.metrics {
            out.push(("metrics", address.as_str()));
        }
        if let ScorerConfig::Http { address, .. } = &self.scorer {
            out.push(("scorer", address.as_str()));
        }
        if let TargetConfig::Http { address, .. } = &self.target {
            out.push(("target", address.as_str()));
        }
        if let NotifyConfig::Webhook { address, .. } = &self.notify {
            out.push(("notify", address.as_str()));
        }
        out
    }

    /// Scaffold a minimal standalone config.
    pub fn scaffold(service_ids: &[&str]) -> Self {
        WatchConfig {
            cycle: CycleConfig::default(),
            bounds: BoundsConfig::default(),
            services: service_ids
                .iter()
                .map(|id| ServiceConfig {
                    id: id.to_string(),
                    min: None,
                    max: None,
                })
                .collect(),
            metrics: MetricsConfig::Push {
                retention: default_retention(),
            },
            scorer: ScorerConfig::Http {
                address: "127.0.0.1:8080".to_string(),
                path: default_scorer_path(),
                token: None,
            },
            target: TargetConfig::Local,
            notify: NotifyConfig::Log,
            secrets: SecretsConfig::default(),
            state: StateConfig::default(),
        }
    }
}

/// Strip the `secret://` prefix, if present.
pub fn secret_ref(value: &str) -> Option<&str> {
    value.strip_prefix(SECRET_REF_PREFIX)
}

fn duration_field(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration {
        field,
        value: value.to_string(),
    })
}
