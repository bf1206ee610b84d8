//! Environment-driven configuration for the orchestration core.
//!
//! Every knob is an environment variable; `Config::from_env()` reads them
//! all once at boot and `validate()` reports issues before the server
//! starts accepting traffic.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub observer: ObserverConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub tenancy: TenancyConfig,
    #[serde(default)]
    pub goals: GoalsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub turn: TurnConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

impl Config {
    /// Read every setting from the process environment, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                bind_addr: env_str("BIND_ADDR", "127.0.0.1:8087"),
            },
            telemetry: TelemetryConfig {
                enabled: env_bool("TELEMETRY_ENABLED", false),
                log_path: PathBuf::from(env_str(
                    "TELEMETRY_LOG_PATH",
                    "./data/telemetry/events.ndjson",
                )),
            },
            bus: BusConfig {
                kind: env_str("BUS_TYPE", "memory").parse().unwrap_or_default(),
                brokers: env_str("BUS_BROKERS", ""),
                topic: env_str("BUS_TOPIC", "atrium.telemetry"),
            },
            observer: ObserverConfig {
                max_events: env_usize("MAX_EVENTS_IN_MEMORY", 5000),
            },
            auth: AuthConfig {
                internal_jwt_secret: std::env::var("INTERNAL_JWT_SECRET").unwrap_or_default(),
            },
            tenancy: TenancyConfig {
                system_uuid: env_str("SYSTEM_TENANT_UUID", ""),
            },
            goals: GoalsConfig {
                ttl_seconds: env_u64("GOAL_TTL_SECONDS", 900),
            },
            tools: ToolsConfig {
                default_ttl_seconds: env_u64("TOOL_DEFAULT_TTL_SECONDS", 90),
                timeout_seconds: env_u64("TOOL_TIMEOUT_SECONDS", 30),
            },
            turn: TurnConfig {
                tool_call_budget: env_usize("TURN_TOOL_CALL_BUDGET", 8),
            },
            llm: LlmConfig {
                base_url: env_str("LLM_BASE_URL", "http://localhost:11434/v1"),
                api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
                model: env_str("LLM_MODEL", "gpt-4o-mini"),
                timeout_seconds: env_u64("LLM_TIMEOUT_SECONDS", 60),
            },
            crm: CrmConfig {
                base_url: env_str("CRM_BASE_URL", "http://localhost:3100"),
            },
            artifacts: ArtifactsConfig {
                root: PathBuf::from(env_str("ARTIFACT_ROOT", "./data/artifacts")),
                inline_max_bytes: env_usize("ARTIFACT_INLINE_MAX_BYTES", 65536),
            },
        }
    }

    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.bind_addr.is_empty() {
            issues.push(ConfigIssue::error("server.bind_addr", "must not be empty"));
        }

        if self.auth.internal_jwt_secret.is_empty() {
            issues.push(ConfigIssue::error(
                "auth.internal_jwt_secret",
                "INTERNAL_JWT_SECRET must be set; internal tokens cannot be minted without it",
            ));
        } else if self.auth.internal_jwt_secret.len() < 32 {
            issues.push(ConfigIssue::warning(
                "auth.internal_jwt_secret",
                "secret is shorter than 32 bytes",
            ));
        }

        if !self.llm.base_url.starts_with("http://") && !self.llm.base_url.starts_with("https://") {
            issues.push(ConfigIssue::error(
                "llm.base_url",
                format!(
                    "must start with http:// or https:// (got \"{}\")",
                    self.llm.base_url
                ),
            ));
        }

        if !self.crm.base_url.starts_with("http://") && !self.crm.base_url.starts_with("https://") {
            issues.push(ConfigIssue::error(
                "crm.base_url",
                format!(
                    "must start with http:// or https:// (got \"{}\")",
                    self.crm.base_url
                ),
            ));
        }

        if self.telemetry.enabled && self.telemetry.log_path.as_os_str().is_empty() {
            issues.push(ConfigIssue::error(
                "telemetry.log_path",
                "TELEMETRY_LOG_PATH must be set when telemetry is enabled",
            ));
        }

        if matches!(self.bus.kind, BusKind::Kafka | BusKind::Rabbit) && self.bus.brokers.is_empty()
        {
            issues.push(ConfigIssue::warning(
                "bus.brokers",
                "BUS_TYPE names an external transport but BUS_BROKERS is empty; \
                 falling back to the in-process bus",
            ));
        }

        if self.observer.max_events == 0 {
            issues.push(ConfigIssue::error(
                "observer.max_events",
                "MAX_EVENTS_IN_MEMORY must be greater than 0",
            ));
        }

        if self.turn.tool_call_budget == 0 {
            issues.push(ConfigIssue::error(
                "turn.tool_call_budget",
                "TURN_TOOL_CALL_BUDGET must be greater than 0",
            ));
        }

        if self.tools.default_ttl_seconds < 10 || self.tools.default_ttl_seconds > 300 {
            issues.push(ConfigIssue::warning(
                "tools.default_ttl_seconds",
                "cache TTLs are expected to fall in the 10s–300s band",
            ));
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sections
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8087".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Master switch for event emission. When off, every emit is a no-op.
    pub enabled: bool,
    /// Append-only NDJSON sink file.
    pub log_path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_path: PathBuf::from("./data/telemetry/events.ndjson"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    Memory,
    Kafka,
    Rabbit,
}

impl std::str::FromStr for BusKind {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kafka" => Ok(BusKind::Kafka),
            "rabbit" | "rabbitmq" => Ok(BusKind::Rabbit),
            "memory" | "" => Ok(BusKind::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BusConfig {
    pub kind: BusKind,
    pub brokers: String,
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    pub max_events: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self { max_events: 5000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// HS256 signing secret for internal tokens. Never logged.
    pub internal_jwt_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TenancyConfig {
    /// UUID the literal tenant identifier `"system"` resolves to.
    pub system_uuid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalsConfig {
    pub ttl_seconds: u64,
}

impl Default for GoalsConfig {
    fn default() -> Self {
        Self { ttl_seconds: 900 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    pub default_ttl_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 90,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Maximum tool invocations in a single stateless turn.
    pub tool_call_budget: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            tool_call_budget: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".into(),
            api_key: String::new(),
            model: "gpt-4o-mini".into(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    pub base_url: String,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3100".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    pub root: PathBuf,
    /// Tool results above this serialized size are offloaded to the
    /// artifact store and referenced by id.
    pub inline_max_bytes: usize,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data/artifacts"),
            inline_max_bytes: 65536,
        }
    }
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
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Env helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn env_str(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let cfg = Config::default();
        assert_eq!(cfg.goals.ttl_seconds, 900);
        assert_eq!(cfg.tools.default_ttl_seconds, 90);
        assert_eq!(cfg.turn.tool_call_budget, 8);
        assert_eq!(cfg.observer.max_events, 5000);
        assert_eq!(cfg.artifacts.inline_max_bytes, 65536);
    }

    #[test]
    fn validate_flags_missing_jwt_secret() {
        let cfg = Config::default();
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "auth.internal_jwt_secret"
                && i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn validate_accepts_complete_config() {
        let mut cfg = Config::default();
        cfg.auth.internal_jwt_secret = "0123456789abcdef0123456789abcdef".into();
        let errors: Vec<_> = cfg
            .validate()
            .into_iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn validate_warns_on_external_bus_without_brokers() {
        let mut cfg = Config::default();
        cfg.auth.internal_jwt_secret = "0123456789abcdef0123456789abcdef".into();
        cfg.bus.kind = BusKind::Kafka;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.field == "bus.brokers" && i.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn bus_kind_parses_known_values() {
        assert_eq!("kafka".parse::<BusKind>(), Ok(BusKind::Kafka));
        assert_eq!("rabbit".parse::<BusKind>(), Ok(BusKind::Rabbit));
        assert_eq!("memory".parse::<BusKind>(), Ok(BusKind::Memory));
        assert!("carrier-pigeon".parse::<BusKind>().is_err());
    }
}
