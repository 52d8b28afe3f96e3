mod escalation;
mod history;
mod llm;
mod moderation;
mod observability;
mod prompt;
mod storage;
mod welcome;

pub use escalation::*;
pub use history::*;
pub use llm::*;
pub use moderation::*;
pub use observability::*;
pub use prompt::*;
pub use storage::*;
pub use welcome::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub welcome: WelcomeConfig,
    #[serde(default)]
    pub moderation: ModerationConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
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

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self { severity: ConfigSeverity::Error, field: field.into(), message: message.into() }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self { severity: ConfigSeverity::Warning, field: field.into(), message: message.into() }
    }
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
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.history.compress_batch == 0 {
            errors.push(ConfigError::error(
                "history.compress_batch",
                "compress_batch must be at least 1",
            ));
        }

        // Compressing more turns than the ceiling keeps would drain history.
        if self.history.max_turns < self.history.compress_batch {
            errors.push(ConfigError::error(
                "history.max_turns",
                format!(
                    "max_turns ({}) must be >= compress_batch ({})",
                    self.history.max_turns, self.history.compress_batch
                ),
            ));
        }

        if self.history.history_limit == 0 {
            errors.push(ConfigError::error(
                "history.history_limit",
                "history_limit must be at least 1",
            ));
        }

        if self.prompt.timezone.parse::<chrono_tz::Tz>().is_err() {
            errors.push(ConfigError::error(
                "prompt.timezone",
                format!("unknown timezone \"{}\"", self.prompt.timezone),
            ));
        }

        if self.prompt.weekday_names.len() != 7 {
            errors.push(ConfigError::error(
                "prompt.weekday_names",
                format!("expected 7 names, got {}", self.prompt.weekday_names.len()),
            ));
        }

        if self.escalation.operator_handle.trim().is_empty() {
            errors.push(ConfigError::error(
                "escalation.operator_handle",
                "operator_handle must not be empty",
            ));
        }

        if self.escalation.operator_channel.is_none() {
            errors.push(ConfigError::warning(
                "escalation.operator_channel",
                "no operator channel configured; escalations will only be logged",
            ));
        }

        if self.welcome.ttl_secs == 0 {
            errors.push(ConfigError::error("welcome.ttl_secs", "ttl_secs must be greater than 0"));
        }

        if self.welcome.sweep_interval_secs == 0 {
            errors.push(ConfigError::error(
                "welcome.sweep_interval_secs",
                "sweep_interval_secs must be greater than 0",
            ));
        }

        if !self.welcome.template.contains("{users}") {
            errors.push(ConfigError::error(
                "welcome.template",
                "template must contain the {users} placeholder",
            ));
        }

        if self.llm.base_url.is_empty() {
            errors.push(ConfigError::warning(
                "llm.base_url",
                "base_url is empty; backend calls will fail",
            ));
        }

        errors
    }

    /// True when [`validate`](Self::validate) reported no hard errors.
    pub fn has_errors(issues: &[ConfigError]) -> bool {
        issues.iter().any(|e| e.severity == ConfigSeverity::Error)
    }
}
