//! Engine configuration for Forgeflow.
//!
//! `EngineConfig` represents the top-level TOML config controlling
//! workflow admission, default timeouts, the default middleware
//! assembly, and the audit log destination. All fields have sensible
//! defaults so an empty file (or no file) is valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Forgeflow engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Maximum workflows running concurrently process-wide (0 = unlimited).
    #[serde(default)]
    pub max_concurrent_workflows: usize,

    /// Default workflow timeout in seconds, used when a workflow does
    /// not set its own.
    #[serde(default = "default_workflow_timeout_secs")]
    pub default_workflow_timeout_secs: u64,

    /// Which links the default middleware assembly installs.
    #[serde(default)]
    pub middleware: MiddlewareToggles,

    /// Where to append the JSONL audit log (None = audit disabled).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log_path: Option<PathBuf>,
}

fn default_workflow_timeout_secs() -> u64 {
    1800
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workflows: 0,
            default_workflow_timeout_secs: default_workflow_timeout_secs(),
            middleware: MiddlewareToggles::default(),
            audit_log_path: None,
        }
    }
}

/// Enable/disable flags for the default middleware chain.
///
/// When all three are on, the assembly order is error-handling
/// outermost, then timing, then logging innermost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MiddlewareToggles {
    #[serde(default = "default_true")]
    pub error_handling: bool,
    #[serde(default = "default_true")]
    pub timing: bool,
    #[serde(default = "default_true")]
    pub logging: bool,
}

fn default_true() -> bool {
    true
}

impl Default for MiddlewareToggles {
    fn default() -> Self {
        Self {
            error_handling: true,
            timing: true,
            logging: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_concurrent_workflows, 0);
        assert_eq!(config.default_workflow_timeout_secs, 1800);
        assert!(config.middleware.logging);
    }

    #[test]
    fn deserialize_with_values() {
        let toml_str = r#"
max_concurrent_workflows = 4
default_workflow_timeout_secs = 600
audit_log_path = "/var/log/forgeflow/audit.jsonl"

[middleware]
timing = false
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_concurrent_workflows, 4);
        assert_eq!(config.default_workflow_timeout_secs, 600);
        assert!(!config.middleware.timing);
        assert!(config.middleware.error_handling);
        assert_eq!(
            config.audit_log_path,
            Some(PathBuf::from("/var/log/forgeflow/audit.jsonl"))
        );
    }

    #[test]
    fn serde_roundtrip() {
        let config = EngineConfig {
            max_concurrent_workflows: 2,
            default_workflow_timeout_secs: 300,
            middleware: MiddlewareToggles {
                error_handling: false,
                timing: true,
                logging: true,
            },
            audit_log_path: Some(PathBuf::from("audit.jsonl")),
        };
        let toml_str = toml::to_string(&config).unwrap();
        let back: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, config);
    }
}
