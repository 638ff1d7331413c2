//! TOML configuration files
//!
//! A configuration file describes one session and, optionally, a batch of
//! steps to run in it:
//!
//! ```toml
//! [session]
//! command = "sh -i"
//! prompt = '\$ $'
//! pty_stdin = true
//! pty_stdout = true
//! timeout = 10.0
//!
//! [session.env]
//! PS1 = "$ "
//!
//! [batch]
//! stop_on_error = true
//!
//! [[batch.steps]]
//! cmd = "# check the kernel"
//!
//! [[batch.steps]]
//! cmd = "uname -s"
//! pass = "Linux"
//! ```
//!
//! Durations are fractional seconds.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::result::SessionError;

/// Whole configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// The session to open.
    pub session: SessionConfig,

    /// Steps to run once connected.
    pub batch: BatchConfig,
}

/// Construction parameters of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Command line to launch.
    pub command: Option<String>,

    /// Display name.
    pub name: Option<String>,

    /// Prompt regex.
    pub prompt: Option<String>,

    /// Default call timeout in seconds.
    pub timeout: f64,

    /// Longest single wait of the polling loop, in seconds.
    pub delay: f64,

    /// Idle timeout in seconds.
    pub idle_timeout: Option<f64>,

    pub pty_stdin: bool,
    pub pty_stdout: bool,
    pub shell: bool,
    pub hide_output: bool,

    /// Flush the startup output after connecting.
    pub flush: bool,

    pub scrollback: bool,

    /// Extra connection attempts.
    pub retry: u32,

    /// Seconds between connection attempts.
    pub retry_delay: f64,

    pub lazy: bool,
    pub disable_echo: bool,
    pub auto_reconnect: bool,
    pub strip_ansi: bool,
    pub pty_rows: u16,
    pub pty_cols: u16,

    /// Working directory of the child.
    pub cwd: Option<PathBuf>,

    /// Extra environment variables.
    pub env: BTreeMap<String, String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command: None,
            name: None,
            prompt: None,
            timeout: 5.0,
            delay: 0.1,
            idle_timeout: None,
            pty_stdin: false,
            pty_stdout: false,
            shell: false,
            hide_output: false,
            flush: false,
            scrollback: false,
            retry: 0,
            retry_delay: 1.0,
            lazy: false,
            disable_echo: false,
            auto_reconnect: false,
            strip_ansi: false,
            pty_rows: 24,
            pty_cols: 80,
            cwd: None,
            env: BTreeMap::new(),
        }
    }
}

/// Batch section of a configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct BatchConfig {
    /// Stop at the first step whose pass pattern is not found.
    pub stop_on_error: bool,

    /// Do not print passing results.
    pub hide_pass: bool,

    pub steps: Vec<StepConfig>,
}

/// One batch step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StepConfig {
    /// Command, or a `#` comment to print.
    pub cmd: String,

    /// Regex the output must contain for the step to pass.
    pub pass: Option<String>,

    /// Timeout of this step in seconds.
    pub timeout: Option<f64>,
}

/// Reject durations that cannot be represented.
fn check_seconds(field: &str, value: f64) -> Result<(), SessionError> {
    if !value.is_finite() || value < 0.0 {
        return Err(SessionError::ConfigError(format!(
            "{} must be a non-negative number of seconds, got {}",
            field, value
        )));
    }
    Ok(())
}

impl SessionConfig {
    /// Check values that cannot be represented by the session.
    pub fn validate(&self) -> Result<(), SessionError> {
        check_seconds("timeout", self.timeout)?;
        check_seconds("delay", self.delay)?;
        check_seconds("retry_delay", self.retry_delay)?;
        if let Some(idle) = self.idle_timeout {
            check_seconds("idle_timeout", idle)?;
        }
        if self.pty_rows == 0 || self.pty_cols == 0 {
            return Err(SessionError::ConfigError(format!(
                "pty size must be non-zero, got {}x{}",
                self.pty_rows, self.pty_cols
            )));
        }
        Ok(())
    }
}

impl BatchConfig {
    /// Check the per-step timeouts.
    pub fn validate(&self) -> Result<(), SessionError> {
        for (i, step) in self.steps.iter().enumerate() {
            if let Some(timeout) = step.timeout {
                check_seconds(&format!("batch.steps[{}].timeout", i), timeout)?;
            }
        }
        Ok(())
    }
}

impl Config {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, SessionError> {
        let config: Config =
            toml::from_str(text).map_err(|e| SessionError::ConfigError(e.to_string()))?;
        config.session.validate()?;
        config.batch.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let text = fs::read_to_string(path).map_err(|e| {
            SessionError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.session, SessionConfig::default());
        assert!(config.batch.steps.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(
            r##"
            [session]
            command = "sh -i"
            prompt = '\$ $'
            pty_stdout = true
            timeout = 10.0

            [session.env]
            PS1 = "$ "

            [batch]
            stop_on_error = true

            [[batch.steps]]
            cmd = "# header"

            [[batch.steps]]
            cmd = "echo hi"
            pass = "hi"
            timeout = 2.0
            "##,
        )
        .unwrap();

        assert_eq!(config.session.command.as_deref(), Some("sh -i"));
        assert_eq!(config.session.env.get("PS1").map(String::as_str), Some("$ "));
        assert!(config.batch.stop_on_error);
        assert_eq!(config.batch.steps.len(), 2);
        assert_eq!(config.batch.steps[1].pass.as_deref(), Some("hi"));
    }

    #[test]
    fn test_negative_timeout_rejected() {
        let err = Config::from_toml_str("[session]\ntimeout = -1.0").unwrap_err();
        assert!(matches!(err, SessionError::ConfigError(ref msg) if msg.contains("timeout")));
    }

    #[test]
    fn test_infinite_step_timeout_rejected() {
        let err = Config::from_toml_str("[[batch.steps]]\ncmd = \"echo hi\"\ntimeout = inf")
            .unwrap_err();
        assert!(
            matches!(err, SessionError::ConfigError(ref msg) if msg.contains("batch.steps[0].timeout"))
        );
    }

    #[test]
    fn test_infinite_session_timeout_rejected() {
        let err = Config::from_toml_str("[session]\ntimeout = inf").unwrap_err();
        assert!(matches!(err, SessionError::ConfigError(_)));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = Config::from_toml_str("[session]\nretry = \"many\"").unwrap_err();
        assert!(matches!(err, SessionError::ConfigError(_)));
    }
}
