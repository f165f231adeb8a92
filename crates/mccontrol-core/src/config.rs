//! Controller configuration.

use std::{path::{Path, PathBuf}, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{ControlError, error::Result};

const ENV_PREFIX: &str = "MCCONTROL_";

/// How the controller reaches the orchestration platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Use the service account mounted into the pod.
    InCluster,
    /// Use a credentials file from outside the cluster.
    #[default]
    External,
}

impl std::str::FromStr for RunMode {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "incluster" => Ok(Self::InCluster),
            "external" | "outofcluster" => Ok(Self::External),
            other => Err(ControlError::Configuration(format!("unknown run mode: {other}"))),
        }
    }
}

/// Full configuration surface of a controller instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub run_mode: RunMode,
    /// Credentials file; only read in [`RunMode::External`].
    pub credentials_path: Option<PathBuf>,
    pub namespace: String,
    /// Label selector for game-server instances, e.g. `app=minecraft`.
    pub instance_selector: String,
    /// Label selector for endpoints. Falls back to `instance_selector`.
    pub endpoint_selector: Option<String>,
    /// Container hosting the game-server process.
    pub container_name: String,
    /// Game port, used for status pings and endpoint matching.
    pub game_port: u16,
    /// Console protocol port. `0` disables the persistent transport.
    pub console_port: u16,
    pub console_password: String,
    pub identity_refresh_interval_secs: u64,
    pub session_sweep_interval_secs: u64,
    pub command_timeout_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            run_mode: RunMode::default(),
            credentials_path: None,
            namespace: "default".to_string(),
            instance_selector: "app=minecraft".to_string(),
            endpoint_selector: None,
            container_name: "minecraft".to_string(),
            game_port: 25565,
            console_port: 25575,
            console_password: String::new(),
            identity_refresh_interval_secs: 300,
            session_sweep_interval_secs: 300,
            command_timeout_secs: 30,
        }
    }
}

impl ControllerConfig {
    /// Load from `MCCONTROL_*` environment variables, defaulting missing keys.
    ///
    /// # Errors
    /// Returns a configuration error if a variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup. Keys are the unprefixed upper-case
    /// field names, e.g. `NAMESPACE` is read from `MCCONTROL_NAMESPACE`.
    ///
    /// # Errors
    /// Returns a configuration error if a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(mode) = get("RUN_MODE") {
            config.run_mode = mode.parse()?;
        }
        config.credentials_path = get("CREDENTIALS_PATH").map(PathBuf::from);
        if let Some(ns) = get("NAMESPACE") {
            config.namespace = ns;
        }
        if let Some(selector) = get("INSTANCE_SELECTOR") {
            config.instance_selector = selector;
        }
        config.endpoint_selector = get("ENDPOINT_SELECTOR");
        if let Some(container) = get("CONTAINER_NAME") {
            config.container_name = container;
        }
        if let Some(port) = get("GAME_PORT") {
            config.game_port = parse_number("GAME_PORT", &port)?;
        }
        if let Some(port) = get("CONSOLE_PORT") {
            config.console_port = parse_number("CONSOLE_PORT", &port)?;
        }
        if let Some(password) = get("CONSOLE_PASSWORD") {
            config.console_password = password;
        }
        if let Some(secs) = get("IDENTITY_REFRESH_INTERVAL_SECS") {
            config.identity_refresh_interval_secs =
                parse_number("IDENTITY_REFRESH_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = get("SESSION_SWEEP_INTERVAL_SECS") {
            config.session_sweep_interval_secs =
                parse_number("SESSION_SWEEP_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = get("COMMAND_TIMEOUT_SECS") {
            config.command_timeout_secs = parse_number("COMMAND_TIMEOUT_SECS", &secs)?;
        }

        Ok(config)
    }

    /// Load from a JSON document on disk.
    ///
    /// # Errors
    /// Returns a configuration error if the file is unreadable or malformed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ControlError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            ControlError::Configuration(format!("invalid config {}: {e}", path.display()))
        })
    }

    /// Check the fields every component depends on.
    ///
    /// # Errors
    /// Returns a configuration error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(ControlError::Configuration("namespace is empty".into()));
        }
        if self.instance_selector.trim().is_empty() {
            return Err(ControlError::Configuration("instance selector is empty".into()));
        }
        if self.game_port == 0 {
            return Err(ControlError::Configuration("game port is unset".into()));
        }
        Ok(())
    }

    /// Endpoint selector, falling back to the instance selector.
    #[must_use]
    pub fn endpoint_selector(&self) -> &str {
        self.endpoint_selector
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.instance_selector)
    }

    /// Console port, or `None` when the persistent transport is disabled.
    #[must_use]
    pub const fn console_port(&self) -> Option<u16> {
        if self.console_port == 0 {
            None
        } else {
            Some(self.console_port)
        }
    }

    /// Credentials file to use in external mode.
    #[must_use]
    pub fn resolved_credentials_path(&self) -> Option<PathBuf> {
        match self.run_mode {
            RunMode::InCluster => None,
            RunMode::External => self
                .credentials_path
                .clone()
                .or_else(|| dirs::home_dir().map(|home| home.join(".kube").join("config"))),
        }
    }

    #[must_use]
    pub const fn identity_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.identity_refresh_interval_secs)
    }

    #[must_use]
    pub const fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session_sweep_interval_secs)
    }

    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ControlError::Configuration(format!("{ENV_PREFIX}{name} is not a number: {value}")))
}

/// Retry schedule of a persistent protocol session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            factor: 1.5,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// `min(base * factor^attempt, max)`, with `attempt` starting at 0.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff(self.base_delay, self.factor, attempt, self.max_delay)
    }
}

/// Reconnect schedule of a follow log stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    /// Consecutive failed reconnects before giving up.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Optional cap on the total time spent in one reconnect episode.
    pub max_window: Option<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_window: None,
        }
    }
}

impl ReconnectPolicy {
    /// `min(base * 2^(attempt-1), max)`, with `attempt` starting at 1.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        backoff(self.base_delay, 2.0, attempt.saturating_sub(1), self.max_delay)
    }
}

fn backoff(base: Duration, factor: f64, exponent: u32, max: Duration) -> Duration {
    let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
    let scaled = base.as_secs_f64() * factor.powi(exponent);
    if !scaled.is_finite() || scaled >= max.as_secs_f64() {
        max
    } else {
        Duration::from_secs_f64(scaled)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_from_lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("MCCONTROL_RUN_MODE", "InCluster"),
            ("MCCONTROL_NAMESPACE", "games"),
            ("MCCONTROL_CONSOLE_PORT", "0"),
            ("MCCONTROL_IDENTITY_REFRESH_INTERVAL_SECS", "60"),
        ]
        .into_iter()
        .collect();

        let config =
            ControllerConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string())).unwrap();
        assert_eq!(config.run_mode, RunMode::InCluster);
        assert_eq!(config.namespace, "games");
        assert_eq!(config.console_port(), None);
        assert_eq!(config.identity_refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.container_name, "minecraft");
        assert!(config.resolved_credentials_path().is_none());
    }

    #[test]
    fn test_bad_port_is_configuration_error() {
        let err = ControllerConfig::from_lookup(|k| {
            (k == "MCCONTROL_GAME_PORT").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ControlError::Configuration(_)));
    }

    #[test]
    fn test_endpoint_selector_falls_back() {
        let mut config = ControllerConfig::default();
        assert_eq!(config.endpoint_selector(), "app=minecraft");
        config.endpoint_selector = Some("svc=mc".into());
        assert_eq!(config.endpoint_selector(), "svc=mc");
    }

    #[test]
    fn test_validate_rejects_empty_namespace() {
        let config = ControllerConfig {
            namespace: " ".into(),
            ..ControllerConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(ControllerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_json_defaults_missing_fields() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"namespace":"mc","run_mode":"in_cluster"}"#).unwrap();
        assert_eq!(config.namespace, "mc");
        assert_eq!(config.run_mode, RunMode::InCluster);
        assert_eq!(config.game_port, 25565);
    }

    #[test]
    fn test_retry_policy_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(750));
        assert_eq!(policy.delay_for(20), Duration::from_secs(10));
    }

    #[test]
    fn test_reconnect_policy_backoff() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }
}
