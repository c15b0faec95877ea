//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::SentinelConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value '{value}' for {var}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional file, apply process environment
/// overrides, then validate the result.
pub fn load(path: Option<&Path>) -> Result<SentinelConfig, ConfigError> {
    load_with(path, |name| std::env::var(name).ok())
}

/// Same as [`load`], resolving environment variables through `lookup`.
pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<SentinelConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => SentinelConfig::default(),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment-style overrides using `lookup` to resolve variables.
///
/// Recognised variables: `HEALTH_CHECK_URL`, `CHECK_INTERVAL` (ms),
/// `MAX_FAILURES`, `RESTART_COMMAND`, `LOG_FILE`, `METRICS_FILE`,
/// `SUPERVISED_PID`, `MAX_ATTEMPTS`, `BASE_DELAY` (ms), `MAX_DELAY` (ms),
/// `BACKOFF_MULTIPLIER`.
pub fn apply_env_overrides<F>(config: &mut SentinelConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("HEALTH_CHECK_URL") {
        config.monitor.health_check_url = url;
    }
    if let Some(value) = lookup("CHECK_INTERVAL") {
        config.monitor.check_interval_ms = parse_var("CHECK_INTERVAL", value)?;
    }
    if let Some(value) = lookup("MAX_FAILURES") {
        config.monitor.max_failures = parse_var("MAX_FAILURES", value)?;
    }
    if let Some(command) = lookup("RESTART_COMMAND") {
        config.restart.command = command;
    }
    if let Some(value) = lookup("SUPERVISED_PID") {
        config.restart.supervised_pid = Some(parse_var("SUPERVISED_PID", value)?);
    }
    if let Some(path) = lookup("LOG_FILE") {
        config.files.log_file = path.into();
    }
    if let Some(path) = lookup("METRICS_FILE") {
        config.files.metrics_file = path.into();
    }

    let retry = &mut config.client.retry;
    if let Some(value) = lookup("MAX_ATTEMPTS") {
        retry.max_attempts = parse_var("MAX_ATTEMPTS", value)?;
    }
    if let Some(value) = lookup("BASE_DELAY") {
        retry.base_delay_ms = parse_var("BASE_DELAY", value)?;
    }
    if let Some(value) = lookup("MAX_DELAY") {
        retry.max_delay_ms = parse_var("MAX_DELAY", value)?;
    }
    if let Some(value) = lookup("BACKOFF_MULTIPLIER") {
        retry.backoff_multiplier = parse_var("BACKOFF_MULTIPLIER", value)?;
    }

    Ok(())
}

fn parse_var<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::PathBuf;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_env_overrides_supervisor_settings() {
        let mut config = SentinelConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("HEALTH_CHECK_URL", "http://127.0.0.1:9000/health"),
                ("CHECK_INTERVAL", "5000"),
                ("MAX_FAILURES", "5"),
                ("RESTART_COMMAND", "./run.sh"),
                ("LOG_FILE", "/tmp/sentinel.log"),
                ("METRICS_FILE", "/tmp/metrics.json"),
                ("SUPERVISED_PID", "4242"),
            ]),
        )
        .unwrap();

        assert_eq!(config.monitor.health_check_url, "http://127.0.0.1:9000/health");
        assert_eq!(config.monitor.check_interval_ms, 5000);
        assert_eq!(config.monitor.max_failures, 5);
        assert_eq!(config.restart.command, "./run.sh");
        assert_eq!(config.restart.supervised_pid, Some(4242));
        assert_eq!(config.files.log_file, PathBuf::from("/tmp/sentinel.log"));
        assert_eq!(config.files.metrics_file, PathBuf::from("/tmp/metrics.json"));
    }

    #[test]
    fn test_env_overrides_retry_settings() {
        let mut config = SentinelConfig::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("MAX_ATTEMPTS", "5"),
                ("BASE_DELAY", "500"),
                ("MAX_DELAY", "8000"),
                ("BACKOFF_MULTIPLIER", "1.5"),
            ]),
        )
        .unwrap();

        let retry = &config.client.retry;
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.base_delay_ms, 500);
        assert_eq!(retry.max_delay_ms, 8000);
        assert_eq!(retry.backoff_multiplier, 1.5);
    }

    #[test]
    fn test_unparseable_env_value_is_an_error() {
        let mut config = SentinelConfig::default();
        let err = apply_env_overrides(&mut config, env(&[("MAX_FAILURES", "three")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: "MAX_FAILURES", .. }));
        assert_eq!(err.to_string(), "Invalid value 'three' for MAX_FAILURES");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [monitor]
            health_check_url = "http://127.0.0.1:7000/health"
            max_failures = 4
            "#
        )
        .unwrap();

        let config = load_with(Some(file.path()), env(&[])).unwrap();
        assert_eq!(config.monitor.max_failures, 4);
        assert_eq!(config.monitor.health_check_url, "http://127.0.0.1:7000/health");
    }

    #[test]
    fn test_environment_wins_over_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[monitor]\nmax_failures = 4\ncheck_interval_ms = 1000").unwrap();

        let config = load_with(Some(file.path()), env(&[("MAX_FAILURES", "7")])).unwrap();
        assert_eq!(config.monitor.max_failures, 7);
        assert_eq!(config.monitor.check_interval_ms, 1000);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[monitor]\nmax_failures = 0").unwrap();

        let err = load_with(Some(file.path()), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("monitor.max_failures"));
    }

    #[test]
    fn test_invalid_environment_value_fails_validation() {
        let err = load_with(None, env(&[("HEALTH_CHECK_URL", "not a url")])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("monitor.health_check_url"));
    }
}
