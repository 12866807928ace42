//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Detect conflicting listener ports
//!
//! Returns every validation error, not just the first.

use crate::config::schema::ProxyConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem found in the settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be 0")]
    ZeroPort { field: &'static str },

    #[error("http_port and https_port are both {0}")]
    PortConflict(u16),

    #[error("bind_host must list at least one address")]
    NoBindHost,

    #[error("bind_host contains an empty entry")]
    EmptyBindHost,

    #[error("unknown log level '{0}'")]
    LogLevel(String),

    #[error("{0} must be greater than 0")]
    NotPositive(&'static str),
}

/// Check the settings, collecting every problem.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.http_port == Some(0) {
        errors.push(ValidationError::ZeroPort { field: "http_port" });
    }
    if config.https_port == Some(0) {
        errors.push(ValidationError::ZeroPort { field: "https_port" });
    }
    if let (Some(http), Some(https)) = (config.http_port, config.https_port) {
        if http == https && http != 0 {
            errors.push(ValidationError::PortConflict(http));
        }
    }

    if config.bind_host.is_empty() {
        errors.push(ValidationError::NoBindHost);
    } else if config.bind_host.iter().any(|h| h.trim().is_empty()) {
        errors.push(ValidationError::EmptyBindHost);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if config.request_timeout_secs == 0 {
        errors.push(ValidationError::NotPositive("request_timeout_secs"));
    }
    if config.max_body_size == 0 {
        errors.push(ValidationError::NotPositive("max_body_size"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let config = ProxyConfig {
            http_port: Some(0),
            bind_host: Vec::new(),
            request_timeout_secs: 0,
            ..ProxyConfig::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroPort { field: "http_port" },
                ValidationError::NoBindHost,
                ValidationError::NotPositive("request_timeout_secs"),
            ]
        );
    }

    #[test]
    fn rejects_shared_port() {
        let config = ProxyConfig {
            http_port: Some(8443),
            ..ProxyConfig::default()
        };
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::PortConflict(8443)]
        );
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = ProxyConfig::default();
        config.observability.log_level = "chatty".into();
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::LogLevel("chatty".into())]
        );
    }
}
