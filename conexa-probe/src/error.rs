//! Error types for the probe.
//!
//! These cover setup only. Failures of the probe itself are captured into
//! [`conexa_common::ProbeResult`] instead of being returned as `Err`.

/// Setup errors: configuration, client construction, request encoding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Failed to read .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("port must not be 0".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: port must not be 0");

        let err = Error::HttpClient("tls backend unavailable".to_string());
        assert!(err.to_string().contains("HTTP client error"));
    }

    #[test]
    fn test_error_from_config_error() {
        let err: Error = config::ConfigError::Message("missing field".to_string()).into();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("missing field"));
    }
}
