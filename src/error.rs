//! Error types for the Authguard service.

use thiserror::Error;

/// Main error type for Authguard operations.
///
/// A rate limit denial is not an error: limiters report it as `Ok(false)`.
#[derive(Error, Debug)]
pub enum AuthGuardError {
    /// The identity lacks a dimension the limiter needs, or names a dimension
    /// the limiter was not initialized with.
    #[error("not found appropriate key in user identity")]
    IncorrectIdentity,

    /// The limit store had nothing for the requested dimensions.
    #[error("not found any limits for given identity")]
    NoLimitsFound,

    /// A composite bucket key could not be resolved to a dimension.
    #[error("incorrect bucket key: {0}")]
    IncorrectBucketKey(String),

    /// Operation not supported by this limiter
    #[error("operation not supported")]
    NotSupported,

    /// Unparseable IP passed to a list membership check
    #[error("incorrect IP passed: {0}")]
    InvalidInputIp(String),

    /// No rule matched a delete request
    #[error("rule not found")]
    RuleNotFound,

    /// Limit or rule storage failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Authguard operations.
pub type Result<T> = std::result::Result<T, AuthGuardError>;

impl From<::config::ConfigError> for AuthGuardError {
    fn from(err: ::config::ConfigError) -> Self {
        AuthGuardError::Config(err.to_string())
    }
}

impl From<AuthGuardError> for tonic::Status {
    fn from(err: AuthGuardError) -> Self {
        let message = err.to_string();
        match err {
            AuthGuardError::IncorrectIdentity | AuthGuardError::InvalidInputIp(_) => {
                tonic::Status::invalid_argument(message)
            }
            AuthGuardError::RuleNotFound => tonic::Status::not_found(message),
            _ => tonic::Status::internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_invalid_argument() {
        let status = tonic::Status::from(AuthGuardError::IncorrectIdentity);
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status = tonic::Status::from(AuthGuardError::InvalidInputIp("nope".to_string()));
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert!(status.message().contains("nope"));
    }

    #[test]
    fn test_rule_not_found_maps_to_not_found() {
        let status = tonic::Status::from(AuthGuardError::RuleNotFound);
        assert_eq!(status.code(), tonic::Code::NotFound);
    }

    #[test]
    fn test_other_errors_map_to_internal() {
        for err in [
            AuthGuardError::NoLimitsFound,
            AuthGuardError::NotSupported,
            AuthGuardError::IncorrectBucketKey("ip".to_string()),
            AuthGuardError::Storage("connection reset".to_string()),
        ] {
            assert_eq!(tonic::Status::from(err).code(), tonic::Code::Internal);
        }
    }
}
