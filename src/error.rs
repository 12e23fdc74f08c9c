use crate::config::ConfigError;
use crate::messaging::FormatError;
use crate::port::PortError;
use crate::profile::{ProfileError, StoreError};
use crate::service::ServiceError;
use thiserror::Error;

/// Unified application error type.
///
/// Each layer keeps its own error enum; this one only exists so `main` and
/// the console can use `?` across layers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serial port error: {0}")]
    Port(#[from] PortError),

    #[error("{0}")]
    Service(#[from] ServiceError),

    #[error("{0}")]
    Profile(#[from] ProfileError),

    #[error("Profile storage error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Format(#[from] FormatError),

    #[error("An I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    #[error("A background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for application-level operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_errors_convert() {
        let err: AppError = ServiceError::PortNotOpen.into();
        assert!(matches!(err, AppError::Service(_)));

        let err: AppError = ProfileError::Protected.into();
        assert_eq!(err.to_string(), "Cannot delete the Default profile.");

        let err: AppError = FormatError::InvalidHex.into();
        assert!(err.to_string().starts_with("Invalid HEX format"));
    }
}
