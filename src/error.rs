/*!
 * Error types for the PagePilot application layer
 */

use pagepilot_core_resilience::{ClassifiedError, ErrorKind};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration file missing, unreadable or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config file could not be read or written
    #[error("Failed to access {path}: {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Logging could not be initialised
    #[error("Logging error: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A collaborator failure, already classified
    #[error(transparent)]
    Classified(#[from] ClassifiedError),
}

impl AppError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::ConfigFile { .. } | AppError::Logging(_) => EXIT_FATAL,
            AppError::Classified(err) => match err.kind {
                ErrorKind::Authentication
                | ErrorKind::Authorization
                | ErrorKind::DatabaseError
                | ErrorKind::ServiceUnavailable => EXIT_FATAL,
                _ => EXIT_PARTIAL,
            },
            AppError::Io(_) => EXIT_PARTIAL,
        }
    }

    /// The classified failure behind this error, if any
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            AppError::Classified(err) => Some(err),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(format!("Invalid TOML: {}", err))
    }
}

impl From<toml::ser::Error> for AppError {
    fn from(err: toml::ser::Error) -> Self {
        AppError::Config(format!("Failed to serialize config: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(AppError::Config("bad".into()).exit_code(), EXIT_FATAL);
        assert_eq!(
            AppError::from(ClassifiedError::validation("Content is required")).exit_code(),
            EXIT_PARTIAL
        );
        assert_eq!(
            AppError::from(ClassifiedError::database("Database server unavailable")).exit_code(),
            EXIT_FATAL
        );
    }

    #[test]
    fn test_classified_is_transparent() {
        let err = AppError::from(ClassifiedError::not_found("Post not found"));
        assert_eq!(err.to_string(), "NotFound: Post not found");
        assert_eq!(err.classified().map(|e| e.kind), Some(ErrorKind::NotFound));
        assert!(AppError::Logging("x".into()).classified().is_none());
    }

    #[test]
    fn test_toml_errors_become_config_errors() {
        let err: AppError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
        assert!(matches!(err, AppError::Config(msg) if msg.starts_with("Invalid TOML")));
    }
}
