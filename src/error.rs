//! Error types for Codex Factory

use thiserror::Error;

/// Result type for Codex Factory operations
pub type Result<T> = std::result::Result<T, FactoryError>;

/// Codex Factory error types
#[derive(Error, Debug)]
pub enum FactoryError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported version: {0}")]
    UnsupportedVersion(String),

    #[error("Docker repository has to be configured to resolve image {0}")]
    MissingRepo(String),

    #[error("Found {count} containers for name \"{name}\", expected only one")]
    AmbiguousName { name: String, count: usize },

    #[error(
        "Container with name \"{name}\" was created with image {existing} but {requested} was requested"
    )]
    ImageConflict {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("Image {0} does not declare a compatible blockchain image")]
    MissingBlockchainLabel(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Container not running: {0}")]
    ContainerNotRunning(String),

    #[error("Docker daemon responded with {status_code}: {message}")]
    Daemon { status_code: u16, message: String },

    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Node API error: {0}")]
    Api(String),

    #[error("Unsupported multiaddress: {0}")]
    UnsupportedMultiaddr(String),

    #[error("Timeout: {phase} did not become ready after {attempts} attempts")]
    Timeout { phase: String, attempts: u32 },

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FactoryError {
    /// The daemon reported that the addressed object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, FactoryError::Daemon { status_code: 404, .. })
    }

    /// The daemon reported that nothing changed, e.g. stopping a stopped container
    pub fn is_not_modified(&self) -> bool {
        matches!(self, FactoryError::Daemon { status_code: 304, .. })
    }

    /// Shorthand used by daemon implementations
    pub fn daemon(status_code: u16, message: impl Into<String>) -> Self {
        FactoryError::Daemon {
            status_code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daemon_status_predicates() {
        assert!(FactoryError::daemon(404, "no such container").is_not_found());
        assert!(FactoryError::daemon(304, "container already stopped").is_not_modified());
        assert!(!FactoryError::daemon(500, "boom").is_not_found());
        assert!(!FactoryError::Interrupted.is_not_modified());
    }

    #[test]
    fn test_image_conflict_message_names_both_images() {
        let err = FactoryError::ImageConflict {
            name: "codex-factory-client".to_string(),
            existing: "codexstorage/nim-codex:0.1.0".to_string(),
            requested: "codexstorage/nim-codex:0.2.0".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("0.1.0"));
        assert!(message.contains("0.2.0"));
    }
}
