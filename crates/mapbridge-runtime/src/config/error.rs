//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found at the specified path.
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file extension is not a supported (or enabled) format.
    #[error("unsupported or disabled configuration file format: .{0}")]
    UnsupportedFormat(String),

    /// Extracting the typed configuration failed.
    #[error("failed to extract configuration: {0}")]
    Extract(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
