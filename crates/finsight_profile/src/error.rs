//! Error types for the profile module.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for profile operations.
pub type ProfileResult<T> = Result<T, ProfileError>;

/// Errors that can occur while loading or validating a profile.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("No profile found for environment '{environment}' in {dir}")]
    NotFound { environment: String, dir: PathBuf },

    #[error("Config directory not found: {0}")]
    ConfigDirNotFound(PathBuf),

    #[error("Invalid profile {path}: {message}")]
    InvalidFormat { path: PathBuf, message: String },

    #[error("Profile validation failed for '{environment}': {}", .errors.join("; "))]
    Validation {
        environment: String,
        errors: Vec<String>,
    },

    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
