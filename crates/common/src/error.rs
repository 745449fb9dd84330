//! Error types shared across Dashview crates.

use std::path::PathBuf;

/// Top-level error type for Dashview operations.
#[derive(Debug, thiserror::Error)]
pub enum DashviewError {
    #[error("An export is already in progress")]
    AlreadyInProgress,

    #[error("No camera source is loaded")]
    NoSourceLoaded,

    #[error("Export denied: {reason}")]
    AccessDenied { reason: String },

    #[error("Invalid export options: {message}")]
    InvalidOptions { message: String },

    #[error("Source error: {message}")]
    Source { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Encoder error: {message}")]
    Encoder { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using DashviewError.
pub type DashviewResult<T> = Result<T, DashviewError>;

impl DashviewError {
    pub fn access_denied(reason: impl Into<String>) -> Self {
        Self::AccessDenied {
            reason: reason.into(),
        }
    }

    pub fn invalid_options(msg: impl Into<String>) -> Self {
        Self::InvalidOptions {
            message: msg.into(),
        }
    }

    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error was raised during setup, before any export
    /// resource was acquired.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyInProgress
                | Self::NoSourceLoaded
                | Self::AccessDenied { .. }
                | Self::InvalidOptions { .. }
        )
    }
}
