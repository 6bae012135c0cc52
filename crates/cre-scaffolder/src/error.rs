//! Error type shared by the template registry components

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Everything that can go wrong while resolving, discovering or materializing templates
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A repository string did not have the `owner/repo[@ref]` shape
    #[error("invalid repository format {input:?}: expected owner/repo[@ref]")]
    InvalidRepoFormat { input: String },

    /// Transport error, non-success status or undecodable response from the remote host
    #[error("template source {repo} is unavailable: {reason}")]
    RemoteUnavailable { repo: String, reason: String },

    /// A per-template metadata document could not be used
    #[error("invalid template metadata at {path}: {reason}")]
    InvalidMetadata { path: String, reason: String },

    /// A cache record exists but could not be decoded
    #[error("corrupt cache record {}: {reason}", path.display())]
    CacheCorrupt { path: PathBuf, reason: String },

    /// An archive entry would be written outside the destination directory
    #[error("illegal file path in archive: {entry}")]
    UnsafeArchivePath { entry: String },

    /// Reading the archive or writing extracted files failed
    #[error("failed to extract template: {message}")]
    ExtractionFailed {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("template {name:?} not found")]
    TemplateNotFound { name: String },

    #[error("no templates found from any source. Check your network connection and try again")]
    NoTemplatesAvailable,

    /// The workflow name cannot be used as a single directory name
    #[error("invalid workflow name {name:?}: must be a single directory name")]
    InvalidWorkflowName { name: String },

    /// The HTTP client could not be configured
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("failed to read or write template configuration {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl RegistryError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn extraction(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::ExtractionFailed {
            message: message.into(),
            source,
        }
    }

    pub(crate) fn remote(repo: impl ToString, reason: impl ToString) -> Self {
        Self::RemoteUnavailable {
            repo: repo.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Errors that must never trigger a fallback path
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UnsafeArchivePath { .. } | Self::Cancelled)
    }
}
