//! Error types for flagcache
//!
//! All modules use `FlagResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for flagcache operations
pub type FlagResult<T> = Result<T, FlagError>;

/// All errors that can occur in flagcache
#[derive(Error, Debug)]
pub enum FlagError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Fetch errors
    #[error("Request failed for {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Request for {url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    // Cache errors
    #[error("Cannot decode cached asset: {0}")]
    Decode(String),

    #[error("Failed to persist asset cache: {0}")]
    StorePersist(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlagError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a transport error for a URL
    pub fn transport(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => Some("Run: flagcache config show"),
            Self::Transport { .. } => Some("Check network access to the asset CDN"),
            Self::HttpStatus { status: 404, .. } => {
                Some("The asset does not exist at fetch.base_url; check the configured CDN path")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = FlagError::HttpStatus {
            url: "https://cdn.example/1f1e6-1f1fa.svg".to_string(),
            status: 404,
        };
        assert!(err.to_string().contains("status 404"));
    }

    #[test]
    fn error_hint() {
        let err = FlagError::transport("https://cdn.example/x.svg", "connection refused");
        assert_eq!(err.hint(), Some("Check network access to the asset CDN"));
        assert!(FlagError::Internal("x".to_string()).hint().is_none());
    }
}
