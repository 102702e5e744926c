//! Error types for Stratus
//!
//! All modules use `StratusResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Stratus operations
pub type StratusResult<T> = Result<T, StratusError>;

/// All errors that can occur in Stratus
#[derive(Error, Debug)]
pub enum StratusError {
    // Remote store errors
    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("remote store is closed")]
    StoreClosed,

    #[error("read action {action_id} from remote: {reason}")]
    RemoteAction { action_id: String, reason: String },

    #[error("read output {output_id} from remote: {reason}")]
    RemoteOutput { output_id: String, reason: String },

    // Record errors
    #[error("malformed action record: {0}")]
    MalformedAction(String),

    #[error("invalid record id: {0:?}")]
    InvalidId(String),

    // Configuration errors
    #[error("invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("missing required setting: {0}")]
    ConfigMissing(&'static str),

    #[error("failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

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

impl StratusError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create the canonical not-found sentinel for a remote key
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Check whether this error is the not-found sentinel
    ///
    /// Callers use this to discriminate a cache miss from a transport
    /// failure; any other remote error is not a miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
