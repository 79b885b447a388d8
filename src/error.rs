//! Error types for mtbcat
//!
//! All modules use `CatalogResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// All errors that can occur while fetching, caching or reading the catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    // Network errors
    #[error("HTTP status {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Transport error fetching {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Timed out after {secs}s fetching {url}")]
    FetchTimeout { url: String, secs: u64 },

    #[error("Invalid proxy URL {proxy}: {reason}")]
    ProxyInvalid { proxy: String, reason: String },

    // Document errors
    #[error("Failed to parse {document} document: {reason}")]
    Parse {
        document: &'static str,
        reason: String,
    },

    #[error("Failed to load root manifest {url}: {source}")]
    RootManifest {
        url: String,
        #[source]
        source: Box<CatalogError>,
    },

    // Cache errors
    #[error("URL too long to cache ({len} bytes, limit {max})")]
    CacheUrlTooLong { len: usize, max: usize },

    // Lookup errors
    #[error("Component not found: {0}")]
    ComponentNotFound(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
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

    // Task errors
    #[error("Background task failed: {0}")]
    Task(String),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl CatalogError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a document parse error
    pub fn parse(document: &'static str, reason: impl ToString) -> Self {
        Self::Parse {
            document,
            reason: reason.to_string(),
        }
    }

    /// Check if a later attempt at the same operation could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::FetchTimeout { .. } => true,
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::RootManifest { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Transport { .. } | Self::FetchTimeout { .. } => {
                Some("Check network access, or set fetch.proxy in the config file")
            }
            Self::HttpStatus { status: 404, .. } => Some("Check the catalog root URL (--root)"),
            Self::ProxyInvalid { .. } => Some("Use a proxy URL like http://host:port"),
            Self::RootManifest { source, .. } => source.hint(),
            Self::ConfigInvalid { .. } => Some("Run: mtbcat config show"),
            _ => None,
        }
    }
}
