//! Error types for capsule.

use std::io;

/// Errors produced by the capsule protocol clients and navigation engine.
///
/// Each protocol-level failure category has its own variant so callers can
/// branch on it: `CertChanged` asks the user before re-pinning, `Canceled`
/// is dropped silently, everything else becomes a dismissible message.
#[derive(Debug, thiserror::Error)]
pub enum CapsuleError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("could not connect: {0}")]
    Dial(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("certificate for {host} has changed")]
    CertChanged { host: String },

    #[error("request timed out")]
    Timeout,

    #[error("request canceled")]
    Canceled,

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CapsuleError {
    /// Whether this error represents an intentional supersession rather
    /// than a failure worth showing to the user.
    pub fn is_canceled(&self) -> bool {
        matches!(self, CapsuleError::Canceled)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CapsuleError>;
