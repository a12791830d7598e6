//! Error types for the medigate edge gateway.

use std::io;

use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway startup and plumbing errors.
///
/// Per-request failures never surface here: authentication failures become
/// redirects and forwarding failures become 502 responses at the proxy
/// boundary. This enum covers the paths where the process itself cannot
/// continue (bad configuration, bind failure).
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
