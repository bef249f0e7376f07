//! Error handling for the on-air light daemon

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Config error (missing or malformed environment, unsupported host)
    #[error("Config error: {0}")]
    Config(String),

    /// Probe error (capability consent ledger unreadable)
    #[error("Probe error: {0}")]
    Probe(String),

    /// Bridge unreachable (timeout or connection failure)
    #[error("Bridge unreachable: {0}")]
    Unreachable(String),

    /// Bridge rejected the request (non-success status or bad payload)
    #[error("Bridge rejected request: {0}")]
    Rejected(String),
}
