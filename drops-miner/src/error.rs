//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// Scheduling outcomes (no streams, no progress, preemption, stream down)
/// are not errors; see [`crate::scheduler::SessionOutcome`] and
/// [`crate::scheduler::CampaignOutcome`].
#[derive(Error, Debug)]
pub enum Error {
    /// A call to the remote API client failed. Always treated as transient.
    #[error("API error: {0}")]
    Api(String),

    /// The page driver failed (navigation, load timeout, page action).
    #[error("Page driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    pub fn driver(msg: impl Into<String>) -> Self {
        Self::Driver(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
