//! Error handling - Hierarchical errors for the bus runtime

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// aleph-bus error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("Config: {0}")]
    Config(String),

    /// Construction-time invalid input
    #[error("Validation: {0}")]
    Validation(String),

    /// A second handler was registered for the same message type
    #[error("Duplicate handler: {component} already handles {message_type}")]
    DuplicateHandler {
        component: String,
        message_type: String,
    },

    /// A mailbox worker did not shut down cleanly
    #[error("Shutdown: {0}")]
    Shutdown(String),

    /// IO errors
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse errors
    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}
