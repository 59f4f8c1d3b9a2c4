use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authorization refused (status {status}): {reason}")]
    AuthDenied { status: u16, reason: String },

    #[error("Authorization timed out after {0} ms")]
    AuthTimeout(u128),

    #[error("GPIO error [pin {pin}]: {reason}")]
    Gpio { pin: u32, reason: String },

    #[error("Badge reader error: {0}")]
    BadgeReader(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Build a GPIO error for the given line offset
    pub fn gpio(pin: u32, reason: impl std::fmt::Display) -> Self {
        Self::Gpio {
            pin,
            reason: reason.to_string(),
        }
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;
