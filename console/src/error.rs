//! Error taxonomy for the console.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    /// The request never produced a response (connect, DNS, reset, body read).
    #[error("Request failed: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("HTTP error: {status} ({message})")]
    Http { status: u16, message: String },

    #[error("Failed to parse JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// A client-side precondition refused the action before any request.
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ConsoleError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Failures worth retrying on the next scheduled tick.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::Rejected(_) | Self::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for ConsoleError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            return Self::Transport(format!("invalid response body: {value}"));
        }
        Self::Transport(value.to_string())
    }
}

pub type Result<T, E = ConsoleError> = std::result::Result<T, E>;
