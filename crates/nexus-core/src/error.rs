use thiserror::Error;

/// Errors produced by the chat core.
///
/// Configuration errors are fatal to session creation and propagate to the
/// caller. Transport errors are recovered by the reply controller, which
/// turns them into a single apology message in the transcript.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport(message.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Transport(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Error::Transport(format!("connection failed: {err}"))
        } else {
            Error::Transport(format!("request failed: {err}"))
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
