use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("transport: {0}")]
    Transport(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("config: {0}")]
    Config(String),

    #[error("storage: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Text shown in the inline error banner.
    pub fn user_message(&self) -> String {
        match self {
            Error::Http(e) if e.is_timeout() => "The server took too long to respond.".into(),
            Error::Http(e) if e.is_connect() => "Could not reach the server.".into(),
            Error::Status { status: 401 | 403, .. } => "You are not allowed to do that.".into(),
            Error::Status { status: 404, .. } => "The requested item no longer exists.".into(),
            Error::Status { status, body } if !body.is_empty() => format!("HTTP {status}: {body}"),
            Error::Status { status, .. } => format!("Request failed (HTTP {status})."),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
