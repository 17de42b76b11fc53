use rally_common::tree::TreeError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("store answered {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },
    #[error("malformed record: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("bad store path: {0}")]
    Path(#[from] TreeError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error("not allowed: {0}")]
    Forbidden(String),
    #[error("no user is signed in")]
    SignedOut,
}

impl Error {
    /// Failures of the store itself, as opposed to something wrong with the request.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Error::Unavailable(_) | Error::Transport(_) => true,
            Error::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}
