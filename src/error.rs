use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] tokio_rusqlite::Error),

    #[error("{context}: HTTP {status} => {body}")]
    Api {
        context: &'static str,
        status: u16,
        body: String,
    },

    #[error("Authentication error: {0}")]
    Auth(String),

    /// The account lacks moderator permissions for the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    /// A placeholder referenced a channel that was never checked for live status.
    #[error("channel {0:?} has no live status; it was never queried")]
    UnresolvedChannel(String),
}

impl Error {
    /// Errors scoped to a single subreddit that should not abort a run.
    pub fn is_permission_or_missing(&self) -> bool {
        matches!(self, Error::Forbidden(_) | Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
