use thiserror::Error;

/// Failures of one sync attempt. None of these reach the host; the tracker
/// logs them and carries on.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    /// The server no longer accepts the session id we sent (HTTP 409).
    #[error("session conflict")]
    SessionConflict,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
}

impl SyncError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::SessionConflict)
    }
}
