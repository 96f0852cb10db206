use thiserror::Error;

/// Failure surface of the request pipeline and session layer. Variants carry
/// owned strings only so the refresh coordinator can fan one result out to
/// every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// Transport-level failure before any HTTP status existed. Reported with
    /// status 0 so callers can tell it apart from server errors.
    #[error("network error: {0}")]
    Network(String),
    /// 401 with a non-token reason, or 403. Never retried.
    #[error("unauthorized (http {status}): {message}")]
    Unauthorized { status: u16, message: String },
    /// The refresh exchange failed; the session is over and the caller must
    /// route the user back to login.
    #[error("session expired")]
    SessionExpired,
    /// Any other non-2xx response, carrying the server-provided message or
    /// the HTTP status text.
    #[error("server error (http {status}): {message}")]
    Server { status: u16, message: String },
    /// Credential store read/write failure.
    #[error("credential store error: {0}")]
    Credential(String),
    /// Malformed or failed login/refresh exchange plumbing.
    #[error("auth exchange error: {0}")]
    Auth(String),
}

impl ApiError {
    /// Numeric HTTP status backing this error; 0 when no response was
    /// received.
    pub fn status(&self) -> u16 {
        match self {
            Self::Network(_) => 0,
            Self::Unauthorized { status, .. } | Self::Server { status, .. } => *status,
            Self::SessionExpired => 401,
            Self::Credential(_) | Self::Auth(_) => 0,
        }
    }
}
