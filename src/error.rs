use std::fmt;

/// Result type for tradestation-rs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tradestation-rs
#[derive(Debug)]
pub enum Error {
    /// HTTP request failed
    Http(reqwest::Error),

    /// JSON serialization/deserialization failed
    Json(serde_json::Error),

    /// Invalid configuration (missing credentials, out-of-range parameters)
    Config(String),

    /// Credentials or token rejected, after local recovery was attempted
    Auth(AuthError),

    /// Transport-level failure of the streaming connection
    Connection(String),

    /// API error response
    Api { status: u16, message: String },

    /// Reconnection failed after the configured number of attempts
    ReconnectFailed {
        attempts: u32,
        last_error: String,
    },
}

impl Error {
    /// Whether the reconnect policy may retry after this error.
    ///
    /// Authentication failures are handled separately by the session and
    /// configuration errors are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) | Error::Connection(_) => true,
            Error::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Error::Json(_)
            | Error::Config(_)
            | Error::Auth(_)
            | Error::ReconnectFailed { .. } => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {}", e),
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Auth(e) => write!(f, "Authentication error: {}", e),
            Error::Connection(msg) => write!(f, "Connection error: {}", msg),
            Error::Api { status, message } => {
                write!(f, "API error (status {}): {}", status, message)
            }
            Error::ReconnectFailed {
                attempts,
                last_error,
            } => write!(
                f,
                "Reconnection failed after {} attempts: {}",
                attempts, last_error
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Auth(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Auth(err)
    }
}

/// Failure of an OAuth exchange or of the token lifecycle.
///
/// Cloneable so that every caller waiting on the same in-flight refresh
/// receives the identical failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The authorization server rejected the grant (invalid credentials,
    /// expired or revoked refresh token, or a 401 from the API itself)
    Rejected {
        status: u16,
        error: String,
        description: Option<String>,
    },

    /// The user denied consent, or the redirect carried an error
    Denied(String),

    /// The redirect `state` did not match the one that was sent
    StateMismatch,

    /// The token endpoint could not be reached or returned an unreadable body
    Transport(String),

    /// The exchange did not finish within the configured timeout
    TimedOut,

    /// A refresh was requested but no refresh token is held
    NoRefreshToken,

    /// The token manager has been closed
    Closed,
}

impl AuthError {
    /// Whether a failed refresh should fall back to full re-authentication.
    pub fn needs_reauthentication(&self) -> bool {
        matches!(self, AuthError::Rejected { .. } | AuthError::NoRefreshToken)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Rejected {
                status,
                error,
                description,
            } => match description {
                Some(description) => {
                    write!(f, "rejected (status {}): {}: {}", status, error, description)
                }
                None => write!(f, "rejected (status {}): {}", status, error),
            },
            AuthError::Denied(reason) => write!(f, "authorization denied: {}", reason),
            AuthError::StateMismatch => write!(f, "authorization state mismatch"),
            AuthError::Transport(msg) => write!(f, "token endpoint unreachable: {}", msg),
            AuthError::TimedOut => write!(f, "token exchange timed out"),
            AuthError::NoRefreshToken => write!(f, "no refresh token available"),
            AuthError::Closed => write!(f, "token manager is closed"),
        }
    }
}

impl std::error::Error for AuthError {}
