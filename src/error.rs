use std::fmt;

#[derive(Debug)]
pub enum Error {
    NoCredential,
    RefreshFailed(String),
    AuthExpired,
    AuthorizationFailed(String),
    GatewayUnreachable { path: String, reason: String },
    InvalidRequest { path: String, status: u16, message: String },
    OutOfRange { path: String, value: f64, min: f64, max: f64 },
    InvalidValue { path: String, reason: String },
    ModeConflict { expected: String, actual: String },
    UnsupportedInMode { operation: &'static str, mode: String },
    Unavailable(String),
    UnknownEndpoint(String),
    Protocol(String),
    Http(reqwest::Error),
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl Error {
    /// Network or gateway trouble; the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::GatewayUnreachable { .. })
    }

    /// Rejected locally or by mode checks before anything was written.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::OutOfRange { .. }
                | Error::InvalidValue { .. }
                | Error::ModeConflict { .. }
                | Error::UnsupportedInMode { .. }
                | Error::UnknownEndpoint(_)
        )
    }

    /// The session cannot continue without the user authorizing again.
    pub fn needs_reauthorization(&self) -> bool {
        matches!(
            self,
            Error::RefreshFailed(_) | Error::NoCredential | Error::AuthExpired
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoCredential => write!(f, "no credential loaded"),
            Error::RefreshFailed(msg) => {
                write!(f, "token refresh failed, re-authorization required: {msg}")
            }
            Error::AuthExpired => write!(f, "access token rejected after refresh"),
            Error::AuthorizationFailed(msg) => write!(f, "authorization failed: {msg}"),
            Error::GatewayUnreachable { path, reason } => {
                write!(f, "gateway unreachable ({path}): {reason}")
            }
            Error::InvalidRequest {
                path,
                status,
                message,
            } => write!(f, "request rejected ({path}, HTTP {status}): {message}"),
            Error::OutOfRange {
                path,
                value,
                min,
                max,
            } => write!(f, "{value} out of range for {path} ({min}..={max})"),
            Error::InvalidValue { path, reason } => write!(f, "invalid value for {path}: {reason}"),
            Error::ModeConflict { expected, actual } => {
                write!(f, "mode conflict: expected {expected}, device reports {actual}")
            }
            Error::UnsupportedInMode { operation, mode } => {
                write!(f, "{operation} not supported in mode {mode}")
            }
            Error::Unavailable(path) => write!(f, "no value available for {path}"),
            Error::UnknownEndpoint(path) => write!(f, "unknown endpoint: {path}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Http(e) => write!(f, "HTTP client error: {e}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
