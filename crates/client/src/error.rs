use std::io;
use std::time::Duration;

use http::StatusCode;
use micro_http1::protocol::{ParseError, Response, SendError};
use thiserror::Error;

/// Everything a request can fail with.
///
/// A call resolves to one [`Response`] or exactly one of these. Whatever the
/// variant, the connection the failed transaction ran on is closed and evicted
/// from the pool.
#[derive(Error, Debug)]
pub enum Error {
    /// The peer sent malformed HTTP. Never retried.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The connection ended before the response was complete.
    #[error("incomplete message: {reason}")]
    IncompleteMessage { reason: String },

    /// The server answered with an error status and `status_exception` is on.
    #[error("request failed with status {status}")]
    Status { status: StatusCode, response: Box<Response> },

    /// No bytes arrived for the configured read timeout.
    #[error("no data received for {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl Error {
    pub fn incomplete<S: ToString>(reason: S) -> Self {
        Self::IncompleteMessage { reason: reason.to_string() }
    }

    pub fn status(response: Response) -> Self {
        Self::Status { status: response.status, response: Box::new(response) }
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    pub fn invalid_url<U: ToString, S: ToString>(url: U, reason: S) -> Self {
        Self::InvalidUrl { url: url.to_string(), reason: reason.to_string() }
    }

    pub(crate) fn closed() -> Self {
        Self::Io(io::Error::new(io::ErrorKind::ConnectionAborted, "connection closed"))
    }

    /// Worth another attempt on a fresh connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Io(_) | Error::IncompleteMessage { .. } | Error::Timeout { .. })
    }

    /// Transport level failure; an incomplete message counts as one.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Error::Io(_) | Error::IncompleteMessage { .. })
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            Error::Status { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Error::Status { response, .. } => Some(*response),
            _ => None,
        }
    }
}

impl From<SendError> for Error {
    fn from(e: SendError) -> Self {
        match e {
            SendError::Io { source } => Error::Io(source),
            other => Error::Io(io::Error::new(io::ErrorKind::InvalidInput, other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use micro_http1::protocol::ParseState;

    #[test]
    fn recoverable_errors() {
        assert!(Error::from(io::Error::from(io::ErrorKind::BrokenPipe)).is_recoverable());
        assert!(Error::incomplete("eof in body").is_recoverable());
        assert!(Error::timeout(Duration::from_secs(1)).is_recoverable());

        assert!(!Error::from(ParseError::unexpected_eof(ParseState::Body)).is_recoverable());
        assert!(!Error::status(Response::new(StatusCode::BAD_GATEWAY)).is_recoverable());
        assert!(!Error::invalid_url("x", "relative").is_recoverable());
    }

    #[test]
    fn incomplete_message_is_an_io_error() {
        assert!(Error::incomplete("eof").is_io_error());
        assert!(!Error::timeout(Duration::from_secs(1)).is_io_error());
    }

    #[test]
    fn status_error_keeps_response() {
        let error = Error::status(Response::new(StatusCode::NOT_FOUND));
        assert_eq!(error.status_code(), Some(StatusCode::NOT_FOUND));
        assert_eq!(error.response().map(|r| r.status), Some(StatusCode::NOT_FOUND));
        assert_eq!(error.into_response().unwrap().status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn send_error_becomes_io() {
        let error = Error::from(SendError::invalid_body("too long"));
        assert!(matches!(error, Error::Io(ref e) if e.kind() == io::ErrorKind::InvalidInput));
    }
}
