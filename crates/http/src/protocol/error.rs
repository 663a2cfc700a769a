use std::fmt;
use std::io;
use thiserror::Error;

/// The phase a [`Parser`](crate::codec::Parser) is in.
///
/// Carried by every [`ParseError`] so callers can tell where in the message
/// the wire data went wrong.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ParseState {
    /// Unconfigured, no bytes seen for the current message
    Idle,
    /// Reading the start line and header block
    Head,
    /// Reading the message body
    Body,
    /// Reading the trailer section after the last chunk
    Trailers,
    /// The whole message has been consumed
    Complete,
}

impl ParseState {
    /// Stable numeric code for the state, used in logs.
    pub fn code(self) -> u8 {
        match self {
            ParseState::Idle => 0,
            ParseState::Head => 1,
            ParseState::Body => 2,
            ParseState::Trailers => 3,
            ParseState::Complete => 4,
        }
    }
}

impl fmt::Display for ParseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParseState::Idle => "idle",
            ParseState::Head => "head",
            ParseState::Body => "body",
            ParseState::Trailers => "trailers",
            ParseState::Complete => "complete",
        };
        write!(f, "{name}({})", self.code())
    }
}

/// Malformed wire data. Terminal for the current message; the parser that
/// produced it must be [`reset`](crate::codec::Parser::reset) before reuse.
#[derive(Error, Debug)]
#[error("{kind} (parser state: {state})")]
pub struct ParseError {
    state: ParseState,
    kind: ParseErrorKind,
}

#[derive(Error, Debug)]
pub enum ParseErrorKind {
    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid start line: {reason}")]
    InvalidStartLine { reason: String },

    #[error("invalid http version: {0:?}")]
    InvalidVersion(Option<u8>),

    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid chunk size: {reason}")]
    InvalidChunkSize { reason: String },

    #[error("invalid chunk: {reason}")]
    InvalidChunk { reason: String },

    #[error("invalid trailer: {reason}")]
    InvalidTrailer { reason: String },

    #[error("unexpected end of message")]
    UnexpectedEof,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn new(state: ParseState, kind: ParseErrorKind) -> Self {
        Self { state, kind }
    }

    /// Re-stamps the error with the parser state it surfaced in.
    #[must_use]
    pub fn at(mut self, state: ParseState) -> Self {
        self.state = state;
        self
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    /// Human readable description without the state suffix.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::new(ParseState::Head, ParseErrorKind::TooLargeHeader { current_size, max_size })
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::new(ParseState::Head, ParseErrorKind::TooManyHeaders { max_num })
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::new(ParseState::Head, ParseErrorKind::InvalidHeader { reason: str.to_string() })
    }

    pub fn invalid_start_line<S: ToString>(str: S) -> Self {
        Self::new(ParseState::Head, ParseErrorKind::InvalidStartLine { reason: str.to_string() })
    }

    pub fn invalid_version(version: Option<u8>) -> Self {
        Self::new(ParseState::Head, ParseErrorKind::InvalidVersion(version))
    }

    pub fn invalid_status(code: u16) -> Self {
        Self::new(ParseState::Head, ParseErrorKind::InvalidStatus(code))
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::new(ParseState::Head, ParseErrorKind::InvalidContentLength { reason: str.to_string() })
    }

    pub fn invalid_chunk_size<S: ToString>(str: S) -> Self {
        Self::new(ParseState::Body, ParseErrorKind::InvalidChunkSize { reason: str.to_string() })
    }

    pub fn invalid_chunk<S: ToString>(str: S) -> Self {
        Self::new(ParseState::Body, ParseErrorKind::InvalidChunk { reason: str.to_string() })
    }

    pub fn invalid_trailer<S: ToString>(str: S) -> Self {
        Self::new(ParseState::Trailers, ParseErrorKind::InvalidTrailer { reason: str.to_string() })
    }

    pub fn unexpected_eof(state: ParseState) -> Self {
        Self::new(state, ParseErrorKind::UnexpectedEof)
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::new(ParseState::Idle, ParseErrorKind::Io { source: e.into() })
    }
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        Self::io(e)
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid head: {reason}")]
    InvalidHead { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_head<S: ToString>(str: S) -> Self {
        Self::InvalidHead { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}
