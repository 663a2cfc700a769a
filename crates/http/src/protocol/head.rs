//! Start line plus header block of a message.
//!
//! [`MessageHead`] is direction-agnostic: the parser produces it for both
//! requests and responses, and the encoders serialise it back. It also owns the
//! body framing rules of [RFC 7230 Section 3.3.3](https://tools.ietf.org/html/rfc7230#section-3.3.3).

use http::{Method, StatusCode, Version};

use crate::ensure;
use crate::protocol::{Headers, ParseError, PayloadSize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartLine {
    Request { method: Method, target: String },
    Response { status: StatusCode, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHead {
    pub version: Version,
    pub start_line: StartLine,
    pub headers: Headers,
}

impl MessageHead {
    pub fn request(method: Method, target: impl Into<String>, version: Version, headers: Headers) -> Self {
        Self { version, start_line: StartLine::Request { method, target: target.into() }, headers }
    }

    pub fn response(status: StatusCode, version: Version, headers: Headers) -> Self {
        let reason = status.canonical_reason().unwrap_or_default().to_string();
        Self { version, start_line: StartLine::Response { status, reason }, headers }
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start_line, StartLine::Request { .. })
    }

    pub fn method(&self) -> Option<&Method> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { target, .. } => Some(target),
            StartLine::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match &self.start_line {
            StartLine::Response { status, .. } => Some(*status),
            StartLine::Request { .. } => None,
        }
    }

    /// Does the message have a `Transfer-Encoding` whose final coding is `chunked`?
    pub fn is_chunked(&self) -> bool {
        self.headers.is_chunked()
    }

    /// The declared `Content-Length`, if any.
    ///
    /// Repeated fields (or comma lists) are accepted only when every value agrees.
    pub fn content_length(&self) -> Result<Option<u64>, ParseError> {
        let mut length = None;
        for value in self.headers.get_all("Content-Length").flat_map(|v| v.split(',')) {
            let parsed = value
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::invalid_content_length(format!("value {value:?} is not a number")))?;

            if let Some(existing) = length {
                ensure!(existing == parsed, ParseError::invalid_content_length("conflicting content-length values"));
            }
            length = Some(parsed);
        }
        Ok(length)
    }

    /// Whether the connection may stay open after this message.
    pub fn keep_alive(&self) -> bool {
        if self.headers.contains_token("Connection", "close") {
            return false;
        }
        self.version != Version::HTTP_10 || self.headers.contains_token("Connection", "keep-alive")
    }

    /// Determines how the body of this message is delimited.
    ///
    /// `request_method` is the method of the request a response answers; it is
    /// needed because responses to `HEAD` never carry a body.
    pub fn payload_size(&self, request_method: Option<&Method>) -> Result<PayloadSize, ParseError> {
        match &self.start_line {
            StartLine::Request { .. } => {
                let has_te = self.headers.contains("Transfer-Encoding");
                let length = self.content_length()?;
                ensure!(
                    !(has_te && length.is_some()),
                    ParseError::invalid_header("both transfer-encoding and content-length are present")
                );

                if self.is_chunked() {
                    return Ok(PayloadSize::Chunked);
                }
                ensure!(!has_te, ParseError::invalid_header("request transfer-encoding must end with chunked"));

                Ok(match length {
                    None | Some(0) => PayloadSize::Empty,
                    Some(n) => PayloadSize::Length(n),
                })
            }

            StartLine::Response { status, .. } => {
                if request_method == Some(&Method::HEAD)
                    || status.is_informational()
                    || *status == StatusCode::NO_CONTENT
                    || *status == StatusCode::NOT_MODIFIED
                {
                    return Ok(PayloadSize::Empty);
                }

                if self.headers.contains("Transfer-Encoding") {
                    return Ok(if self.is_chunked() { PayloadSize::Chunked } else { PayloadSize::UntilClose });
                }

                Ok(match self.content_length()? {
                    Some(0) => PayloadSize::Empty,
                    Some(n) => PayloadSize::Length(n),
                    None => PayloadSize::UntilClose,
                })
            }
        }
    }
}
