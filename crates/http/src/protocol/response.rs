//! Parsed HTTP response.

use std::sync::Arc;

use bytes::Bytes;
use http::{StatusCode, Version};

use crate::protocol::{Headers, MessageHead, Request, StartLine};

#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub reason: String,
    pub version: Version,
    pub headers: Headers,
    /// Buffered body; empty when the body was streamed to a sink instead.
    pub body: Bytes,
    pub trailers: Headers,
    /// The request that produced this response.
    pub request: Option<Arc<Request>>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            version: Version::HTTP_11,
            headers: Headers::new(),
            body: Bytes::new(),
            trailers: Headers::new(),
            request: None,
        }
    }

    /// Builds a body-less response from a parsed response head.
    ///
    /// Returns `None` when the head is a request head.
    pub fn from_head(head: MessageHead) -> Option<Self> {
        match head.start_line {
            StartLine::Response { status, reason } => Some(Self {
                status,
                reason,
                version: head.version,
                headers: head.headers,
                body: Bytes::new(),
                trailers: Headers::new(),
                request: None,
            }),
            StartLine::Request { .. } => None,
        }
    }

    /// 301, 302, 303, 307 or 308.
    pub fn is_redirect(&self) -> bool {
        matches!(self.status.as_u16(), 301 | 302 | 303 | 307 | 308)
    }

    /// Anything that is not success, an interim 100/101, a redirect or 304.
    pub fn is_error(&self) -> bool {
        !(self.status.is_success()
            || self.status == StatusCode::CONTINUE
            || self.status == StatusCode::SWITCHING_PROTOCOLS
            || self.status == StatusCode::NOT_MODIFIED
            || self.is_redirect())
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get("Location")
    }

    pub fn is_chunked(&self) -> bool {
        self.headers.is_chunked()
    }

    /// `Connection: close`, or HTTP/1.0 without keep-alive.
    pub fn wants_close(&self) -> bool {
        self.headers.contains_token("Connection", "close")
            || (self.version == Version::HTTP_10 && !self.headers.contains_token("Connection", "keep-alive"))
    }

    pub fn head(&self) -> MessageHead {
        MessageHead {
            version: self.version,
            start_line: StartLine::Response { status: self.status, reason: self.reason.clone() },
            headers: self.headers.clone(),
        }
    }

    /// Length of the redirect chain that led here.
    pub fn redirect_count(&self) -> usize {
        let mut count = 0;
        let mut parent = self.request.as_ref().and_then(|r| r.parent.clone());
        while let Some(response) = parent {
            count += 1;
            parent = response.request.as_ref().and_then(|r| r.parent.clone());
        }
        count
    }
}
