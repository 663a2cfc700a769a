//! Outgoing HTTP request.
//!
//! Unlike `http::Request`, headers are an ordered [`Headers`] list so the wire
//! form matches exactly what the caller (and the layers) put in, and the
//! request remembers the response that caused it when it is a redirect.

use std::sync::Arc;

use http::{Method, Version};

use crate::protocol::{Body, Headers, MessageHead, Response};

#[derive(Debug)]
pub struct Request {
    pub method: Method,
    /// Request target, usually `path?query`.
    pub target: String,
    pub version: Version,
    pub headers: Headers,
    pub body: Body,
    /// The response this request follows up on, set for redirects.
    pub parent: Option<Arc<Response>>,
}

impl Request {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            version: Version::HTTP_11,
            headers: Headers::new(),
            body: Body::Empty,
            parent: None,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// GET, HEAD, PUT, DELETE, OPTIONS and TRACE may be repeated without
    /// changing the outcome.
    pub fn is_idempotent(&self) -> bool {
        self.is_safe() || matches!(self.method, Method::PUT | Method::DELETE)
    }

    /// GET, HEAD, OPTIONS and TRACE do not modify server state.
    pub fn is_safe(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
    }

    pub fn is_chunked(&self) -> bool {
        self.headers.is_chunked()
    }

    /// Does the method normally carry a payload?
    pub fn expects_body(&self) -> bool {
        !matches!(
            self.method,
            Method::GET | Method::HEAD | Method::DELETE | Method::OPTIONS | Method::CONNECT | Method::TRACE
        )
    }

    /// Start line plus headers, ready for the encoder.
    pub fn head(&self) -> MessageHead {
        MessageHead::request(self.method.clone(), self.target.clone(), self.version, self.headers.clone())
    }

    /// Full copy when the body is rewindable.
    pub fn try_clone(&self) -> Option<Request> {
        Some(Request { body: self.body.try_clone()?, ..self.clone_without_body() })
    }

    /// Copy used as a response's back-reference: streams become [`Body::Empty`].
    pub fn snapshot(&self) -> Request {
        Request { body: self.body.try_clone().unwrap_or_default(), ..self.clone_without_body() }
    }

    fn clone_without_body(&self) -> Request {
        Request {
            method: self.method.clone(),
            target: self.target.clone(),
            version: self.version,
            headers: self.headers.clone(),
            body: Body::Empty,
            parent: self.parent.clone(),
        }
    }
}
