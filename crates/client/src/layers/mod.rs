//! The layers a [`Client`](crate::Client) runs every request through.
//!
//! In their default order:
//!
//! - [`RedirectLayer`]: follows redirect responses
//! - [`BasicAuthLayer`]: turns URL credentials into `Authorization`
//! - [`CookieLayer`]: reads and fills a [`CookieJar`]
//! - [`CanonicalizeLayer`]: rewrites header names to `Canonical-Form`
//! - [`MessageLayer`]: target, `Host`, `User-Agent` and body framing
//! - [`SignatureLayer`]: optional [`RequestSigner`] hook
//! - [`RetryLayer`]: repeats failed attempts with backoff
//! - [`ExceptionLayer`]: error statuses become [`Error::Status`](crate::Error::Status)
//! - [`ConnectionPoolLayer`]: acquires a transaction
//! - [`TimeoutLayer`]: read timeout watchdog
//! - [`StreamLayer`]: writes the request and reads the response
//!
//! [`Client::open`](crate::Client::open) uses a shorter chain: the request
//! shaping layers from BasicAuth to the extra layers, then
//! [`ConnectionPoolLayer`] and [`HandoffLayer`], which gives the request to
//! the caller instead of executing it.

mod basic_auth;
mod canonicalize;
mod connection_pool;
mod cookie;
mod exception;
mod handoff;
mod message;
mod redirect;
mod retry;
mod signature;
mod stream;
mod timeout;

pub use basic_auth::BasicAuthLayer;
pub use canonicalize::CanonicalizeLayer;
pub use connection_pool::ConnectionPoolLayer;
pub use cookie::{CookieJar, CookieLayer, MemoryCookieJar};
pub use exception::ExceptionLayer;
pub use handoff::HandoffLayer;
pub use message::MessageLayer;
pub use redirect::RedirectLayer;
pub use retry::RetryLayer;
pub use signature::{RequestSigner, SignatureLayer};
pub use stream::StreamLayer;
pub use timeout::TimeoutLayer;
