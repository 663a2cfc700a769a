//! An async HTTP/1.1 client with a layered request pipeline and a pipelining
//! connection pool.
//!
//! Every request runs through a chain of [`Layer`]s. The outer layers shape
//! the request (redirects, credentials, cookies, framing), the middle ones
//! decide how often it is attempted (retries, status errors), and the inner
//! ones put it on a pooled connection and execute it. Responses travel back
//! up the same chain.
//!
//! Connections are shared: a connection can carry several requests at once
//! (pipelining), each as a [`Transaction`] that writes and then reads in the
//! order it was issued.
//!
//! # Example
//!
//! ```no_run
//! use micro_client::{Client, ClientConfig, Headers};
//! use http::Method;
//!
//! # async fn run() -> Result<(), micro_client::Error> {
//! let client = Client::new(ClientConfig::default().pipeline_limit(4));
//!
//! let response = client
//!     .request(Method::POST, "http://localhost:8080/echo", Headers::from([("Content-Type", "text/plain")]), "hello")
//!     .await?;
//! assert_eq!(response.body, "hello");
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`client`]: the [`Client`] facade and its builder
//! - [`layer`] / [`layers`] / [`pipeline`]: the request pipeline
//! - [`pool`]: connections per scheme, host and port
//! - [`connection`]: one connection and the transactions sequenced on it
//! - [`stream`]: writing a request and reading a response on a transaction
//! - [`exchange`]: requests whose body the caller writes and reads
//! - [`transport`]: TCP and TLS connectors
//! - [`config`], [`backoff`], [`error`]: options, retry delays, failures
//!
//! The message model and the parser live in the `micro-http1` crate and are
//! re-exported here.

pub mod backoff;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod exchange;
pub mod layer;
pub mod layers;
pub mod pipeline;
pub mod pool;
pub mod stream;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use config::{BackoffConfig, ClientConfig, PoolConfig};
pub use connection::{Connection, Transaction};
pub use error::Error;
pub use exchange::Exchange;
pub use layer::{Layer, Next, RequestContext, ResponseSink};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use pool::Pool;
pub use transport::{ConnectionKey, Connector, TcpConnector};

pub use micro_http1::protocol::{Body, Headers, Request, Response};
