//! The request pipeline's building block.
//!
//! A [`Layer`] receives the request context and the rest of the chain as
//! [`Next`]. It may change the request, call `next.run(ctx)` zero or more
//! times, and change or replace what comes back. The last layer of a chain
//! talks to the network.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use micro_http1::protocol::{Request, Response};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use url::Url;

use crate::config::ClientConfig;
use crate::connection::Transaction;
use crate::exchange::ExchangeSlot;
use crate::Error;

#[async_trait]
pub trait Layer: Send + Sync {
    async fn call(&self, ctx: RequestContext, next: Next<'_>) -> Result<Response, Error>;

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>().rsplit("::").next().unwrap_or("layer")
    }
}

/// The layers after the current one.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    layers: &'a [Arc<dyn Layer>],
}

impl<'a> Next<'a> {
    pub fn new(layers: &'a [Arc<dyn Layer>]) -> Self {
        Self { layers }
    }

    pub async fn run(self, ctx: RequestContext) -> Result<Response, Error> {
        match self.layers.split_first() {
            Some((layer, rest)) => layer.call(ctx, Next { layers: rest }).await,
            None => Err(Error::Io(io::Error::new(io::ErrorKind::Unsupported, "no layer executed the request"))),
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.layers.iter().map(|layer| layer.name())).finish()
    }
}

/// Everything a layer knows about the request being executed.
#[derive(Debug)]
pub struct RequestContext {
    pub url: Url,
    pub request: Request,
    pub config: Arc<ClientConfig>,
    /// Set by the connection layer for the layers below it.
    pub transaction: Option<Transaction>,
    /// Stream successful response bodies here instead of buffering them.
    pub response_sink: Option<ResponseSink>,
    /// Set for [`Client::open`](crate::Client::open): the request is handed
    /// over here instead of being executed.
    pub exchange: Option<ExchangeSlot>,
}

impl RequestContext {
    pub fn new(url: Url, request: Request, config: Arc<ClientConfig>) -> Self {
        Self { url, request, config, transaction: None, response_sink: None, exchange: None }
    }

    #[must_use]
    pub fn with_response_sink(mut self, sink: ResponseSink) -> Self {
        self.response_sink = Some(sink);
        self
    }

    /// A copy for another attempt. `None` when the body cannot be replayed.
    pub fn try_clone(&self) -> Option<RequestContext> {
        Some(RequestContext {
            url: self.url.clone(),
            request: self.request.try_clone()?,
            config: Arc::clone(&self.config),
            transaction: None,
            response_sink: self.response_sink.clone(),
            exchange: self.exchange.clone(),
        })
    }
}

/// Destination for response bodies.
///
/// Only successful responses are streamed; the bytes written so far are
/// counted so a layer can tell whether the attempt can still be repeated.
#[derive(Clone)]
pub struct ResponseSink {
    writer: Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
    written: Arc<AtomicU64>,
}

impl ResponseSink {
    pub fn new<W: AsyncWrite + Send + Unpin + 'static>(writer: W) -> Self {
        Self { writer: Arc::new(Mutex::new(Box::new(writer))), written: Arc::new(AtomicU64::new(0)) }
    }

    pub async fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(bytes).await?;
        self.written.fetch_add(bytes.len() as u64, Ordering::AcqRel);
        Ok(())
    }

    pub async fn flush(&self) -> io::Result<()> {
        self.writer.lock().await.flush().await
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSink").field("written", &self.written()).finish_non_exhaustive()
    }
}
