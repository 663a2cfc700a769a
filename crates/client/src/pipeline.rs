//! Ordered layer chains.

use std::fmt;
use std::sync::Arc;

use micro_http1::protocol::Response;

use crate::layer::{Layer, Next, RequestContext};
use crate::layers::{
    BasicAuthLayer, CanonicalizeLayer, ConnectionPoolLayer, CookieJar, CookieLayer, ExceptionLayer, HandoffLayer,
    MessageLayer, RedirectLayer, RequestSigner, RetryLayer, SignatureLayer, StreamLayer, TimeoutLayer,
};
use crate::pool::Pool;
use crate::Error;

/// An immutable chain of layers, cheap to clone and share between tasks.
#[derive(Clone)]
pub struct Pipeline {
    layers: Arc<[Arc<dyn Layer>]>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// The default chain:
    ///
    /// Redirect, BasicAuth, Cookie, Canonicalize, Message, Signature (with a
    /// signer), the `extra` layers, Retry, Exception, ConnectionPool, Timeout
    /// and Stream.
    ///
    /// Extra layers sit inside the redirect loop and outside the retry loop,
    /// so they see every hop once with a fully framed request.
    pub fn standard(
        pool: Pool,
        cookie_jar: Arc<dyn CookieJar>,
        signer: Option<Arc<dyn RequestSigner>>,
        extra: Vec<Arc<dyn Layer>>,
    ) -> Self {
        Self::builder()
            .add_last(RedirectLayer)
            .add_shaping(cookie_jar, signer, extra)
            .add_last(RetryLayer)
            .add_last(ExceptionLayer)
            .add_last(ConnectionPoolLayer::new(pool))
            .add_last(TimeoutLayer)
            .add_last(StreamLayer)
            .build()
    }

    /// The chain behind [`Client::open`](crate::Client::open): the request
    /// shaping layers of [`standard`](Self::standard), then ConnectionPool and
    /// Handoff.
    ///
    /// Redirect, Retry, Exception and Timeout are not part of it; the caller
    /// reads the response.
    pub fn opening(
        pool: Pool,
        cookie_jar: Arc<dyn CookieJar>,
        signer: Option<Arc<dyn RequestSigner>>,
        extra: Vec<Arc<dyn Layer>>,
    ) -> Self {
        Self::builder()
            .add_shaping(cookie_jar, signer, extra)
            .add_last(ConnectionPoolLayer::new(pool))
            .add_last(HandoffLayer)
            .build()
    }

    pub async fn run(&self, ctx: RequestContext) -> Result<Response, Error> {
        Next::new(&self.layers).run(ctx).await
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("layers", &self.layer_names()).finish()
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    layers: Vec<Arc<dyn Layer>>,
}

impl PipelineBuilder {
    fn new() -> Self {
        Self { layers: vec![] }
    }

    #[must_use]
    pub fn add_last<L: Layer + 'static>(self, layer: L) -> Self {
        self.add_last_arc(Arc::new(layer))
    }

    #[must_use]
    pub fn add_first<L: Layer + 'static>(self, layer: L) -> Self {
        self.add_first_arc(Arc::new(layer))
    }

    #[must_use]
    pub fn add_last_arc(mut self, layer: Arc<dyn Layer>) -> Self {
        self.layers.push(layer);
        self
    }

    #[must_use]
    pub fn add_first_arc(mut self, layer: Arc<dyn Layer>) -> Self {
        self.layers.insert(0, layer);
        self
    }

    /// BasicAuth, Cookie, Canonicalize, Message, Signature (with a signer)
    /// and the `extra` layers.
    fn add_shaping(
        self,
        cookie_jar: Arc<dyn CookieJar>,
        signer: Option<Arc<dyn RequestSigner>>,
        extra: Vec<Arc<dyn Layer>>,
    ) -> Self {
        let mut builder = self
            .add_last(BasicAuthLayer)
            .add_last(CookieLayer::new(cookie_jar))
            .add_last(CanonicalizeLayer)
            .add_last(MessageLayer);
        if let Some(signer) = signer {
            builder = builder.add_last(SignatureLayer::new(signer));
        }
        extra.into_iter().fold(builder, Self::add_last_arc)
    }

    pub fn build(self) -> Pipeline {
        Pipeline { layers: self.layers.into() }
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.layers.iter().map(|layer| layer.name())).finish()
    }
}
