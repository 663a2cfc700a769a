//! The client facade.

use std::fmt;
use std::sync::Arc;

use http::Method;
use micro_http1::protocol::{Body, Headers, Request, Response};
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::exchange::{Exchange, ExchangeSlot};
use crate::layer::{Layer, RequestContext};
use crate::layers::{CookieJar, MemoryCookieJar, RequestSigner};
use crate::pipeline::Pipeline;
use crate::pool::Pool;
use crate::transport::{Connector, TcpConnector};
use crate::Error;

/// An HTTP/1.1 client.
///
/// Cloning is cheap; clones share the connection pool, the cookie jar and the
/// layer pipeline. The pool limits come from the config the client was built
/// with, while every other option can be changed per call with
/// [`request_with`](Client::request_with).
///
/// ```no_run
/// # async fn run() -> Result<(), micro_client::Error> {
/// use micro_client::{Client, ClientConfig};
///
/// let client = Client::new(ClientConfig::default().retries(2));
/// let response = client.get("http://example.com/").await?;
/// println!("{} {} bytes", response.status, response.body.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    config: Arc<ClientConfig>,
    pool: Pool,
    pipeline: Pipeline,
    opener: Pipeline,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        headers: Headers,
        body: impl Into<Body>,
    ) -> Result<Response, Error> {
        self.send(self.context(method, url, headers, body, Arc::clone(&self.config))?).await
    }

    /// Like [`request`](Client::request), with options for this call only.
    pub async fn request_with(
        &self,
        method: Method,
        url: &str,
        headers: Headers,
        body: impl Into<Body>,
        config: ClientConfig,
    ) -> Result<Response, Error> {
        self.send(self.context(method, url, headers, body, Arc::new(config))?).await
    }

    /// A context for [`send`](Client::send), to be completed by the caller,
    /// for instance with a response sink.
    pub fn context(
        &self,
        method: Method,
        url: &str,
        headers: Headers,
        body: impl Into<Body>,
        config: Arc<ClientConfig>,
    ) -> Result<RequestContext, Error> {
        let url = Url::parse(url).map_err(|e| Error::invalid_url(url, e))?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::invalid_url(url, "missing host"));
        }
        let request = Request::new(method, "/").with_headers(headers).with_body(body);
        Ok(RequestContext::new(url, request, config))
    }

    pub async fn send(&self, ctx: RequestContext) -> Result<Response, Error> {
        debug!(method = %ctx.request.method, url = %ctx.url, "send request");
        self.pipeline.run(ctx).await
    }

    /// Prepares a request whose body the caller writes and whose response the
    /// caller reads, piece by piece, through the returned [`Exchange`].
    ///
    /// The request goes through the same shaping layers as
    /// [`request`](Client::request) and takes a pooled connection. Redirects,
    /// retries, status errors and the read timeout do not apply. Without a
    /// `Content-Length` header, a method that carries a body is sent chunked.
    pub async fn open(&self, method: Method, url: &str, headers: Headers) -> Result<Exchange, Error> {
        self.open_in(method, url, headers, Arc::clone(&self.config)).await
    }

    /// Like [`open`](Client::open), with options for this call only.
    pub async fn open_with(
        &self,
        method: Method,
        url: &str,
        headers: Headers,
        config: ClientConfig,
    ) -> Result<Exchange, Error> {
        self.open_in(method, url, headers, Arc::new(config)).await
    }

    async fn open_in(
        &self,
        method: Method,
        url: &str,
        headers: Headers,
        config: Arc<ClientConfig>,
    ) -> Result<Exchange, Error> {
        let mut ctx = self.context(method, url, headers, Body::Empty, config)?;
        let expects_body = ctx.request.expects_body();
        let framing = &mut ctx.request.headers;
        if expects_body && !framing.contains("Content-Length") && !framing.contains("Transfer-Encoding") {
            framing.set("Transfer-Encoding", "chunked");
        }

        let slot = ExchangeSlot::new();
        ctx.exchange = Some(slot.clone());
        debug!(method = %ctx.request.method, url = %ctx.url, "open exchange");
        self.opener.run(ctx).await?;
        slot.take().ok_or_else(|| Error::Io(std::io::Error::other("no exchange was handed over")))
    }

    pub async fn get(&self, url: &str) -> Result<Response, Error> {
        self.request(Method::GET, url, Headers::new(), Body::Empty).await
    }

    pub async fn head(&self, url: &str) -> Result<Response, Error> {
        self.request(Method::HEAD, url, Headers::new(), Body::Empty).await
    }

    pub async fn post(&self, url: &str, body: impl Into<Body>) -> Result<Response, Error> {
        self.request(Method::POST, url, Headers::new(), body).await
    }

    pub async fn put(&self, url: &str, body: impl Into<Body>) -> Result<Response, Error> {
        self.request(Method::PUT, url, Headers::new(), body).await
    }

    pub async fn delete(&self, url: &str) -> Result<Response, Error> {
        self.request(Method::DELETE, url, Headers::new(), Body::Empty).await
    }

    /// Closes every pooled connection. Requests in flight fail; later
    /// requests open new connections.
    pub fn shutdown(&self) {
        self.pool.close_all();
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").field("config", &self.config).field("pipeline", &self.pipeline).finish_non_exhaustive()
    }
}

pub struct ClientBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
    cookie_jar: Option<Arc<dyn CookieJar>>,
    signer: Option<Arc<dyn RequestSigner>>,
    layers: Vec<Arc<dyn Layer>>,
}

impl ClientBuilder {
    fn new() -> Self {
        Self { config: ClientConfig::default(), connector: None, cookie_jar: None, signer: None, layers: vec![] }
    }

    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// How connections are opened; TCP with TLS by default.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    #[must_use]
    pub fn cookie_jar(mut self, jar: Arc<dyn CookieJar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    #[must_use]
    pub fn signer(mut self, signer: impl RequestSigner + 'static) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// Adds a layer right before the retry layer, after the request is framed.
    #[must_use]
    pub fn layer(mut self, layer: impl Layer + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn build(self) -> Client {
        let pool_config = self.config.pool_config();
        let connector =
            self.connector.unwrap_or_else(|| Arc::new(TcpConnector::new(pool_config.connect_timeout)));
        let pool = Pool::new(pool_config, connector);
        let cookie_jar = self.cookie_jar.unwrap_or_else(|| Arc::new(MemoryCookieJar::new()));
        let opener = Pipeline::opening(
            pool.clone(),
            Arc::clone(&cookie_jar),
            self.signer.as_ref().map(Arc::clone),
            self.layers.iter().map(Arc::clone).collect(),
        );
        let pipeline = Pipeline::standard(pool.clone(), cookie_jar, self.signer, self.layers);

        Client { config: Arc::new(self.config), pool, pipeline, opener }
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder").field("config", &self.config).finish_non_exhaustive()
    }
}
