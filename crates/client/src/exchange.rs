//! Exchanges driven by the caller.
//!
//! [`Client::open`](crate::Client::open) runs the request through the layers
//! that shape it and acquire a connection, then stops: the caller writes the
//! request body and reads the response body itself, one piece at a time.
//!
//! ```no_run
//! # async fn run(client: micro_client::Client) -> Result<(), micro_client::Error> {
//! use bytes::Bytes;
//! use http::Method;
//! use micro_client::Headers;
//!
//! let exchange = client.open(Method::POST, "http://localhost:8080/play", Headers::new()).await?;
//!
//! let mut writer = exchange.start_write().await?;
//! writer.write(Bytes::from_static(b"song 7")).await?;
//! writer.close_write().await?;
//!
//! let mut reader = exchange.start_read().await?;
//! println!("{}", reader.response().status);
//! while let Some(piece) = reader.read().await? {
//!     println!("{} bytes", piece.len());
//! }
//! let response = reader.close_read()?;
//! # drop(response);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use micro_http1::protocol::Request;
use url::Url;

use crate::connection::Transaction;
use crate::stream::{RequestStream, ResponseStream};
use crate::Error;

/// A framed request holding its transaction.
///
/// The request head is not sent until [`start_write`](Self::start_write).
/// Dropping the exchange returns its slot to the pool; if either phase was
/// not closed the connection is closed instead of reused.
pub struct Exchange {
    url: Url,
    request: Request,
    transaction: Transaction,
}

impl Exchange {
    pub(crate) fn new(url: Url, request: Request, transaction: Transaction) -> Self {
        Self { url, request, transaction }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The request as the layers left it, without body.
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Waits for the write turn and sends the request head.
    pub async fn start_write(&self) -> Result<RequestStream<'_>, Error> {
        RequestStream::start_write(&self.transaction, &self.request.head()).await
    }

    /// Waits for the read turn and reads the response head.
    pub async fn start_read(&self) -> Result<ResponseStream<'_>, Error> {
        ResponseStream::start_read(&self.transaction, &self.request.method).await
    }

    /// Both phases were closed.
    pub fn is_complete(&self) -> bool {
        self.transaction.is_complete()
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("method", &self.request.method)
            .field("url", &self.url.as_str())
            .field("transaction", &self.transaction)
            .finish()
    }
}

/// Where the last layer of an opening pipeline leaves the [`Exchange`].
#[derive(Clone, Default)]
pub struct ExchangeSlot {
    inner: Arc<Mutex<Option<Exchange>>>,
}

impl ExchangeSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, exchange: Exchange) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(exchange);
    }

    pub fn take(&self) -> Option<Exchange> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

impl fmt::Debug for ExchangeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filled = self.inner.lock().unwrap_or_else(PoisonError::into_inner).is_some();
        f.debug_struct("ExchangeSlot").field("filled", &filled).finish()
    }
}
