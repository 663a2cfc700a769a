//! Handing a prepared request to the caller.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use micro_http1::protocol::Response;
use tracing::debug;

use crate::exchange::{Exchange, ExchangeSlot};
use crate::layer::{Layer, Next, RequestContext};
use crate::Error;

/// The terminal layer of an opening pipeline.
///
/// Nothing is written: the framed request and its transaction go into the
/// context's [`ExchangeSlot`] and the caller drives the exchange. The layers
/// above get an interim `100 Continue` standing in for the response the caller
/// will read.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandoffLayer;

#[async_trait]
impl Layer for HandoffLayer {
    async fn call(&self, ctx: RequestContext, _next: Next<'_>) -> Result<Response, Error> {
        let RequestContext { url, request, transaction, exchange, .. } = ctx;
        let slot: ExchangeSlot = exchange
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, "no exchange slot to hand over to")))?;
        let transaction = transaction
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::NotConnected, "no transaction acquired")))?;

        debug!(id = transaction.connection().id(), sequence = transaction.sequence(), %url, "exchange handed over");
        let mut interim = Response::new(StatusCode::CONTINUE);
        interim.request = Some(Arc::new(request.snapshot()));
        slot.put(Exchange::new(url, request, transaction));
        Ok(interim)
    }
}
