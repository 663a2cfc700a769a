//! Executing the request on its transaction.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use http_body_util::BodyExt;
use micro_http1::protocol::{Body, MessageHead, Response};
use tracing::{debug, warn};

use crate::connection::Transaction;
use crate::layer::{Layer, Next, RequestContext, ResponseSink};
use crate::stream::{RequestStream, ResponseStream};
use crate::Error;

/// The terminal layer: writes the request and reads the response on the
/// transaction the connection layer acquired.
///
/// The body is written while the response head is awaited, so a server that
/// answers early (for instance `413` with `Connection: close`) is heard before
/// the upload ends. Such an aborted exchange drops the writer and closes the
/// connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamLayer;

#[async_trait]
impl Layer for StreamLayer {
    async fn call(&self, ctx: RequestContext, _next: Next<'_>) -> Result<Response, Error> {
        let RequestContext { mut request, transaction, response_sink, .. } = ctx;
        let transaction = transaction
            .ok_or_else(|| Error::Io(io::Error::new(io::ErrorKind::NotConnected, "no transaction acquired")))?;

        let head = request.head();
        let body = std::mem::take(&mut request.body);
        request.body = body.try_clone().unwrap_or_default();
        let method = request.method.clone();

        let mut writer = Box::pin(write_request(&transaction, &head, body));
        let read_head = ResponseStream::start_read(&transaction, &method);
        tokio::pin!(read_head);

        let mut write_result = None;
        let mut stream = loop {
            tokio::select! {
                result = &mut writer, if write_result.is_none() => {
                    if let Err(e) = &result {
                        debug!("request write failed, waiting for an early response: {e}");
                    }
                    write_result = Some(result);
                }
                stream = &mut read_head => match (stream, write_result.take()) {
                    (Ok(stream), result) => {
                        write_result = result;
                        break stream;
                    }
                    // the write error explains the failed read better
                    (Err(_), Some(Err(write_error))) => return Err(write_error),
                    (Err(read_error), _) => return Err(read_error),
                },
            }
        };

        if stream.is_aborted() {
            warn!(status = %stream.response().status, "server aborted the request");
            drop(writer);
            transaction.connection().close();
        } else {
            let result = match write_result {
                Some(result) => result,
                None => writer.await,
            };
            result?;
        }

        let sink = response_sink.filter(|_| stream.response().status.is_success());
        let body = read_body(&mut stream, sink.as_ref()).await?;
        let mut response = stream.close_read()?;
        response.body = body;
        response.request = Some(Arc::new(request));
        Ok(response)
    }
}

async fn write_request(transaction: &Transaction, head: &MessageHead, body: Body) -> Result<(), Error> {
    let mut stream = RequestStream::start_write(transaction, head).await?;
    match body {
        Body::Empty => {}
        Body::Bytes(bytes) => stream.write(bytes).await?,
        Body::Stream(mut body) => {
            while let Some(frame) = body.frame().await {
                let frame = frame.map_err(|e| Error::Io(io::Error::other(e)))?;
                if let Ok(data) = frame.into_data() {
                    stream.write(data).await?;
                }
            }
        }
    }
    stream.close_write().await
}

async fn read_body(stream: &mut ResponseStream<'_>, sink: Option<&ResponseSink>) -> Result<bytes::Bytes, Error> {
    let mut body = BytesMut::new();
    while let Some(bytes) = stream.read().await? {
        match sink {
            Some(sink) => sink.write(&bytes).await?,
            None => body.extend_from_slice(&bytes),
        }
    }
    if let Some(sink) = sink {
        sink.flush().await?;
    }
    Ok(body.freeze())
}
