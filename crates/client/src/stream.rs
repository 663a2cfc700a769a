//! Request and response streams over a [`Transaction`].
//!
//! [`RequestStream`] frames and writes one request during the transaction's
//! write turn; [`ResponseStream`] parses one response during its read turn.

use bytes::{Bytes, BytesMut};
use http::{Method, StatusCode};
use micro_http1::codec::MessageEncoder;
use micro_http1::protocol::{MessageHead, ParseError, PayloadItem, Response};
use tokio_util::codec::Encoder;
use tracing::{debug, trace};

use crate::connection::{ReadPhase, Transaction, WritePhase};
use crate::Error;

pub struct RequestStream<'a> {
    phase: WritePhase<'a>,
    encoder: MessageEncoder,
    buffer: BytesMut,
}

impl<'a> RequestStream<'a> {
    /// Waits for the write turn and writes the request head.
    pub async fn start_write(transaction: &'a Transaction, head: &MessageHead) -> Result<Self, Error> {
        let mut phase = transaction.start_write().await?;
        let mut encoder = MessageEncoder::new();
        let mut buffer = BytesMut::with_capacity(1024);

        encoder.encode(head, &mut buffer)?;
        phase.write_all(&buffer).await?;
        buffer.clear();

        Ok(Self { phase, encoder, buffer })
    }

    /// Writes body bytes, framed the way the head announced.
    pub async fn write(&mut self, data: Bytes) -> Result<(), Error> {
        if data.is_empty() {
            return Ok(());
        }
        self.encoder.encode(PayloadItem::Chunk(data), &mut self.buffer)?;
        self.phase.write_all(&self.buffer).await?;
        self.buffer.clear();
        Ok(())
    }

    /// Ends the body, flushes, and hands the write turn on.
    pub async fn close_write(mut self) -> Result<(), Error> {
        self.encoder.encode(PayloadItem::<Bytes>::Eof, &mut self.buffer)?;
        if self.encoder.in_body() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "request body is shorter than its content-length",
            )));
        }
        if !self.buffer.is_empty() {
            self.phase.write_all(&self.buffer).await?;
        }
        self.phase.flush().await?;
        self.phase.close_write();
        Ok(())
    }
}

pub struct ResponseStream<'a> {
    phase: ReadPhase<'a>,
    response: Response,
    eof: bool,
}

impl<'a> ResponseStream<'a> {
    /// Waits for the read turn and parses the response head, skipping interim
    /// 1xx responses other than 101.
    pub async fn start_read(transaction: &'a Transaction, method: &Method) -> Result<Self, Error> {
        let mut phase = transaction.start_read().await?;

        loop {
            let head = read_head(&mut phase, method).await?;
            let response = Response::from_head(head)
                .ok_or_else(|| ParseError::invalid_start_line("expected a status line, got a request line"))?;

            if response.status.is_informational() && response.status != StatusCode::SWITCHING_PROTOCOLS {
                trace!(status = %response.status, "skip interim response");
                continue;
            }

            debug!(status = %response.status, sequence = transaction.sequence(), "response head");
            return Ok(Self { phase, response, eof: false });
        }
    }

    /// The response head; the body is read separately.
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn into_response(self) -> Response {
        self.response
    }

    /// Error status together with `Connection: close`: the server will not
    /// read the rest of the request.
    pub fn is_aborted(&self) -> bool {
        self.response.is_error() && self.response.headers.contains_token("Connection", "close")
    }

    pub fn has_more_data(&mut self) -> bool {
        let (parser, _) = self.phase.parts();
        !parser.is_complete()
    }

    /// Next piece of body, or `None` at the end of the message. Reads from the
    /// transport only once the buffered bytes are used up.
    pub async fn read(&mut self) -> Result<Option<Bytes>, Error> {
        loop {
            {
                let (parser, excess) = self.phase.parts();
                if parser.is_complete() {
                    return Ok(None);
                }
                match parser.parse_body(excess)? {
                    Some(PayloadItem::Chunk(bytes)) => return Ok(Some(bytes)),
                    Some(PayloadItem::Eof) => return Ok(None),
                    None => {}
                }
            }

            if self.phase.read_more().await? == 0 {
                self.eof = true;
                let (parser, _) = self.phase.parts();
                parser.finish().map_err(Error::incomplete)?;
            }
        }
    }

    /// Ends the read turn, returning the response with its trailers.
    ///
    /// Fails if the body was not read to the end; the connection is then
    /// closed. A response that asked for close, whose body ran until close, or
    /// that switched protocols also closes the connection, which then leaves
    /// the pool.
    pub fn close_read(mut self) -> Result<Response, Error> {
        let (parser, _) = self.phase.parts();
        if !parser.is_complete() {
            return Err(Error::incomplete(format!("response body not fully read ({})", parser.state())));
        }

        let until_close = parser.payload_size().is_some_and(|size| size.is_until_close());
        self.response.trailers = parser.take_trailers();
        let switched = self.response.status == StatusCode::SWITCHING_PROTOCOLS;
        if self.eof || until_close || switched || self.response.wants_close() {
            self.phase.transaction().connection().close();
        }
        self.phase.close_read();
        Ok(self.response)
    }
}

async fn read_head(phase: &mut ReadPhase<'_>, method: &Method) -> Result<MessageHead, Error> {
    {
        let (parser, _) = phase.parts();
        parser.reset();
        parser.set_request_method(method);
    }

    loop {
        let started = {
            let (parser, excess) = phase.parts();
            if let Some(head) = parser.parse_head(excess)? {
                return Ok(head);
            }
            parser.flags().message_started
        };

        if phase.read_more().await? == 0 {
            return Err(if started {
                Error::incomplete("connection closed in the response head")
            } else {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before the response head",
                ))
            });
        }
    }
}
