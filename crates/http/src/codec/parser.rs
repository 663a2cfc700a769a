//! Resumable HTTP/1.1 message parser.
//!
//! A [`Parser`] walks exactly one message at a time through
//! `Idle → Head → Body → Trailers → Complete`, accepting input in fragments of
//! any size. Bytes that belong to the next message are never consumed, so a
//! pipelined connection can hand the leftovers to the following transaction.
//!
//! Two ways to drive it:
//!
//! - buffer-oriented: [`Parser::parse_head`] and [`Parser::parse_body`] work
//!   on a caller-owned `BytesMut`, and the parser is also a tokio-util
//!   [`Decoder`] yielding [`Message`]s;
//! - fragment-oriented: [`Parser::feed`] copies a fragment into the parser's
//!   own buffer and reports head, body bytes and excess in one [`Feed`].

use bytes::{Bytes, BytesMut};
use http::Method;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeadDecoder;
use crate::protocol::{Headers, Message, MessageHead, ParseError, ParseState, PayloadItem, PayloadSize};

const INIT_BUFFER_SIZE: usize = 8 * 1024;

/// Progress markers for the current message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub message_started: bool,
    pub headers_complete: bool,
    pub body_complete: bool,
    pub message_complete: bool,
    pub has_trailers: bool,
}

/// Outcome of one [`Parser::feed`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Feed {
    /// The head, on the call that completed it.
    pub head: Option<MessageHead>,
    /// Body bytes decoded during this call, framing removed.
    pub body: Bytes,
    /// Bytes past the end of the message; only set once the message completed.
    pub excess: Bytes,
    pub complete: bool,
}

#[derive(Debug)]
pub struct Parser {
    state: ParseState,
    flags: Flags,
    head_decoder: HeadDecoder,
    payload_decoder: Option<PayloadDecoder>,
    payload_size: Option<PayloadSize>,
    request_method: Option<Method>,
    trailers: Headers,
    buffer: BytesMut,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            state: ParseState::Idle,
            flags: Flags::default(),
            head_decoder: HeadDecoder,
            payload_decoder: None,
            payload_size: None,
            request_method: None,
            trailers: Headers::new(),
            buffer: BytesMut::with_capacity(INIT_BUFFER_SIZE),
        }
    }

    /// Back to `Idle` for the next message. The internal buffer keeps its
    /// allocation.
    pub fn reset(&mut self) {
        self.state = ParseState::Idle;
        self.flags = Flags::default();
        self.payload_decoder = None;
        self.payload_size = None;
        self.request_method = None;
        self.trailers = Headers::new();
        self.buffer.clear();
    }

    /// Method of the request the parsed response answers. Responses to `HEAD`
    /// never have a body.
    pub fn set_request_method(&mut self, method: &Method) {
        self.request_method = Some(method.clone());
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.flags.message_complete
    }

    #[inline]
    pub fn headers_complete(&self) -> bool {
        self.flags.headers_complete
    }

    /// Framing of the current body, known once the head is parsed.
    pub fn payload_size(&self) -> Option<PayloadSize> {
        self.payload_size
    }

    pub fn trailers(&self) -> &Headers {
        &self.trailers
    }

    pub fn take_trailers(&mut self) -> Headers {
        std::mem::take(&mut self.trailers)
    }

    /// Parses the start line and headers from `src`.
    ///
    /// Returns `Ok(None)` until the whole head is buffered, and after the head
    /// of the current message was already returned.
    pub fn parse_head(&mut self, src: &mut BytesMut) -> Result<Option<MessageHead>, ParseError> {
        if self.flags.headers_complete {
            return Ok(None);
        }

        if !src.is_empty() {
            self.flags.message_started = true;
            self.state = ParseState::Head;
        }

        let head = match self.head_decoder.decode(src).map_err(|e| e.at(ParseState::Head))? {
            Some(head) => head,
            None => return Ok(None),
        };

        let payload_size = head.payload_size(self.request_method.as_ref()).map_err(|e| e.at(ParseState::Head))?;
        trace!(?payload_size, "message head complete");

        self.flags.headers_complete = true;
        self.payload_size = Some(payload_size);

        if payload_size.is_empty() {
            self.complete();
        } else {
            self.payload_decoder = Some(payload_size.into());
            self.state = ParseState::Body;
        }

        Ok(Some(head))
    }

    /// Decodes the next piece of body from `src`.
    ///
    /// `Ok(Some(Eof))` marks the end of the message; from then on every call
    /// returns `Eof` again without touching `src`. `Ok(None)` means more bytes
    /// are needed, or that the head has not been parsed yet.
    pub fn parse_body(&mut self, src: &mut BytesMut) -> Result<Option<PayloadItem>, ParseError> {
        let payload_decoder = match self.state {
            ParseState::Complete => return Ok(Some(PayloadItem::Eof)),
            ParseState::Idle | ParseState::Head => return Ok(None),
            ParseState::Body | ParseState::Trailers => match &mut self.payload_decoder {
                Some(decoder) => decoder,
                None => return Ok(None),
            },
        };

        let state = self.state;
        let item = payload_decoder.decode(src).map_err(|e| if e.state() == ParseState::Idle { e.at(state) } else { e })?;

        match item {
            Some(PayloadItem::Eof) => {
                self.trailers = payload_decoder.take_trailers();
                self.flags.has_trailers = !self.trailers.is_empty();
                self.complete();
                Ok(Some(PayloadItem::Eof))
            }
            Some(chunk) => Ok(Some(chunk)),
            None => {
                if payload_decoder.in_trailers() {
                    self.state = ParseState::Trailers;
                }
                Ok(None)
            }
        }
    }

    /// Tells the parser the transport reached EOF.
    ///
    /// Completes a close-delimited body. Fails when the message was cut short;
    /// EOF before any byte of a message is not an error.
    pub fn finish(&mut self) -> Result<(), ParseError> {
        match self.state {
            ParseState::Complete => Ok(()),
            ParseState::Idle => Ok(()),
            ParseState::Body if self.payload_size.is_some_and(|size| size.is_until_close()) => {
                self.complete();
                Ok(())
            }
            state => Err(ParseError::unexpected_eof(state)),
        }
    }

    /// Appends `data` to the parser's own buffer and parses as far as possible.
    pub fn feed(&mut self, data: &[u8]) -> Result<Feed, ParseError> {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.extend_from_slice(data);

        let result = self.feed_buffer(&mut buffer);
        self.buffer = buffer;
        result
    }

    fn feed_buffer(&mut self, buffer: &mut BytesMut) -> Result<Feed, ParseError> {
        let mut feed = Feed::default();

        if !self.flags.headers_complete {
            feed.head = self.parse_head(buffer)?;
            if feed.head.is_none() {
                return Ok(feed);
            }
        }

        let mut body = BytesMut::new();
        while !self.is_complete() {
            match self.parse_body(buffer)? {
                Some(PayloadItem::Chunk(bytes)) => body.extend_from_slice(&bytes),
                Some(PayloadItem::Eof) | None => break,
            }
        }
        feed.body = body.freeze();

        if self.is_complete() {
            feed.complete = true;
            feed.excess = buffer.split().freeze();
        }
        Ok(feed)
    }

    /// Bytes fed but not consumed yet.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    fn complete(&mut self) {
        self.state = ParseState::Complete;
        self.flags.body_complete = true;
        self.flags.message_complete = true;
        self.payload_decoder = None;
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Yields `Header` once, then `Payload` items up to and including `Eof`.
impl Decoder for Parser {
    type Item = Message<MessageHead>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if !self.flags.headers_complete {
            return Ok(self.parse_head(src)?.map(Message::Header));
        }
        Ok(self.parse_body(src)?.map(Message::Payload))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        let was_complete = self.is_complete();
        self.finish()?;
        if !was_complete && self.is_complete() {
            return Ok(Some(Message::Payload(PayloadItem::Eof)));
        }
        Ok(None)
    }
}
