//! Decoder for HTTP chunked transfer encoding.
//!
//! Implements [RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1),
//! including the trailer section that may follow the last (zero sized) chunk.
//! Trailer fields are collected and handed to the [`Parser`](crate::codec::Parser)
//! once the body is complete.

use crate::codec::header::MAX_HEADER_BYTES;
use crate::ensure;
use crate::protocol::{Headers, ParseError, PayloadItem};
use bytes::{Buf, Bytes, BytesMut};
use httparse::Status;
use std::task::Poll;
use tokio_util::codec::Decoder;
use tracing::trace;
use ChunkedState::*;

/// Upper bound on the number of trailer fields.
const MAX_TRAILER_NUM: usize = 64;

/// Upper bound on the trailer section, the same as for a message head.
const MAX_TRAILER_BYTES: usize = MAX_HEADER_BYTES;

/// A decoder for HTTP chunked transfer encoding.
///
/// Every call to `decode` consumes only the bytes that belong to the chunked
/// body, so whatever follows the final CRLF stays in the source buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
    trailers: Headers,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0, trailers: Headers::new() }
    }

    /// Is the decoder past the last chunk, reading the trailer section?
    pub fn in_trailers(&self) -> bool {
        self.state == Trailers
    }

    pub fn take_trailers(&mut self) -> Headers {
        std::mem::take(&mut self.trailers)
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size in hex
    Size,
    /// Whitespace after the size
    SizeLws,
    /// Skip chunk extensions
    Extension,
    /// LF after the size line
    SizeLf,
    /// Chunk data
    Body,
    /// CR after chunk data
    BodyCr,
    /// LF after chunk data
    BodyLf,
    /// Trailer fields up to and including the empty line
    Trailers,
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!(trailers = self.trailers.len(), "finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            if self.state == Trailers {
                match read_trailers(src, &mut self.trailers)? {
                    Poll::Ready(()) => {
                        self.state = End;
                        continue;
                    }
                    Poll::Pending => return Ok(None),
                }
            }

            let mut buf = None;

            self.state = match self.state.step(src, &mut self.remaining_size, &mut buf) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }
}

/// Parses the whole trailer block at once, leaving `src` untouched until the
/// terminating empty line has arrived.
fn read_trailers(src: &mut BytesMut, trailers: &mut Headers) -> Result<Poll<()>, ParseError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_TRAILER_NUM];

    let (consumed, parsed) = match httparse::parse_headers(src, &mut headers) {
        Ok(Status::Complete((consumed, parsed))) => (consumed, parsed),
        Ok(Status::Partial) => {
            ensure!(
                src.len() <= MAX_TRAILER_BYTES,
                ParseError::invalid_trailer(format!("trailer section exceeds {MAX_TRAILER_BYTES} bytes"))
            );
            return Ok(Poll::Pending);
        }
        Err(httparse::Error::TooManyHeaders) => {
            return Err(ParseError::invalid_trailer(format!("more than {MAX_TRAILER_NUM} trailer fields")));
        }
        Err(e) => return Err(ParseError::invalid_trailer(e)),
    };

    ensure!(
        consumed <= MAX_TRAILER_BYTES,
        ParseError::invalid_trailer(format!("trailer section exceeds {MAX_TRAILER_BYTES} bytes"))
    );

    for header in parsed {
        trailers.append(header.name, String::from_utf8_lossy(header.value).into_owned());
    }
    src.advance(consumed);
    Ok(Poll::Ready(()))
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.len() > 0 {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

impl ChunkedState {
    fn step(
        &self,
        src: &mut BytesMut,
        remaining_size: &mut u64,
        buf: &mut Option<Bytes>,
    ) -> Poll<Result<ChunkedState, ParseError>> {
        match self {
            Size => ChunkedState::read_size(src, remaining_size),
            SizeLws => ChunkedState::read_size_lws(src),
            Extension => ChunkedState::read_extension(src),
            SizeLf => ChunkedState::read_size_lf(src, remaining_size),
            Body => ChunkedState::read_body(src, remaining_size, buf),
            BodyCr => ChunkedState::read_body_cr(src),
            BodyLf => ChunkedState::read_body_lf(src),
            Trailers => Poll::Ready(Ok(Trailers)),
            End => Poll::Ready(Ok(End)),
        }
    }

    /// Reads one hex digit of the chunk size, or the delimiter ending it.
    fn read_size(src: &mut BytesMut, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        let digit = match try_next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            b => return Poll::Ready(Err(ParseError::invalid_chunk_size(format!("unexpected byte {b:#04x}")))),
        };

        *size_per_chunk = match size_per_chunk.checked_mul(16).and_then(|size| size.checked_add(digit as u64)) {
            Some(size) => size,
            None => return Poll::Ready(Err(ParseError::invalid_chunk_size("chunk size overflow"))),
        };

        Poll::Ready(Ok(Size))
    }

    fn read_size_lws(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            // LWS can follow the chunk size, but no more digits can come
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk_size("invalid linear white space"))),
        }
    }

    /// Extensions are ignored; they end at the next CRLF. A bare LF inside
    /// an extension is rejected.
    fn read_extension(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => Poll::Ready(Err(ParseError::invalid_chunk("chunk extension contains newline"))),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_size_lf(src: &mut BytesMut, size_per_chunk: &mut u64) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' if *size_per_chunk == 0 => Poll::Ready(Ok(Trailers)),
            b'\n' => Poll::Ready(Ok(Body)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk_size("missing LF after chunk size"))),
        }
    }

    fn read_body(
        src: &mut BytesMut,
        size_per_chunk: &mut u64,
        buf: &mut Option<Bytes>,
    ) -> Poll<Result<ChunkedState, ParseError>> {
        if src.is_empty() {
            return Poll::Ready(Ok(Body));
        }

        if *size_per_chunk == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        // cap remaining bytes at the max capacity of usize
        let remaining = match *size_per_chunk {
            r if r > usize::MAX as u64 => usize::MAX,
            r => r as usize,
        };

        let read_size = std::cmp::min(remaining, src.len());

        *size_per_chunk -= read_size as u64;
        *buf = Some(src.split_to(read_size).freeze());

        if *size_per_chunk > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }

    fn read_body_cr(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(BodyLf)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("missing CR after chunk data"))),
        }
    }

    fn read_body_lf(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(Size)),
            _ => Poll::Ready(Err(ParseError::invalid_chunk("missing LF after chunk data"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ParseErrorKind, ParseState};

    #[test]
    fn test_basic() {
        let mut buffer: BytesMut = BytesMut::from(&b"10\r\n1234567890abcdef\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let item = decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(item.is_chunk());
        assert_eq!(item.as_bytes().unwrap(), &Bytes::from_static(b"1234567890abcdef"));

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_chunks_leave_excess() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhello\r\n7\r\n, world\r\n0\r\n\r\nHTTP/1.1"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"hello"));

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b", world"));

        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(&buffer[..], b"HTTP/1.1");
    }

    #[test]
    fn test_chunks_with_extensions() {
        let mut buffer: BytesMut = BytesMut::from(&b"5;chunk-ext=value\r\nhello\r\n0\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"hello"));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_chunks_with_trailers() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhello\r\n0\r\nExpires: never\r\nX-Sum: 42\r\n\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());

        let trailers = decoder.take_trailers();
        assert_eq!(trailers.get("expires"), Some("never"));
        assert_eq!(trailers.get("x-sum"), Some("42"));
    }

    #[test]
    fn test_trailers_arrive_in_pieces() {
        let mut buffer: BytesMut = BytesMut::from(&b"0\r\nX-Sum"[..]);
        let mut decoder = ChunkedDecoder::new();

        assert!(decoder.decode(&mut buffer).unwrap().is_none());
        assert!(decoder.in_trailers());

        buffer.extend_from_slice(b": 1\r\n");
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"\r\n");
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(decoder.take_trailers().get("X-Sum"), Some("1"));
    }

    #[test]
    fn test_oversized_trailers() {
        let mut buffer: BytesMut = BytesMut::from(&b"0\r\nX-Pad: "[..]);
        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(&vec![b'a'; MAX_TRAILER_BYTES]);
        let error = decoder.decode(&mut buffer).unwrap_err();
        assert!(matches!(error.kind(), ParseErrorKind::InvalidTrailer { .. }));
        assert_eq!(error.state(), ParseState::Trailers);
    }

    #[test]
    fn test_incomplete_chunk() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhel"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap();
        assert_eq!(chunk.unwrap().as_bytes().unwrap(), &Bytes::copy_from_slice(b"hel"));

        buffer.extend_from_slice(b"lo\r\n0\r\n\r\n");

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"lo"));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_invalid_chunk_size() {
        let mut buffer: BytesMut = BytesMut::from(&b"xyz\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();

        let error = decoder.decode(&mut buffer).unwrap_err();
        assert!(matches!(error.kind(), ParseErrorKind::InvalidChunkSize { .. }));
        assert_eq!(error.state(), ParseState::Body);
    }

    #[test]
    fn test_size_overflow() {
        let mut buffer: BytesMut = BytesMut::from(&b"fffffffffffffffff\r\n"[..]);
        let mut decoder = ChunkedDecoder::new();
        assert!(decoder.decode(&mut buffer).is_err());
    }

    #[test]
    fn test_missing_crlf() {
        let mut buffer: BytesMut = BytesMut::from(&b"5\r\nhelloBad"[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap(), &Bytes::copy_from_slice(b"hello"));

        let error = decoder.decode(&mut buffer).unwrap_err();
        assert!(matches!(error.kind(), ParseErrorKind::InvalidChunk { .. }));
    }

    #[test]
    fn test_large_chunk() {
        let size = 1024 * 1024;
        let mut data = Vec::with_capacity(size + 16);
        data.extend(format!("{:x}\r\n", size).into_bytes());
        data.extend(vec![b'A'; size]);
        data.extend(b"\r\n0\r\n\r\n");

        let mut buffer = BytesMut::from(&data[..]);
        let mut decoder = ChunkedDecoder::new();

        let chunk = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap().len(), size);
        assert!(chunk.as_bytes().unwrap().iter().all(|&b| b == b'A'));
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }
}
