//! Start line and header block decoding.
//!
//! Parses either a request (`GET / HTTP/1.1`) or a response (`HTTP/1.1 200 OK`)
//! head with `httparse`, picking the flavour from the first bytes on the wire.
//!
//! # Limits
//!
//! - Maximum number of headers: 64
//! - Maximum head size: 8KB
//! - Only HTTP/1.0 and HTTP/1.1
//!
//! Obsolete line folding is accepted in responses. Each continuation line is
//! kept as its own `("", value)` pair following the folded header, so
//! [`Headers::append_combined`](crate::protocol::Headers::append_combined) can
//! merge them if the caller wants to.

use bytes::{Buf, BytesMut};
use http::{Method, StatusCode, Version};
use httparse::{Error, ParserConfig, Status};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{Headers, MessageHead, ParseError, StartLine};

/// Maximum number of headers allowed in a message head
pub const MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the start line plus header section
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

const RESPONSE_PREFIX: &[u8] = b"HTTP/";

/// Decoder for message heads implementing the [`Decoder`] trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadDecoder;

impl Decoder for HeadDecoder {
    type Item = MessageHead;
    type Error = ParseError;

    /// - `Ok(Some(head))` once the whole head arrived; its bytes are consumed
    /// - `Ok(None)` if more data is needed; nothing is consumed
    /// - `Err(ParseError)` on malformed or oversized input
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // empty lines before the start line are tolerated by httparse, skip them for the sniffing
        let start = src.iter().position(|b| *b != b'\r' && *b != b'\n').unwrap_or(src.len());
        let sniff = &src[start..];

        if sniff.len() < RESPONSE_PREFIX.len() && RESPONSE_PREFIX.starts_with(sniff) {
            ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
            return Ok(None);
        }

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADER_NUM];

        let parsed = if sniff.starts_with(RESPONSE_PREFIX) {
            decode_response(&src[..], &mut headers)?
        } else {
            decode_request(&src[..], &mut headers)?
        };

        match parsed {
            Some((head, consumed)) => {
                trace!(head_size = consumed, headers = head.headers.len(), "parsed message head");
                src.advance(consumed);
                Ok(Some(head))
            }
            None => {
                ensure!(src.len() <= MAX_HEADER_BYTES, ParseError::too_large_header(src.len(), MAX_HEADER_BYTES));
                Ok(None)
            }
        }
    }
}

fn decode_response<'b>(
    src: &'b [u8],
    headers: &mut [httparse::Header<'b>],
) -> Result<Option<(MessageHead, usize)>, ParseError> {
    let mut response = httparse::Response::new(headers);
    let status = ParserConfig::default()
        .allow_obsolete_multiline_headers_in_responses(true)
        .allow_spaces_after_header_name_in_responses(true)
        .parse_response(&mut response, src)
        .map_err(map_httparse_error)?;

    let consumed = match status {
        Status::Complete(consumed) => consumed,
        Status::Partial => return Ok(None),
    };
    ensure!(consumed <= MAX_HEADER_BYTES, ParseError::too_large_header(consumed, MAX_HEADER_BYTES));

    let version = parse_version(response.version)?;
    let code = response.code.ok_or_else(|| ParseError::invalid_start_line("missing status code"))?;
    let status = StatusCode::from_u16(code).map_err(|_| ParseError::invalid_status(code))?;
    let reason = response.reason.unwrap_or_default().to_string();

    let head = MessageHead {
        version,
        start_line: StartLine::Response { status, reason },
        headers: collect_headers(response.headers),
    };
    Ok(Some((head, consumed)))
}

fn decode_request<'b>(
    src: &'b [u8],
    headers: &mut [httparse::Header<'b>],
) -> Result<Option<(MessageHead, usize)>, ParseError> {
    let mut request = httparse::Request::new(headers);
    let consumed = match request.parse(src).map_err(map_httparse_error)? {
        Status::Complete(consumed) => consumed,
        Status::Partial => return Ok(None),
    };
    ensure!(consumed <= MAX_HEADER_BYTES, ParseError::too_large_header(consumed, MAX_HEADER_BYTES));

    let version = parse_version(request.version)?;
    let method = request.method.ok_or_else(|| ParseError::invalid_start_line("missing method"))?;
    let method = Method::from_bytes(method.as_bytes()).map_err(ParseError::invalid_start_line)?;
    let target = request.path.ok_or_else(|| ParseError::invalid_start_line("missing request target"))?;

    let head = MessageHead::request(method, target, version, collect_headers(request.headers));
    Ok(Some((head, consumed)))
}

fn parse_version(version: Option<u8>) -> Result<Version, ParseError> {
    match version {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        // HTTP/2 and HTTP/3 are not spoken over this codec
        v => Err(ParseError::invalid_version(v)),
    }
}

fn map_httparse_error(e: Error) -> ParseError {
    match e {
        Error::TooManyHeaders => ParseError::too_many_headers(MAX_HEADER_NUM),
        Error::Version => ParseError::invalid_version(None),
        Error::Status => ParseError::invalid_start_line("invalid status code"),
        Error::Token | Error::NewLine => ParseError::invalid_start_line(e),
        e => ParseError::invalid_header(e),
    }
}

/// Copies header pairs out of the parse buffer, splitting folded values into
/// continuation pairs with an empty name.
fn collect_headers(parsed: &[httparse::Header<'_>]) -> Headers {
    let mut headers = Headers::with_capacity(parsed.len());
    for header in parsed {
        let value = String::from_utf8_lossy(header.value);
        let mut lines = value.split('\n').map(|line| line.trim_end_matches('\r'));

        headers.append(header.name, lines.next().unwrap_or_default().trim_end());
        for continuation in lines {
            headers.append("", continuation.trim());
        }
    }
    headers
}
