//! Start line and header block encoding.
//!
//! Headers are written exactly as they are stored, in order and with their
//! original capitalisation. Framing headers are the caller's business: the
//! [`MessageEncoder`](crate::codec::MessageEncoder) only reads them to pick a
//! body encoder.

use crate::protocol::{MessageHead, SendError, StartLine};

use bytes::{BufMut, BytesMut};

use http::Version;
use std::io;
use std::io::Write;
use tokio_util::codec::Encoder;
use tracing::error;

/// Initial buffer size allocated for head serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

/// Encoder for message heads implementing the [`Encoder`] trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadEncoder;

impl Encoder<&MessageHead> for HeadEncoder {
    type Error = SendError;

    fn encode(&mut self, head: &MessageHead, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let version = match head.version {
            Version::HTTP_11 => "HTTP/1.1",
            Version::HTTP_10 => "HTTP/1.0",
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(SendError::invalid_head(format!("unsupported http version {v:?}")));
            }
        };

        dst.reserve(INIT_HEADER_SIZE);
        match &head.start_line {
            StartLine::Request { method, target } => {
                if target.is_empty() || target.bytes().any(|b| b == b' ' || b == b'\r' || b == b'\n') {
                    return Err(SendError::invalid_head(format!("invalid request target {target:?}")));
                }
                write!(FastWrite(dst), "{} {} {}\r\n", method.as_str(), target, version)?;
            }
            StartLine::Response { status, reason } => {
                check_field(reason)?;
                write!(FastWrite(dst), "{} {} {}\r\n", version, status.as_str(), reason)?;
            }
        }

        for (name, value) in &head.headers {
            check_field(value)?;
            if name.is_empty() {
                // continuation of the previous field
                if dst.ends_with(b"\r\n") {
                    dst.truncate(dst.len() - 2);
                }
                dst.put_u8(b' ');
                dst.put_slice(value.as_bytes());
                dst.put_slice(b"\r\n");
                continue;
            }

            check_field(name)?;
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Rejects CR and LF, which would let a value smuggle extra header lines.
fn check_field(field: &str) -> Result<(), SendError> {
    if field.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(SendError::invalid_head(format!("field {field:?} contains a line break")));
    }
    Ok(())
}

/// Fast writer implementation for writing to BytesMut.
/// Space was reserved up front, so writes never fail.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
