use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

/// Writes a `Content-Length` framed body verbatim, refusing to write more
/// than the declared length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    length: u64,
    received_eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { length, received_eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.length == 0 || self.received_eof
    }

    pub fn remaining(&self) -> u64 {
        self.length
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            PayloadItem::Chunk(bytes) => {
                if !bytes.has_remaining() {
                    return Ok(());
                }
                if bytes.remaining() as u64 > self.length {
                    warn!(remaining = self.length, chunk = bytes.remaining(), "body longer than content-length");
                    return Err(SendError::invalid_body(format!(
                        "body exceeds content-length by {} bytes",
                        bytes.remaining() as u64 - self.length
                    )));
                }
                self.length -= bytes.remaining() as u64;
                dst.extend_from_slice(bytes.chunk());
                Ok(())
            }
            PayloadItem::Eof => {
                self.received_eof = true;
                if self.length > 0 {
                    return Err(SendError::invalid_body(format!("body ended {} bytes short of content-length", self.length)));
                }
                Ok(())
            }
        }
    }
}
