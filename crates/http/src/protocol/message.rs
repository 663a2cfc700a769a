//! Codec level items: what the parser yields and the encoders consume.

use bytes::{Buf, Bytes};

/// A head followed by body pieces, the unit the tokio-util codec traits
/// exchange. `Data` is the buffer type of body pieces.
#[derive(Debug)]
pub enum Message<T, Data: Buf = Bytes> {
    Header(T),
    Payload(PayloadItem<Data>),
}

impl<T> Message<T> {
    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    #[inline]
    pub fn is_payload(&self) -> bool {
        !self.is_header()
    }

    /// The body piece, `None` for a head.
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        if let Message::Payload(item) = self { Some(item) } else { None }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Message::Payload(PayloadItem::Chunk(bytes))
    }
}

/// One piece of body with framing removed, or the end of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    Chunk(Data),
    Eof,
}

impl<D: Buf> PayloadItem<D> {
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    #[inline]
    pub fn is_chunk(&self) -> bool {
        !self.is_eof()
    }
}

impl PayloadItem {
    pub fn as_bytes(&self) -> Option<&Bytes> {
        if let PayloadItem::Chunk(bytes) = self { Some(bytes) } else { None }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        if let PayloadItem::Chunk(bytes) = self { Some(bytes) } else { None }
    }
}

/// How the end of a body is found, as decided from the head.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length` bytes.
    Length(u64),
    /// `Transfer-Encoding: chunked`, possibly followed by trailers.
    Chunked,
    /// No body at all: HEAD responses, 1xx/204/304, bodiless requests.
    Empty,
    /// A response body without length; it ends when the peer closes.
    UntilClose,
}

impl PayloadSize {
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty | PayloadSize::Length(0))
    }

    #[inline]
    pub fn is_until_close(&self) -> bool {
        matches!(self, PayloadSize::UntilClose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sizes() {
        assert!(PayloadSize::Empty.is_empty());
        assert!(PayloadSize::Length(0).is_empty());
        assert!(!PayloadSize::Length(1).is_empty());
        assert!(!PayloadSize::UntilClose.is_empty());
    }

    #[test]
    fn payload_messages() {
        let message: Message<()> = Bytes::from_static(b"abc").into();
        assert!(message.is_payload());
        assert_eq!(message.into_payload_item().and_then(PayloadItem::into_bytes), Some(Bytes::from_static(b"abc")));
        assert!(Message::<()>::Header(()).into_payload_item().is_none());
    }
}
