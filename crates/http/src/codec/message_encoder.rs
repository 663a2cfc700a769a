use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeadEncoder;
use crate::protocol::{Message, MessageHead, PayloadItem, PayloadSize, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

/// Writes a head followed by its body, framing the body the way the head's
/// `Transfer-Encoding` / `Content-Length` headers announce.
#[derive(Debug, Default)]
pub struct MessageEncoder {
    head_encoder: HeadEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl MessageEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Is a body in progress?
    pub fn in_body(&self) -> bool {
        self.payload_encoder.is_some()
    }

    /// Framing the encoder uses for `head`'s body.
    pub fn payload_size(head: &MessageHead) -> Result<PayloadSize, SendError> {
        if head.is_chunked() {
            return Ok(PayloadSize::Chunked);
        }
        match head.content_length().map_err(|e| SendError::invalid_head(e.message()))? {
            Some(0) => Ok(PayloadSize::Empty),
            Some(n) => Ok(PayloadSize::Length(n)),
            None if head.is_request() => Ok(PayloadSize::Empty),
            None => Ok(PayloadSize::UntilClose),
        }
    }
}

impl<D: Buf> Encoder<Message<MessageHead, D>> for MessageEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<MessageHead, D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header(head) => self.encode(&head, dst),
            Message::Payload(payload_item) => self.encode(payload_item, dst),
        }
    }
}

impl Encoder<&MessageHead> for MessageEncoder {
    type Error = SendError;

    fn encode(&mut self, head: &MessageHead, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.payload_encoder.is_some() {
            error!("expect payload item but receive message head");
            return Err(SendError::invalid_head("previous message body is not finished"));
        }

        let payload_encoder = PayloadEncoder::from(Self::payload_size(head)?);
        self.head_encoder.encode(head, dst)?;
        if !payload_encoder.is_finish() {
            self.payload_encoder = Some(payload_encoder);
        }
        Ok(())
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for MessageEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload_encoder = match &mut self.payload_encoder {
            Some(encoder) => encoder,
            None if item.is_eof() => return Ok(()),
            None => {
                error!("expect message head but receive payload item");
                return Err(SendError::invalid_body("payload without a message head"));
            }
        };

        let result = payload_encoder.encode(item, dst);
        if result.is_err() || payload_encoder.is_finish() {
            self.payload_encoder.take();
        }
        result
    }
}
