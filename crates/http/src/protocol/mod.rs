//! Message model shared by the parser, the encoders and the client.
//!
//! - [`Headers`]: ordered, duplicate-preserving header list
//! - [`MessageHead`] / [`StartLine`]: what the parser produces for a message
//! - [`Request`] / [`Response`]: full messages as the client sees them
//! - [`Body`]: outgoing request body, buffered or streamed
//! - [`Message`] / [`PayloadItem`] / [`PayloadSize`]: codec level items
//! - [`ParseError`] / [`SendError`]: wire level failures

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod headers;
pub use headers::Headers;
pub use headers::canonical_name;

mod head;
pub use head::MessageHead;
pub use head::StartLine;

mod request;
pub use request::Request;

mod response;
pub use response::Response;

mod error;
pub use error::ParseError;
pub use error::ParseErrorKind;
pub use error::ParseState;
pub use error::SendError;

pub mod body;
pub use body::Body;
pub use body::BoxError;
