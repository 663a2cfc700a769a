//! Wire codec for HTTP/1.1 messages.
//!
//! - [`Parser`]: resumable decoder for one request or response at a time,
//!   usable directly on a buffer, fragment by fragment, or as a tokio-util
//!   [`Decoder`](tokio_util::codec::Decoder)
//! - [`MessageEncoder`]: tokio-util [`Encoder`](tokio_util::codec::Encoder)
//!   writing a head and its framed body
//! - [`header`] and [`body`]: the head and body halves both are built from
//!
//! # Example
//!
//! ```
//! use micro_http1::codec::Parser;
//!
//! let mut parser = Parser::new();
//! let feed = parser.feed(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nokHTTP/1.1").unwrap();
//!
//! assert!(feed.complete);
//! assert_eq!(&feed.body[..], b"ok");
//! assert_eq!(&feed.excess[..], b"HTTP/1.1");
//! ```

pub mod body;
pub mod header;
mod message_encoder;
mod parser;

pub use body::{ChunkedEncoder, PayloadDecoder, PayloadEncoder};
pub use header::{HeadDecoder, HeadEncoder};
pub use message_encoder::MessageEncoder;
pub use parser::{Feed, Flags, Parser};
