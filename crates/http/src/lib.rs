//! HTTP/1.1 message model and wire codec.
//!
//! This crate holds everything about HTTP/1.1 that does not need a socket:
//! the message types, an incremental parser that copes with arbitrary read
//! boundaries, and the encoders that put messages back on the wire. It is
//! direction-agnostic: the parser reads requests as well as responses, so the
//! same pieces serve a client (see the `micro-client` crate) or a server.
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use http::{Method, Version};
//! use micro_http1::codec::{MessageEncoder, Parser};
//! use micro_http1::protocol::{Headers, MessageHead};
//! use tokio_util::codec::Encoder;
//!
//! let head = MessageHead::request(Method::GET, "/", Version::HTTP_11, Headers::from([("Host", "example.com")]));
//! let mut wire = BytesMut::new();
//! MessageEncoder::new().encode(&head, &mut wire).unwrap();
//!
//! let mut parser = Parser::new();
//! let feed = parser.feed(&wire).unwrap();
//! assert!(feed.complete);
//! assert_eq!(feed.head, Some(head));
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: headers, heads, requests, responses, bodies and errors
//! - [`codec`]: [`Parser`](codec::Parser), [`MessageEncoder`](codec::MessageEncoder)
//!   and the head/body decoders and encoders they are made of
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
