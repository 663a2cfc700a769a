//! Message head processing: start line plus header block, for both requests
//! and responses.
//!
//! - [`HeadDecoder`]: parses heads from raw bytes, enforcing size limits
//! - [`HeadEncoder`]: serialises heads, rejecting fields that contain line breaks

mod head_decoder;
mod head_encoder;

pub use head_decoder::HeadDecoder;
pub use head_decoder::{MAX_HEADER_BYTES, MAX_HEADER_NUM};
pub use head_encoder::HeadEncoder;
