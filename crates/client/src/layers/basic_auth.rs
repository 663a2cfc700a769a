//! `Authorization: Basic` from the url's userinfo.

use async_trait::async_trait;
use micro_http1::protocol::Response;
use tracing::trace;

use crate::layer::{Layer, Next, RequestContext};
use crate::Error;

const BASE64_ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Adds `Authorization: Basic base64(user:password)` when the url carries
/// credentials and the request has no `Authorization` header yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicAuthLayer;

#[async_trait]
impl Layer for BasicAuthLayer {
    async fn call(&self, mut ctx: RequestContext, next: Next<'_>) -> Result<Response, Error> {
        if ctx.config.basic_authorization
            && !ctx.url.username().is_empty()
            && !ctx.request.headers.contains("Authorization")
        {
            let user = percent_decode(ctx.url.username());
            let password = ctx.url.password().map(percent_decode).unwrap_or_default();
            let credentials = [user.as_slice(), &b":"[..], password.as_slice()].concat();

            trace!(host = ctx.url.host_str(), "adding basic authorization");
            ctx.request.headers.set("Authorization", format!("Basic {}", base64_encode(&credentials)));
        }
        next.run(ctx).await
    }
}

/// Userinfo stays percent-encoded in a parsed url. Malformed escapes are kept
/// verbatim.
fn percent_decode(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(high), Some(low)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                decoded.push((high << 4) | low);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    decoded
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

fn base64_encode(input: &[u8]) -> String {
    let mut encoded = String::with_capacity(input.len().div_ceil(3) * 4);

    for chunk in input.chunks(3) {
        let n = chunk.iter().enumerate().fold(0u32, |n, (i, b)| n | u32::from(*b) << (16 - 8 * i));
        for i in 0..4 {
            if i <= chunk.len() {
                encoded.push(char::from(BASE64_ALPHABET[(n >> (18 - 6 * i) & 0x3F) as usize]));
            } else {
                encoded.push('=');
            }
        }
    }
    encoded
}
