//! Fills in what the wire needs: request target, `Host`, `User-Agent` and body
//! framing.

use async_trait::async_trait;
use micro_http1::protocol::{Body, Response};
use url::form_urlencoded;

use crate::layer::{Layer, Next, RequestContext};
use crate::Error;

#[derive(Debug, Default, Clone, Copy)]
pub struct MessageLayer;

#[async_trait]
impl Layer for MessageLayer {
    async fn call(&self, mut ctx: RequestContext, next: Next<'_>) -> Result<Response, Error> {
        if let Some(query) = &ctx.config.query {
            let encoded = form_urlencoded::Serializer::new(String::new()).extend_pairs(query).finish();
            ctx.url.set_query((!encoded.is_empty()).then_some(encoded.as_str()));
        }

        ctx.request.target = request_target(&ctx.url);

        let host = ctx.url.host_str().ok_or_else(|| Error::invalid_url(&ctx.url, "missing host"))?;
        let host = match ctx.url.port() {
            Some(port) => format!("{}:{port}", host_header(host)),
            None => host_header(host),
        };

        let expects_body = ctx.request.expects_body();
        let headers = &mut ctx.request.headers;
        headers.set_default("Host", host);
        if let Some(user_agent) = &ctx.config.user_agent {
            headers.set_default("User-Agent", user_agent.clone());
        }

        if !headers.contains("Transfer-Encoding") && !headers.contains("Content-Length") {
            match &ctx.request.body {
                Body::Stream(_) => headers.set("Transfer-Encoding", "chunked"),
                Body::Bytes(bytes) => headers.set("Content-Length", bytes.len().to_string()),
                Body::Empty if expects_body => headers.set("Content-Length", "0"),
                Body::Empty => {}
            }
        }

        next.run(ctx).await
    }
}

/// `path?query`, never empty.
fn request_target(url: &url::Url) -> String {
    let path = if url.path().is_empty() { "/" } else { url.path() };
    match url.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    }
}

/// IPv6 literals keep their brackets in `Host`.
fn host_header(host: &str) -> String {
    if host.contains(':') && !host.starts_with('[') { format!("[{host}]") } else { host.to_string() }
}
