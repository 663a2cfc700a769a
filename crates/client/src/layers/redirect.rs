//! Following redirects.

use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, StatusCode};
use micro_http1::protocol::{Body, Headers, Response};
use tracing::{debug, info};

use crate::layer::{Layer, Next, RequestContext};
use crate::Error;

/// Headers that describe the old message rather than the request.
const NOT_FORWARDED: [&str; 3] = ["Host", "Content-Length", "Transfer-Encoding"];
/// Credentials that must not leak to another host.
const SENSITIVE: [&str; 2] = ["Authorization", "Cookie"];

/// Follows 301, 302, 303, 307 and 308 responses carrying a `Location`, up to
/// `redirect_limit` hops.
///
/// 303 turns the request into a body-less GET (HEAD stays HEAD); the other
/// codes repeat the method and body, which needs a rewindable body. When a
/// redirect can not be followed the redirect response itself is returned.
#[derive(Debug, Default, Clone, Copy)]
pub struct RedirectLayer;

#[async_trait]
impl Layer for RedirectLayer {
    async fn call(&self, ctx: RequestContext, next: Next<'_>) -> Result<Response, Error> {
        if !ctx.config.redirect {
            return next.run(ctx).await;
        }

        let limit = ctx.config.redirect_limit;
        let mut ctx = ctx;
        let mut hops = 0;
        loop {
            let retained = ctx.try_clone();
            let url = ctx.url.clone();
            let response = next.run(ctx).await?;

            let Some(location) = response.location().filter(|_| response.is_redirect()) else {
                return Ok(response);
            };
            if hops >= limit {
                info!(%url, limit, "redirect limit reached");
                return Ok(response);
            }
            let Some(mut follow) = retained else {
                debug!(%url, "request body can not be replayed, not following redirect");
                return Ok(response);
            };

            follow.url = url.join(location).map_err(|e| Error::invalid_url(location, e))?;
            info!(from = %url, to = %follow.url, status = %response.status, "following redirect");

            let same_host = follow.url.host_str() == url.host_str();
            follow.request.headers = if follow.config.forward_headers {
                forwarded_headers(&follow.request.headers, same_host)
            } else {
                Headers::new()
            };

            if response.status == StatusCode::SEE_OTHER {
                if follow.request.method != Method::HEAD {
                    follow.request.method = Method::GET;
                }
                follow.request.body = Body::Empty;
                follow.request.headers.remove("Content-Type");
            }

            follow.request.parent = Some(Arc::new(response));
            hops += 1;
            ctx = follow;
        }
    }
}

fn forwarded_headers(headers: &Headers, same_host: bool) -> Headers {
    headers
        .iter()
        .filter(|(name, _)| !NOT_FORWARDED.iter().any(|n| n.eq_ignore_ascii_case(name)))
        .filter(|(name, _)| same_host || !SENSITIVE.iter().any(|n| n.eq_ignore_ascii_case(name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::layer::testing::{Reply, context, run};

    fn redirect(status: StatusCode, location: &str) -> Response {
        let mut response = Response::new(status);
        response.headers.set("Location", location);
        response
    }

    /// `/start` redirects to `/next` with `status`, everything else is 200.
    fn one_hop(status: StatusCode) -> Arc<Reply> {
        Reply::new(move |ctx| match ctx.url.path() {
            "/start" => Ok(redirect(status, "/next")),
            _ => Ok(Response::new(StatusCode::OK)),
        })
    }

    fn post(url: &str, config: ClientConfig) -> RequestContext {
        let mut ctx = context(Method::POST, url, config);
        ctx.request.body = Body::from("payload");
        ctx.request.headers.set("Content-Type", "text/plain");
        ctx.request.headers.set("Content-Length", "7");
        ctx.request.headers.set("X-Custom", "1");
        ctx
    }

    #[tokio::test]
    async fn see_other_becomes_get_without_body() {
        let reply = one_hop(StatusCode::SEE_OTHER);
        let response = run(RedirectLayer, &reply, post("http://localhost/start", ClientConfig::default())).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let seen = reply.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].0, "http://localhost/next");
        assert_eq!(seen[1].1.method, Method::GET);
        assert!(seen[1].1.body.is_empty());
        assert!(seen[1].1.headers.is_empty());
        assert_eq!(seen[1].1.parent.as_ref().map(|r| r.status), Some(StatusCode::SEE_OTHER));
    }

    #[tokio::test]
    async fn temporary_redirect_keeps_method_and_body() {
        let reply = one_hop(StatusCode::TEMPORARY_REDIRECT);
        run(RedirectLayer, &reply, post("http://localhost/start", ClientConfig::default())).await.unwrap();

        let seen = reply.seen();
        assert_eq!(seen[1].1.method, Method::POST);
        assert_eq!(seen[1].1.body.as_bytes().map(|b| &b[..]), Some(&b"payload"[..]));
    }

    #[tokio::test]
    async fn head_stays_head_on_see_other() {
        let reply = one_hop(StatusCode::SEE_OTHER);
        run(RedirectLayer, &reply, context(Method::HEAD, "http://localhost/start", ClientConfig::default())).await.unwrap();
        assert_eq!(reply.seen()[1].1.method, Method::HEAD);
    }

    #[tokio::test]
    async fn stops_at_the_limit() {
        let reply = Reply::new(|_| Ok(redirect(StatusCode::FOUND, "/again")));
        let config = ClientConfig::default().redirect_limit(3);
        let response = run(RedirectLayer, &reply, context(Method::GET, "http://localhost/", config)).await.unwrap();

        assert_eq!(response.status, StatusCode::FOUND);
        assert_eq!(reply.calls(), 4);
    }

    #[tokio::test]
    async fn disabled_returns_redirect() {
        let reply = one_hop(StatusCode::MOVED_PERMANENTLY);
        let config = ClientConfig::default().redirect(false);
        let response = run(RedirectLayer, &reply, context(Method::GET, "http://localhost/start", config)).await.unwrap();
        assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(reply.calls(), 1);
    }

    #[tokio::test]
    async fn stream_body_is_not_replayed() {
        let reply = one_hop(StatusCode::TEMPORARY_REDIRECT);
        let mut ctx = context(Method::PUT, "http://localhost/start", ClientConfig::default());
        ctx.request.body = Body::from_stream(http_body_util::Full::new(bytes::Bytes::from_static(b"x")));

        let response = run(RedirectLayer, &reply, ctx).await.unwrap();
        assert_eq!(response.status, StatusCode::TEMPORARY_REDIRECT);
    }

    #[tokio::test]
    async fn forwarded_headers_drop_credentials_across_hosts() {
        let reply = Reply::new(|ctx| match ctx.url.host_str() {
            Some("a.example") => Ok(redirect(StatusCode::FOUND, "http://b.example/")),
            _ => Ok(Response::new(StatusCode::OK)),
        });
        let mut ctx = context(Method::GET, "http://a.example/", ClientConfig::default().forward_headers(true));
        ctx.request.headers.set("Authorization", "secret");
        ctx.request.headers.set("Accept", "text/html");
        ctx.request.headers.set("Host", "a.example");
        run(RedirectLayer, &reply, ctx).await.unwrap();

        let headers = &reply.seen()[1].1.headers;
        assert_eq!(headers.get("accept"), Some("text/html"));
        assert!(!headers.contains("authorization"));
        assert!(!headers.contains("host"));
    }

    #[test]
    fn same_host_keeps_credentials() {
        let headers = Headers::from([("Authorization", "x"), ("Content-Length", "3"), ("X-A", "1")]);
        let forwarded = forwarded_headers(&headers, true);
        assert_eq!(forwarded, Headers::from([("Authorization", "x"), ("X-A", "1")]));
    }
}
