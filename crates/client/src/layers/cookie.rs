//! Cookie handling through a pluggable jar.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use micro_http1::protocol::Response;
use tracing::trace;
use url::Url;

use crate::layer::{Layer, Next, RequestContext};
use crate::Error;

/// Where cookies are kept between requests.
///
/// Domain and path matching is the jar's business; the layer only asks what
/// to send and reports what came back.
#[cfg_attr(test, mockall::automock)]
pub trait CookieJar: Send + Sync {
    /// `(name, value)` pairs to send with a request to `url`.
    fn cookies(&self, url: &Url) -> Vec<(String, String)>;

    /// Stores one `Set-Cookie` header value received from `url`.
    fn store(&self, url: &Url, set_cookie: &str);
}

/// Jar keyed by host alone. Attributes other than `Max-Age=0` are ignored.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    hosts: Mutex<HashMap<String, Vec<(String, String)>>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CookieJar for MemoryCookieJar {
    fn cookies(&self, url: &Url) -> Vec<(String, String)> {
        let hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        url.host_str().and_then(|host| hosts.get(host)).cloned().unwrap_or_default()
    }

    fn store(&self, url: &Url, set_cookie: &str) {
        let Some(host) = url.host_str() else {
            return;
        };
        let mut parts = set_cookie.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let (name, value) = (name.trim(), value.trim());
        if name.is_empty() {
            return;
        }
        let expired = parts.filter_map(|attr| attr.split_once('=')).any(|(key, value)| {
            key.trim().eq_ignore_ascii_case("Max-Age") && value.trim().parse::<i64>().is_ok_and(|age| age <= 0)
        });

        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        let cookies = hosts.entry(host.to_string()).or_default();
        cookies.retain(|(existing, _)| existing != name);
        if !expired {
            cookies.push((name.to_string(), value.to_string()));
        }
    }
}

/// Sends cookies from the jar and stores every `Set-Cookie` received, when
/// `cookies` is enabled.
pub struct CookieLayer {
    jar: Arc<dyn CookieJar>,
}

impl CookieLayer {
    pub fn new(jar: Arc<dyn CookieJar>) -> Self {
        Self { jar }
    }
}

#[async_trait]
impl Layer for CookieLayer {
    async fn call(&self, mut ctx: RequestContext, next: Next<'_>) -> Result<Response, Error> {
        if !ctx.config.cookies {
            return next.run(ctx).await;
        }

        let url = ctx.url.clone();
        let cookies = self.jar.cookies(&url);
        if !cookies.is_empty() {
            let mut value = cookies.iter().map(|(name, value)| format!("{name}={value}")).collect::<Vec<_>>().join("; ");
            if let Some(existing) = ctx.request.headers.get("Cookie") {
                value = format!("{existing}; {value}");
            }
            trace!(count = cookies.len(), "sending cookies");
            ctx.request.headers.set("Cookie", value);
        }

        let result = next.run(ctx).await;

        let response = match &result {
            Ok(response) => Some(response),
            Err(e) => e.response(),
        };
        if let Some(response) = response {
            for set_cookie in response.headers.get_all("Set-Cookie") {
                self.jar.store(&url, set_cookie);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::layer::testing::{Reply, context, run};
    use http::{Method, StatusCode};
    use mockall::predicate::always;

    fn set_cookie_reply(status: StatusCode) -> Arc<Reply> {
        Reply::new(move |_| {
            let mut response = Response::new(status);
            response.headers.append("Set-Cookie", "session=abc; Path=/; HttpOnly");
            response.headers.append("Set-Cookie", "theme=dark");
            Ok(response)
        })
    }

    #[tokio::test]
    async fn sends_and_stores_cookies() {
        let mut jar = MockCookieJar::new();
        jar.expect_cookies().with(always()).times(1).returning(|_| vec![("id".to_string(), "7".to_string())]);
        jar.expect_store().withf(|_, value| value.starts_with("session=abc")).times(1).return_const(());
        jar.expect_store().withf(|_, value| value == "theme=dark").times(1).return_const(());

        let reply = set_cookie_reply(StatusCode::OK);
        let mut ctx = context(Method::GET, "http://localhost/", ClientConfig::default().cookies(true));
        ctx.request.headers.set("Cookie", "pre=1");
        run(CookieLayer::new(Arc::new(jar)), &reply, ctx).await.unwrap();

        assert_eq!(reply.seen()[0].1.headers.get("cookie"), Some("pre=1; id=7"));
    }

    #[tokio::test]
    async fn stores_cookies_from_error_responses() {
        let mut jar = MockCookieJar::new();
        jar.expect_cookies().returning(|_| Vec::new());
        jar.expect_store().times(2).return_const(());

        let reply = Reply::new(|_| {
            let mut response = Response::new(StatusCode::FORBIDDEN);
            response.headers.append("Set-Cookie", "a=1");
            response.headers.append("Set-Cookie", "b=2");
            Err(Error::status(response))
        });
        let ctx = context(Method::GET, "http://localhost/", ClientConfig::default().cookies(true));
        assert!(run(CookieLayer::new(Arc::new(jar)), &reply, ctx).await.is_err());
    }

    #[tokio::test]
    async fn disabled_by_default() {
        let mut jar = MockCookieJar::new();
        jar.expect_cookies().never();
        jar.expect_store().never();

        let reply = set_cookie_reply(StatusCode::OK);
        let ctx = context(Method::GET, "http://localhost/", ClientConfig::default());
        run(CookieLayer::new(Arc::new(jar)), &reply, ctx).await.unwrap();
        assert!(!reply.seen()[0].1.headers.contains("cookie"));
    }

    #[test]
    fn memory_jar_replaces_and_expires() {
        let jar = MemoryCookieJar::new();
        let url = Url::parse("http://example.com/a").unwrap();
        let other = Url::parse("http://other.com/").unwrap();

        jar.store(&url, "a=1; Path=/");
        jar.store(&url, "b=2");
        jar.store(&url, "a=3");
        assert_eq!(jar.cookies(&url), vec![("b".to_string(), "2".to_string()), ("a".to_string(), "3".to_string())]);
        assert!(jar.cookies(&other).is_empty());

        jar.store(&url, "b=; Max-Age=0");
        assert_eq!(jar.cookies(&url), vec![("a".to_string(), "3".to_string())]);

        jar.store(&url, "garbage");
        assert_eq!(jar.cookies(&url).len(), 1);
    }
}
