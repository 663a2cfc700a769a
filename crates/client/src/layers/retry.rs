//! Retrying failed attempts with backoff.

use std::sync::Arc;

use async_trait::async_trait;
use micro_http1::protocol::Response;
use tracing::{debug, info};

use crate::backoff::Backoff;
use crate::config::ClientConfig;
use crate::layer::{Layer, Next, RequestContext};
use crate::Error;

/// Repeats an attempt that failed with a recoverable error (io, incomplete
/// message, timeout) or a retry status, sleeping a growing randomised delay in
/// between.
///
/// Only idempotent requests are retried unless `retry_non_idempotent` is set,
/// and only when the body can be replayed and no response bytes went to a
/// sink yet. Parse errors are never retried.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetryLayer;

impl RetryLayer {
    fn should_retry(result: &Result<Response, Error>, config: &ClientConfig) -> bool {
        match result {
            Ok(response) => config.is_retry_status(response.status.as_u16()),
            Err(Error::Status { status, .. }) => config.is_retry_status(status.as_u16()),
            Err(e) => e.is_recoverable(),
        }
    }
}

#[async_trait]
impl Layer for RetryLayer {
    async fn call(&self, ctx: RequestContext, next: Next<'_>) -> Result<Response, Error> {
        let config = Arc::clone(&ctx.config);
        if !config.retry || config.retries == 0 {
            return next.run(ctx).await;
        }

        let mut backoff = Backoff::new(&config.backoff);
        let mut attempt = 0;
        let mut ctx = ctx;
        loop {
            let method_allows = ctx.request.is_idempotent() || config.retry_non_idempotent;
            let sink = ctx.response_sink.clone();
            let retained = if method_allows && attempt < config.retries { ctx.try_clone() } else { None };

            let result = next.run(ctx).await;

            let sink_untouched = sink.is_none_or(|sink| sink.written() == 0);
            let Some(retained) = retained.filter(|_| sink_untouched && Self::should_retry(&result, &config)) else {
                if attempt > 0 {
                    debug!(attempt, ok = result.is_ok(), "retries finished");
                }
                return result;
            };

            let delay = backoff.next().unwrap_or_default();
            attempt += 1;
            match &result {
                Ok(response) => info!(attempt, ?delay, status = %response.status, "retrying"),
                Err(e) => info!(attempt, ?delay, "retrying after error: {e}"),
            }
            tokio::time::sleep(delay).await;
            ctx = retained;
        }
    }
}
