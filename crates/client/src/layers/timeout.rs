//! Read timeout watchdog.

use std::sync::Arc;

use async_trait::async_trait;
use micro_http1::protocol::Response;
use tokio::time::Instant;
use tracing::warn;

use crate::layer::{Layer, Next, RequestContext};
use crate::Error;

/// Fails the request with [`Error::Timeout`] and closes its connection when
/// no bytes arrive on the connection for `read_timeout_secs`.
///
/// Time spent waiting for earlier pipelined responses counts only while the
/// connection is silent.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeoutLayer;

#[async_trait]
impl Layer for TimeoutLayer {
    async fn call(&self, ctx: RequestContext, next: Next<'_>) -> Result<Response, Error> {
        let Some(timeout) = ctx.config.read_timeout_duration() else {
            return next.run(ctx).await;
        };
        let Some(connection) = ctx.transaction.as_ref().map(|t| Arc::clone(t.connection())) else {
            return next.run(ctx).await;
        };

        let started = Instant::now();
        let work = next.run(ctx);
        tokio::pin!(work);

        loop {
            let deadline = connection.last_activity().max(started) + timeout;
            tokio::select! {
                result = &mut work => return result,
                () = tokio::time::sleep_until(deadline) => {
                    if connection.last_activity().max(started) + timeout <= Instant::now() {
                        warn!(id = connection.id(), ?timeout, "read timeout, closing connection");
                        connection.close();
                        return Err(Error::timeout(timeout));
                    }
                }
            }
        }
    }
}
