//! Error statuses as errors.

use async_trait::async_trait;
use micro_http1::protocol::Response;
use tracing::debug;

use crate::layer::{Layer, Next, RequestContext};
use crate::Error;

/// Turns an error status into [`Error::Status`] when `status_exception` is
/// enabled. The response travels inside the error.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExceptionLayer;

#[async_trait]
impl Layer for ExceptionLayer {
    async fn call(&self, ctx: RequestContext, next: Next<'_>) -> Result<Response, Error> {
        let status_exception = ctx.config.status_exception;
        let response = next.run(ctx).await?;

        if status_exception && response.is_error() {
            debug!(status = %response.status, "error status");
            return Err(Error::status(response));
        }
        Ok(response)
    }
}
