//! Header name canonicalisation.

use async_trait::async_trait;
use micro_http1::protocol::Response;

use crate::layer::{Layer, Next, RequestContext};
use crate::Error;

/// Rewrites request and response header names to `Canonical-Dash-Format`
/// when `canonicalize_headers` is enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct CanonicalizeLayer;

#[async_trait]
impl Layer for CanonicalizeLayer {
    async fn call(&self, mut ctx: RequestContext, next: Next<'_>) -> Result<Response, Error> {
        if !ctx.config.canonicalize_headers {
            return next.run(ctx).await;
        }

        ctx.request.headers.canonicalize();
        match next.run(ctx).await {
            Ok(mut response) => {
                response.headers.canonicalize();
                response.trailers.canonicalize();
                Ok(response)
            }
            Err(Error::Status { status, mut response }) => {
                response.headers.canonicalize();
                Err(Error::Status { status, response })
            }
            Err(e) => Err(e),
        }
    }
}
