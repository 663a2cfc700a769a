//! Request signing hook.

use std::sync::Arc;

use async_trait::async_trait;
use micro_http1::protocol::{Request, Response};
use tracing::trace;
use url::Url;

use crate::layer::{Layer, Next, RequestContext};
use crate::Error;

/// Signs a fully constructed request, typically by adding headers derived
/// from the method, target, headers and body.
#[cfg_attr(test, mockall::automock)]
pub trait RequestSigner: Send + Sync {
    fn sign(&self, url: &Url, request: &mut Request) -> Result<(), Error>;
}

/// Runs the signer once per hop. It sits outside the retry layer, so retried
/// attempts resend the signed request unchanged while a redirected request is
/// signed again.
pub struct SignatureLayer {
    signer: Arc<dyn RequestSigner>,
}

impl SignatureLayer {
    pub fn new(signer: Arc<dyn RequestSigner>) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl Layer for SignatureLayer {
    async fn call(&self, mut ctx: RequestContext, next: Next<'_>) -> Result<Response, Error> {
        self.signer.sign(&ctx.url, &mut ctx.request)?;
        trace!(target = %ctx.request.target, "request signed");
        next.run(ctx).await
    }
}
