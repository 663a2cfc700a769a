//! Connection acquisition.

use async_trait::async_trait;
use micro_http1::protocol::Response;
use tracing::{debug, warn};

use crate::layer::{Layer, Next, RequestContext};
use crate::pool::Pool;
use crate::transport::ConnectionKey;
use crate::Error;

/// Takes a transaction from the pool for the request's scheme, host and port
/// and hands it to the layers below.
///
/// The last transaction a connection's reuse limit allows is sent with
/// `Connection: close`. Any error below closes and evicts the connection.
#[derive(Debug, Clone)]
pub struct ConnectionPoolLayer {
    pool: Pool,
}

impl ConnectionPoolLayer {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Layer for ConnectionPoolLayer {
    async fn call(&self, mut ctx: RequestContext, next: Next<'_>) -> Result<Response, Error> {
        let key = ConnectionKey::from_url(&ctx.url, ctx.config.require_ssl_verification)?;
        let transaction = self.pool.get_connection(&key).await?;
        let connection = std::sync::Arc::clone(transaction.connection());
        debug!(id = connection.id(), sequence = transaction.sequence(), %key, "transaction acquired");

        if transaction.is_last_allowed() {
            ctx.request.headers.set("Connection", "close");
        }
        ctx.transaction = Some(transaction);

        match next.run(ctx).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(id = connection.id(), %key, "evicting connection after error: {e}");
                self.pool.evict(&connection);
                Err(e)
            }
        }
    }
}
