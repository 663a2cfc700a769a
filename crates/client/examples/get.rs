//! Fetches a url and prints the response.
//!
//! ```text
//! cargo run -p micro-client --example get -- http://example.com/
//! ```

use std::error::Error;

use micro_client::{Client, ClientConfig};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let url = std::env::args().nth(1).unwrap_or_else(|| "http://example.com/".to_string());
    let client = Client::new(ClientConfig::default().read_timeout(std::time::Duration::from_secs(30)));

    let response = match client.get(&url).await {
        Ok(response) => response,
        Err(micro_client::Error::Status { response, .. }) => *response,
        Err(e) => return Err(e.into()),
    };

    info!(status = %response.status, redirects = response.redirect_count(), "done");
    for (name, value) in response.headers.iter() {
        println!("{name}: {value}");
    }
    println!();
    println!("{}", String::from_utf8_lossy(&response.body));

    client.shutdown();
    Ok(())
}
