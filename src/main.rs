//! blob-gateway: HTTP gateway over Azure Blob Storage.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use blob_gateway::{Args, Config, GatewayServer, DEFAULT_ACCOUNT_KEY};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Parse command-line arguments
    let args = Args::parse();

    // Set up logging; RUST_LOG takes precedence over the flags
    let default_level = if args.debug {
        "debug"
    } else if args.silent {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .try_init()?;

    let config = Config::try_from(args)?;
    let backend = config.backend;
    let account = config.account.clone();

    let server = GatewayServer::new(config)?;

    // Only the well-known development key is safe to print
    let connection_string = if account.key == DEFAULT_ACCOUNT_KEY {
        account.connection_string()
    } else {
        "<hidden>".to_string()
    };

    println!(
        r#"
Blob gateway is starting at {}

Backend: {:?}
Account: {}
Blob endpoint: {}

Connection string:
{}

Press Ctrl+C to stop the server.
"#,
        server.base_url(),
        backend,
        account.name,
        account.blob_endpoint,
        connection_string,
    );

    server.run().await
}
