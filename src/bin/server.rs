//! QueryGPT HTTP server

use anyhow::Result;
use clap::Parser;
use querygpt::config::AppConfig;
use querygpt::context::AppContext;
use querygpt::server;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "querygpt-server")]
#[command(about = "Natural-language to SQL API server")]
struct Args {
    /// Listen address (overrides BIND_ADDR)
    #[arg(long)]
    bind: Option<String>,

    /// Schema catalog JSON file (overrides CATALOG_PATH)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// JSON list of example SQL queries to index (overrides SQL_EXAMPLES_PATH)
    #[arg(long)]
    examples: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(catalog) = args.catalog {
        config.catalog_path = Some(catalog);
    }
    if let Some(examples) = args.examples {
        config.sql_examples_path = Some(examples);
    }

    let bind_addr = config.bind_addr.clone();
    let ctx = Arc::new(AppContext::build(config).await?);

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("QueryGPT server listening on http://{}", bind_addr);

    server::serve(ctx, listener).await?;
    Ok(())
}
