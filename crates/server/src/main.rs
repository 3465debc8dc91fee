//! docshelf MCP server entry point.
//!
//! Loads configuration, opens the document store and serves the read tools
//! on stdio. Logging goes to stderr to avoid interfering with the JSON-RPC
//! protocol on stdout.

use anyhow::{Context, Result};
use docshelf_core::{AppConfig, DocStore};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    let store = DocStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open document store at {}", config.db_path.display()))?;

    tracing::info!(db_path = %config.db_path.display(), "Starting docshelf server on stdio transport");

    let handler = handler::DocshelfServer::new(store, config);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}
