//! Daemon entry point for the business request MCP server.
//!
//! Loads configuration from `.env`, the environment and CLI arguments, builds
//! the SQL Server control plane, and serves MCP over stdio and/or HTTP.

mod config;
mod services;

use br_mcp::server::{McpHttpServerConfig, serve_stdio, serve_streamable_http};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::BrConfig;
use crate::services::{build_auth, build_control_plane, build_file_context};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    // stdout carries the stdio transport
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = BrConfig::from_args()?;
    let control = build_control_plane(&config)?;
    let files = build_file_context(&config);
    let auth = config.auth.as_ref().map(build_auth);
    let _sweeper = auth
        .as_ref()
        .map(|state| state.provider().flows().clone().spawn_sweeper());

    info!(
        stdio = config.enable_stdio,
        http = config.mcp_serve,
        auth = auth.is_some(),
        "br-mcpd starting"
    );

    let http_config = McpHttpServerConfig::new(config.mcp_http_addr)
        .with_stateful_mode(config.mcp_stateful);
    match (config.enable_stdio, config.mcp_serve) {
        (true, true) => {
            tokio::try_join!(
                serve_stdio(control.clone(), files.clone()),
                serve_streamable_http(control, files, http_config, auth),
            )?;
        }
        (true, false) => serve_stdio(control, files).await?,
        (false, _) => serve_streamable_http(control, files, http_config, auth).await?,
    }
    Ok(())
}
