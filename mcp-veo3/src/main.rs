//! Veo 3 MCP Server
//!
//! MCP server for video generation using Google Veo 3 via the Gemini API.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mcp_veo3::{VeoServer, VideoHandler};
use mcp_veo3_common::tracing::{ENV_LOG_FILE, init_tracing};
use mcp_veo3_common::{Config, McpServerBuilder, TransportArgs};

/// Command-line arguments for the Veo 3 server.
#[derive(Parser, Debug)]
#[command(name = "mcp-veo3")]
#[command(about = "MCP server for video generation using Google Veo 3")]
struct Args {
    /// Transport configuration
    #[command(flatten)]
    transport: TransportArgs,

    /// Directory for generated videos (overrides VEO3_OUTPUT_DIR)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, env = ENV_LOG_FILE)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before clap so env-backed flags see it.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing("info", args.log_file.as_deref())?;

    tracing::info!("mcp-veo3 server starting...");

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(output_dir) = &args.output_dir {
        config = config.with_output_dir(output_dir);
    }
    tracing::info!(
        output_dir = %config.output_dir.display(),
        upload_enabled = config.upload_enabled(),
        poll_interval_secs = config.poll_interval.as_secs(),
        poll_timeout_secs = config.poll_timeout.as_secs(),
        "Configuration loaded"
    );

    let transport = args.transport.into_transport(config.port);
    let handler = VideoHandler::new(config).context("failed to initialize video handler")?;
    let server = VeoServer::new(handler);

    tracing::info!(transport = %transport, "Starting MCP server");
    McpServerBuilder::new(server)
        .with_transport(transport)
        .run()
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
