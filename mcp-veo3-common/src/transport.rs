//! MCP transport selection.
//!
//! The server speaks MCP over one of two transports:
//!
//! - **Stdio**: default, for clients that spawn the server as a subprocess
//! - **HTTP**: streamable HTTP on `/mcp`, for remote clients
//!
//! # Example
//!
//! ```ignore
//! use mcp_veo3_common::transport::TransportArgs;
//! use clap::Parser;
//!
//! #[derive(Parser)]
//! struct Args {
//!     #[command(flatten)]
//!     transport: TransportArgs,
//! }
//!
//! let args = Args::parse();
//! let transport = args.transport.into_transport(config.port);
//! ```

use clap::Args;
use std::fmt;

/// Transport mode for MCP server communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Standard input/output transport (default).
    #[default]
    Stdio,
    /// Streamable HTTP transport.
    Http {
        /// Port to listen on
        port: u16,
    },
}

impl Transport {
    /// Create a new stdio transport.
    pub fn stdio() -> Self {
        Transport::Stdio
    }

    /// Create a new HTTP transport on the specified port.
    pub fn http(port: u16) -> Self {
        Transport::Http { port }
    }

    /// Check if this is a stdio transport.
    pub fn is_stdio(&self) -> bool {
        matches!(self, Transport::Stdio)
    }

    /// Get the port if this is a network transport.
    pub fn port(&self) -> Option<u16> {
        match self {
            Transport::Stdio => None,
            Transport::Http { port } => Some(*port),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Stdio => write!(f, "stdio"),
            Transport::Http { port } => write!(f, "http (port {})", port),
        }
    }
}

/// Command-line arguments for transport configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct TransportArgs {
    /// Transport mode: stdio or http
    #[arg(long, default_value = "stdio", value_parser = parse_transport_mode)]
    pub transport: TransportMode,

    /// Port for the HTTP transport (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,
}

/// Transport mode parsed from command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    #[default]
    Stdio,
    Http,
}

fn parse_transport_mode(s: &str) -> Result<TransportMode, String> {
    match s.to_lowercase().as_str() {
        "stdio" => Ok(TransportMode::Stdio),
        "http" => Ok(TransportMode::Http),
        _ => Err(format!(
            "Invalid transport mode '{}'. Valid options: stdio, http",
            s
        )),
    }
}

impl TransportArgs {
    /// Resolve the transport, using `default_port` when `--port` is absent.
    pub fn into_transport(self, default_port: u16) -> Transport {
        match self.transport {
            TransportMode::Stdio => Transport::Stdio,
            TransportMode::Http => Transport::Http {
                port: self.port.unwrap_or(default_port),
            },
        }
    }
}
