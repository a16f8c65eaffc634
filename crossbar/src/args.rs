use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Crossbar LLM gateway
#[derive(Debug, Parser)]
#[command(name = "crossbar", about = "OpenAI-compatible LLM gateway with an embedded MCP tool runtime")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the gateway server
    Server {
        /// Path to the configuration file
        #[arg(short, long, default_value = "crossbar.toml", env = "CROSSBAR_CONFIG")]
        config: PathBuf,

        /// Override the configured listen address
        #[arg(long, env = "CROSSBAR_LISTEN")]
        listen: Option<SocketAddr>,
    },

    /// Execute a local script file through the server's `execute_code` tool
    Script {
        /// Path to the script file
        file: PathBuf,

        /// Arguments exposed to the script as `argv`
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,

        /// Server base URL
        #[arg(long, default_value = "http://localhost:12345")]
        server: String,

        /// Bearer token for server authentication
        #[arg(short, long)]
        token: Option<String>,
    },

    /// Invoke a tool through the server's MCP endpoint
    Tool {
        /// Tool name
        name: String,

        /// JSON-encoded tool arguments
        arguments: Option<String>,

        /// Server base URL
        #[arg(long, default_value = "http://localhost:12345")]
        server: String,

        /// Bearer token for server authentication
        #[arg(short, long)]
        token: Option<String>,
    },
}
