//! Embedded MCP tool runtime for the crossbar gateway.
//!
//! Tools are user-authored scripts discovered from the filesystem on
//! every call: a `tool.toml` manifest per directory describes the tool,
//! its parameters, and whether it is listed or discoverable only through
//! `tool_search`. The crate also hosts the tool-calling driver that
//! executes tools on behalf of a model during scripted completions.

pub mod driver;
pub mod error;
pub mod manifest;
pub mod protocol;
pub mod router;
pub mod script_env;
pub mod search;
pub mod server;
pub mod tools;

pub use driver::{DriverError, complete_with_tools};
pub use error::McpError;
pub use router::mcp_router;
pub use server::{McpServer, ToolMode};
