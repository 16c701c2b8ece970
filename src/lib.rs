//! Model Context Protocol core runtime.
//!
//! `mcpio` implements the MCP wire protocol (JSON-RPC 2.0) for both sides of
//! the connection: an [`McpServer`](server::McpServer) that exposes tools,
//! resources and prompts, and a [`Client`](client::Client) that drives one.
//! Either peer may issue reverse requests (sampling, elicitation, roots
//! listing), and tool calls may be task-augmented for asynchronous execution
//! with polling, cancellation and TTL-based reclamation.
//!
//! Transports are pluggable behind the [`Transport`](shared::Transport)
//! trait; the crate ships newline-delimited stdio, Streamable HTTP
//! (POST + SSE, with an optional long-lived GET listening channel) and an
//! in-process loopback pair.
//!
//! # Example
//!
//! ```no_run
//! use mcpio::server::{McpServer, RequestContext};
//! use mcpio::types::CallToolResult;
//! use serde_json::{json, Value};
//!
//! # async fn run() -> mcpio::Result<()> {
//! let server = McpServer::builder()
//!     .name("calc")
//!     .version("1.0.0")
//!     .tool("add", json!({"type": "object"}), |args: Value, _cx: RequestContext| async move {
//!         let sum = args["x"].as_i64().unwrap_or(0) + args["y"].as_i64().unwrap_or(0);
//!         Ok(CallToolResult::text(sum.to_string()))
//!     })
//!     .build();
//!
//! server.serve(mcpio::shared::StdioTransport::new()).await
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod client;
pub mod error;
pub mod server;
pub mod shared;
pub mod types;

pub use error::{Error, Result, TaskError, TransportError};

/// Protocol versions this implementation accepts, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] =
    &["2025-11-25", "2025-06-18", "2025-03-26", "2024-11-05"];

/// The newest protocol version this implementation speaks.
pub const LATEST_PROTOCOL_VERSION: &str = SUPPORTED_PROTOCOL_VERSIONS[0];

/// Returns true if `version` is one of [`SUPPORTED_PROTOCOL_VERSIONS`].
pub fn is_supported_protocol_version(version: &str) -> bool {
    SUPPORTED_PROTOCOL_VERSIONS.contains(&version)
}
