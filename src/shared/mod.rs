//! Transport abstraction and shared protocol machinery.
//!
//! Everything here is used by both peers: the [`Transport`] contract, the
//! frame codec, the request-correlation [`Protocol`](protocol::Protocol),
//! the SSE parser and the concrete transports (stdio, Streamable HTTP,
//! in-process loopback).

pub mod codec;
pub mod http;
pub mod inprocess;
pub mod protocol;
pub mod reconnect;
pub mod sse;
pub mod stdio;
pub mod streamable_http;
pub mod uri_template;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

pub use codec::{parse_frame, serialize_frame};
pub use inprocess::InProcessTransport;
pub use reconnect::ReconnectConfig;
pub use sse::{SseEvent, SseParser};
pub use stdio::{ChildProcessTransport, StdioClientConfig, StdioTransport};
pub use streamable_http::{AuthProvider, StreamableHttpConfig, StreamableHttpTransport};
pub use uri_template::UriTemplate;

/// One frame traveling over a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportMessage {
    /// A request expecting a response.
    Request(JsonRpcRequest),
    /// A response to a previously sent request.
    Response(JsonRpcResponse),
    /// A one-way notification.
    Notification(JsonRpcNotification),
}

impl TransportMessage {
    /// The method name, when the frame has one.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }
}

impl From<JsonRpcRequest> for TransportMessage {
    fn from(frame: JsonRpcRequest) -> Self {
        Self::Request(frame)
    }
}

impl From<JsonRpcResponse> for TransportMessage {
    fn from(frame: JsonRpcResponse) -> Self {
        Self::Response(frame)
    }
}

impl From<JsonRpcNotification> for TransportMessage {
    fn from(frame: JsonRpcNotification) -> Self {
        Self::Notification(frame)
    }
}

/// A duplex byte channel carrying MCP frames.
///
/// Methods take `&self`: one reader task and any number of senders share a
/// transport behind an `Arc`, so implementations synchronize internally
/// (read side and write side independently, to keep `receive` from blocking
/// `send`).
///
/// Closing a transport fails in-flight `receive` calls with
/// [`TransportError::ConnectionClosed`](crate::error::TransportError).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame to the peer.
    async fn send(&self, message: TransportMessage) -> Result<()>;

    /// Receive the next frame from the peer.
    async fn receive(&self) -> Result<TransportMessage>;

    /// Terminate the connection.
    async fn close(&self) -> Result<()>;

    /// Whether the transport can still carry frames.
    fn is_connected(&self) -> bool;

    /// Short name for diagnostics ("stdio", "streamable-http", ...).
    fn transport_type(&self) -> &'static str;

    /// The session identifier, for transports with a session concept.
    fn session_id(&self) -> Option<String> {
        None
    }

    /// Record the negotiated protocol version (HTTP transports echo it as a
    /// header on subsequent requests).
    fn set_protocol_version(&self, _version: &str) {}

    /// Open the continuous-listening channel, where supported.
    async fn start_listening(&self) -> Result<()> {
        Ok(())
    }
}
