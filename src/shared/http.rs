//! HTTP header and content-type constants for the Streamable HTTP transport.

/// Session identifier assigned by the server on the first `initialize`
/// response and echoed by the client on every subsequent request.
pub const MCP_SESSION_ID: &str = "Mcp-Session-Id";

/// Negotiated protocol version, sent by the client after `initialize`.
pub const MCP_PROTOCOL_VERSION: &str = "MCP-Protocol-Version";

/// SSE resumption point header.
pub const LAST_EVENT_ID: &str = "Last-Event-ID";

/// JSON content type.
pub const APPLICATION_JSON: &str = "application/json";

/// SSE content type.
pub const TEXT_EVENT_STREAM: &str = "text/event-stream";

/// Accept value offering both response styles on POST.
pub const ACCEPT_STREAMABLE: &str = "application/json, text/event-stream";
