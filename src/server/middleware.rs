//! Tool-call interceptors and server lifecycle hooks.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::server::sessions::{RequestContext, SessionId};
use crate::types::CallToolResult;

/// Interceptor wrapped around every tool invocation.
///
/// `before_call` may rewrite the arguments or reject the call outright
/// (rejection short-circuits the handler and surfaces as a protocol error).
/// `after_call` may rewrite the result; its failures are logged, not fatal.
#[async_trait]
pub trait ToolMiddleware: Send + Sync {
    /// Runs before the handler; may mutate `args` or reject the call.
    async fn before_call(
        &self,
        _tool: &str,
        _args: &mut Value,
        _cx: &RequestContext,
    ) -> Result<()> {
        Ok(())
    }

    /// Runs after a successful handler; may mutate the result.
    async fn after_call(
        &self,
        _tool: &str,
        _result: &mut CallToolResult,
        _cx: &RequestContext,
    ) -> Result<()> {
        Ok(())
    }

    /// Observes handler failures.
    async fn on_error(&self, _tool: &str, _error: &Error, _cx: &RequestContext) {}
}

/// An ordered chain of tool middleware.
#[derive(Clone, Default)]
pub struct ToolMiddlewareChain {
    layers: Vec<Arc<dyn ToolMiddleware>>,
}

impl ToolMiddlewareChain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer; layers run in registration order.
    pub fn push(&mut self, layer: Arc<dyn ToolMiddleware>) {
        self.layers.push(layer);
    }

    /// Number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the chain has no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Run every `before_call`; the first rejection aborts the call.
    pub async fn before_call(
        &self,
        tool: &str,
        args: &mut Value,
        cx: &RequestContext,
    ) -> Result<()> {
        for layer in &self.layers {
            if let Err(error) = layer.before_call(tool, args, cx).await {
                layer.on_error(tool, &error, cx).await;
                return Err(error);
            }
        }
        Ok(())
    }

    /// Run every `after_call`; failures are logged and the result kept.
    pub async fn after_call(&self, tool: &str, result: &mut CallToolResult, cx: &RequestContext) {
        for layer in &self.layers {
            if let Err(error) = layer.after_call(tool, result, cx).await {
                tracing::warn!(
                    target: "mcpio::middleware",
                    tool,
                    %error,
                    "after_call middleware failed"
                );
            }
        }
    }

    /// Report a handler failure to every layer.
    pub async fn on_error(&self, tool: &str, error: &Error, cx: &RequestContext) {
        for layer in &self.layers {
            layer.on_error(tool, error, cx).await;
        }
    }
}

impl std::fmt::Debug for ToolMiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolMiddlewareChain")
            .field("layers", &self.len())
            .finish()
    }
}

/// Observability hooks into the server lifecycle.
///
/// All methods default to no-ops; implement only what you need.
#[async_trait]
pub trait ServerHook: Send + Sync {
    /// A request is about to be routed.
    async fn before_request(&self, _method: &str, _session: &SessionId) {}

    /// A request finished; `ok` is false for error responses.
    async fn after_request(&self, _method: &str, _session: &SessionId, _ok: bool) {}

    /// A request failed with a protocol-level error.
    async fn on_error(&self, _method: &str, _session: &SessionId, _error: &Error) {}

    /// A session was registered.
    async fn on_session_registered(&self, _session: &SessionId) {}

    /// A session was unregistered.
    async fn on_session_unregistered(&self, _session: &SessionId) {}
}
