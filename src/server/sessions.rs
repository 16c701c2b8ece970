//! Per-peer session state and the session registry.
//!
//! A [`Session`] owns the bounded outbound queue that carries notifications
//! and reverse requests to its transport (single writer: the server; single
//! reader: the transport pump), plus a [`Protocol`] instance correlating
//! server→client requests with their responses.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{Error, Result, TransportError};
use crate::server::registry::ServerTool;
use crate::shared::protocol::Protocol;
use crate::shared::TransportMessage;
use crate::types::protocol::methods;
use crate::types::{
    ClientCapabilities, CreateMessageParams, CreateMessageResult, ElicitParams, ElicitResult,
    Implementation, JsonRpcNotification, JsonRpcRequest, ListRootsResult, LogMessageParams,
    LoggingLevel, RequestMeta,
};

/// Capacity of each session's outbound queue.
pub const NOTIFY_QUEUE_CAPACITY: usize = 100;

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// A fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier (transport-assigned ids).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One logical bidirectional connection to a client.
pub struct Session {
    id: SessionId,
    outbound_tx: mpsc::Sender<TransportMessage>,
    outbound_rx: Mutex<Option<mpsc::Receiver<TransportMessage>>>,
    protocol: Protocol,
    init_received: AtomicBool,
    initialized: AtomicBool,
    closed: AtomicBool,
    log_level: RwLock<LoggingLevel>,
    client_info: RwLock<Option<Implementation>>,
    client_capabilities: RwLock<Option<ClientCapabilities>>,
    protocol_version: RwLock<Option<String>>,
    tool_overlay: RwLock<Option<BTreeMap<String, ServerTool>>>,
    subscriptions: RwLock<HashSet<String>>,
}

impl Session {
    /// Create a session with the given id.
    pub fn new(id: SessionId) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::channel(NOTIFY_QUEUE_CAPACITY);
        Arc::new(Self {
            id,
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            protocol: Protocol::new(),
            init_received: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            log_level: RwLock::new(LoggingLevel::Info),
            client_info: RwLock::new(None),
            client_capabilities: RwLock::new(None),
            protocol_version: RwLock::new(None),
            tool_overlay: RwLock::new(None),
            subscriptions: RwLock::new(HashSet::new()),
        })
    }

    /// This session's id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// The correlation state for server→client requests.
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Record that `initialize` was handled. Returns false if it already
    /// was (duplicate `initialize` requests are rejected by the caller).
    pub fn mark_init_received(&self) -> bool {
        !self.init_received.swap(true, Ordering::AcqRel)
    }

    /// Mark the session initialized (`notifications/initialized` arrived).
    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    /// Whether non-initialize requests may be served.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Store the peer's identity and capabilities from `initialize`.
    pub fn set_client(&self, info: Implementation, capabilities: ClientCapabilities) {
        *self.client_info.write() = Some(info);
        *self.client_capabilities.write() = Some(capabilities);
    }

    /// The peer's identity, once initialized.
    pub fn client_info(&self) -> Option<Implementation> {
        self.client_info.read().clone()
    }

    /// The peer's declared capabilities, once initialized.
    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.client_capabilities.read().clone()
    }

    /// Record the negotiated protocol version.
    pub fn set_protocol_version(&self, version: impl Into<String>) {
        *self.protocol_version.write() = Some(version.into());
    }

    /// The negotiated protocol version.
    pub fn protocol_version(&self) -> Option<String> {
        self.protocol_version.read().clone()
    }

    /// The minimum level this session wants forwarded.
    pub fn log_level(&self) -> LoggingLevel {
        *self.log_level.read()
    }

    /// Set the forwarded-log threshold (`logging/setLevel`).
    pub fn set_log_level(&self, level: LoggingLevel) {
        *self.log_level.write() = level;
    }

    /// Run `f` against this session's tool overlay, creating it on first use.
    pub fn with_tool_overlay<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, ServerTool>) -> R,
    ) -> R {
        let mut overlay = self.tool_overlay.write();
        f(overlay.get_or_insert_with(BTreeMap::new))
    }

    /// A snapshot of the overlay, if one exists.
    pub fn tool_overlay(&self) -> Option<BTreeMap<String, ServerTool>> {
        self.tool_overlay.read().clone()
    }

    /// Subscribe this session to updates for a resource URI.
    pub fn subscribe(&self, uri: impl Into<String>) {
        self.subscriptions.write().insert(uri.into());
    }

    /// Drop a resource subscription.
    pub fn unsubscribe(&self, uri: &str) {
        self.subscriptions.write().remove(uri);
    }

    /// Whether this session subscribed to `uri`.
    pub fn is_subscribed(&self, uri: &str) -> bool {
        self.subscriptions.read().contains(uri)
    }

    /// Enqueue a notification for the transport.
    ///
    /// The queue is bounded; when full the notification is dropped and
    /// logged rather than blocking the writer.
    pub fn notify(&self, method: &str, params: Option<Value>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let frame = TransportMessage::Notification(JsonRpcNotification::new(method, params));
        if let Err(error) = self.outbound_tx.try_send(frame) {
            tracing::warn!(
                target: "mcpio::session",
                session = %self.id,
                method,
                %error,
                "notification queue full, dropping"
            );
        }
    }

    /// Forward a log message if it meets the session's threshold.
    pub fn log(&self, params: LogMessageParams) {
        if params.level >= self.log_level() {
            let value = serde_json::to_value(&params).ok();
            self.notify(crate::types::protocol::notifications::MESSAGE, value);
        }
    }

    /// Issue a reverse request to the client and await its response.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed.into());
        }
        let id = self.protocol.next_request_id();
        let rx = self.protocol.register(id.clone())?;
        let frame =
            TransportMessage::Request(JsonRpcRequest::new(id.clone(), method, params));
        if self.outbound_tx.try_send(frame).is_err() {
            self.protocol.cancel(&id);
            return Err(TransportError::Send(format!(
                "outbound queue full, cannot deliver {method}"
            ))
            .into());
        }
        let response = self.protocol.wait(id, rx, None).await?;
        response.into_result()
    }

    /// Take the outbound queue's receiver for a transport pump.
    pub fn take_outbound(&self) -> Option<mpsc::Receiver<TransportMessage>> {
        self.outbound_rx.lock().take()
    }

    /// Return the receiver after the pump is done with it.
    pub fn restore_outbound(&self, rx: mpsc::Receiver<TransportMessage>) {
        *self.outbound_rx.lock() = Some(rx);
    }

    /// Tear the session down: fail in-flight reverse calls and stop
    /// accepting outbound traffic.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.protocol.close();
        // Dropping the receiver (if we still hold it) lets queued frames go.
        self.outbound_rx.lock().take();
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("initialized", &self.is_initialized())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Registry of live sessions, keyed by id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session; ids must be unique.
    pub fn register(&self, session: Arc<Session>) -> Result<()> {
        use dashmap::mapref::entry::Entry;
        match self.sessions.entry(session.id().clone()) {
            Entry::Occupied(_) => Err(Error::invalid_request(format!(
                "session '{}' already registered",
                session.id()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            },
        }
    }

    /// Remove and close a session.
    pub fn unregister(&self, id: &SessionId) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(id)?;
        session.close();
        Some(session)
    }

    /// Look a session up by id.
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| s.clone())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Notify every session.
    pub fn broadcast(&self, method: &str, params: Option<Value>) {
        for entry in self.sessions.iter() {
            entry.value().notify(method, params.clone());
        }
    }

    /// Notify sessions matching the predicate.
    pub fn broadcast_filtered(
        &self,
        method: &str,
        params: Option<Value>,
        predicate: impl Fn(&Session) -> bool,
    ) {
        for entry in self.sessions.iter() {
            if predicate(entry.value()) {
                entry.value().notify(method, params.clone());
            }
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .finish()
    }
}

/// Context handed to every handler invocation.
///
/// Carries the bound session (when there is one), a cancellation token that
/// fires when the request is cancelled, and helpers for reverse calls so
/// handlers reach the client without holding a server reference.
#[derive(Clone)]
pub struct RequestContext {
    /// Identifier of the request being served.
    pub request_id: String,
    /// Fires when the request (or owning task) is cancelled.
    pub cancellation: CancellationToken,
    /// The session this request arrived on.
    pub session: Option<Arc<Session>>,
    /// Request `_meta` (progress token).
    pub meta: Option<RequestMeta>,
}

impl RequestContext {
    /// A context bound to a session.
    pub fn new(request_id: impl Into<String>, session: Option<Arc<Session>>) -> Self {
        Self {
            request_id: request_id.into(),
            cancellation: CancellationToken::new(),
            session,
            meta: None,
        }
    }

    /// Use a specific cancellation token (task execution shares the task's).
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Attach request metadata.
    pub fn with_meta(mut self, meta: Option<RequestMeta>) -> Self {
        self.meta = meta;
        self
    }

    /// Whether the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Suspend until the request is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// The bound session's id.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_deref().map(Session::id)
    }

    fn session(&self) -> Result<&Arc<Session>> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::internal("no session bound to this request"))
    }

    /// Ask the client to run LLM sampling (`sampling/createMessage`).
    pub async fn create_message(
        &self,
        params: CreateMessageParams,
    ) -> Result<CreateMessageResult> {
        let session = self.session()?;
        if !session
            .client_capabilities()
            .is_some_and(|caps| caps.supports_sampling())
        {
            return Err(Error::invalid_request(
                "client did not declare sampling capability",
            ));
        }
        let value = session
            .request(methods::SAMPLING_CREATE_MESSAGE, Some(serde_json::to_value(params)?))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Ask the client for user input (`elicitation/create`).
    pub async fn elicit(&self, params: ElicitParams) -> Result<ElicitResult> {
        params.validate()?;
        let session = self.session()?;
        if !session
            .client_capabilities()
            .is_some_and(|caps| caps.supports_elicitation())
        {
            return Err(Error::invalid_request(
                "client did not declare elicitation capability",
            ));
        }
        let value = session
            .request(methods::ELICITATION_CREATE, Some(serde_json::to_value(params)?))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Ask the client for its roots (`roots/list`).
    pub async fn list_roots(&self) -> Result<ListRootsResult> {
        let session = self.session()?;
        let value = session.request(methods::ROOTS_LIST, None).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Ping the client.
    pub async fn ping(&self) -> Result<()> {
        let session = self.session()?;
        session.request(methods::PING, None).await?;
        Ok(())
    }

    /// Forward a log message to this session, honoring its level filter.
    pub fn log(&self, params: LogMessageParams) {
        if let Some(session) = &self.session {
            session.log(params);
        }
    }

    /// Emit a progress notification if the request carried a progress token.
    pub fn progress(&self, progress: f64, total: Option<f64>, message: Option<String>) {
        let Some(token) = self.meta.as_ref().and_then(|m| m.progress_token.clone()) else {
            return;
        };
        if let Some(session) = &self.session {
            let params = crate::types::ProgressParams {
                progress_token: token,
                progress,
                total,
                message,
            };
            if let Ok(value) = serde_json::to_value(&params) {
                session.notify(
                    crate::types::protocol::notifications::PROGRESS,
                    Some(value),
                );
            }
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("session", &self.session_id())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn register_rejects_duplicate_ids() {
        let registry = SessionRegistry::new();
        let id = SessionId::from_string("dup");
        registry.register(Session::new(id.clone())).unwrap();
        assert!(registry.register(Session::new(id)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn notifications_preserve_fifo_order() {
        let session = Session::new(SessionId::generate());
        for i in 0..10 {
            session.notify("notifications/progress", Some(json!({"i": i})));
        }
        let mut rx = session.take_outbound().unwrap();
        for i in 0..10 {
            let TransportMessage::Notification(n) = rx.recv().await.unwrap() else {
                panic!("expected notification");
            };
            assert_eq!(n.params.unwrap()["i"], i);
        }
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let session = Session::new(SessionId::generate());
        for i in 0..(NOTIFY_QUEUE_CAPACITY + 20) {
            session.notify("notifications/progress", Some(json!({"i": i})));
        }
        let mut rx = session.take_outbound().unwrap();
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, NOTIFY_QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn reverse_request_round_trip() {
        let session = Session::new(SessionId::generate());
        let mut rx = session.take_outbound().unwrap();

        let requester = {
            let session = session.clone();
            tokio::spawn(async move { session.request("roots/list", None).await })
        };

        // Pretend to be the transport + client: answer the reverse request.
        let TransportMessage::Request(request) = rx.recv().await.unwrap() else {
            panic!("expected reverse request");
        };
        assert_eq!(request.method, "roots/list");
        session.protocol().complete(crate::types::JsonRpcResponse::success(
            request.id,
            json!({"roots": []}),
        ));

        let value = requester.await.unwrap().unwrap();
        assert_eq!(value, json!({"roots": []}));
    }

    #[tokio::test]
    async fn close_fails_inflight_reverse_requests() {
        let session = Session::new(SessionId::generate());
        let _rx = session.take_outbound().unwrap();
        let requester = {
            let session = session.clone();
            tokio::spawn(async move { session.request("ping", None).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        session.close();
        assert!(requester.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn log_respects_session_level() {
        let session = Session::new(SessionId::generate());
        session.set_log_level(LoggingLevel::Warning);
        session.log(LogMessageParams {
            level: LoggingLevel::Debug,
            logger: None,
            data: json!("quiet"),
        });
        session.log(LogMessageParams {
            level: LoggingLevel::Error,
            logger: None,
            data: json!("loud"),
        });

        let mut rx = session.take_outbound().unwrap();
        let TransportMessage::Notification(n) = rx.try_recv().unwrap() else {
            panic!("expected notification");
        };
        assert_eq!(n.params.unwrap()["data"], "loud");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn overlay_is_independent_per_session() {
        let a = Session::new(SessionId::generate());
        let b = Session::new(SessionId::generate());
        a.with_tool_overlay(|overlay| {
            overlay.insert(
                "extra".into(),
                ServerTool::sync(
                    crate::types::ToolInfo::new("extra", json!({})),
                    crate::server::registry::tool_fn(|_args, _cx| async {
                        Ok(crate::types::CallToolResult::text("x"))
                    }),
                ),
            );
        });
        assert!(a.tool_overlay().unwrap().contains_key("extra"));
        assert!(b.tool_overlay().is_none());
    }
}
