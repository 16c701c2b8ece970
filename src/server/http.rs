//! Streamable HTTP server.
//!
//! One axum endpoint multiplexes MCP sessions:
//! - `POST` carries one frame. Requests are answered on the POST itself,
//!   either as a plain JSON body or as a short SSE stream whose final event
//!   is the response (intermediate events carry notifications and reverse
//!   requests emitted while the handler runs).
//! - `GET` opens the long-lived listening channel: the session's outbound
//!   queue plus heartbeat `ping` requests.
//! - `DELETE` tears the session down.
//!
//! The server assigns `Mcp-Session-Id` on the first `initialize` and
//! requires it on every other request; unknown ids get `404`. SSE events
//! are tagged with ids from an [`InMemoryEventStore`]; a reconnecting GET
//! presents `Last-Event-ID` and has the missed window replayed.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{codes, Result, TransportError};
use crate::server::sessions::{Session, SessionId};
use crate::server::McpServer;
use crate::shared::codec::{parse_frame, serialize_frame};
use crate::shared::http::{
    LAST_EVENT_ID, MCP_PROTOCOL_VERSION, MCP_SESSION_ID, TEXT_EVENT_STREAM,
};
use crate::shared::TransportMessage;
use crate::types::protocol::methods;
use crate::types::{JsonRpcRequest, JsonRpcResponse};

/// Per-session log of streamed SSE events, for `Last-Event-ID` replay.
///
/// Every frame streamed to a session is recorded under the id its SSE event
/// carries; a reconnecting GET replays the retained window after the id it
/// presents. Retention is bounded per session; heartbeat pings are never
/// recorded (they carry no id).
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    next_id: AtomicU64,
    events: Mutex<HashMap<String, VecDeque<(String, TransportMessage)>>>,
}

impl InMemoryEventStore {
    /// Events retained per session before the oldest are dropped.
    pub const RETAINED_PER_SESSION: usize = 256;

    /// Record a frame for `session`; returns the id its SSE event carries.
    pub fn record(&self, session: &str, frame: &TransportMessage) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let mut events = self.events.lock();
        let log = events.entry(session.to_string()).or_default();
        if log.len() == Self::RETAINED_PER_SESSION {
            log.pop_front();
        }
        log.push_back((id.clone(), frame.clone()));
        id
    }

    /// Events recorded for `session` after `last_event_id`, oldest first.
    ///
    /// An id that has aged out of the window (or never existed) replays the
    /// whole retained window rather than silently dropping frames.
    pub fn replay_after(
        &self,
        session: &str,
        last_event_id: &str,
    ) -> Vec<(String, TransportMessage)> {
        let events = self.events.lock();
        let Some(log) = events.get(session) else {
            return Vec::new();
        };
        let start = log
            .iter()
            .position(|(id, _)| id == last_event_id)
            .map_or(0, |pos| pos + 1);
        log.iter().skip(start).cloned().collect()
    }

    /// Drop everything retained for `session`.
    pub fn forget(&self, session: &str) {
        self.events.lock().remove(session);
    }
}

/// Configuration for [`StreamableHttpServer`].
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Endpoint path.
    pub path: String,
    /// Whether `GET` continuous listening is offered (`405` otherwise).
    pub enable_get_listening: bool,
    /// Answer request POSTs with plain JSON instead of SSE.
    pub json_response: bool,
    /// Interval between heartbeat pings on the GET stream.
    pub heartbeat_interval: Duration,
    /// Event log backing `Last-Event-ID` replay; `None` disables
    /// resumability (events stream untagged).
    pub event_store: Option<Arc<InMemoryEventStore>>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            path: "/mcp".to_string(),
            enable_get_listening: true,
            json_response: false,
            heartbeat_interval: Duration::from_secs(3),
            event_store: Some(Arc::new(InMemoryEventStore::default())),
        }
    }
}

#[derive(Clone)]
struct AppState {
    server: McpServer,
    config: Arc<HttpServerConfig>,
}

/// HTTP front-end for an [`McpServer`].
pub struct StreamableHttpServer {
    addr: SocketAddr,
    server: McpServer,
    config: HttpServerConfig,
}

impl StreamableHttpServer {
    /// Serve `server` on `addr` with default configuration.
    pub fn new(addr: SocketAddr, server: McpServer) -> Self {
        Self::with_config(addr, server, HttpServerConfig::default())
    }

    /// Serve `server` on `addr` with the given configuration.
    pub fn with_config(addr: SocketAddr, server: McpServer, config: HttpServerConfig) -> Self {
        Self {
            addr,
            server,
            config,
        }
    }

    /// Bind and start serving; returns the bound address and the serve task.
    pub async fn start(self) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
        let state = AppState {
            server: self.server,
            config: Arc::new(self.config.clone()),
        };
        let app = Router::new()
            .route(
                &self.config.path,
                post(handle_post).get(handle_get).delete(handle_delete),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(TransportError::from)?;
        let local_addr = listener.local_addr().map_err(TransportError::from)?;
        let task = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                tracing::error!(target: "mcpio::http", %error, "http server stopped");
            }
        });
        Ok((local_addr, task))
    }
}

impl std::fmt::Debug for StreamableHttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpServer")
            .field("addr", &self.addr)
            .field("config", &self.config)
            .finish()
    }
}

fn rpc_error_body(code: i32, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": {"code": code, "message": message}
    })
}

fn error_response(status: StatusCode, code: i32, message: &str) -> Response {
    (status, Json(rpc_error_body(code, message))).into_response()
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(MCP_SESSION_ID)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

fn with_session_headers(mut response: Response, session: &Session) -> Response {
    if let Ok(value) = session.id().as_str().parse() {
        response.headers_mut().insert(MCP_SESSION_ID, value);
    }
    if let Some(version) = session.protocol_version() {
        if let Ok(value) = version.parse() {
            response.headers_mut().insert(MCP_PROTOCOL_VERSION, value);
        }
    }
    response
}

fn frame_event(message: &TransportMessage) -> Option<Event> {
    let bytes = serialize_frame(message).ok()?;
    let data = String::from_utf8(bytes).ok()?;
    Some(Event::default().event("message").data(data))
}

/// Build the SSE event for a frame, recording it for replay when an event
/// store is configured.
fn tagged_event(
    store: Option<&Arc<InMemoryEventStore>>,
    session: &Session,
    message: &TransportMessage,
) -> Option<Event> {
    let event = frame_event(message)?;
    match store {
        Some(store) => Some(event.id(store.record(session.id().as_str(), message))),
        None => Some(event),
    }
}

/// Resolve the session for an inbound frame, creating one when the frame is
/// the session-opening `initialize`.
async fn resolve_session(
    state: &AppState,
    headers: &HeaderMap,
    message: &TransportMessage,
) -> std::result::Result<Arc<Session>, Response> {
    let header = session_header(headers);

    if let Some(id) = header {
        return state
            .server
            .sessions()
            .get(&SessionId::from_string(id))
            .ok_or_else(|| {
                error_response(StatusCode::NOT_FOUND, codes::INVALID_REQUEST, "unknown session")
            });
    }

    let is_initialize = matches!(
        message,
        TransportMessage::Request(request) if request.method == methods::INITIALIZE
    );
    if !is_initialize {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            codes::INVALID_REQUEST,
            "missing Mcp-Session-Id header",
        ));
    }

    state.server.register_session(None).await.map_err(|error| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL_ERROR,
            &error.to_string(),
        )
    })
}

async fn handle_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let message = match parse_frame(&body) {
        Ok(message) => message,
        Err(error) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                codes::PARSE_ERROR,
                &error.to_string(),
            );
        },
    };

    let session = match resolve_session(&state, &headers, &message).await {
        Ok(session) => session,
        Err(response) => return response,
    };

    match message {
        TransportMessage::Request(request) => {
            handle_post_request(state, session, request).await
        },
        message => {
            // Notifications and reverse-call responses are one-way.
            state.server.handle_message(&session, message).await;
            with_session_headers(StatusCode::NO_CONTENT.into_response(), &session)
        },
    }
}

async fn handle_post_request(
    state: AppState,
    session: Arc<Session>,
    request: JsonRpcRequest,
) -> Response {
    // SSE streaming needs exclusive use of the session's outbound queue;
    // when a GET listener holds it (or JSON mode is configured) the response
    // body is plain JSON and outbound traffic rides the GET stream.
    let outbound = if state.config.json_response {
        None
    } else {
        session.take_outbound()
    };

    let Some(mut outbound) = outbound else {
        let response = state
            .server
            .handle_message(&session, TransportMessage::Request(request))
            .await;
        return match response {
            Some(response) => with_session_headers(Json(response).into_response(), &session),
            None => with_session_headers(StatusCode::NO_CONTENT.into_response(), &session),
        };
    };

    let (tx, rx) = mpsc::unbounded_channel::<std::result::Result<Event, Infallible>>();
    let server = state.server.clone();
    let store = state.config.event_store.clone();
    let stream_session = session.clone();
    tokio::spawn(async move {
        let mut call = Box::pin(
            server.handle_message(&stream_session, TransportMessage::Request(request)),
        );
        let mut drained = false;
        let response: Option<JsonRpcResponse> = loop {
            tokio::select! {
                response = &mut call => break response,
                frame = outbound.recv(), if !drained => {
                    match frame {
                        Some(frame) => {
                            if let Some(event) =
                                tagged_event(store.as_ref(), &stream_session, &frame)
                            {
                                // Client may have disconnected; keep driving
                                // the call so server state settles.
                                let _ = tx.send(Ok(event));
                            }
                        },
                        None => drained = true,
                    }
                },
            }
        };
        if let Some(response) = response {
            let frame = TransportMessage::Response(response);
            if let Some(event) = tagged_event(store.as_ref(), &stream_session, &frame) {
                let _ = tx.send(Ok(event));
            }
        }
        stream_session.restore_outbound(outbound);
    });

    let sse = Sse::new(UnboundedReceiverStream::new(rx));
    with_session_headers(sse.into_response(), &session)
}

async fn handle_get(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !state.config.enable_get_listening {
        return error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            codes::INVALID_REQUEST,
            "continuous listening is not enabled",
        );
    }

    let accepts_sse = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains(TEXT_EVENT_STREAM) || accept.contains("*/*"));
    if !accepts_sse {
        return error_response(
            StatusCode::NOT_ACCEPTABLE,
            codes::INVALID_REQUEST,
            "Accept must include text/event-stream",
        );
    }

    let Some(id) = session_header(&headers) else {
        return error_response(
            StatusCode::NOT_FOUND,
            codes::INVALID_REQUEST,
            "missing Mcp-Session-Id header",
        );
    };
    let Some(session) = state.server.sessions().get(&SessionId::from_string(id)) else {
        return error_response(StatusCode::NOT_FOUND, codes::INVALID_REQUEST, "unknown session");
    };

    let Some(mut outbound) = session.take_outbound() else {
        return error_response(
            StatusCode::CONFLICT,
            codes::INVALID_REQUEST,
            "another stream is attached to this session",
        );
    };

    // Frames streamed before the connection was lost are replayed first.
    let last_event_id = headers
        .get(LAST_EVENT_ID)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string);
    let replay = match (&state.config.event_store, &last_event_id) {
        (Some(store), Some(last)) => store.replay_after(session.id().as_str(), last),
        _ => Vec::new(),
    };

    let (tx, rx) = mpsc::unbounded_channel::<std::result::Result<Event, Infallible>>();
    let store = state.config.event_store.clone();
    let stream_session = session.clone();
    let heartbeat = state.config.heartbeat_interval;
    tokio::spawn(async move {
        for (event_id, frame) in replay {
            let Some(event) = frame_event(&frame) else { continue };
            if tx.send(Ok(event.id(event_id))).is_err() {
                stream_session.restore_outbound(outbound);
                return;
            }
        }

        let mut ticker = tokio::time::interval(heartbeat);
        // The first tick completes immediately; skip it so pings are spaced.
        ticker.tick().await;
        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    match frame {
                        Some(frame) => {
                            let Some(event) =
                                tagged_event(store.as_ref(), &stream_session, &frame)
                            else {
                                continue;
                            };
                            if tx.send(Ok(event)).is_err() {
                                break;
                            }
                        },
                        None => break,
                    }
                },
                _ = ticker.tick() => {
                    let id = stream_session.protocol().next_request_id();
                    // The receiver is dropped on purpose: a missing pong is
                    // not by itself a disconnect.
                    match stream_session.protocol().register(id.clone()) {
                        Ok(_rx) => {},
                        Err(_) => break,
                    }
                    let ping = TransportMessage::Request(JsonRpcRequest::new(
                        id,
                        methods::PING,
                        None,
                    ));
                    let Some(event) = frame_event(&ping) else { continue };
                    if tx.send(Ok(event)).is_err() {
                        break;
                    }
                },
            }
        }
        stream_session.restore_outbound(outbound);
    });

    let sse = Sse::new(UnboundedReceiverStream::new(rx));
    with_session_headers(sse.into_response(), &session)
}

async fn handle_delete(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(id) = session_header(&headers) else {
        return error_response(
            StatusCode::NOT_FOUND,
            codes::INVALID_REQUEST,
            "missing Mcp-Session-Id header",
        );
    };
    let session_id = SessionId::from_string(id);
    if state.server.sessions().get(&session_id).is_none() {
        return error_response(StatusCode::NOT_FOUND, codes::INVALID_REQUEST, "unknown session");
    }
    state.server.unregister_session(&session_id).await;
    if let Some(store) = &state.config.event_store {
        store.forget(session_id.as_str());
    }
    StatusCode::NO_CONTENT.into_response()
}
