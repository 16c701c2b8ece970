//! Client-side Streamable HTTP transport.
//!
//! One logical MCP session is multiplexed over short-lived POSTs plus an
//! optional long-lived GET. Every outbound frame is a POST to the endpoint;
//! the server answers with `application/json` (one frame) or
//! `text/event-stream` (a stream of frames, the last of which is the
//! response to the POSTed request). [`StreamableHttpTransport::start_listening`]
//! opens the GET channel for server-initiated traffic and keeps it alive
//! with bounded exponential backoff.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, Result, TransportError};
use crate::shared::codec::{parse_frame, serialize_frame};
use crate::shared::http::{
    ACCEPT_STREAMABLE, APPLICATION_JSON, LAST_EVENT_ID, MCP_PROTOCOL_VERSION, MCP_SESSION_ID,
    TEXT_EVENT_STREAM,
};
use crate::shared::reconnect::ReconnectConfig;
use crate::shared::sse::SseParser;
use crate::shared::{Transport, TransportMessage};

type HttpClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Supplies bearer tokens for the `Authorization` header.
///
/// Token acquisition (OAuth flows, refresh) is the caller's concern; the
/// transport only attaches whatever this trait yields and surfaces `401`
/// as [`Error::Unauthorized`] so the caller can re-acquire and retry.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The current access token.
    async fn get_access_token(&self) -> Result<String>;
}

/// Configuration for [`StreamableHttpTransport`].
#[derive(Clone)]
pub struct StreamableHttpConfig {
    /// The MCP endpoint, e.g. `http://localhost:8080/mcp`.
    pub url: Url,
    /// Extra headers added to every request.
    pub extra_headers: Vec<(String, String)>,
    /// Bearer-token source, if the server requires auth.
    pub auth_provider: Option<Arc<dyn AuthProvider>>,
    /// Replaces the derived `Host` header (proxy/gateway deployments).
    pub host_override: Option<String>,
    /// Session id to resume, if any; otherwise captured from the server.
    pub session_id: Option<String>,
    /// Backoff policy for the listening GET.
    pub reconnect: ReconnectConfig,
}

impl StreamableHttpConfig {
    /// Default configuration for an endpoint.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            extra_headers: Vec::new(),
            auth_provider: None,
            host_override: None,
            session_id: None,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Add a header to every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    /// Set the bearer-token source.
    pub fn with_auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth_provider = Some(provider);
        self
    }

    /// Replace the derived `Host` header.
    pub fn with_host_override(mut self, host: impl Into<String>) -> Self {
        self.host_override = Some(host.into());
        self
    }

    /// Resume an existing session.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

impl std::fmt::Debug for StreamableHttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpConfig")
            .field("url", &self.url)
            .field("extra_headers", &self.extra_headers)
            .field("auth_provider", &self.auth_provider.is_some())
            .field("host_override", &self.host_override)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Streamable HTTP transport (client side).
pub struct StreamableHttpTransport {
    config: StreamableHttpConfig,
    client: HttpClient,
    session_id: Arc<RwLock<Option<String>>>,
    protocol_version: Arc<RwLock<Option<String>>>,
    last_event_id: Arc<RwLock<Option<String>>>,
    inbound_tx: mpsc::UnboundedSender<TransportMessage>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<TransportMessage>>,
    closed: AtomicBool,
    shutdown: CancellationToken,
    listening: AtomicBool,
}

impl StreamableHttpTransport {
    /// Build a transport for the configured endpoint.
    pub fn new(config: StreamableHttpConfig) -> Result<Self> {
        // Pin the ring provider; idempotent, and avoids provider ambiguity
        // when the host application also links aws-lc-rs.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| TransportError::Request(format!("tls roots unavailable: {e}")))?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(https);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let session_id = Arc::new(RwLock::new(config.session_id.clone()));
        Ok(Self {
            config,
            client,
            session_id,
            protocol_version: Arc::new(RwLock::new(None)),
            last_event_id: Arc::new(RwLock::new(None)),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            listening: AtomicBool::new(false),
        })
    }

    /// The id of the last SSE event received; resent as `Last-Event-ID`
    /// when the listening GET reconnects.
    pub fn last_event_id(&self) -> Option<String> {
        self.last_event_id.read().clone()
    }

    async fn build_request(&self, method: Method, body: Bytes) -> Result<Request<Full<Bytes>>> {
        let mut builder = Request::builder().method(method).uri(self.config.url.as_str());

        for (name, value) in &self.config.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(host) = &self.config.host_override {
            builder = builder.header(hyper::header::HOST, host.as_str());
        }
        if let Some(provider) = &self.config.auth_provider {
            let token = provider.get_access_token().await?;
            builder = builder.header(hyper::header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(session_id) = self.session_id.read().as_deref() {
            builder = builder.header(MCP_SESSION_ID, session_id);
        }
        if let Some(version) = self.protocol_version.read().as_deref() {
            builder = builder.header(MCP_PROTOCOL_VERSION, version);
        }

        builder
            .body(Full::new(body))
            .map_err(|e| TransportError::InvalidMessage(e.to_string()).into())
    }

    fn capture_headers(&self, response: &Response<Incoming>) {
        if let Some(value) = response.headers().get(MCP_SESSION_ID) {
            if let Ok(session_id) = value.to_str() {
                *self.session_id.write() = Some(session_id.to_string());
            }
        }
        if let Some(value) = response.headers().get(MCP_PROTOCOL_VERSION) {
            if let Ok(version) = value.to_str() {
                *self.protocol_version.write() = Some(version.to_string());
            }
        }
    }

    fn deliver(tx: &mpsc::UnboundedSender<TransportMessage>, bytes: &[u8]) {
        match parse_frame(bytes) {
            Ok(message) => {
                let _ = tx.send(message);
            },
            Err(error) => {
                tracing::warn!(target: "mcpio::http", %error, "discarding unparseable frame");
            },
        }
    }

    /// Drain an SSE body, delivering every `message` event as a frame and
    /// tracking event ids for reconnect resumption.
    async fn pump_sse(
        mut body: Incoming,
        tx: mpsc::UnboundedSender<TransportMessage>,
        shutdown: CancellationToken,
        last_event_id: Arc<RwLock<Option<String>>>,
    ) -> Result<()> {
        let mut parser = SseParser::new();
        loop {
            let frame = tokio::select! {
                frame = body.frame() => frame,
                () = shutdown.cancelled() => return Ok(()),
            };
            let Some(frame) = frame else {
                return Ok(());
            };
            let frame = frame.map_err(|e| TransportError::Request(e.to_string()))?;
            if let Some(data) = frame.data_ref() {
                let chunk = String::from_utf8_lossy(data);
                for event in parser.feed(&chunk) {
                    if let Some(id) = &event.id {
                        *last_event_id.write() = Some(id.clone());
                    }
                    if event.is_message() && !event.data.is_empty() {
                        Self::deliver(&tx, event.data.as_bytes());
                    }
                }
            }
        }
    }

}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn send(&self, message: TransportMessage) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed.into());
        }

        let is_notification = matches!(message, TransportMessage::Notification(_));
        let body = Bytes::from(serialize_frame(&message)?);
        let request = self.build_request(Method::POST, body).await?;
        let request = {
            let (mut parts, body) = request.into_parts();
            parts.headers.insert(
                hyper::header::CONTENT_TYPE,
                APPLICATION_JSON
                    .parse()
                    .map_err(|_| TransportError::InvalidMessage("bad content type".into()))?,
            );
            parts.headers.insert(
                hyper::header::ACCEPT,
                ACCEPT_STREAMABLE
                    .parse()
                    .map_err(|_| TransportError::InvalidMessage("bad accept header".into()))?,
            );
            Request::from_parts(parts, body)
        };

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        self.capture_headers(&response);

        match response.status() {
            StatusCode::UNAUTHORIZED => {
                return Err(Error::Unauthorized {
                    message: "server requires authorization".into(),
                });
            },
            StatusCode::NOT_FOUND => {
                return Err(TransportError::Request(
                    "server does not recognize this session (404)".into(),
                )
                .into());
            },
            // 202/204 acknowledge a notification with no body.
            StatusCode::ACCEPTED | StatusCode::NO_CONTENT => return Ok(()),
            status if !status.is_success() => {
                return Err(TransportError::Request(format!(
                    "request failed with status {status}"
                ))
                .into());
            },
            _ => {},
        }

        let content_type = response
            .headers()
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains(TEXT_EVENT_STREAM) {
            // Stream the body so intermediate frames (notifications, reverse
            // requests) surface before the final response arrives.
            let tx = self.inbound_tx.clone();
            let shutdown = self.shutdown.clone();
            let last_event_id = self.last_event_id.clone();
            tokio::spawn(async move {
                if let Err(error) =
                    Self::pump_sse(response.into_body(), tx, shutdown, last_event_id).await
                {
                    tracing::warn!(target: "mcpio::http", %error, "POST stream terminated");
                }
            });
            return Ok(());
        }

        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?
            .to_bytes();

        if bytes.is_empty() {
            if is_notification || content_type.is_empty() {
                return Ok(());
            }
            return Err(TransportError::InvalidMessage("empty response body".into()).into());
        }
        Self::deliver(&self.inbound_tx, &bytes);
        Ok(())
    }

    async fn receive(&self) -> Result<TransportMessage> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::ConnectionClosed.into());
        }
        let mut rx = self.inbound_rx.lock().await;
        match rx.recv().await {
            Some(message) => Ok(message),
            None => Err(TransportError::ConnectionClosed.into()),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.shutdown.cancel();
        self.inbound_rx.lock().await.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn transport_type(&self) -> &'static str {
        "streamable-http"
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    fn set_protocol_version(&self, version: &str) {
        *self.protocol_version.write() = Some(version.to_string());
    }

    async fn start_listening(&self) -> Result<()> {
        if self.listening.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let this = self.clone_for_listener();
        tokio::spawn(async move {
            let mut attempt: u32 = 0;
            loop {
                if this.shutdown.is_cancelled() {
                    break;
                }
                match this.listen_once().await {
                    // Connection ended normally; reconnect from a fresh budget.
                    Ok(true) => attempt = 0,
                    Ok(false) => break,
                    Err(error) => {
                        tracing::debug!(target: "mcpio::http", %error, "listening channel lost");
                    },
                }
                let Some(delay) = this.config.reconnect.delay_for(attempt) else {
                    tracing::warn!(
                        target: "mcpio::http",
                        "listening channel retry budget exhausted"
                    );
                    break;
                };
                attempt = attempt.saturating_add(1);
                tokio::select! {
                    () = tokio::time::sleep(delay) => {},
                    () = this.shutdown.cancelled() => break,
                }
            }
        });
        Ok(())
    }
}

impl StreamableHttpTransport {
    /// A handle sharing this transport's connection state, for the listener
    /// task. Only the pieces the GET loop needs are cloned.
    fn clone_for_listener(&self) -> ListenerHandle {
        ListenerHandle {
            config: self.config.clone(),
            client: self.client.clone(),
            session_id: self.session_id.clone(),
            protocol_version: self.protocol_version.clone(),
            last_event_id: self.last_event_id.clone(),
            inbound_tx: self.inbound_tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

struct ListenerHandle {
    config: StreamableHttpConfig,
    client: HttpClient,
    session_id: Arc<RwLock<Option<String>>>,
    protocol_version: Arc<RwLock<Option<String>>>,
    last_event_id: Arc<RwLock<Option<String>>>,
    inbound_tx: mpsc::UnboundedSender<TransportMessage>,
    shutdown: CancellationToken,
}

impl ListenerHandle {
    async fn listen_once(&self) -> Result<bool> {
        let mut builder = Request::builder().method(Method::GET).uri(self.config.url.as_str());
        for (name, value) in &self.config.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(host) = &self.config.host_override {
            builder = builder.header(hyper::header::HOST, host.as_str());
        }
        if let Some(provider) = &self.config.auth_provider {
            let token = provider.get_access_token().await?;
            builder = builder.header(hyper::header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(session_id) = self.session_id.read().as_deref() {
            builder = builder.header(MCP_SESSION_ID, session_id);
        }
        if let Some(version) = self.protocol_version.read().as_deref() {
            builder = builder.header(MCP_PROTOCOL_VERSION, version);
        }
        // Resume from the last event the previous connection delivered.
        if let Some(last) = self.last_event_id.read().as_deref() {
            builder = builder.header(LAST_EVENT_ID, last);
        }
        builder = builder.header(hyper::header::ACCEPT, TEXT_EVENT_STREAM);

        let request = builder
            .body(Full::new(Bytes::new()))
            .map_err(|e| Error::from(TransportError::InvalidMessage(e.to_string())))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            tracing::info!(
                target: "mcpio::http",
                "server does not support continuous listening (405)"
            );
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(TransportError::Request(format!(
                "listening GET failed with status {}",
                response.status()
            ))
            .into());
        }

        if let Some(value) = response.headers().get(MCP_SESSION_ID) {
            if let Ok(session_id) = value.to_str() {
                *self.session_id.write() = Some(session_id.to_string());
            }
        }

        StreamableHttpTransport::pump_sse(
            response.into_body(),
            self.inbound_tx.clone(),
            self.shutdown.clone(),
            self.last_event_id.clone(),
        )
        .await?;
        Ok(true)
    }
}

impl std::fmt::Debug for StreamableHttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamableHttpTransport")
            .field("url", &self.config.url)
            .field("session_id", &self.session_id.read())
            .field("last_event_id", &self.last_event_id.read())
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
