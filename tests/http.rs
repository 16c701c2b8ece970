//! End-to-end tests over real Streamable HTTP on an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use serde_json::{json, Value};
use url::Url;

use mcpio::client::{content_text, Client, SamplingHandler};
use mcpio::server::http::{HttpServerConfig, StreamableHttpServer};
use mcpio::server::{McpServer, RequestContext};
use mcpio::shared::{SseEvent, SseParser, StreamableHttpConfig, StreamableHttpTransport, Transport};
use mcpio::types::{
    CallToolResult, ClientCapabilities, Content, CreateMessageParams, CreateMessageResult,
    LogMessageParams, LoggingLevel, Role, SamplingMessage,
};
use mcpio::{Error, Result};

struct CapitalSampler;

#[async_trait::async_trait]
impl SamplingHandler for CapitalSampler {
    async fn create_message(&self, params: CreateMessageParams) -> Result<CreateMessageResult> {
        let question = params
            .messages
            .first()
            .and_then(|m| match &m.content {
                Content::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .unwrap_or_default();
        let answer = if question.contains("capital of France") {
            "Paris is the capital of France."
        } else {
            "no idea"
        };
        Ok(CreateMessageResult {
            role: Role::Assistant,
            content: Content::Text {
                text: answer.to_string(),
            },
            model: "mock-sonnet".to_string(),
            stop_reason: None,
        })
    }
}

fn sampling_server() -> McpServer {
    McpServer::builder()
        .name("http-server")
        .version("1.0.0")
        .tool("calculate", json!({"type": "object"}), |args: Value, _cx| async move {
            let sum = args["x"].as_i64().unwrap_or(0) + args["y"].as_i64().unwrap_or(0);
            Ok(CallToolResult::text(sum.to_string()))
        })
        .tool("ask", json!({"type": "object"}), |args: Value, cx: RequestContext| async move {
            let question = args["question"].as_str().unwrap_or_default().to_string();
            let sampled = cx
                .create_message(CreateMessageParams {
                    messages: vec![SamplingMessage {
                        role: Role::User,
                        content: Content::Text { text: question },
                    }],
                    model_preferences: None,
                    system_prompt: None,
                    temperature: None,
                    max_tokens: Some(64),
                    stop_sequences: None,
                })
                .await?;
            let Content::Text { text } = sampled.content else {
                return Err(Error::internal("expected text"));
            };
            Ok(CallToolResult::text(format!("{text} [{}]", sampled.model)))
        })
        .build()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

async fn start_server(server: McpServer) -> SocketAddr {
    init_tracing();
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let (bound, _task) = StreamableHttpServer::new(addr, server).start().await.unwrap();
    bound
}

async fn start_server_with(server: McpServer, config: HttpServerConfig) -> SocketAddr {
    init_tracing();
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let (bound, _task) = StreamableHttpServer::with_config(addr, server, config)
        .start()
        .await
        .unwrap();
    bound
}

fn http_client(addr: SocketAddr) -> Client<StreamableHttpTransport> {
    let url = Url::parse(&format!("http://{addr}/mcp")).unwrap();
    let transport = StreamableHttpTransport::new(StreamableHttpConfig::new(url)).unwrap();
    let client = Client::new(transport);
    client.set_request_timeout(Some(Duration::from_secs(10)));
    client
}

#[tokio::test]
async fn initialize_assigns_a_session_id() {
    let addr = start_server(sampling_server()).await;
    let client = http_client(addr);

    assert!(client.transport().session_id().is_none());
    let result = client
        .initialize(ClientCapabilities::minimal())
        .await
        .unwrap();
    assert_eq!(result.server_info.name, "http-server");
    assert!(client.transport().session_id().is_some());
}

#[tokio::test]
async fn tool_call_over_http() {
    let addr = start_server(sampling_server()).await;
    let client = http_client(addr);
    client
        .initialize(ClientCapabilities::minimal())
        .await
        .unwrap();

    let result = client
        .call_tool("calculate", json!({"x": 2, "y": 3}))
        .await
        .unwrap();
    assert_eq!(content_text(&result.content), "5");
}

#[tokio::test]
async fn reverse_sampling_over_listening_channel() {
    let addr = start_server(sampling_server()).await;
    let client = http_client(addr);
    client.set_sampling_handler(Arc::new(CapitalSampler));
    client
        .initialize(ClientCapabilities::minimal())
        .await
        .unwrap();
    client.start_listening().await.unwrap();
    // Give the GET stream a moment to attach before the tool call needs it.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let result = client
        .call_tool("ask", json!({"question": "What is the capital of France?"}))
        .await
        .unwrap();
    let text = content_text(&result.content);
    assert!(text.contains("Paris is the capital of France"), "got: {text}");
    assert!(text.contains("mock-sonnet"), "got: {text}");
}

#[tokio::test]
async fn notification_posts_are_accepted() {
    let addr = start_server(sampling_server()).await;
    let client = http_client(addr);
    client
        .initialize(ClientCapabilities::minimal())
        .await
        .unwrap();

    // The server answers notification POSTs with 204 No Content; the
    // transport must treat that as success.
    client
        .notification("notifications/roots/list_changed", None)
        .await
        .unwrap();
}

#[tokio::test]
async fn foreign_session_id_is_rejected_with_404() {
    let addr = start_server(sampling_server()).await;

    let url = Url::parse(&format!("http://{addr}/mcp")).unwrap();
    let config = StreamableHttpConfig::new(url).with_session_id("forged-session-id");
    let transport = StreamableHttpTransport::new(config).unwrap();

    let err = transport
        .send(mcpio::shared::TransportMessage::Request(
            mcpio::types::JsonRpcRequest::new(
                mcpio::types::RequestId::Number(1),
                "tools/list",
                None,
            ),
        ))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("404"), "got: {err}");
}

#[tokio::test]
async fn raw_requests_get_protocol_error_statuses() {
    let addr = start_server(sampling_server()).await;
    let raw: HyperClient<_, Full<Bytes>> =
        HyperClient::builder(TokioExecutor::new()).build_http();

    // Malformed body: 400.
    let request = hyper::Request::builder()
        .method(hyper::Method::POST)
        .uri(format!("http://{addr}/mcp"))
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from_static(b"{not json")))
        .unwrap();
    let response = raw.request(request).await.unwrap();
    assert_eq!(response.status(), hyper::StatusCode::BAD_REQUEST);

    // GET without a session: 404.
    let request = hyper::Request::builder()
        .method(hyper::Method::GET)
        .uri(format!("http://{addr}/mcp"))
        .header(hyper::header::ACCEPT, "text/event-stream")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = raw.request(request).await.unwrap();
    assert_eq!(response.status(), hyper::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_is_405_when_listening_disabled() {
    let server = sampling_server();
    let addr = start_server_with(
        server,
        HttpServerConfig {
            enable_get_listening: false,
            ..Default::default()
        },
    )
    .await;

    let raw: HyperClient<_, Full<Bytes>> =
        HyperClient::builder(TokioExecutor::new()).build_http();
    let request = hyper::Request::builder()
        .method(hyper::Method::GET)
        .uri(format!("http://{addr}/mcp"))
        .header(hyper::header::ACCEPT, "text/event-stream")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let response = raw.request(request).await.unwrap();
    assert_eq!(response.status(), hyper::StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn json_response_mode_works_end_to_end() {
    let server = sampling_server();
    let addr = start_server_with(
        server,
        HttpServerConfig {
            json_response: true,
            ..Default::default()
        },
    )
    .await;
    let client = http_client(addr);
    client
        .initialize(ClientCapabilities::minimal())
        .await
        .unwrap();

    let result = client
        .call_tool("calculate", json!({"x": 40, "y": 2}))
        .await
        .unwrap();
    assert_eq!(content_text(&result.content), "42");
}

#[tokio::test]
async fn sse_event_ids_feed_resumption_state() {
    let addr = start_server(sampling_server()).await;
    let client = http_client(addr);
    client
        .initialize(ClientCapabilities::minimal())
        .await
        .unwrap();

    // The initialize response rode a tagged SSE event; the transport must
    // have recorded its id for Last-Event-ID reconnects.
    assert!(client.transport().last_event_id().is_some());
}

/// Open the listening GET, retrying on `409` until the previous stream's
/// outbound lease has been released (the server notices a dropped stream on
/// its next write, at the latest the heartbeat ping).
async fn attach_listener(
    raw: &HyperClient<hyper_util::client::legacy::connect::HttpConnector, Full<Bytes>>,
    addr: SocketAddr,
    session_id: &str,
    last_event_id: Option<&str>,
) -> hyper::body::Incoming {
    let mut attempts = 0;
    loop {
        let mut builder = hyper::Request::builder()
            .method(hyper::Method::GET)
            .uri(format!("http://{addr}/mcp"))
            .header(hyper::header::ACCEPT, "text/event-stream")
            .header("Mcp-Session-Id", session_id);
        if let Some(last) = last_event_id {
            builder = builder.header("Last-Event-ID", last);
        }
        let request = builder.body(Full::new(Bytes::new())).unwrap();
        let response = raw.request(request).await.unwrap();
        if response.status() == hyper::StatusCode::OK {
            return response.into_body();
        }
        assert_eq!(response.status(), hyper::StatusCode::CONFLICT);
        attempts += 1;
        assert!(attempts < 200, "outbound lease was never released");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Read streamed SSE bytes until `want` message events have arrived.
async fn read_message_events(
    body: &mut hyper::body::Incoming,
    parser: &mut SseParser,
    want: usize,
) -> Vec<SseEvent> {
    let mut events = Vec::new();
    while events.len() < want {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("sse frame within 5s")
            .expect("stream still open")
            .expect("readable frame");
        if let Some(data) = frame.data_ref() {
            let chunk = String::from_utf8_lossy(data);
            events.extend(parser.feed(&chunk).into_iter().filter(SseEvent::is_message));
        }
    }
    events
}

#[tokio::test]
async fn get_reconnect_replays_missed_events() {
    let server = sampling_server();
    let addr = start_server(server.clone()).await;
    let client = http_client(addr);
    client
        .initialize(ClientCapabilities::minimal())
        .await
        .unwrap();
    let session_id = client.transport().session_id().unwrap();

    // Two log notifications queue up before any listener is attached.
    for seq in 1..=2 {
        server.log_message(LogMessageParams {
            level: LoggingLevel::Info,
            logger: Some("replay-test".into()),
            data: json!({ "seq": seq }),
        });
    }

    let raw: HyperClient<_, Full<Bytes>> =
        HyperClient::builder(TokioExecutor::new()).build_http();

    let mut body = attach_listener(&raw, addr, &session_id, None).await;
    let mut parser = SseParser::new();
    let delivered = read_message_events(&mut body, &mut parser, 2).await;
    assert!(delivered[0].data.contains("\"seq\":1"));
    assert!(delivered[1].data.contains("\"seq\":2"));
    let resume_from = delivered[0].id.clone().expect("live events are tagged");
    let lost_id = delivered[1].id.clone().expect("live events are tagged");

    // Drop the stream, then emit one more notification. The server only
    // notices the disconnect on its next write, so this frame is recorded
    // but never delivered.
    drop(body);
    server.log_message(LogMessageParams {
        level: LoggingLevel::Info,
        logger: Some("replay-test".into()),
        data: json!({ "seq": 3 }),
    });

    // Reconnect presenting the first event's id.
    let mut body = attach_listener(&raw, addr, &session_id, Some(&resume_from)).await;
    let mut parser = SseParser::new();
    let replayed = read_message_events(&mut body, &mut parser, 2).await;
    assert_eq!(replayed[0].id.as_deref(), Some(lost_id.as_str()));
    assert!(replayed[0].data.contains("\"seq\":2"));
    assert!(replayed[1].data.contains("\"seq\":3"));
}

#[tokio::test]
async fn task_lifecycle_over_http() {
    let server = McpServer::builder()
        .name("task-http")
        .task_tool(
            mcpio::types::ToolInfo::new("slow_echo", json!({"type": "object"}))
                .with_task_support(mcpio::types::TaskSupport::Optional),
            |args: Value, _cx| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(CallToolResult::text(
                    args["text"].as_str().unwrap_or_default().to_string(),
                ))
            },
        )
        .build();
    let addr = start_server(server).await;
    let client = http_client(addr);
    client
        .initialize(ClientCapabilities::minimal())
        .await
        .unwrap();

    let created = client
        .call_tool_task(
            "slow_echo",
            json!({"text": "over http"}),
            mcpio::types::TaskParams {
                ttl: Some(60_000),
                poll_interval: Some(100),
            },
        )
        .await
        .unwrap();
    assert_eq!(created.task.status, mcpio::types::TaskStatus::Working);

    let result = client.task_result(&created.task.task_id).await.unwrap();
    assert_eq!(content_text(&result.content), "over http");

    let listing = client.list_tasks(None).await.unwrap();
    assert_eq!(listing.tasks.len(), 1);
}
