//! MCP client: drives a server over any [`Transport`] and services the
//! server's reverse requests (sampling, elicitation, roots, ping).

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::shared::protocol::Protocol;
use crate::shared::{Transport, TransportMessage};
use crate::types::protocol::{methods, notifications};
use crate::types::{
    CallToolResult, ClientCapabilities, CompleteParams, CompleteResult, Content,
    CreateMessageParams, CreateMessageResult, CreateTaskResult, ElicitParams, ElicitResult,
    ElicitationCapability, GetPromptResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListRootsResult, ListTasksResult,
    ListToolsResult, LoggingLevel, ReadResourceResult, Root, RootsCapability,
    SamplingCapability, Task, TaskParams,
};

/// Services server→client `sampling/createMessage` requests.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    /// Run the sampling request against the host's model.
    async fn create_message(&self, params: CreateMessageParams) -> Result<CreateMessageResult>;
}

/// Services server→client `elicitation/create` requests.
#[async_trait]
pub trait ElicitationHandler: Send + Sync {
    /// Collect the requested input from the user.
    async fn elicit(&self, params: ElicitParams) -> Result<ElicitResult>;
}

struct ClientState {
    sampling: RwLock<Option<Arc<dyn SamplingHandler>>>,
    elicitation: RwLock<Option<Arc<dyn ElicitationHandler>>>,
    roots: RwLock<Vec<Root>>,
}

impl ClientState {
    async fn handle_server_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        let outcome: Result<Value> = match request.method.as_str() {
            methods::PING => Ok(json!({})),
            methods::SAMPLING_CREATE_MESSAGE => {
                // Clone the handler out so no lock guard lives across awaits.
                let handler = self.sampling.read().clone();
                match handler {
                    Some(handler) => async {
                        let params: CreateMessageParams = request.params_as()?;
                        let result = handler.create_message(params).await?;
                        serde_json::to_value(result).map_err(|e| Error::internal(e.to_string()))
                    }
                    .await,
                    None => Err(Error::method_not_found("no sampling handler registered")),
                }
            },
            methods::ELICITATION_CREATE => {
                let handler = self.elicitation.read().clone();
                match handler {
                    Some(handler) => async {
                        let params: ElicitParams = request.params_as()?;
                        params.validate()?;
                        let result = handler.elicit(params).await?;
                        serde_json::to_value(result).map_err(|e| Error::internal(e.to_string()))
                    }
                    .await,
                    None => Err(Error::method_not_found("no elicitation handler registered")),
                }
            },
            methods::ROOTS_LIST => {
                let roots = self.roots.read().clone();
                serde_json::to_value(ListRootsResult { roots })
                    .map_err(|e| Error::internal(e.to_string()))
            },
            other => Err(Error::method_not_found(other.to_string())),
        };

        match outcome {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::error(id, error.to_jsonrpc()),
        }
    }
}

/// An MCP client bound to one transport.
pub struct Client<T: Transport + 'static> {
    transport: Arc<T>,
    protocol: Arc<Protocol>,
    info: Implementation,
    state: Arc<ClientState>,
    server: RwLock<Option<InitializeResult>>,
    initialized: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
    request_timeout: RwLock<Option<Duration>>,
}

impl<T: Transport + 'static> Client<T> {
    /// Create a client over `transport`.
    pub fn new(transport: T) -> Self {
        Self::with_info(
            transport,
            Implementation::new("mcpio-client", env!("CARGO_PKG_VERSION")),
        )
    }

    /// Create a client reporting a specific identity.
    pub fn with_info(transport: T, info: Implementation) -> Self {
        Self {
            transport: Arc::new(transport),
            protocol: Arc::new(Protocol::new()),
            info,
            state: Arc::new(ClientState {
                sampling: RwLock::new(None),
                elicitation: RwLock::new(None),
                roots: RwLock::new(Vec::new()),
            }),
            server: RwLock::new(None),
            initialized: AtomicBool::new(false),
            reader: Mutex::new(None),
            request_timeout: RwLock::new(None),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Fail requests that take longer than `timeout`.
    pub fn set_request_timeout(&self, timeout: Option<Duration>) {
        *self.request_timeout.write() = timeout;
    }

    /// Install the sampling handler (advertised at initialize).
    pub fn set_sampling_handler(&self, handler: Arc<dyn SamplingHandler>) {
        *self.state.sampling.write() = Some(handler);
    }

    /// Install the elicitation handler (advertised at initialize).
    pub fn set_elicitation_handler(&self, handler: Arc<dyn ElicitationHandler>) {
        *self.state.elicitation.write() = Some(handler);
    }

    /// Replace the roots served to `roots/list`; emits
    /// `notifications/roots/list_changed` once initialized.
    pub async fn set_roots(&self, roots: Vec<Root>) -> Result<()> {
        *self.state.roots.write() = roots;
        if self.initialized.load(Ordering::Acquire) {
            self.notification(notifications::ROOTS_LIST_CHANGED, None)
                .await?;
        }
        Ok(())
    }

    /// Subscribe to inbound notifications.
    pub fn on_notification(&self, handler: impl Fn(JsonRpcNotification) + Send + Sync + 'static) {
        self.protocol.subscribe_notifications(Arc::new(handler));
    }

    /// The server's initialize result, once initialized.
    pub fn server_info(&self) -> Option<InitializeResult> {
        self.server.read().clone()
    }

    fn ensure_reader(&self) {
        let mut guard = self.reader.lock();
        if guard.is_some() {
            return;
        }
        let transport = self.transport.clone();
        let protocol = self.protocol.clone();
        let state = self.state.clone();
        *guard = Some(tokio::spawn(async move {
            loop {
                match transport.receive().await {
                    Ok(TransportMessage::Response(response)) => {
                        protocol.complete(response);
                    },
                    Ok(TransportMessage::Notification(notification)) => {
                        protocol.dispatch_notification(&notification);
                    },
                    Ok(TransportMessage::Request(request)) => {
                        // Reverse request; answer on a separate task so a
                        // slow handler does not stall the reader.
                        let transport = transport.clone();
                        let state = state.clone();
                        tokio::spawn(async move {
                            let response = state.handle_server_request(request).await;
                            if let Err(error) = transport
                                .send(TransportMessage::Response(response))
                                .await
                            {
                                tracing::debug!(
                                    target: "mcpio::client",
                                    %error,
                                    "failed to answer reverse request"
                                );
                            }
                        });
                    },
                    Err(Error::Parse(message)) => {
                        tracing::warn!(
                            target: "mcpio::client",
                            %message,
                            "discarding bad frame"
                        );
                    },
                    Err(_) => {
                        protocol.close();
                        break;
                    },
                }
            }
        }));
    }

    /// Send a raw request and await its result value.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.ensure_reader();
        let id = self.protocol.next_request_id();
        let rx = self.protocol.register(id.clone())?;
        let frame = TransportMessage::Request(JsonRpcRequest::new(id.clone(), method, params));
        if let Err(error) = self.transport.send(frame).await {
            self.protocol.cancel(&id);
            return Err(error);
        }
        let timeout = *self.request_timeout.read();
        let response = self.protocol.wait(id, rx, timeout).await?;
        response.into_result()
    }

    /// Send a raw notification.
    pub async fn notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.transport
            .send(TransportMessage::Notification(JsonRpcNotification::new(
                method, params,
            )))
            .await
    }

    /// Run the initialization handshake.
    ///
    /// Capability flags for registered handlers are filled in automatically;
    /// after a successful exchange the `notifications/initialized`
    /// notification is sent and the negotiated version recorded on the
    /// transport.
    pub async fn initialize(
        &self,
        capabilities: ClientCapabilities,
    ) -> Result<InitializeResult> {
        let mut capabilities = capabilities;
        if capabilities.sampling.is_none() && self.state.sampling.read().is_some() {
            capabilities.sampling = Some(SamplingCapability::default());
        }
        if capabilities.elicitation.is_none() && self.state.elicitation.read().is_some() {
            capabilities.elicitation = Some(ElicitationCapability::default());
        }
        if capabilities.roots.is_none() && !self.state.roots.read().is_empty() {
            capabilities.roots = Some(RootsCapability { list_changed: true });
        }

        let params = InitializeParams {
            protocol_version: crate::LATEST_PROTOCOL_VERSION.to_string(),
            capabilities,
            client_info: self.info.clone(),
        };
        let value = self
            .request(methods::INITIALIZE, Some(serde_json::to_value(params)?))
            .await?;
        let result: InitializeResult = serde_json::from_value(value)?;

        if !crate::is_supported_protocol_version(&result.protocol_version) {
            return Err(Error::invalid_request(format!(
                "server negotiated unsupported protocol version: {}",
                result.protocol_version
            )));
        }

        self.transport.set_protocol_version(&result.protocol_version);
        self.notification(notifications::INITIALIZED, None).await?;
        *self.server.write() = Some(result.clone());
        self.initialized.store(true, Ordering::Release);
        Ok(result)
    }

    /// Open the transport's continuous-listening channel, if it has one.
    pub async fn start_listening(&self) -> Result<()> {
        self.ensure_reader();
        self.transport.start_listening().await
    }

    /// Liveness probe.
    pub async fn ping(&self) -> Result<()> {
        self.request(methods::PING, None).await?;
        Ok(())
    }

    /// List tools.
    pub async fn list_tools(&self, cursor: Option<String>) -> Result<ListToolsResult> {
        let value = self
            .request(methods::TOOLS_LIST, Some(json!({ "cursor": cursor })))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Call a tool synchronously.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let value = self
            .request(
                methods::TOOLS_CALL,
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Call a tool with task augmentation; returns the created task.
    pub async fn call_tool_task(
        &self,
        name: &str,
        arguments: Value,
        task: TaskParams,
    ) -> Result<CreateTaskResult> {
        let value = self
            .request(
                methods::TOOLS_CALL,
                Some(json!({
                    "name": name,
                    "arguments": arguments,
                    "task": task,
                })),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Poll a task's status.
    pub async fn get_task(&self, task_id: &str) -> Result<Task> {
        let value = self
            .request(methods::TASKS_GET, Some(json!({ "taskId": task_id })))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Block until a task is terminal and fetch its result.
    pub async fn task_result(&self, task_id: &str) -> Result<CallToolResult> {
        let value = self
            .request(methods::TASKS_RESULT, Some(json!({ "taskId": task_id })))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// List this session's tasks.
    pub async fn list_tasks(&self, cursor: Option<String>) -> Result<ListTasksResult> {
        let value = self
            .request(methods::TASKS_LIST, Some(json!({ "cursor": cursor })))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Request cancellation of a task.
    pub async fn cancel_task(&self, task_id: &str) -> Result<Task> {
        let value = self
            .request(methods::TASKS_CANCEL, Some(json!({ "taskId": task_id })))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// List resources.
    pub async fn list_resources(&self, cursor: Option<String>) -> Result<ListResourcesResult> {
        let value = self
            .request(methods::RESOURCES_LIST, Some(json!({ "cursor": cursor })))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// List resource templates.
    pub async fn list_resource_templates(
        &self,
        cursor: Option<String>,
    ) -> Result<ListResourceTemplatesResult> {
        let value = self
            .request(
                methods::RESOURCES_TEMPLATES_LIST,
                Some(json!({ "cursor": cursor })),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Read a resource by URI.
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        let value = self
            .request(methods::RESOURCES_READ, Some(json!({ "uri": uri })))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Subscribe to updates for a resource URI.
    pub async fn subscribe_resource(&self, uri: &str) -> Result<()> {
        self.request(methods::RESOURCES_SUBSCRIBE, Some(json!({ "uri": uri })))
            .await?;
        Ok(())
    }

    /// Drop a resource subscription.
    pub async fn unsubscribe_resource(&self, uri: &str) -> Result<()> {
        self.request(methods::RESOURCES_UNSUBSCRIBE, Some(json!({ "uri": uri })))
            .await?;
        Ok(())
    }

    /// List prompts.
    pub async fn list_prompts(&self, cursor: Option<String>) -> Result<ListPromptsResult> {
        let value = self
            .request(methods::PROMPTS_LIST, Some(json!({ "cursor": cursor })))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Expand a prompt.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: std::collections::HashMap<String, String>,
    ) -> Result<GetPromptResult> {
        let value = self
            .request(
                methods::PROMPTS_GET,
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Ask the server for argument completions.
    pub async fn complete(&self, params: CompleteParams) -> Result<CompleteResult> {
        let value = self
            .request(
                methods::COMPLETION_COMPLETE,
                Some(serde_json::to_value(params)?),
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Set the minimum log level the server forwards to this session.
    pub async fn set_logging_level(&self, level: LoggingLevel) -> Result<()> {
        self.request(methods::LOGGING_SET_LEVEL, Some(json!({ "level": level })))
            .await?;
        Ok(())
    }

    /// Close the connection; in-flight requests fail.
    pub async fn close(&self) -> Result<()> {
        self.protocol.close();
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.transport.close().await
    }
}

impl<T: Transport + 'static> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("info", &self.info)
            .field("initialized", &self.initialized.load(Ordering::Acquire))
            .field("transport", &self.transport.transport_type())
            .finish()
    }
}

/// Convenience text extraction from a tool/prompt content list.
pub fn content_text(content: &[Content]) -> String {
    content
        .iter()
        .filter_map(|item| match item {
            Content::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::InProcessTransport;
    use crate::types::RequestId;

    /// A fake peer loop that answers ping and echoes reverse pings.
    async fn fake_peer(transport: InProcessTransport) {
        loop {
            match transport.receive().await {
                Ok(TransportMessage::Request(request)) => {
                    let response = match request.method.as_str() {
                        "ping" => JsonRpcResponse::success(request.id, json!({})),
                        other => JsonRpcResponse::error(
                            request.id,
                            Error::method_not_found(other.to_string()).to_jsonrpc(),
                        ),
                    };
                    if transport
                        .send(TransportMessage::Response(response))
                        .await
                        .is_err()
                    {
                        break;
                    }
                },
                Ok(_) => {},
                Err(_) => break,
            }
        }
    }

    #[tokio::test]
    async fn ping_round_trip() {
        let (client_end, server_end) = InProcessTransport::pair();
        tokio::spawn(fake_peer(server_end));
        let client = Client::new(client_end);
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn client_answers_reverse_ping() {
        let (client_end, server_end) = InProcessTransport::pair();
        let client = Client::new(client_end);
        client.ensure_reader();

        server_end
            .send(TransportMessage::Request(JsonRpcRequest::new(
                RequestId::Number(900),
                methods::PING,
                None,
            )))
            .await
            .unwrap();

        let reply = server_end.receive().await.unwrap();
        let TransportMessage::Response(response) = reply else {
            panic!("expected response");
        };
        assert_eq!(response.id, RequestId::Number(900));
        assert_eq!(response.result(), Some(&json!({})));
    }

    #[tokio::test]
    async fn unknown_reverse_method_is_rejected() {
        let (client_end, server_end) = InProcessTransport::pair();
        let client = Client::new(client_end);
        client.ensure_reader();

        server_end
            .send(TransportMessage::Request(JsonRpcRequest::new(
                RequestId::Number(901),
                "mystery/method",
                None,
            )))
            .await
            .unwrap();

        let TransportMessage::Response(response) = server_end.receive().await.unwrap() else {
            panic!("expected response");
        };
        assert_eq!(
            response.error_payload().unwrap().code,
            crate::error::codes::METHOD_NOT_FOUND
        );
    }

    #[tokio::test]
    async fn timeout_applies_to_requests() {
        let (client_end, _server_end) = InProcessTransport::pair();
        let client = Client::new(client_end);
        client.set_request_timeout(Some(Duration::from_millis(30)));
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[test]
    fn content_text_joins_text_items() {
        let content = vec![
            Content::Text { text: "a".into() },
            Content::Image {
                data: "zz".into(),
                mime_type: "image/png".into(),
            },
            Content::Text { text: "b".into() },
        ];
        assert_eq!(content_text(&content), "a\nb");
    }
}
