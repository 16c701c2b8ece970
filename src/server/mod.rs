//! MCP server: registries, sessions, task engine and request routing.

pub mod http;
pub mod middleware;
pub mod registry;
pub mod sessions;
pub mod tasks;

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::error::{codes, Error, Result};
use crate::shared::{Transport, TransportMessage};
use crate::types::protocol::{methods, notifications};
use crate::types::{
    CallToolParams, CallToolResult, CancelledParams, CompleteParams, CompleteResult,
    CompletionReference, CompletionsCapability, CreateTaskResult, GetPromptParams,
    Implementation, InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ListParams, LogMessageParams, LoggingCapability, PromptInfo,
    PromptsCapability, ReadResourceParams, ResourceInfo, ResourceTemplateInfo,
    ResourceUpdatedParams, ResourcesCapability, ServerCapabilities, SetLevelParams,
    SubscribeParams, TaskIdParams, TaskSupport, TasksCapability, ToolInfo, ToolsCapability,
    MODEL_IMMEDIATE_RESPONSE_META_KEY,
};

pub use middleware::{ServerHook, ToolMiddleware, ToolMiddlewareChain};
pub use registry::{
    prompt_fn, resource_fn, tool_fn, CompletionFn, PromptHandler, PromptRegistry,
    ResourceHandler, ResourceRegistry, ServerTool, ToolHandler, ToolKind, ToolListFilter,
    ToolRegistry,
};
pub use sessions::{RequestContext, Session, SessionId, SessionRegistry};
pub use tasks::{TaskEngine, TaskEngineConfig, TaskEntry};

struct ServerInner {
    info: Implementation,
    instructions: Option<String>,
    capabilities: ServerCapabilities,
    tools: ToolRegistry,
    resources: ResourceRegistry,
    prompts: PromptRegistry,
    sessions: Arc<SessionRegistry>,
    tasks: TaskEngine,
    middleware: ToolMiddlewareChain,
    hooks: Vec<Arc<dyn ServerHook>>,
    page_size: usize,
}

/// An MCP server; cheap to clone, every clone shares state.
#[derive(Clone)]
pub struct McpServer {
    inner: Arc<ServerInner>,
}

impl McpServer {
    /// Start building a server.
    pub fn builder() -> McpServerBuilder {
        McpServerBuilder::new()
    }

    /// Server identity.
    pub fn info(&self) -> &Implementation {
        &self.inner.info
    }

    /// Declared capabilities.
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.inner.capabilities
    }

    /// The live sessions.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.inner.sessions
    }

    /// The task engine.
    pub fn tasks(&self) -> &TaskEngine {
        &self.inner.tasks
    }

    /// Create and register a session, optionally with a transport-assigned id.
    pub async fn register_session(&self, id: Option<String>) -> Result<Arc<Session>> {
        let id = id.map_or_else(SessionId::generate, SessionId::from_string);
        let session = Session::new(id);
        self.inner.sessions.register(session.clone())?;
        for hook in &self.inner.hooks {
            hook.on_session_registered(session.id()).await;
        }
        Ok(session)
    }

    /// Close and drop a session.
    pub async fn unregister_session(&self, id: &SessionId) {
        if self.inner.sessions.unregister(id).is_some() {
            for hook in &self.inner.hooks {
                hook.on_session_unregistered(id).await;
            }
        }
    }

    /// Register a tool at runtime, emitting `tools/list_changed` if declared.
    pub fn add_tool(&self, tool: ServerTool) {
        self.inner.tools.insert(tool);
        self.notify_tools_changed();
    }

    /// Remove a tool at runtime.
    pub fn remove_tool(&self, name: &str) {
        if self.inner.tools.remove(name) {
            self.notify_tools_changed();
        }
    }

    /// Register a resource at runtime.
    pub fn add_resource(&self, info: ResourceInfo, handler: Arc<dyn ResourceHandler>) {
        self.inner.resources.add_resource(info, handler);
        if self.inner.capabilities.resources_list_changed() {
            self.inner
                .sessions
                .broadcast(notifications::RESOURCES_LIST_CHANGED, None);
        }
    }

    /// Register a prompt at runtime.
    pub fn add_prompt(&self, info: PromptInfo, handler: Arc<dyn PromptHandler>) {
        self.inner.prompts.insert(info, handler);
        if self.inner.capabilities.prompts_list_changed() {
            self.inner
                .sessions
                .broadcast(notifications::PROMPTS_LIST_CHANGED, None);
        }
    }

    fn notify_tools_changed(&self) {
        if self.inner.capabilities.tools_list_changed() {
            self.inner
                .sessions
                .broadcast(notifications::TOOLS_LIST_CHANGED, None);
        }
    }

    /// Forward a log message to every session that wants this level.
    pub fn log_message(&self, params: LogMessageParams) {
        let value = match serde_json::to_value(&params) {
            Ok(value) => value,
            Err(_) => return,
        };
        self.inner.sessions.broadcast_filtered(
            notifications::MESSAGE,
            Some(value),
            |session| params.level >= session.log_level(),
        );
    }

    /// Tell subscribed sessions that a resource changed.
    pub fn resource_updated(&self, uri: &str) {
        let params = match serde_json::to_value(ResourceUpdatedParams { uri: uri.to_string() }) {
            Ok(value) => value,
            Err(_) => return,
        };
        self.inner.sessions.broadcast_filtered(
            notifications::RESOURCES_UPDATED,
            Some(params),
            |session| session.is_subscribed(uri),
        );
    }

    /// Route one inbound frame for a session.
    ///
    /// Requests produce a response; responses complete the session's reverse
    /// calls; notifications drive lifecycle state. This is the single entry
    /// point every transport funnels into.
    pub async fn handle_message(
        &self,
        session: &Arc<Session>,
        message: TransportMessage,
    ) -> Option<JsonRpcResponse> {
        match message {
            TransportMessage::Request(request) => {
                Some(self.handle_request(session, request).await)
            },
            TransportMessage::Response(response) => {
                session.protocol().complete(response);
                None
            },
            TransportMessage::Notification(notification) => {
                self.handle_notification(session, notification).await;
                None
            },
        }
    }

    async fn handle_request(
        &self,
        session: &Arc<Session>,
        request: JsonRpcRequest,
    ) -> JsonRpcResponse {
        let method = request.method.clone();
        for hook in &self.inner.hooks {
            hook.before_request(&method, session.id()).await;
        }

        let result = self.dispatch(session, &request).await;
        let ok = result.is_ok();
        let response = match result {
            Ok(value) => JsonRpcResponse::success(request.id, value),
            Err(error) => {
                for hook in &self.inner.hooks {
                    hook.on_error(&method, session.id(), &error).await;
                }
                JsonRpcResponse::error(request.id, error.to_jsonrpc())
            },
        };

        for hook in &self.inner.hooks {
            hook.after_request(&method, session.id(), ok).await;
        }
        response
    }

    async fn handle_notification(
        &self,
        session: &Arc<Session>,
        notification: JsonRpcNotification,
    ) {
        match notification.method.as_str() {
            notifications::INITIALIZED => {
                session.mark_initialized();
            },
            notifications::CANCELLED => {
                if let Ok(params) = notification.params_as::<CancelledParams>() {
                    tracing::debug!(
                        target: "mcpio::session",
                        session = %session.id(),
                        request_id = %params.request_id,
                        reason = ?params.reason,
                        "peer cancelled a request"
                    );
                }
            },
            notifications::ROOTS_LIST_CHANGED => {
                tracing::debug!(
                    target: "mcpio::session",
                    session = %session.id(),
                    "client roots changed"
                );
            },
            other => {
                tracing::debug!(
                    target: "mcpio::session",
                    method = other,
                    "ignoring notification"
                );
            },
        }
    }

    fn context(&self, session: &Arc<Session>, request: &JsonRpcRequest) -> RequestContext {
        RequestContext::new(request.id.to_string(), Some(session.clone()))
    }

    async fn dispatch(&self, session: &Arc<Session>, request: &JsonRpcRequest) -> Result<Value> {
        let method = request.method.as_str();

        if method == methods::INITIALIZE {
            return self.handle_initialize(session, request);
        }
        if !session.is_initialized() {
            return Err(Error::NotInitialized);
        }

        match method {
            methods::PING => Ok(json!({})),

            methods::TOOLS_LIST => {
                let params: ListParams = request.params_as()?;
                let cx = self.context(session, request);
                let listing =
                    self.inner
                        .tools
                        .list(params.cursor.as_deref(), self.inner.page_size, &cx)?;
                ok_value(&listing)
            },
            methods::TOOLS_CALL => self.handle_call_tool(session, request).await,

            methods::RESOURCES_LIST => {
                let params: ListParams = request.params_as()?;
                let listing = self
                    .inner
                    .resources
                    .list(params.cursor.as_deref(), self.inner.page_size)?;
                ok_value(&listing)
            },
            methods::RESOURCES_TEMPLATES_LIST => {
                let params: ListParams = request.params_as()?;
                let listing = self
                    .inner
                    .resources
                    .list_templates(params.cursor.as_deref(), self.inner.page_size)?;
                ok_value(&listing)
            },
            methods::RESOURCES_READ => {
                let params: ReadResourceParams = request.params_as()?;
                let cx = self.context(session, request);
                let result = self.inner.resources.read(&params.uri, cx).await?;
                ok_value(&result)
            },
            methods::RESOURCES_SUBSCRIBE => {
                let params: SubscribeParams = request.params_as()?;
                session.subscribe(params.uri);
                Ok(json!({}))
            },
            methods::RESOURCES_UNSUBSCRIBE => {
                let params: SubscribeParams = request.params_as()?;
                session.unsubscribe(&params.uri);
                Ok(json!({}))
            },

            methods::PROMPTS_LIST => {
                let params: ListParams = request.params_as()?;
                let listing = self
                    .inner
                    .prompts
                    .list(params.cursor.as_deref(), self.inner.page_size)?;
                ok_value(&listing)
            },
            methods::PROMPTS_GET => {
                let params: GetPromptParams = request.params_as()?;
                let cx = self.context(session, request);
                let result = self
                    .inner
                    .prompts
                    .render(&params.name, params.arguments, cx)
                    .await?;
                ok_value(&result)
            },

            methods::COMPLETION_COMPLETE => {
                let params: CompleteParams = request.params_as()?;
                let completion = match &params.r#ref {
                    CompletionReference::Prompt { name } => self.inner.prompts.complete(
                        name,
                        &params.argument.name,
                        &params.argument.value,
                    ),
                    CompletionReference::Resource { uri } => self.inner.resources.complete(
                        uri,
                        &params.argument.name,
                        &params.argument.value,
                    ),
                };
                ok_value(&CompleteResult { completion })
            },

            methods::LOGGING_SET_LEVEL => {
                let params: SetLevelParams = request.params_as()?;
                session.set_log_level(params.level);
                Ok(json!({}))
            },

            methods::TASKS_GET => {
                let params: TaskIdParams = request.params_as()?;
                ok_value(&self.inner.tasks.get(&params.task_id)?)
            },
            methods::TASKS_RESULT => {
                let params: TaskIdParams = request.params_as()?;
                ok_value(&self.inner.tasks.wait_result(&params.task_id).await?)
            },
            methods::TASKS_LIST => {
                let params: ListParams = request.params_as()?;
                ok_value(&self.inner.tasks.list(session.id(), params.cursor.as_deref())?)
            },
            methods::TASKS_CANCEL => {
                let params: TaskIdParams = request.params_as()?;
                ok_value(&self.inner.tasks.cancel(&params.task_id)?)
            },

            other => Err(Error::method_not_found(other.to_string())),
        }
    }

    fn handle_initialize(
        &self,
        session: &Arc<Session>,
        request: &JsonRpcRequest,
    ) -> Result<Value> {
        let params: InitializeParams = request.params_as()?;

        if !crate::is_supported_protocol_version(&params.protocol_version) {
            return Err(Error::Peer {
                code: codes::INVALID_PARAMS,
                message: format!(
                    "unsupported protocol version: {}",
                    params.protocol_version
                ),
                data: Some(json!({ "supported": crate::SUPPORTED_PROTOCOL_VERSIONS })),
            });
        }
        if !session.mark_init_received() {
            return Err(Error::invalid_request(
                "session already initialized",
            ));
        }

        session.set_client(params.client_info, params.capabilities);
        session.set_protocol_version(&params.protocol_version);
        tracing::debug!(
            target: "mcpio::session",
            session = %session.id(),
            version = %params.protocol_version,
            "session initialize handled"
        );

        ok_value(&InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: self.inner.capabilities.clone(),
            server_info: self.inner.info.clone(),
            instructions: self.inner.instructions.clone(),
        })
    }

    async fn handle_call_tool(
        &self,
        session: &Arc<Session>,
        request: &JsonRpcRequest,
    ) -> Result<Value> {
        let params: CallToolParams = request.params_as()?;
        let tool = self
            .inner
            .tools
            .resolve(&params.name, Some(session))
            .ok_or_else(|| Error::invalid_params(format!("unknown tool: {}", params.name)))?;

        let support = tool.info.task_support();
        if params.task.is_none() && support == TaskSupport::Required {
            return Err(Error::method_not_found(format!(
                "tool '{}' requires task augmentation",
                params.name
            )));
        }
        if params.task.is_some() && support == TaskSupport::Forbidden {
            return Err(Error::invalid_params(format!(
                "tool '{}' does not accept task augmentation",
                params.name
            )));
        }

        if let Some(task_params) = &params.task {
            return self.call_tool_as_task(session, &tool, &params, task_params);
        }

        let cx = RequestContext::new(request.id.to_string(), Some(session.clone()))
            .with_meta(params.meta.clone());
        let chain = &self.inner.middleware;
        let mut args = params.arguments.clone();
        chain.before_call(&params.name, &mut args, &cx).await?;

        match tool.kind.handler().call(args, cx.clone()).await {
            Ok(mut result) => {
                chain.after_call(&params.name, &mut result, &cx).await;
                ok_value(&result)
            },
            // A tool raising is a domain failure, not a protocol failure:
            // successful JSON-RPC response with isError set.
            Err(error) => {
                chain.on_error(&params.name, &error, &cx).await;
                ok_value(&CallToolResult::error_text(error.to_string()))
            },
        }
    }

    fn call_tool_as_task(
        &self,
        session: &Arc<Session>,
        tool: &ServerTool,
        params: &CallToolParams,
        task_params: &crate::types::TaskParams,
    ) -> Result<Value> {
        let entry = self.inner.tasks.create(session.id().clone(), task_params)?;
        let snapshot = entry.snapshot();

        let cx = RequestContext::new(
            format!("task:{}", snapshot.task_id),
            Some(session.clone()),
        )
        .with_cancellation(entry.cancellation())
        .with_meta(params.meta.clone());

        let handler = tool.kind.handler().clone();
        let chain = self.inner.middleware.clone();
        let name = params.name.clone();
        let mut args = params.arguments.clone();
        self.inner.tasks.spawn_execute(entry, async move {
            chain.before_call(&name, &mut args, &cx).await?;
            let mut result = handler.call(args, cx.clone()).await.inspect_err(|error| {
                tracing::debug!(target: "mcpio::tasks", tool = %name, %error, "task tool failed");
            })?;
            chain.after_call(&name, &mut result, &cx).await;
            Ok(result)
        });

        let meta = tool.info.meta.as_ref().and_then(|tool_meta| {
            tool_meta.get(MODEL_IMMEDIATE_RESPONSE_META_KEY).map(|hint| {
                let mut meta = Map::new();
                meta.insert(MODEL_IMMEDIATE_RESPONSE_META_KEY.to_string(), hint.clone());
                meta
            })
        });

        ok_value(&CreateTaskResult {
            task: snapshot,
            meta,
        })
    }

    /// Serve one connection: register a session, pump its outbound queue to
    /// the transport, and route inbound frames until the peer goes away.
    ///
    /// Requests are handled on their own tokio tasks so a blocking call
    /// (`tasks/result`) does not starve the connection.
    pub async fn serve<T: Transport + 'static>(&self, transport: T) -> Result<()> {
        let transport = Arc::new(transport);
        let session = self.register_session(transport.session_id()).await?;

        let mut outbound = session
            .take_outbound()
            .ok_or_else(|| Error::internal("session outbound queue already taken"))?;
        let writer_transport = transport.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound.recv().await {
                if let Err(error) = writer_transport.send(frame).await {
                    tracing::debug!(target: "mcpio::session", %error, "outbound pump stopped");
                    break;
                }
            }
        });

        loop {
            match transport.receive().await {
                Ok(TransportMessage::Request(request)) => {
                    let server = self.clone();
                    let session = session.clone();
                    let transport = transport.clone();
                    tokio::spawn(async move {
                        let response = server.handle_request(&session, request).await;
                        if let Err(error) =
                            transport.send(TransportMessage::Response(response)).await
                        {
                            tracing::debug!(
                                target: "mcpio::session",
                                %error,
                                "failed to deliver response"
                            );
                        }
                    });
                },
                Ok(message) => {
                    self.handle_message(&session, message).await;
                },
                Err(Error::Parse(message)) => {
                    tracing::warn!(target: "mcpio::session", %message, "discarding bad frame");
                },
                Err(_) => break,
            }
        }

        writer.abort();
        self.unregister_session(&session.id().clone()).await;
        Ok(())
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("info", &self.inner.info)
            .field("sessions", &self.inner.sessions.len())
            .finish()
    }
}

fn ok_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::internal(e.to_string()))
}

/// Builder for [`McpServer`].
pub struct McpServerBuilder {
    name: String,
    version: String,
    instructions: Option<String>,
    tools: Vec<ServerTool>,
    tool_filter: Option<ToolListFilter>,
    resources: Vec<(ResourceInfo, Arc<dyn ResourceHandler>)>,
    templates: Vec<(
        ResourceTemplateInfo,
        Arc<dyn ResourceHandler>,
        HashMap<String, CompletionFn>,
    )>,
    prompts: Vec<(PromptInfo, Arc<dyn PromptHandler>, HashMap<String, CompletionFn>)>,
    middleware: ToolMiddlewareChain,
    hooks: Vec<Arc<dyn ServerHook>>,
    task_config: TaskEngineConfig,
    page_size: usize,
    capabilities: Option<ServerCapabilities>,
}

impl Default for McpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl McpServerBuilder {
    /// A builder with nothing registered.
    pub fn new() -> Self {
        Self {
            name: "mcpio-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            instructions: None,
            tools: Vec::new(),
            tool_filter: None,
            resources: Vec::new(),
            templates: Vec::new(),
            prompts: Vec::new(),
            middleware: ToolMiddlewareChain::new(),
            hooks: Vec::new(),
            task_config: TaskEngineConfig::default(),
            page_size: 50,
            capabilities: None,
        }
    }

    /// Server name reported during initialization.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Server version reported during initialization.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Usage instructions included in the initialize result.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Register a synchronous tool from an async closure.
    pub fn tool<F, Fut>(mut self, name: impl Into<String>, input_schema: Value, f: F) -> Self
    where
        F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallToolResult>> + Send + 'static,
    {
        self.tools
            .push(ServerTool::sync(ToolInfo::new(name, input_schema), tool_fn(f)));
        self
    }

    /// Register a task-capable tool from an async closure; `info` declares
    /// its task-support mode.
    pub fn task_tool<F, Fut>(mut self, info: ToolInfo, f: F) -> Self
    where
        F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CallToolResult>> + Send + 'static,
    {
        self.tools.push(ServerTool::task(info, tool_fn(f)));
        self
    }

    /// Register a fully described tool.
    pub fn add_tool(mut self, tool: ServerTool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Install the `tools/list` filter hook.
    pub fn tool_filter(mut self, filter: ToolListFilter) -> Self {
        self.tool_filter = Some(filter);
        self
    }

    /// Register a concrete resource.
    pub fn resource(mut self, info: ResourceInfo, handler: Arc<dyn ResourceHandler>) -> Self {
        self.resources.push((info, handler));
        self
    }

    /// Register a templated resource.
    pub fn resource_template(
        mut self,
        info: ResourceTemplateInfo,
        handler: Arc<dyn ResourceHandler>,
    ) -> Self {
        self.templates.push((info, handler, HashMap::new()));
        self
    }

    /// Register a templated resource with placeholder completions.
    pub fn resource_template_with_completions(
        mut self,
        info: ResourceTemplateInfo,
        handler: Arc<dyn ResourceHandler>,
        completions: HashMap<String, CompletionFn>,
    ) -> Self {
        self.templates.push((info, handler, completions));
        self
    }

    /// Register a prompt.
    pub fn prompt(mut self, info: PromptInfo, handler: Arc<dyn PromptHandler>) -> Self {
        self.prompts.push((info, handler, HashMap::new()));
        self
    }

    /// Register a prompt with argument completions.
    pub fn prompt_with_completions(
        mut self,
        info: PromptInfo,
        handler: Arc<dyn PromptHandler>,
        completions: HashMap<String, CompletionFn>,
    ) -> Self {
        self.prompts.push((info, handler, completions));
        self
    }

    /// Append a tool middleware layer.
    pub fn middleware(mut self, layer: Arc<dyn ToolMiddleware>) -> Self {
        self.middleware.push(layer);
        self
    }

    /// Append a lifecycle hook.
    pub fn hook(mut self, hook: Arc<dyn ServerHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Configure the task engine.
    pub fn task_config(mut self, config: TaskEngineConfig) -> Self {
        self.task_config = config;
        self
    }

    /// Page size for list endpoints.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Override the advertised capabilities (normally derived from what is
    /// registered).
    pub fn capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    fn derive_capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            tools: (!self.tools.is_empty()).then(|| ToolsCapability {
                list_changed: Some(true),
            }),
            resources: (!self.resources.is_empty() || !self.templates.is_empty()).then(|| {
                ResourcesCapability {
                    subscribe: Some(true),
                    list_changed: Some(true),
                }
            }),
            prompts: (!self.prompts.is_empty()).then(|| PromptsCapability {
                list_changed: Some(true),
            }),
            logging: Some(LoggingCapability::default()),
            completions: Some(CompletionsCapability::default()),
            tasks: Some(TasksCapability::all()),
            experimental: None,
        }
    }

    /// Assemble the server.
    pub fn build(self) -> McpServer {
        let capabilities = self
            .capabilities
            .clone()
            .unwrap_or_else(|| self.derive_capabilities());

        let sessions = Arc::new(SessionRegistry::new());
        let tools = ToolRegistry::new();
        for tool in self.tools {
            tools.insert(tool);
        }
        if let Some(filter) = self.tool_filter {
            tools.set_filter(filter);
        }

        let resources = ResourceRegistry::new();
        for (info, handler) in self.resources {
            resources.add_resource(info, handler);
        }
        for (info, handler, completions) in self.templates {
            if let Err(error) =
                resources.add_template_with_completions(info.clone(), handler, completions)
            {
                tracing::warn!(
                    target: "mcpio::server",
                    template = %info.uri_template,
                    %error,
                    "skipping unparseable resource template"
                );
            }
        }

        let prompts = PromptRegistry::new();
        for (info, handler, completions) in self.prompts {
            prompts.insert_with_completions(info, handler, completions);
        }

        let tasks = TaskEngine::new(self.task_config, sessions.clone());

        McpServer {
            inner: Arc::new(ServerInner {
                info: Implementation::new(self.name, self.version),
                instructions: self.instructions,
                capabilities,
                tools,
                resources,
                prompts,
                sessions,
                tasks,
                middleware: self.middleware,
                hooks: self.hooks,
                page_size: self.page_size,
            }),
        }
    }
}

impl std::fmt::Debug for McpServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServerBuilder")
            .field("name", &self.name)
            .field("tools", &self.tools.len())
            .field("prompts", &self.prompts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClientCapabilities, RequestId};
    use serde_json::json;

    fn test_server() -> McpServer {
        McpServer::builder()
            .name("test-server")
            .version("1.0.0")
            .tool("echo", json!({"type": "object"}), |args, _cx| async move {
                Ok(CallToolResult::text(args["text"].as_str().unwrap_or("").to_string()))
            })
            .build()
    }

    fn init_request(id: i64) -> JsonRpcRequest {
        JsonRpcRequest::new(
            RequestId::Number(id),
            methods::INITIALIZE,
            Some(
                serde_json::to_value(InitializeParams {
                    protocol_version: crate::LATEST_PROTOCOL_VERSION.to_string(),
                    capabilities: ClientCapabilities::minimal(),
                    client_info: Implementation::new("test-client", "0.0.1"),
                })
                .unwrap(),
            ),
        )
    }

    async fn initialized_session(server: &McpServer) -> Arc<Session> {
        let session = server.register_session(None).await.unwrap();
        let response = server
            .handle_message(&session, TransportMessage::Request(init_request(1)))
            .await
            .unwrap();
        assert!(response.result().is_some());
        server
            .handle_message(
                &session,
                TransportMessage::Notification(JsonRpcNotification::new(
                    notifications::INITIALIZED,
                    None,
                )),
            )
            .await;
        session
    }

    #[tokio::test]
    async fn requests_before_initialize_are_rejected() {
        let server = test_server();
        let session = server.register_session(None).await.unwrap();
        let response = server
            .handle_message(
                &session,
                TransportMessage::Request(JsonRpcRequest::new(
                    RequestId::Number(1),
                    methods::TOOLS_LIST,
                    None,
                )),
            )
            .await
            .unwrap();
        let error = response.error_payload().unwrap();
        assert_eq!(error.code, codes::NOT_INITIALIZED);
        assert!(error.message.contains("not initialized"));
    }

    #[tokio::test]
    async fn duplicate_initialize_is_rejected() {
        let server = test_server();
        let session = initialized_session(&server).await;
        let response = server
            .handle_message(&session, TransportMessage::Request(init_request(2)))
            .await
            .unwrap();
        let error = response.error_payload().unwrap();
        assert_eq!(error.code, codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn unsupported_protocol_version_is_rejected_with_supported_list() {
        let server = test_server();
        let session = server.register_session(None).await.unwrap();
        let request = JsonRpcRequest::new(
            RequestId::Number(1),
            methods::INITIALIZE,
            Some(json!({
                "protocolVersion": "1999-01-01",
                "capabilities": {},
                "clientInfo": {"name": "old", "version": "0.1"}
            })),
        );
        let response = server
            .handle_message(&session, TransportMessage::Request(request))
            .await
            .unwrap();
        let error = response.error_payload().unwrap();
        assert_eq!(error.code, codes::INVALID_PARAMS);
        assert!(error.data.as_ref().unwrap()["supported"].is_array());

        // A retry with a supported version succeeds: the failed attempt did
        // not consume the session's initialize slot.
        let response = server
            .handle_message(&session, TransportMessage::Request(init_request(2)))
            .await
            .unwrap();
        assert!(response.result().is_some());
    }

    #[tokio::test]
    async fn sync_tool_call_returns_content() {
        let server = test_server();
        let session = initialized_session(&server).await;
        let request = JsonRpcRequest::new(
            RequestId::Number(3),
            methods::TOOLS_CALL,
            Some(json!({"name": "echo", "arguments": {"text": "hello"}})),
        );
        let response = server
            .handle_message(&session, TransportMessage::Request(request))
            .await
            .unwrap();
        let result = response.result().unwrap();
        assert_eq!(result["content"][0]["text"], "hello");
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn tool_domain_error_is_a_successful_response() {
        let server = McpServer::builder()
            .tool("fails", json!({}), |_args, _cx| async {
                Err(Error::internal("kaboom"))
            })
            .build();
        let session = initialized_session(&server).await;
        let request = JsonRpcRequest::new(
            RequestId::Number(3),
            methods::TOOLS_CALL,
            Some(json!({"name": "fails"})),
        );
        let response = server
            .handle_message(&session, TransportMessage::Request(request))
            .await
            .unwrap();
        let result = response.result().expect("domain failure is not a protocol error");
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("kaboom"));
    }

    #[tokio::test]
    async fn task_required_tool_rejects_plain_calls() {
        let server = McpServer::builder()
            .task_tool(
                ToolInfo::new("process_batch", json!({"type": "object"}))
                    .with_task_support(TaskSupport::Required),
                |_args, _cx| async { Ok(CallToolResult::text("done")) },
            )
            .build();
        let session = initialized_session(&server).await;
        let request = JsonRpcRequest::new(
            RequestId::Number(3),
            methods::TOOLS_CALL,
            Some(json!({"name": "process_batch", "arguments": {}})),
        );
        let response = server
            .handle_message(&session, TransportMessage::Request(request))
            .await
            .unwrap();
        let error = response.error_payload().unwrap();
        assert_eq!(error.code, codes::METHOD_NOT_FOUND);
        assert!(error.message.contains("requires task augmentation"));
    }

    #[tokio::test]
    async fn forbidden_tool_rejects_task_calls() {
        let server = test_server();
        let session = initialized_session(&server).await;
        let request = JsonRpcRequest::new(
            RequestId::Number(3),
            methods::TOOLS_CALL,
            Some(json!({"name": "echo", "arguments": {}, "task": {"ttl": 1000}})),
        );
        let response = server
            .handle_message(&session, TransportMessage::Request(request))
            .await
            .unwrap();
        let error = response.error_payload().unwrap();
        assert_eq!(error.code, codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let server = test_server();
        let session = initialized_session(&server).await;
        let request = JsonRpcRequest::new(RequestId::Number(3), "bogus/method", None);
        let response = server
            .handle_message(&session, TransportMessage::Request(request))
            .await
            .unwrap();
        assert_eq!(response.error_payload().unwrap().code, codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn response_id_kind_is_echoed() {
        let server = test_server();
        let session = initialized_session(&server).await;
        let request = JsonRpcRequest::new(RequestId::from("str-id"), methods::PING, None);
        let response = server
            .handle_message(&session, TransportMessage::Request(request))
            .await
            .unwrap();
        assert_eq!(response.id, RequestId::String("str-id".to_string()));
    }
}
