//! MCP method names and param/result shapes.
//!
//! Dispatch in this crate is by method string; every routed method has a
//! params struct here that handlers deserialize lazily from the raw frame.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::capabilities::{ClientCapabilities, ServerCapabilities};
use crate::types::tasks::TaskParams;

/// Method names routed by this implementation.
pub mod methods {
    /// Session initialization handshake.
    pub const INITIALIZE: &str = "initialize";
    /// Liveness probe; either peer may send it.
    pub const PING: &str = "ping";
    /// List registered tools.
    pub const TOOLS_LIST: &str = "tools/list";
    /// Invoke a tool (optionally task-augmented).
    pub const TOOLS_CALL: &str = "tools/call";
    /// List concrete resources.
    pub const RESOURCES_LIST: &str = "resources/list";
    /// List resource templates.
    pub const RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
    /// Read a resource by URI.
    pub const RESOURCES_READ: &str = "resources/read";
    /// Subscribe to updates for a resource URI.
    pub const RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
    /// Drop a resource subscription.
    pub const RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
    /// List prompts.
    pub const PROMPTS_LIST: &str = "prompts/list";
    /// Expand a prompt into messages.
    pub const PROMPTS_GET: &str = "prompts/get";
    /// Argument completion.
    pub const COMPLETION_COMPLETE: &str = "completion/complete";
    /// Set the session's minimum forwarded log level.
    pub const LOGGING_SET_LEVEL: &str = "logging/setLevel";
    /// Poll a task's status.
    pub const TASKS_GET: &str = "tasks/get";
    /// Block for a task's result.
    pub const TASKS_RESULT: &str = "tasks/result";
    /// List tasks owned by the session.
    pub const TASKS_LIST: &str = "tasks/list";
    /// Request cancellation of a task.
    pub const TASKS_CANCEL: &str = "tasks/cancel";
    /// Server→client LLM sampling request.
    pub const SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
    /// Server→client user-input request.
    pub const ELICITATION_CREATE: &str = "elicitation/create";
    /// Server→client roots listing request.
    pub const ROOTS_LIST: &str = "roots/list";
}

/// Notification method names.
pub mod notifications {
    /// Client finished initialization.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// A request was cancelled by its issuer.
    pub const CANCELLED: &str = "notifications/cancelled";
    /// Progress update for a long-running request.
    pub const PROGRESS: &str = "notifications/progress";
    /// Log message forwarded to the client.
    pub const MESSAGE: &str = "notifications/message";
    /// The tool list changed.
    pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
    /// The resource list changed.
    pub const RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
    /// A subscribed resource changed.
    pub const RESOURCES_UPDATED: &str = "notifications/resources/updated";
    /// The prompt list changed.
    pub const PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
    /// The client's roots changed.
    pub const ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";
    /// A task changed status.
    pub const TASKS_STATUS: &str = "notifications/tasks/status";
}

/// Name and version of one side of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Implementation {
    /// Implementation name.
    pub name: String,
    /// Implementation version.
    pub version: String,
}

impl Implementation {
    /// Build an implementation descriptor.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Params of `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version the client proposes.
    pub protocol_version: String,
    /// Client feature flags.
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    /// Client identity.
    pub client_info: Implementation,
}

/// Result of `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// The negotiated protocol version.
    pub protocol_version: String,
    /// Server feature flags.
    pub capabilities: ServerCapabilities,
    /// Server identity.
    pub server_info: Implementation,
    /// Optional usage instructions for the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Opaque pagination cursor.
pub type Cursor = Option<String>;

/// Whether a tool may, must, or must not run as a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSupport {
    /// Task augmentation is rejected.
    #[default]
    Forbidden,
    /// The caller chooses sync or task execution.
    Optional,
    /// Calls without a `task` field are rejected.
    Required,
}

/// Execution constraints declared on a tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    /// Task-augmentation mode.
    #[serde(default)]
    pub task_support: TaskSupport,
}

/// A tool as listed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the arguments (caller-supplied blob).
    pub input_schema: Value,
    /// JSON Schema for the result, when declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Execution constraints (task support).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ToolExecution>,
    /// Free-form metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl ToolInfo {
    /// Build a tool descriptor with just a name and input schema.
    pub fn new(name: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema,
            output_schema: None,
            execution: None,
            meta: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare the task-support mode.
    pub fn with_task_support(mut self, task_support: TaskSupport) -> Self {
        self.execution = Some(ToolExecution { task_support });
        self
    }

    /// The effective task-support mode (`Forbidden` when undeclared).
    pub fn task_support(&self) -> TaskSupport {
        self.execution.as_ref().map_or_else(TaskSupport::default, |e| e.task_support)
    }
}

/// Params of `tools/list`, `prompts/list`, `resources/list`,
/// `resources/templates/list` and `tasks/list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    /// Cursor from a previous page, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Cursor,
}

/// Result of `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// One page of tools.
    pub tools: Vec<ToolInfo>,
    /// Cursor for the next page, absent on the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Cursor,
}

/// Params of `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolParams {
    /// Tool to invoke.
    pub name: String,
    /// Arguments matching the tool's input schema.
    #[serde(default)]
    pub arguments: Value,
    /// Present iff the caller wants task-augmented execution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskParams>,
    /// Request metadata (progress token).
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

/// Result of a synchronous `tools/call` (and of `tasks/result`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content items produced by the tool.
    #[serde(default)]
    pub content: Vec<Content>,
    /// True when the tool raised a domain error.
    #[serde(default)]
    pub is_error: bool,
    /// Result metadata (e.g. related-task linkage).
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

impl CallToolResult {
    /// A successful single-text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: false,
            meta: None,
        }
    }

    /// A domain-error result carrying the message as text content.
    pub fn error_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::Text { text: text.into() }],
            is_error: true,
            meta: None,
        }
    }
}

/// One content item in tool results, resource reads and prompt messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Content {
    /// Plain text.
    #[serde(rename_all = "camelCase")]
    Text {
        /// The text.
        text: String,
    },
    /// Base64-encoded image data.
    #[serde(rename_all = "camelCase")]
    Image {
        /// Base64 payload.
        data: String,
        /// MIME type, e.g. `image/png`.
        mime_type: String,
    },
    /// Embedded or referenced resource content.
    #[serde(rename_all = "camelCase")]
    Resource {
        /// Resource URI.
        uri: String,
        /// Inline text content, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// MIME type.
        #[serde(skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

/// A resource as listed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// Resource URI.
    pub uri: String,
    /// Human-readable name.
    pub name: String,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Result of `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    /// One page of resources.
    pub resources: Vec<ResourceInfo>,
    /// Cursor for the next page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Cursor,
}

/// A templated resource, addressed by an RFC 6570 pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateInfo {
    /// URI pattern with `{name}` placeholders.
    pub uri_template: String,
    /// Template name.
    pub name: String,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of resources produced from this template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Result of `resources/templates/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourceTemplatesResult {
    /// One page of templates.
    pub resource_templates: Vec<ResourceTemplateInfo>,
    /// Cursor for the next page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Cursor,
}

/// Params of `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResourceParams {
    /// URI to read.
    pub uri: String,
}

/// Result of `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResourceResult {
    /// The resource contents.
    pub contents: Vec<Content>,
}

/// Params of `resources/subscribe` and `resources/unsubscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeParams {
    /// Resource URI.
    pub uri: String,
}

/// Params of `notifications/resources/updated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUpdatedParams {
    /// The URI that changed.
    pub uri: String,
}

/// An argument accepted by a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied.
    #[serde(default)]
    pub required: bool,
}

/// A prompt as listed to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInfo {
    /// Unique prompt name.
    pub name: String,
    /// Description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

/// Result of `prompts/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPromptsResult {
    /// One page of prompts.
    pub prompts: Vec<PromptInfo>,
    /// Cursor for the next page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Cursor,
}

/// Params of `prompts/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPromptParams {
    /// Prompt name.
    pub name: String,
    /// Named argument values.
    #[serde(default)]
    pub arguments: HashMap<String, String>,
}

/// Result of `prompts/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPromptResult {
    /// Description of the expanded prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The ordered messages.
    pub messages: Vec<PromptMessage>,
}

/// One message of an expanded prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMessage {
    /// Speaker role.
    pub role: Role,
    /// Message content.
    pub content: Content,
}

/// Speaker role in prompt and sampling messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user.
    User,
    /// The model.
    Assistant,
    /// System instruction.
    System,
}

/// Minimum severity a session wants forwarded, ordered low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    /// Diagnostic detail.
    Debug,
    /// Routine information.
    Info,
    /// Something surprising but recoverable.
    Warning,
    /// A failed operation.
    Error,
    /// The server cannot continue normally.
    Critical,
}

/// Params of `logging/setLevel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLevelParams {
    /// New minimum forwarded level.
    pub level: LoggingLevel,
}

/// Params of `notifications/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessageParams {
    /// Severity.
    pub level: LoggingLevel,
    /// Logger name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Message payload.
    pub data: Value,
}

/// Progress token correlating progress notifications with a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    /// String token.
    String(String),
    /// Numeric token.
    Number(i64),
}

/// Metadata attachable to any request (`_meta`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    /// Token to attach to progress notifications for this request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<ProgressToken>,
}

/// Params of `notifications/progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    /// Token from the originating request.
    pub progress_token: ProgressToken,
    /// Monotonically increasing progress value.
    pub progress: f64,
    /// Total, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Human-readable status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Params of `notifications/cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    /// Id of the cancelled request.
    pub request_id: crate::types::jsonrpc::RequestId,
    /// Optional reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Params of `completion/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteParams {
    /// What is being completed.
    pub r#ref: CompletionReference,
    /// The argument under completion.
    pub argument: CompletionArgument,
}

/// Reference target of a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionReference {
    /// Completing a prompt argument.
    #[serde(rename = "ref/prompt")]
    Prompt {
        /// Prompt name.
        name: String,
    },
    /// Completing a resource template placeholder.
    #[serde(rename = "ref/resource")]
    Resource {
        /// Template URI.
        uri: String,
    },
}

/// The argument under completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionArgument {
    /// Argument name.
    pub name: String,
    /// Partial value typed so far.
    pub value: String,
}

/// Result of `completion/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResult {
    /// The completion payload.
    pub completion: Completion,
}

/// Completion values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// Suggested values.
    pub values: Vec<String>,
    /// Total available, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    /// Whether more values exist beyond `values`.
    #[serde(default)]
    pub has_more: bool,
}

/// One message in a sampling conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingMessage {
    /// Speaker role.
    pub role: Role,
    /// Message content.
    pub content: Content,
}

/// Hints for client-side model selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPreferences {
    /// Name hints, in preference order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<ModelHint>>,
    /// Cost priority, 0..=1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,
    /// Speed priority, 0..=1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,
    /// Intelligence priority, 0..=1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intelligence_priority: Option<f64>,
}

/// A single model-name hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelHint {
    /// Substring or family name to prefer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Params of `sampling/createMessage` (server → client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageParams {
    /// Conversation to sample from.
    pub messages: Vec<SamplingMessage>,
    /// Model selection hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,
    /// System prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Output token cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Result of `sampling/createMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResult {
    /// Role of the sampled message (normally assistant).
    pub role: Role,
    /// Sampled content.
    pub content: Content,
    /// Model that produced it.
    pub model: String,
    /// Why sampling stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// Elicitation presentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitationMode {
    /// The client renders a form from a JSON schema.
    #[default]
    Form,
    /// The client opens a URL identified by an elicitation id.
    Url,
}

/// Params of `elicitation/create` (server → client).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitParams {
    /// Message shown to the user.
    pub message: String,
    /// Presentation mode; absent means `form`.
    #[serde(default)]
    pub mode: ElicitationMode,
    /// Schema of the requested input (form mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_schema: Option<Value>,
    /// URL to open (url mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Identifier tying the URL flow back to this request (url mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation_id: Option<String>,
}

impl ElicitParams {
    /// Validate the mode-dependent field requirements.
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            ElicitationMode::Form => {
                if self.requested_schema.is_none() {
                    return Err(Error::invalid_params(
                        "form elicitation requires requestedSchema",
                    ));
                }
            },
            ElicitationMode::Url => {
                if self.url.is_none() || self.elicitation_id.is_none() {
                    return Err(Error::invalid_params(
                        "url elicitation requires url and elicitationId",
                    ));
                }
            },
        }
        Ok(())
    }
}

/// How the user resolved an elicitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitAction {
    /// The user supplied the requested input.
    Accept,
    /// The user declined.
    Decline,
    /// The user dismissed the request.
    Cancel,
}

/// Result of `elicitation/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitResult {
    /// How the user responded.
    pub action: ElicitAction,
    /// The supplied input, when accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

/// A root the client grants the server access to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Root {
    /// Root URI (commonly `file://`).
    pub uri: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Result of `roots/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRootsResult {
    /// The granted roots.
    pub roots: Vec<Root>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn call_tool_params_with_task() {
        let raw = json!({
            "name": "process_batch",
            "arguments": {"items": [1, 2, 3]},
            "task": {"ttl": 60000}
        });
        let params: CallToolParams = serde_json::from_value(raw).unwrap();
        assert_eq!(params.name, "process_batch");
        assert_eq!(params.task.as_ref().unwrap().ttl, Some(60000));
    }

    #[test]
    fn call_tool_params_arguments_default() {
        let params: CallToolParams = serde_json::from_value(json!({"name": "noop"})).unwrap();
        assert!(params.arguments.is_null());
        assert!(params.task.is_none());
    }

    #[test]
    fn content_tagging() {
        let text = Content::Text {
            text: "5".to_string(),
        };
        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json, json!({"type": "text", "text": "5"}));

        let image: Content =
            serde_json::from_value(json!({"type": "image", "data": "QUJD", "mimeType": "image/png"}))
                .unwrap();
        assert!(matches!(image, Content::Image { .. }));
    }

    #[test]
    fn tool_info_serializes_camel_case() {
        let info = ToolInfo::new("calculate", json!({"type": "object"}))
            .with_description("Arithmetic")
            .with_task_support(TaskSupport::Required);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["inputSchema"]["type"], "object");
        assert_eq!(json["execution"]["taskSupport"], "required");
    }

    #[test]
    fn task_support_defaults_to_forbidden() {
        let info = ToolInfo::new("plain", json!({}));
        assert_eq!(info.task_support(), TaskSupport::Forbidden);
    }

    #[test]
    fn elicitation_mode_validation() {
        let form = ElicitParams {
            message: "Name?".into(),
            mode: ElicitationMode::Form,
            requested_schema: Some(json!({"type": "object"})),
            url: None,
            elicitation_id: None,
        };
        assert!(form.validate().is_ok());

        let bad_form = ElicitParams {
            requested_schema: None,
            ..form.clone()
        };
        assert!(bad_form.validate().is_err());

        let url = ElicitParams {
            message: "Sign in".into(),
            mode: ElicitationMode::Url,
            requested_schema: None,
            url: Some("https://example.com/auth".into()),
            elicitation_id: Some("e-1".into()),
        };
        assert!(url.validate().is_ok());

        let bad_url = ElicitParams {
            elicitation_id: None,
            ..url
        };
        assert!(bad_url.validate().is_err());
    }

    #[test]
    fn empty_mode_defaults_to_form() {
        let params: ElicitParams = serde_json::from_value(json!({
            "message": "Name?",
            "requestedSchema": {"type": "object"}
        }))
        .unwrap();
        assert_eq!(params.mode, ElicitationMode::Form);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn logging_levels_are_ordered() {
        assert!(LoggingLevel::Debug < LoggingLevel::Info);
        assert!(LoggingLevel::Warning < LoggingLevel::Critical);
        assert_eq!(
            serde_json::to_value(LoggingLevel::Warning).unwrap(),
            json!("warning")
        );
    }
}
