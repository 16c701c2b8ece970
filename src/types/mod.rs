//! Wire-level protocol types.

pub mod capabilities;
pub mod jsonrpc;
pub mod protocol;
pub mod tasks;

pub use capabilities::{
    ClientCapabilities, CompletionsCapability, ElicitationCapability, LoggingCapability,
    PromptsCapability, ResourcesCapability, RootsCapability, SamplingCapability,
    ServerCapabilities, TaskRequestsCapability, TasksCapability, ToolsCapability,
};
pub use jsonrpc::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
    ResponsePayload, JSONRPC_VERSION,
};
pub use protocol::{
    methods, notifications, CallToolParams, CallToolResult, CancelledParams, CompleteParams,
    CompleteResult, Completion, CompletionArgument, CompletionReference, Content,
    CreateMessageParams, CreateMessageResult, Cursor, ElicitAction, ElicitParams, ElicitResult,
    ElicitationMode, GetPromptParams, GetPromptResult, Implementation, InitializeParams,
    InitializeResult, ListParams, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListRootsResult, ListToolsResult, LogMessageParams, LoggingLevel,
    ModelHint, ModelPreferences, ProgressParams, ProgressToken, PromptArgument, PromptInfo,
    PromptMessage, ReadResourceParams, ReadResourceResult, RequestMeta, ResourceInfo,
    ResourceTemplateInfo, ResourceUpdatedParams, Role, Root, SamplingMessage, SetLevelParams,
    SubscribeParams, TaskSupport, ToolExecution, ToolInfo,
};
pub use tasks::{
    related_task_meta, CreateTaskResult, ListTasksResult, Task, TaskIdParams, TaskParams,
    TaskStatus, MODEL_IMMEDIATE_RESPONSE_META_KEY, RELATED_TASK_META_KEY,
};
