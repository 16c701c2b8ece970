//! Capability declarations exchanged during `initialize`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Capabilities a client advertises during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    /// The client can service `sampling/createMessage` requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,

    /// The client can service `elicitation/create` requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapability>,

    /// The client can service `roots/list` requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,

    /// Experimental, implementation-defined capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
}

impl ClientCapabilities {
    /// No optional features advertised.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Every standard client feature advertised.
    pub fn full() -> Self {
        Self {
            sampling: Some(SamplingCapability::default()),
            elicitation: Some(ElicitationCapability::default()),
            roots: Some(RootsCapability { list_changed: true }),
            experimental: None,
        }
    }

    /// Whether the client accepts sampling requests.
    pub fn supports_sampling(&self) -> bool {
        self.sampling.is_some()
    }

    /// Whether the client accepts elicitation requests.
    pub fn supports_elicitation(&self) -> bool {
        self.elicitation.is_some()
    }

    /// Whether the client accepts roots listing requests.
    pub fn supports_roots(&self) -> bool {
        self.roots.is_some()
    }
}

/// Capabilities a server advertises during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    /// Tool support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,

    /// Resource support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,

    /// Prompt support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,

    /// `logging/setLevel` and `notifications/message` support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,

    /// `completion/complete` support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionsCapability>,

    /// Task-augmented execution support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<TasksCapability>,

    /// Experimental, implementation-defined capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<HashMap<String, serde_json::Value>>,
}

impl ServerCapabilities {
    /// Whether `notifications/tools/list_changed` may be emitted.
    pub fn tools_list_changed(&self) -> bool {
        self.tools
            .as_ref()
            .and_then(|t| t.list_changed)
            .unwrap_or(false)
    }

    /// Whether `notifications/resources/list_changed` may be emitted.
    pub fn resources_list_changed(&self) -> bool {
        self.resources
            .as_ref()
            .and_then(|r| r.list_changed)
            .unwrap_or(false)
    }

    /// Whether `notifications/prompts/list_changed` may be emitted.
    pub fn prompts_list_changed(&self) -> bool {
        self.prompts
            .as_ref()
            .and_then(|p| p.list_changed)
            .unwrap_or(false)
    }
}

/// Tool capability flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Whether `notifications/tools/list_changed` is emitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resource capability flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    /// Whether `resources/subscribe` is supported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,

    /// Whether `notifications/resources/list_changed` is emitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Prompt capability flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsCapability {
    /// Whether `notifications/prompts/list_changed` is emitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Logging capability marker (empty object on the wire).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingCapability {}

/// Completions capability marker (empty object on the wire).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionsCapability {}

/// Sampling capability marker (empty object on the wire).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingCapability {}

/// Elicitation capability marker (empty object on the wire).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitationCapability {}

/// Roots capability flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapability {
    /// Whether `notifications/roots/list_changed` is emitted.
    #[serde(default)]
    pub list_changed: bool,
}

/// Task capability flags advertised when the task engine is enabled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksCapability {
    /// `tasks/list` is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<bool>,

    /// `tasks/cancel` is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel: Option<bool>,

    /// Which request kinds accept task augmentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<TaskRequestsCapability>,
}

impl TasksCapability {
    /// The full capability set this engine implements.
    pub fn all() -> Self {
        Self {
            list: Some(true),
            cancel: Some(true),
            requests: Some(TaskRequestsCapability {
                tools_call: Some(true),
            }),
        }
    }
}

/// Request kinds that accept a `task` field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequestsCapability {
    /// `tools/call` accepts task augmentation.
    #[serde(rename = "tools/call", skip_serializing_if = "Option::is_none")]
    pub tools_call: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_omits_everything() {
        let json = serde_json::to_value(ClientCapabilities::minimal()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn full_advertises_client_features() {
        let caps = ClientCapabilities::full();
        assert!(caps.supports_sampling());
        assert!(caps.supports_elicitation());
        assert!(caps.supports_roots());
        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json["roots"]["listChanged"], true);
    }

    #[test]
    fn tasks_capability_shape() {
        let caps = ServerCapabilities {
            tasks: Some(TasksCapability::all()),
            ..Default::default()
        };
        let json = serde_json::to_value(&caps).unwrap();
        assert_eq!(json["tasks"]["list"], true);
        assert_eq!(json["tasks"]["cancel"], true);
        assert_eq!(json["tasks"]["requests"]["tools/call"], true);
    }

    #[test]
    fn list_changed_defaults_to_false() {
        let caps = ServerCapabilities {
            tools: Some(ToolsCapability { list_changed: None }),
            ..Default::default()
        };
        assert!(!caps.tools_list_changed());
    }
}
