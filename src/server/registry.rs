//! Tool, resource and prompt registries.
//!
//! Registries are ordered maps so listings (and therefore pagination
//! cursors) are deterministic. Cursors are the base64-encoded index one past
//! the last returned item; an undecodable cursor is `INVALID_PARAMS`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::server::sessions::{RequestContext, Session};
use crate::shared::uri_template::UriTemplate;
use crate::types::{
    CallToolResult, Completion, GetPromptResult, ListPromptsResult, ListResourceTemplatesResult,
    ListResourcesResult, ListToolsResult, PromptInfo, ReadResourceResult, ResourceInfo,
    ResourceTemplateInfo, ToolInfo,
};

/// Encode a pagination cursor.
pub(crate) fn encode_cursor(index: usize) -> String {
    BASE64.encode(index.to_string())
}

/// Decode a pagination cursor; bad cursors are `INVALID_PARAMS`.
pub(crate) fn decode_cursor(cursor: Option<&str>) -> Result<usize> {
    let Some(cursor) = cursor else {
        return Ok(0);
    };
    let bytes = BASE64
        .decode(cursor)
        .map_err(|_| Error::invalid_params("invalid cursor"))?;
    let text = String::from_utf8(bytes).map_err(|_| Error::invalid_params("invalid cursor"))?;
    text.parse().map_err(|_| Error::invalid_params("invalid cursor"))
}

/// Slice one page out of an ordered listing.
pub(crate) fn paginate<T: Clone>(
    items: &[T],
    cursor: Option<&str>,
    page_size: usize,
) -> Result<(Vec<T>, Option<String>)> {
    let start = decode_cursor(cursor)?;
    if start > items.len() {
        return Err(Error::invalid_params("invalid cursor"));
    }
    let end = (start + page_size).min(items.len());
    let page = items[start..end].to_vec();
    let next = (end < items.len()).then(|| encode_cursor(end));
    Ok((page, next))
}

/// Handler behind a registered tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool.
    async fn call(&self, args: Value, cx: RequestContext) -> Result<CallToolResult>;
}

struct FnToolHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnToolHandler<F>
where
    F: Fn(Value, RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<CallToolResult>> + Send,
{
    async fn call(&self, args: Value, cx: RequestContext) -> Result<CallToolResult> {
        (self.f)(args, cx).await
    }
}

/// Wrap an async closure as a [`ToolHandler`].
pub fn tool_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Value, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CallToolResult>> + Send + 'static,
{
    Arc::new(FnToolHandler { f })
}

/// How a tool's handler executes.
#[derive(Clone)]
pub enum ToolKind {
    /// Runs inline; the call returns its `CallToolResult` directly.
    Sync(Arc<dyn ToolHandler>),
    /// Runs through the task engine when the call is task-augmented.
    Task(Arc<dyn ToolHandler>),
}

impl ToolKind {
    /// The underlying handler, whichever variant.
    pub fn handler(&self) -> &Arc<dyn ToolHandler> {
        match self {
            Self::Sync(handler) | Self::Task(handler) => handler,
        }
    }
}

/// A registered tool: metadata plus its handler variant.
#[derive(Clone)]
pub struct ServerTool {
    /// Metadata listed to clients.
    pub info: ToolInfo,
    /// Handler variant, resolved at call time.
    pub kind: ToolKind,
}

impl ServerTool {
    /// A synchronous tool.
    pub fn sync(info: ToolInfo, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            info,
            kind: ToolKind::Sync(handler),
        }
    }

    /// A task-capable tool.
    pub fn task(info: ToolInfo, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            info,
            kind: ToolKind::Task(handler),
        }
    }
}

impl std::fmt::Debug for ServerTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerTool")
            .field("name", &self.info.name)
            .field(
                "kind",
                &match self.kind {
                    ToolKind::Sync(_) => "sync",
                    ToolKind::Task(_) => "task",
                },
            )
            .finish()
    }
}

/// Post-listing filter hook applied to every `tools/list` result.
pub type ToolListFilter =
    Arc<dyn Fn(&RequestContext, Vec<ToolInfo>) -> Vec<ToolInfo> + Send + Sync>;

/// Name-keyed tool table with per-session overlay support.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, ServerTool>>,
    filter: RwLock<Option<ToolListFilter>>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tool; returns true when a tool was replaced.
    pub fn insert(&self, tool: ServerTool) -> bool {
        self.tools
            .write()
            .insert(tool.info.name.clone(), tool)
            .is_some()
    }

    /// Remove a tool by name.
    pub fn remove(&self, name: &str) -> bool {
        self.tools.write().remove(name).is_some()
    }

    /// Number of globally registered tools.
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Whether the global table is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Install the `tools/list` filter hook.
    pub fn set_filter(&self, filter: ToolListFilter) {
        *self.filter.write() = Some(filter);
    }

    /// Resolve a tool for a call: the session overlay wins, the global
    /// table is the fallback.
    pub fn resolve(&self, name: &str, session: Option<&Session>) -> Option<ServerTool> {
        if let Some(session) = session {
            if let Some(overlay) = session.tool_overlay() {
                if let Some(tool) = overlay.get(name) {
                    return Some(tool.clone());
                }
            }
        }
        self.tools.read().get(name).cloned()
    }

    /// One page of the merged (overlay-shadowed) listing, filter applied.
    pub fn list(
        &self,
        cursor: Option<&str>,
        page_size: usize,
        cx: &RequestContext,
    ) -> Result<ListToolsResult> {
        let mut merged: BTreeMap<String, ToolInfo> = self
            .tools
            .read()
            .iter()
            .map(|(name, tool)| (name.clone(), tool.info.clone()))
            .collect();
        if let Some(session) = &cx.session {
            if let Some(overlay) = session.tool_overlay() {
                for (name, tool) in overlay {
                    merged.insert(name, tool.info.clone());
                }
            }
        }

        let mut infos: Vec<ToolInfo> = merged.into_values().collect();
        if let Some(filter) = self.filter.read().clone() {
            infos = filter(cx, infos);
        }

        let (tools, next_cursor) = paginate(&infos, cursor, page_size)?;
        Ok(ListToolsResult { tools, next_cursor })
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.len()).finish()
    }
}

/// Handler behind a resource or resource template.
///
/// For template matches, `params` carries the extracted placeholder values;
/// `uri` is always the concrete URI from the request.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Read the resource addressed by `uri`.
    async fn read(
        &self,
        uri: &str,
        params: HashMap<String, String>,
        cx: RequestContext,
    ) -> Result<ReadResourceResult>;
}

struct FnResourceHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ResourceHandler for FnResourceHandler<F>
where
    F: Fn(String, HashMap<String, String>, RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ReadResourceResult>> + Send,
{
    async fn read(
        &self,
        uri: &str,
        params: HashMap<String, String>,
        cx: RequestContext,
    ) -> Result<ReadResourceResult> {
        (self.f)(uri.to_string(), params, cx).await
    }
}

/// Wrap an async closure as a [`ResourceHandler`].
pub fn resource_fn<F, Fut>(f: F) -> Arc<dyn ResourceHandler>
where
    F: Fn(String, HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ReadResourceResult>> + Send + 'static,
{
    Arc::new(FnResourceHandler { f })
}

/// Completion callback for a template placeholder or prompt argument.
pub type CompletionFn = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

struct ResourceEntry {
    info: ResourceInfo,
    handler: Arc<dyn ResourceHandler>,
}

struct TemplateEntry {
    info: ResourceTemplateInfo,
    template: UriTemplate,
    handler: Arc<dyn ResourceHandler>,
    completions: HashMap<String, CompletionFn>,
}

/// URI-keyed resources plus templated resources.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: RwLock<BTreeMap<String, ResourceEntry>>,
    templates: RwLock<Vec<TemplateEntry>>,
}

impl ResourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a concrete resource.
    pub fn add_resource(&self, info: ResourceInfo, handler: Arc<dyn ResourceHandler>) {
        self.resources
            .write()
            .insert(info.uri.clone(), ResourceEntry { info, handler });
    }

    /// Remove a concrete resource.
    pub fn remove_resource(&self, uri: &str) -> bool {
        self.resources.write().remove(uri).is_some()
    }

    /// Register a templated resource; the pattern must compile.
    pub fn add_template(
        &self,
        info: ResourceTemplateInfo,
        handler: Arc<dyn ResourceHandler>,
    ) -> Result<()> {
        self.add_template_with_completions(info, handler, HashMap::new())
    }

    /// Register a templated resource with placeholder completion callbacks.
    pub fn add_template_with_completions(
        &self,
        info: ResourceTemplateInfo,
        handler: Arc<dyn ResourceHandler>,
        completions: HashMap<String, CompletionFn>,
    ) -> Result<()> {
        let template = UriTemplate::new(&info.uri_template)?;
        self.templates.write().push(TemplateEntry {
            info,
            template,
            handler,
            completions,
        });
        Ok(())
    }

    /// Whether any resource or template is registered.
    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty() && self.templates.read().is_empty()
    }

    /// One page of concrete resources.
    pub fn list(&self, cursor: Option<&str>, page_size: usize) -> Result<ListResourcesResult> {
        let infos: Vec<ResourceInfo> = self
            .resources
            .read()
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        let (resources, next_cursor) = paginate(&infos, cursor, page_size)?;
        Ok(ListResourcesResult {
            resources,
            next_cursor,
        })
    }

    /// One page of templates.
    pub fn list_templates(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<ListResourceTemplatesResult> {
        let infos: Vec<ResourceTemplateInfo> = self
            .templates
            .read()
            .iter()
            .map(|entry| entry.info.clone())
            .collect();
        let (resource_templates, next_cursor) = paginate(&infos, cursor, page_size)?;
        Ok(ListResourceTemplatesResult {
            resource_templates,
            next_cursor,
        })
    }

    /// Read a resource: exact URI first, then the matching template with
    /// the longest static prefix.
    pub async fn read(&self, uri: &str, cx: RequestContext) -> Result<ReadResourceResult> {
        let exact = self
            .resources
            .read()
            .get(uri)
            .map(|entry| entry.handler.clone());
        if let Some(handler) = exact {
            return handler.read(uri, HashMap::new(), cx).await;
        }

        let best = {
            let templates = self.templates.read();
            let mut best: Option<(usize, HashMap<String, String>, Arc<dyn ResourceHandler>)> =
                None;
            for entry in templates.iter() {
                if let Some(params) = entry.template.match_uri(uri) {
                    let prefix_len = entry.template.static_prefix().len();
                    if best.as_ref().is_none_or(|(len, _, _)| prefix_len > *len) {
                        best = Some((prefix_len, params, entry.handler.clone()));
                    }
                }
            }
            best
        };

        match best {
            Some((_, params, handler)) => handler.read(uri, params, cx).await,
            None => Err(Error::invalid_params(format!("unknown resource: {uri}"))),
        }
    }

    /// Complete a template placeholder value.
    pub fn complete(&self, uri_template: &str, argument: &str, prefix: &str) -> Completion {
        let templates = self.templates.read();
        let values = templates
            .iter()
            .find(|entry| entry.info.uri_template == uri_template)
            .and_then(|entry| entry.completions.get(argument))
            .map(|complete| complete(prefix))
            .unwrap_or_default();
        Completion {
            total: Some(values.len()),
            values,
            has_more: false,
        }
    }
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("resources", &self.resources.read().len())
            .field("templates", &self.templates.read().len())
            .finish()
    }
}

/// Handler behind a registered prompt.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Expand the prompt with the given arguments.
    async fn render(
        &self,
        args: HashMap<String, String>,
        cx: RequestContext,
    ) -> Result<GetPromptResult>;
}

struct FnPromptHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> PromptHandler for FnPromptHandler<F>
where
    F: Fn(HashMap<String, String>, RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<GetPromptResult>> + Send,
{
    async fn render(
        &self,
        args: HashMap<String, String>,
        cx: RequestContext,
    ) -> Result<GetPromptResult> {
        (self.f)(args, cx).await
    }
}

/// Wrap an async closure as a [`PromptHandler`].
pub fn prompt_fn<F, Fut>(f: F) -> Arc<dyn PromptHandler>
where
    F: Fn(HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<GetPromptResult>> + Send + 'static,
{
    Arc::new(FnPromptHandler { f })
}

struct PromptEntry {
    info: PromptInfo,
    handler: Arc<dyn PromptHandler>,
    completions: HashMap<String, CompletionFn>,
}

/// Name-keyed prompt table.
#[derive(Default)]
pub struct PromptRegistry {
    prompts: RwLock<BTreeMap<String, PromptEntry>>,
}

impl PromptRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prompt.
    pub fn insert(&self, info: PromptInfo, handler: Arc<dyn PromptHandler>) {
        self.insert_with_completions(info, handler, HashMap::new());
    }

    /// Register a prompt with argument completion callbacks.
    pub fn insert_with_completions(
        &self,
        info: PromptInfo,
        handler: Arc<dyn PromptHandler>,
        completions: HashMap<String, CompletionFn>,
    ) {
        self.prompts.write().insert(
            info.name.clone(),
            PromptEntry {
                info,
                handler,
                completions,
            },
        );
    }

    /// Remove a prompt.
    pub fn remove(&self, name: &str) -> bool {
        self.prompts.write().remove(name).is_some()
    }

    /// Whether no prompts are registered.
    pub fn is_empty(&self) -> bool {
        self.prompts.read().is_empty()
    }

    /// One page of prompts.
    pub fn list(&self, cursor: Option<&str>, page_size: usize) -> Result<ListPromptsResult> {
        let infos: Vec<PromptInfo> = self
            .prompts
            .read()
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        let (prompts, next_cursor) = paginate(&infos, cursor, page_size)?;
        Ok(ListPromptsResult {
            prompts,
            next_cursor,
        })
    }

    /// Expand a prompt.
    pub async fn render(
        &self,
        name: &str,
        args: HashMap<String, String>,
        cx: RequestContext,
    ) -> Result<GetPromptResult> {
        let handler = self
            .prompts
            .read()
            .get(name)
            .map(|entry| entry.handler.clone())
            .ok_or_else(|| Error::invalid_params(format!("unknown prompt: {name}")))?;
        handler.render(args, cx).await
    }

    /// Complete a prompt argument value.
    pub fn complete(&self, prompt: &str, argument: &str, prefix: &str) -> Completion {
        let prompts = self.prompts.read();
        let values = prompts
            .get(prompt)
            .and_then(|entry| entry.completions.get(argument))
            .map(|complete| complete(prefix))
            .unwrap_or_default();
        Completion {
            total: Some(values.len()),
            values,
            has_more: false,
        }
    }
}

impl std::fmt::Debug for PromptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptRegistry")
            .field("prompts", &self.prompts.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Content;
    use serde_json::json;

    fn text_tool(name: &str, reply: &'static str) -> ServerTool {
        ServerTool::sync(
            ToolInfo::new(name, json!({"type": "object"})),
            tool_fn(move |_args, _cx| async move { Ok(CallToolResult::text(reply)) }),
        )
    }

    #[test]
    fn cursor_round_trip() {
        let cursor = encode_cursor(12);
        assert_eq!(decode_cursor(Some(&cursor)).unwrap(), 12);
        assert_eq!(decode_cursor(None).unwrap(), 0);
    }

    #[test]
    fn bad_cursor_is_invalid_params() {
        let err = decode_cursor(Some("!!not-base64!!")).unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
        let err = decode_cursor(Some(&BASE64.encode("not-a-number"))).unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
    }

    #[test]
    fn listing_paginates_deterministically() {
        let registry = ToolRegistry::new();
        for name in ["alpha", "bravo", "charlie", "delta", "echo"] {
            registry.insert(text_tool(name, "ok"));
        }
        let cx = RequestContext::new("t", None);

        let first = registry.list(None, 2, &cx).unwrap();
        assert_eq!(
            first.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["alpha", "bravo"]
        );
        let second = registry
            .list(first.next_cursor.as_deref(), 2, &cx)
            .unwrap();
        assert_eq!(
            second.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["charlie", "delta"]
        );
        let third = registry
            .list(second.next_cursor.as_deref(), 2, &cx)
            .unwrap();
        assert_eq!(third.tools.len(), 1);
        assert!(third.next_cursor.is_none());
    }

    #[test]
    fn overlay_shadows_global_table() {
        use crate::server::sessions::{Session, SessionId};

        let registry = ToolRegistry::new();
        registry.insert(text_tool("shared", "global"));

        let session = Session::new(SessionId::generate());
        session.with_tool_overlay(|overlay| {
            overlay.insert("shared".into(), text_tool("shared", "overlayed"));
            overlay.insert("private".into(), text_tool("private", "mine"));
        });

        assert!(registry.resolve("private", Some(&session)).is_some());
        assert!(registry.resolve("private", None).is_none());

        let cx = RequestContext::new("t", Some(session));
        let listing = registry.list(None, 10, &cx).unwrap();
        let names: Vec<_> = listing.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["private", "shared"]);
    }

    #[test]
    fn filter_hook_applies_post_overlay() {
        let registry = ToolRegistry::new();
        registry.insert(text_tool("keep", "ok"));
        registry.insert(text_tool("hide", "ok"));
        registry.set_filter(Arc::new(|_cx, tools| {
            tools.into_iter().filter(|t| t.name != "hide").collect()
        }));

        let cx = RequestContext::new("t", None);
        let listing = registry.list(None, 10, &cx).unwrap();
        assert_eq!(listing.tools.len(), 1);
        assert_eq!(listing.tools[0].name, "keep");
    }

    #[tokio::test]
    async fn template_longest_static_prefix_wins() {
        let registry = ResourceRegistry::new();
        registry
            .add_template(
                ResourceTemplateInfo {
                    uri_template: "files://{path}".into(),
                    name: "any".into(),
                    description: None,
                    mime_type: None,
                },
                resource_fn(|uri, _params, _cx| async move {
                    Ok(ReadResourceResult {
                        contents: vec![Content::Resource {
                            uri,
                            text: Some("general".into()),
                            mime_type: None,
                        }],
                    })
                }),
            )
            .unwrap();
        registry
            .add_template(
                ResourceTemplateInfo {
                    uri_template: "files://docs/{name}".into(),
                    name: "docs".into(),
                    description: None,
                    mime_type: None,
                },
                resource_fn(|uri, params, _cx| async move {
                    assert_eq!(params["name"], "guide");
                    Ok(ReadResourceResult {
                        contents: vec![Content::Resource {
                            uri,
                            text: Some("specific".into()),
                            mime_type: None,
                        }],
                    })
                }),
            )
            .unwrap();

        let cx = RequestContext::new("t", None);
        let result = registry.read("files://docs/guide", cx).await.unwrap();
        let Content::Resource { text, .. } = &result.contents[0] else {
            panic!("expected resource content");
        };
        assert_eq!(text.as_deref(), Some("specific"));
    }

    #[tokio::test]
    async fn unknown_resource_is_invalid_params() {
        let registry = ResourceRegistry::new();
        let cx = RequestContext::new("t", None);
        let err = registry.read("nope://x", cx).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));
    }

    #[test]
    fn prompt_completion_uses_registered_callback() {
        let registry = PromptRegistry::new();
        let mut completions: HashMap<String, CompletionFn> = HashMap::new();
        completions.insert(
            "language".into(),
            Arc::new(|prefix: &str| {
                ["rust", "ruby", "python"]
                    .iter()
                    .filter(|l| l.starts_with(prefix))
                    .map(ToString::to_string)
                    .collect()
            }),
        );
        registry.insert_with_completions(
            PromptInfo {
                name: "review".into(),
                description: None,
                arguments: None,
            },
            prompt_fn(|_args, _cx| async {
                Ok(GetPromptResult {
                    description: None,
                    messages: vec![],
                })
            }),
            completions,
        );

        let completion = registry.complete("review", "language", "ru");
        assert_eq!(completion.values, vec!["rust", "ruby"]);
        let empty = registry.complete("review", "unknown", "x");
        assert!(empty.values.is_empty());
    }
}
