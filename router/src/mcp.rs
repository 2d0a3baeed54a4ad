//! MCP tool registry and dispatch: a uniform call surface over heterogeneous
//! tool providers, plus keyword/heuristic tool selection.
//!
//! Real MCP servers speak HTTP or MQTT to remote providers; wire-level
//! framing is out of scope here; `MCPServer` implementors in this crate are
//! hand-written in-process mocks standing in for that remote call, following
//! the same "one trait, several concrete backends" shape used by the printer
//! drivers.

use crate::types::ToolMode;
use async_trait::async_trait;
use neuron_turn::types::ToolSchema;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Question-word and real-time-data terms that trigger tool selection in
/// `auto` mode even without an exact keyword match.
const HEURISTIC_REALTIME_TERMS: &[&str] = &[
    "what is", "who is", "when did", "when is", "how much", "latest", "today", "current", "now", "price of",
];
/// Fabrication-domain terms triggering the fabrication/CAD tools in `auto` mode.
const HEURISTIC_FABRICATION_TERMS: &[&str] = &["print me", "3d print", "stl", "cad model", "fabricate"];

/// One entry in a tool catalog: name, description, JSON-schema parameters,
/// and the selection/safety metadata the registry and agent need.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name, e.g. `"web_search"`.
    pub name: String,
    /// Human-readable description, used both for display and as the
    /// embedding-similarity fallback's comparison text.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
    /// Keyword triggers for `auto` tool-mode selection.
    pub keyword_triggers: Vec<String>,
    /// Whether this tool requires `allow_paid` to be exposed/invoked.
    #[serde(default)]
    pub paid: bool,
    /// Whether this tool is hazardous and requires a confirmation round-trip
    /// before it actually executes (§4.8).
    #[serde(default)]
    pub requires_confirmation: bool,
}

impl ToolDefinition {
    fn new(name: &str, description: &str, input_schema: Value, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
            keyword_triggers: keywords.iter().map(|k| k.to_string()).collect(),
            paid: false,
            requires_confirmation: false,
        }
    }

    fn paid(mut self) -> Self {
        self.paid = true;
        self
    }

    fn hazardous(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }
}

/// Result of one `execute_tool` call. Produced by exactly one MCP server
/// call; never mutated after return.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolResult {
    /// Whether the call succeeded.
    pub success: bool,
    /// Structured result payload, present on success.
    pub data: Option<Value>,
    /// Error message, present on failure.
    pub error: Option<String>,
    /// Free-form metadata (timing, provider echo, ...).
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl ToolResult {
    /// A successful result carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// A failed result carrying `error`.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    /// Render the observation text fed back into the agent's next prompt.
    pub fn as_observation(&self) -> String {
        if self.success {
            self.data
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_else(|| "null".to_string())
        } else {
            format!("error: {}", self.error.as_deref().unwrap_or("unknown error"))
        }
    }
}

/// Uniform call surface over one tool provider. Implementations wrap a
/// remote HTTP or MQTT API in a production deployment; the core depends only
/// on this interface.
#[async_trait]
pub trait MCPServer: Send + Sync {
    /// Tools this server exposes.
    fn list_tools(&self) -> Vec<ToolDefinition>;

    /// Invoke one tool by its (server-local) name.
    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult;

    /// Fetch a named resource. Best-effort; failures are a plain `Err`
    /// string rather than a typed error, since callers treat this the same
    /// way as a tool failure.
    async fn fetch_resource(&self, uri: &str) -> Result<Value, String> {
        Err(format!("no resource at {uri}"))
    }

    /// Render a named prompt template, if this server offers any.
    async fn render_prompt(&self, _name: &str, _vars: &HashMap<String, String>) -> Option<String> {
        None
    }
}

/// Resolves tool name → (server, server-local tool name) once at build time
/// and dispatches calls through that binding.
pub struct McpRegistry {
    servers: HashMap<String, Arc<dyn MCPServer>>,
    bindings: HashMap<String, (String, String)>,
    catalog: Vec<ToolDefinition>,
}

impl McpRegistry {
    /// Build a registry from a set of `(server_id, server)` pairs, resolving
    /// every tool binding up front.
    pub fn new(servers: Vec<(&str, Arc<dyn MCPServer>)>) -> Self {
        let mut server_map = HashMap::new();
        let mut bindings = HashMap::new();
        let mut catalog = Vec::new();
        for (server_id, server) in servers {
            for tool in server.list_tools() {
                bindings.insert(tool.name.clone(), (server_id.to_string(), tool.name.clone()));
                catalog.push(tool);
            }
            server_map.insert(server_id.to_string(), server);
        }
        Self {
            servers: server_map,
            bindings,
            catalog,
        }
    }

    /// The full resolved tool catalog.
    pub fn catalog(&self) -> &[ToolDefinition] {
        &self.catalog
    }

    /// Look up a tool's definition by name.
    pub fn get_definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.catalog.iter().find(|t| t.name == name)
    }

    /// Dispatch a tool call through its resolved binding. A missing binding
    /// yields `{success:false, error:"Unknown tool"}` without contacting any
    /// server.
    pub async fn dispatch(&self, name: &str, args: Value) -> ToolResult {
        let Some((server_id, tool_name)) = self.bindings.get(name) else {
            return ToolResult::err("Unknown tool");
        };
        let Some(server) = self.servers.get(server_id) else {
            return ToolResult::err("Unknown tool");
        };
        server.execute_tool(tool_name, args).await
    }

    /// Select the tools exposed to a prompt under the given mode (§4.3).
    pub fn select(&self, prompt: &str, mode: ToolMode, allow_paid: bool) -> Vec<ToolDefinition> {
        let selected: Vec<ToolDefinition> = match mode {
            ToolMode::Off => Vec::new(),
            ToolMode::On => self.catalog.clone(),
            ToolMode::Auto => self.select_auto(prompt),
        };
        selected.into_iter().filter(|t| allow_paid || !t.paid).collect()
    }

    fn select_auto(&self, prompt: &str) -> Vec<ToolDefinition> {
        let lower = prompt.to_lowercase();
        let mut selected: Vec<ToolDefinition> = self
            .catalog
            .iter()
            .filter(|t| t.keyword_triggers.iter().any(|k| lower.contains(k)))
            .cloned()
            .collect();

        let realtime_hit = HEURISTIC_REALTIME_TERMS.iter().any(|t| lower.contains(t));
        let fabrication_hit = HEURISTIC_FABRICATION_TERMS.iter().any(|t| lower.contains(t));

        if realtime_hit {
            self.add_if_absent(&mut selected, "web_search");
        }
        if fabrication_hit {
            self.add_if_absent(&mut selected, "segment_mesh");
            self.add_if_absent(&mut selected, "generate_cad_model");
        }
        selected
    }

    fn add_if_absent(&self, selected: &mut Vec<ToolDefinition>, name: &str) {
        if selected.iter().any(|t| t.name == name) {
            return;
        }
        if let Some(def) = self.get_definition(name) {
            selected.push(def.clone());
        }
    }
}

/// Render a tool catalog as provider-neutral function-calling schemas,
/// for a one-shot local call that offers tools without running the full
/// ReAct loop (§4.1 step 5).
pub fn tool_schemas(tools: &[ToolDefinition]) -> Vec<ToolSchema> {
    tools
        .iter()
        .map(|def| ToolSchema {
            name: def.name.clone(),
            description: def.description.clone(),
            input_schema: def.input_schema.clone(),
        })
        .collect()
}

/// Compose `image_search` → `image_filter` → `store_selection` for one
/// vision target, returning a markdown list of `(title, download_url,
/// source)` or `None` if the pipeline produced nothing.
pub async fn run_vision_pipeline(registry: &McpRegistry, query: &str, session_id: &str) -> Option<String> {
    let search = registry
        .dispatch("image_search", json!({"query": query, "max_results": 8}))
        .await;
    let images = search.data?.get("images")?.clone();

    let filtered = registry
        .dispatch(
            "image_filter",
            json!({"query": query, "images": images, "min_score": 0.35}),
        )
        .await;
    let images = filtered.data?.get("images")?.clone();
    let top3: Vec<Value> = images.as_array()?.iter().take(3).cloned().collect();
    if top3.is_empty() {
        return None;
    }

    let _ = registry
        .dispatch("store_selection", json!({"session_id": session_id, "images": top3}))
        .await;

    let mut md = String::new();
    for image in &top3 {
        let title = image.get("title").and_then(Value::as_str).unwrap_or("untitled");
        let url = image.get("download_url").and_then(Value::as_str).unwrap_or("");
        let source = image.get("source").and_then(Value::as_str).unwrap_or("unknown");
        md.push_str(&format!("- [{title}]({url}) — {source}\n"));
    }
    Some(md)
}

/// Web search / retrieval. Grounds `web_search` and the realtime-data path.
pub struct WebServer;

#[async_trait]
impl MCPServer for WebServer {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "web_search",
            "Search the web for current information",
            json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
            &["search", "look up", "news", "latest", "today", "current"],
        )]
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        match name {
            "web_search" => {
                let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
                ToolResult::ok(json!({"query": query, "results": [
                    {"title": format!("Result for {query}"), "snippet": "simulated search result", "url": "https://example.com"},
                ]}))
            }
            other => ToolResult::err(format!("unknown tool on web server: {other}")),
        }
    }
}

/// Delegates to a larger local model for deeper reasoning on a sub-query.
pub struct ReasonServer;

#[async_trait]
impl MCPServer for ReasonServer {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "reason_with_f16",
            "Delegate a sub-question to the full-precision local model",
            json!({"type": "object", "properties": {"query": {"type": "string"}, "context": {"type": "string"}}, "required": ["query"]}),
            &["think harder", "reason about", "explain deeply"],
        )]
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        match name {
            "reason_with_f16" => {
                let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
                ToolResult::ok(json!({"answer": format!("(f16) reasoned answer for: {query}")}))
            }
            other => ToolResult::err(format!("unknown tool on reason server: {other}")),
        }
    }
}

/// CAD model generation from a text/image prompt. Paid: mesh generation is
/// compute-expensive and gated the same way deep research is.
pub struct CadServer;

#[async_trait]
impl MCPServer for CadServer {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "generate_cad_model",
            "Generate a CAD model artifact from a text prompt and optional references",
            json!({"type": "object", "properties": {
                "prompt": {"type": "string"}, "references": {"type": "array"},
                "image_refs": {"type": "array"}, "mode": {"type": "string"}
            }, "required": ["prompt"]}),
            &["design a", "cad model", "generate a model"],
        )
        .paid()]
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        match name {
            "generate_cad_model" => {
                let prompt = args.get("prompt").and_then(Value::as_str).unwrap_or_default();
                ToolResult::ok(json!({"artifact_uri": format!("cad://generated/{}", prompt.len())}))
            }
            other => ToolResult::err(format!("unknown tool on cad server: {other}")),
        }
    }
}

/// Image search / filter / selection-storage, composed by [`run_vision_pipeline`].
pub struct VisionServer;

#[async_trait]
impl MCPServer for VisionServer {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "image_search",
                "Search for images matching a query",
                json!({"type": "object", "properties": {"query": {"type": "string"}, "max_results": {"type": "integer"}}, "required": ["query"]}),
                &["photo of", "picture of", "image of"],
            ),
            ToolDefinition::new(
                "image_filter",
                "Filter a set of image search results by relevance score",
                json!({"type": "object", "properties": {"query": {"type": "string"}, "images": {"type": "array"}, "min_score": {"type": "number"}}, "required": ["query", "images"]}),
                &[],
            ),
            ToolDefinition::new(
                "store_selection",
                "Persist the selected images against a session",
                json!({"type": "object", "properties": {"session_id": {"type": "string"}, "images": {"type": "array"}}, "required": ["session_id", "images"]}),
                &[],
            ),
        ]
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        match name {
            "image_search" => {
                let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
                let max_results = args.get("max_results").and_then(Value::as_u64).unwrap_or(8);
                let images: Vec<Value> = (0..max_results.min(8))
                    .map(|i| {
                        json!({
                            "title": format!("{query} #{i}"),
                            "download_url": format!("https://example.com/{query}/{i}.jpg"),
                            "source": "example-gallery",
                            "score": 1.0 - (i as f64) * 0.1,
                        })
                    })
                    .collect();
                ToolResult::ok(json!({"images": images}))
            }
            "image_filter" => {
                let min_score = args.get("min_score").and_then(Value::as_f64).unwrap_or(0.35);
                let images = args.get("images").cloned().unwrap_or_else(|| json!([]));
                let filtered: Vec<Value> = images
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|img| img.get("score").and_then(Value::as_f64).unwrap_or(0.0) >= min_score)
                    .collect();
                ToolResult::ok(json!({"images": filtered}))
            }
            "store_selection" => ToolResult::ok(json!({"stored": true})),
            other => ToolResult::err(format!("unknown tool on vision server: {other}")),
        }
    }
}

/// Smart-home device control and discovery. Carries the two hazardous tools
/// named directly in the spec (`lock.unlock`, `power.enable`).
pub struct HomeServer;

#[async_trait]
impl MCPServer for HomeServer {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "control_device",
                "Send a control command to a home device",
                json!({"type": "object", "properties": {"entity_id": {"type": "string"}, "command": {"type": "string"}}, "required": ["entity_id", "command"]}),
                &["turn on", "turn off", "set the"],
            ),
            ToolDefinition::new(
                "get_entity_state",
                "Read a home device's current state",
                json!({"type": "object", "properties": {"entity_id": {"type": "string"}}, "required": ["entity_id"]}),
                &["is the", "status of"],
            ),
            ToolDefinition::new(
                "list_entities",
                "List known home devices",
                json!({"type": "object", "properties": {}}),
                &["what devices", "list devices"],
            ),
            ToolDefinition::new(
                "lock.unlock",
                "Unlock a physical lock",
                json!({"type": "object", "properties": {"entity_id": {"type": "string"}}, "required": ["entity_id"]}),
                &["unlock the"],
            )
            .hazardous(),
            ToolDefinition::new(
                "power.enable",
                "Energize a powered circuit (e.g. a welding bay)",
                json!({"type": "object", "properties": {"entity_id": {"type": "string"}}, "required": ["entity_id"]}),
                &["power on", "enable power"],
            )
            .hazardous(),
        ]
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        let entity_id = args.get("entity_id").and_then(Value::as_str).unwrap_or("unknown");
        match name {
            "control_device" => ToolResult::ok(json!({"entity_id": entity_id, "acknowledged": true})),
            "get_entity_state" => ToolResult::ok(json!({"entity_id": entity_id, "state": "on"})),
            "list_entities" => ToolResult::ok(json!({"entities": [entity_id]})),
            "lock.unlock" => ToolResult::ok(json!({"entity_id": entity_id, "unlocked": true})),
            "power.enable" => ToolResult::ok(json!({"entity_id": entity_id, "powered": true})),
            other => ToolResult::err(format!("unknown tool on home server: {other}")),
        }
    }
}

/// Vector-memory recall and write, fronting the conversation memory
/// adapter's remote half.
pub struct MemoryServer;

#[async_trait]
impl MCPServer for MemoryServer {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "store_memory",
                "Persist a memory entry",
                json!({"type": "object", "properties": {"content": {"type": "string"}}, "required": ["content"]}),
                &["remember that", "note that"],
            ),
            ToolDefinition::new(
                "recall_memory",
                "Recall memory entries relevant to a query",
                json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
                &["do you remember", "recall"],
            ),
            ToolDefinition::new(
                "delete_memory",
                "Delete a memory entry",
                json!({"type": "object", "properties": {"key": {"type": "string"}}, "required": ["key"]}),
                &["forget that"],
            ),
        ]
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        match name {
            "store_memory" => ToolResult::ok(json!({"stored": true})),
            "recall_memory" => {
                let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
                ToolResult::ok(json!({"query": query, "memories": []}))
            }
            "delete_memory" => ToolResult::ok(json!({"deleted": true})),
            other => ToolResult::err(format!("unknown tool on memory server: {other}")),
        }
    }
}

/// Mesh segmentation and printer discovery for the fabrication pipeline.
pub struct FabricationServer;

#[async_trait]
impl MCPServer for FabricationServer {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "segment_mesh",
                "Segment an oversized mesh into printable pieces with joints",
                json!({"type": "object", "properties": {"mesh_uri": {"type": "string"}}, "required": ["mesh_uri"]}),
                &["segment the model", "split the mesh"],
            ),
            ToolDefinition::new(
                "check_segmentation",
                "Check whether a mesh needs segmentation for the target printer",
                json!({"type": "object", "properties": {"mesh_uri": {"type": "string"}, "printer_id": {"type": "string"}}, "required": ["mesh_uri", "printer_id"]}),
                &["will it fit", "does it fit"],
            ),
            ToolDefinition::new(
                "list_printers",
                "List known printers and their capability envelopes",
                json!({"type": "object", "properties": {}}),
                &["what printers", "list printers"],
            ),
        ]
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        match name {
            "segment_mesh" => {
                let mesh_uri = args.get("mesh_uri").and_then(Value::as_str).unwrap_or_default();
                ToolResult::ok(json!({"mesh_uri": mesh_uri, "segments": 2}))
            }
            "check_segmentation" => ToolResult::ok(json!({"needs_segmentation": false})),
            "list_printers" => ToolResult::ok(json!({"printers": []})),
            other => ToolResult::err(format!("unknown tool on fabrication server: {other}")),
        }
    }
}

/// Generic device-command broker.
pub struct BrokerServer;

#[async_trait]
impl MCPServer for BrokerServer {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "execute_command",
                "Execute a named broker command",
                json!({"type": "object", "properties": {"command": {"type": "string"}, "args": {"type": "object"}}, "required": ["command"]}),
                &["run the command"],
            ),
            ToolDefinition::new(
                "list_commands",
                "List broker commands available",
                json!({"type": "object", "properties": {}}),
                &["what commands"],
            ),
        ]
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        match name {
            "execute_command" => {
                let command = args.get("command").and_then(Value::as_str).unwrap_or_default();
                ToolResult::ok(json!({"command": command, "executed": true}))
            }
            "list_commands" => ToolResult::ok(json!({"commands": []})),
            other => ToolResult::err(format!("unknown tool on broker server: {other}")),
        }
    }
}

/// New-device discovery and pairing approval.
pub struct DiscoveryServer;

#[async_trait]
impl MCPServer for DiscoveryServer {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "discover_devices",
                "Scan for new unpaired devices",
                json!({"type": "object", "properties": {}}),
                &["find new devices", "discover devices"],
            ),
            ToolDefinition::new(
                "approve_device",
                "Approve pairing with a discovered device",
                json!({"type": "object", "properties": {"device_id": {"type": "string"}}, "required": ["device_id"]}),
                &["pair with", "approve device"],
            ),
        ]
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        match name {
            "discover_devices" => ToolResult::ok(json!({"devices": []})),
            "approve_device" => {
                let device_id = args.get("device_id").and_then(Value::as_str).unwrap_or_default();
                ToolResult::ok(json!({"device_id": device_id, "approved": true}))
            }
            other => ToolResult::err(format!("unknown tool on discovery server: {other}")),
        }
    }
}

/// Deep web research: page fetch plus citation extraction. Paid — this is
/// the spec's worked example of a paid tool filtered out of `auto` selection
/// unless the caller authorized it.
pub struct ResearchServer;

#[async_trait]
impl MCPServer for ResearchServer {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "fetch_webpage",
                "Fetch and extract the text content of a webpage",
                json!({"type": "object", "properties": {"url": {"type": "string"}}, "required": ["url"]}),
                &["deep research", "research this"],
            )
            .paid(),
            ToolDefinition::new(
                "get_citations",
                "Extract citation metadata for a fetched page",
                json!({"type": "object", "properties": {"url": {"type": "string"}}, "required": ["url"]}),
                &["cite your sources"],
            )
            .paid(),
        ]
    }

    async fn execute_tool(&self, name: &str, args: Value) -> ToolResult {
        match name {
            "fetch_webpage" => {
                let url = args.get("url").and_then(Value::as_str).unwrap_or_default();
                ToolResult::ok(json!({"url": url, "text": "simulated page content"}))
            }
            "get_citations" => {
                let url = args.get("url").and_then(Value::as_str).unwrap_or_default();
                ToolResult::ok(json!({"url": url, "citations": []}))
            }
            other => ToolResult::err(format!("unknown tool on research server: {other}")),
        }
    }
}

/// Build a registry over the full mock catalog named in the spec.
pub fn default_registry() -> McpRegistry {
    McpRegistry::new(vec![
        ("web", Arc::new(WebServer)),
        ("reason", Arc::new(ReasonServer)),
        ("cad", Arc::new(CadServer)),
        ("vision", Arc::new(VisionServer)),
        ("home", Arc::new(HomeServer)),
        ("memory", Arc::new(MemoryServer)),
        ("fabrication", Arc::new(FabricationServer)),
        ("broker", Arc::new(BrokerServer)),
        ("discovery", Arc::new(DiscoveryServer)),
        ("research", Arc::new(ResearchServer)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_mode_selects_nothing() {
        let registry = default_registry();
        let selected = registry.select("search for cats", ToolMode::Off, true);
        assert!(selected.is_empty());
    }

    #[test]
    fn on_mode_selects_full_catalog_minus_paid() {
        let registry = default_registry();
        let selected = registry.select("hello", ToolMode::On, false);
        assert!(selected.iter().all(|t| !t.paid));
        assert!(selected.len() < registry.catalog().len());
    }

    #[test]
    fn auto_mode_keyword_trigger() {
        let registry = default_registry();
        let selected = registry.select("what's the latest news today", ToolMode::Auto, false);
        assert!(selected.iter().any(|t| t.name == "web_search"));
    }

    #[test]
    fn auto_mode_filters_paid_tools_without_allow_paid() {
        let registry = default_registry();
        let selected = registry.select("please do deep research on this", ToolMode::Auto, false);
        assert!(selected.iter().all(|t| t.name != "fetch_webpage"));
    }

    #[test]
    fn auto_mode_includes_paid_tools_with_allow_paid() {
        let registry = default_registry();
        let selected = registry.select("please do deep research on this", ToolMode::Auto, true);
        assert!(selected.iter().any(|t| t.name == "fetch_webpage"));
    }

    #[tokio::test]
    async fn dispatch_unknown_tool_is_uniform_error() {
        let registry = default_registry();
        let result = registry.dispatch("does_not_exist", json!({})).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Unknown tool"));
    }

    #[tokio::test]
    async fn dispatch_known_tool_reaches_its_server() {
        let registry = default_registry();
        let result = registry.dispatch("web_search", json!({"query": "rust async"})).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn vision_pipeline_produces_markdown_list() {
        let registry = default_registry();
        let md = run_vision_pipeline(&registry, "sunset", "session-1").await.unwrap();
        assert!(md.starts_with("- ["));
        assert!(md.lines().count() <= 3);
    }

    #[test]
    fn hazardous_tools_are_flagged() {
        let registry = default_registry();
        let unlock = registry.get_definition("lock.unlock").unwrap();
        assert!(unlock.requires_confirmation);
        let power = registry.get_definition("power.enable").unwrap();
        assert!(power.requires_confirmation);
    }
}
