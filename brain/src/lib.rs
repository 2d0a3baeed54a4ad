#![deny(missing_docs)]
//! Brain: the orchestrator wiring that builds a [`router::RoutingEngine`]
//! and a [`fab::ParallelScheduler`] from configuration and exposes the two
//! JSON-shaped contracts the conversational surface and the print-job
//! surface are built against.

use router::{
    AlwaysAllow, AuditStore, Cache, ConversationStore, CostTracker, InMemoryAuditStore, InMemoryCache,
    InMemoryMemoryAdapter, MemoryAdapter, PermissionManager, RoutingConfig, RoutingEngine, RoutingEngineDeps,
    RoutingRequest, Tier, ToolMode,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use router::{RouterError, RoutingResult};

/// Errors the orchestrator can return.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BrainError {
    /// A configuration file or flag was malformed.
    #[error("config error: {0}")]
    Config(String),

    /// Reading a configuration file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing a configuration file as JSON failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The routing engine returned an error.
    #[error("routing error: {0}")]
    Router(#[from] router::RouterError),

    /// The print-job scheduler returned an error.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] fab::SchedulerError),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Top-level configuration: the routing engine's layered config plus the
/// API credentials needed to build its cloud providers.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BrainConfig {
    /// Routing engine configuration (§1A/§6A/§9A).
    #[serde(default)]
    pub routing: RoutingConfig,
    /// API key for the WEB-tier provider, if cloud escalation is wired up.
    #[serde(default)]
    pub openai_api_key: Option<String>,
    /// API key for the FRONTIER-tier provider, if cloud escalation is wired up.
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
}

impl BrainConfig {
    /// Load configuration from a JSON file, or fall back to [`Default`] if
    /// `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, BrainError> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&text)?)
            }
        }
    }
}

/// One conversational turn to route.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Identifies the conversation this turn belongs to.
    pub conversation_id: String,
    /// Unique id for this turn.
    pub request_id: String,
    /// The user's message text (raw; inline syntax is parsed internally).
    pub user_message: String,
    /// The human behind the request, if known.
    pub user_id: Option<String>,
    /// Run the bounded ReAct tool agent instead of a single local call.
    pub use_agent: bool,
    /// Whether escalation to a paid tier is authorized.
    pub allow_paid: bool,
    /// Force a specific tier, bypassing confidence-based escalation.
    pub force_tier: Option<Tier>,
    /// Short phrases describing images to search for and attach.
    pub vision_targets: Vec<String>,
}

impl RunRequest {
    /// Build a request with only the required fields set.
    pub fn new(conversation_id: impl Into<String>, request_id: impl Into<String>, user_message: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            request_id: request_id.into(),
            user_message: user_message.into(),
            user_id: None,
            use_agent: false,
            allow_paid: false,
            force_tier: None,
            vision_targets: Vec::new(),
        }
    }
}

/// The §6 non-streaming response contract.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RunResponse {
    /// Echoes the request's conversation id.
    pub conversation_id: String,
    /// The final answer text (or the confirmation prompt, if one is pending).
    pub output: String,
    /// Routing metadata, omitted when the turn short-circuited into a
    /// confirmation prompt rather than actually routing.
    pub routing: Option<RoutingInfo>,
    /// Set when this turn is blocked on a hazardous tool's confirmation.
    #[serde(default)]
    pub requires_confirmation: bool,
    /// The exact phrase the caller must reply with to proceed.
    #[serde(default)]
    pub confirmation_phrase: Option<String>,
    /// The tool awaiting confirmation.
    #[serde(default)]
    pub pending_tool: Option<String>,
    /// Coarse hazard category of the pending tool.
    #[serde(default)]
    pub hazard_class: Option<String>,
}

/// Which tier served the turn, and how confident/expensive/slow it was.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RoutingInfo {
    /// Which tier served the turn.
    pub tier: String,
    /// Heuristic confidence in `[0, 1]`.
    pub confidence: f64,
    /// Wall-clock latency for the turn.
    pub latency_ms: u64,
    /// Whether the turn was served from cache.
    pub cached: bool,
}

/// The orchestrator: a built [`RoutingEngine`] plus the print-job scheduler,
/// ready to serve turns.
pub struct Brain {
    engine: Arc<RoutingEngine>,
    scheduler: Arc<fab::ParallelScheduler>,
}

impl Brain {
    /// Build the orchestrator from configuration and a set of printer
    /// drivers (possibly empty — a deployment with no printers still routes
    /// conversational turns normally).
    pub fn new(
        config: BrainConfig,
        printers: std::collections::HashMap<String, Arc<dyn fab::PrinterDriver>>,
    ) -> Result<Self, BrainError> {
        let local: Arc<dyn router::DynProvider> =
            Arc::new(router::BoxedProvider(neuron_provider_ollama::OllamaProvider::new()));

        let web: Option<Arc<dyn router::DynProvider>> = config.openai_api_key.clone().map(|key| {
            Arc::new(router::BoxedProvider(neuron_provider_openai::OpenAIProvider::new(key)))
                as Arc<dyn router::DynProvider>
        });

        let frontier: Option<Arc<dyn router::DynProvider>> = config.anthropic_api_key.clone().map(|key| {
            Arc::new(router::BoxedProvider(neuron_provider_anthropic::AnthropicProvider::new(key)))
                as Arc<dyn router::DynProvider>
        });

        let engine = RoutingEngine::new(RoutingEngineDeps {
            local,
            web,
            frontier,
            summarizer: None,
            registry: Arc::new(router::default_registry()),
            cache: Arc::new(InMemoryCache::new()) as Arc<dyn Cache>,
            audit: Arc::new(InMemoryAuditStore::new()) as Arc<dyn AuditStore>,
            cost: Arc::new(CostTracker::new()),
            conversations: Arc::new(ConversationStore::new()),
            memory: Arc::new(InMemoryMemoryAdapter::new()) as Arc<dyn MemoryAdapter>,
            permission: Arc::new(AlwaysAllow) as Arc<dyn PermissionManager>,
            config: config.routing,
        });

        let scheduler = fab::ParallelScheduler::new(printers, fab::OptimizerConfig::default());

        Ok(Self {
            engine: Arc::new(engine),
            scheduler: Arc::new(scheduler),
        })
    }

    /// Route one conversational turn, mapping the routing result (or a
    /// confirmation hold) onto the §6 response contract.
    pub async fn run(&self, request: RunRequest) -> Result<RunResponse, BrainError> {
        let conversation_id = request.conversation_id.clone();
        let routing_request = RoutingRequest {
            conversation_id: request.conversation_id,
            request_id: request.request_id,
            prompt: request.user_message,
            user_id: request.user_id,
            force_tier: request.force_tier,
            freshness_required: false,
            model_hint: None,
            provider_override: None,
            use_agent: request.use_agent,
            tool_mode: ToolMode::Auto,
            allow_paid: request.allow_paid,
            vision_targets: request.vision_targets,
        };

        let result = self.engine.route(routing_request).await?;
        Ok(to_response(conversation_id, result))
    }

    /// The print-job scheduler, for callers that also dispatch fabrication
    /// tool calls against it directly (outside the routing engine).
    pub fn scheduler(&self) -> &Arc<fab::ParallelScheduler> {
        &self.scheduler
    }

    /// The underlying routing engine, for callers that need direct access
    /// (e.g. to stream a turn via `route_stream`).
    pub fn engine(&self) -> &Arc<RoutingEngine> {
        &self.engine
    }
}

fn to_response(conversation_id: String, result: RoutingResult) -> RunResponse {
    let requires_confirmation = result
        .metadata
        .get("requires_confirmation")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    if requires_confirmation {
        return RunResponse {
            conversation_id,
            output: result.output,
            routing: None,
            requires_confirmation: true,
            confirmation_phrase: meta_str(&result, "confirmation_phrase"),
            pending_tool: meta_str(&result, "pending_tool"),
            hazard_class: meta_str(&result, "hazard_class"),
        };
    }

    RunResponse {
        conversation_id,
        output: result.output.clone(),
        routing: Some(RoutingInfo {
            tier: result.tier.as_str().to_string(),
            confidence: result.confidence,
            latency_ms: result.latency_ms,
            cached: result.cached,
        }),
        requires_confirmation: false,
        confirmation_phrase: None,
        pending_tool: None,
        hazard_class: None,
    }
}

fn meta_str(result: &RoutingResult, key: &str) -> Option<String> {
    result.metadata.get(key).and_then(|v| v.as_str()).map(str::to_string)
}
