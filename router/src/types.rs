//! Core data types shared across the routing engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which backend tier served (or should serve) a request.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// On-device quantized model. Cheapest, least capable.
    Local,
    /// Cloud web-grounded retrieval/search provider.
    Web,
    /// Large cloud reasoning model. Most expensive.
    Frontier,
}

impl Tier {
    /// Static per-call unit cost used for cost bookkeeping when a provider
    /// doesn't report an exact figure. Mirrors the original's per-tier
    /// cost table; these are relative weights, not billed dollar amounts.
    pub fn unit_cost(&self) -> Decimal {
        match self {
            Tier::Local => Decimal::new(1, 4),      // 0.0001
            Tier::Web => Decimal::new(2, 3),        // 0.002
            Tier::Frontier => Decimal::new(6, 2),   // 0.06
        }
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Local => "local",
            Tier::Web => "web",
            Tier::Frontier => "frontier",
        }
    }
}

/// Which tool-selection mode to apply for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolMode {
    /// Select tools heuristically based on the prompt.
    Auto,
    /// Expose the full catalog regardless of prompt content.
    On,
    /// Expose no tools.
    Off,
}

impl Default for ToolMode {
    fn default() -> Self {
        ToolMode::Auto
    }
}

/// One routing request: everything needed to decide a tier and produce an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRequest {
    /// Identifies the conversation this turn belongs to.
    pub conversation_id: String,
    /// Unique identifier for this specific turn. Must be unique process-wide
    /// for the lifetime of the audit log.
    pub request_id: String,
    /// The (already-enriched) prompt text.
    pub prompt: String,
    /// Identifies the human behind the request, if known.
    pub user_id: Option<String>,
    /// Caller-forced tier, bypassing confidence-based escalation.
    pub force_tier: Option<Tier>,
    /// When true, cache lookups/writes and force escalation consideration.
    #[serde(default)]
    pub freshness_required: bool,
    /// Caller hint for which concrete model to use within a tier.
    pub model_hint: Option<String>,
    /// Cloud provider override parsed from an `@<provider>:` prefix (§6).
    #[serde(default)]
    pub provider_override: Option<String>,
    /// Run the bounded ReAct loop instead of a single local call.
    #[serde(default)]
    pub use_agent: bool,
    /// Tool exposure policy for this turn.
    #[serde(default)]
    pub tool_mode: ToolMode,
    /// Whether escalation to a paid tier is authorized for this turn.
    #[serde(default)]
    pub allow_paid: bool,
    /// Short phrases describing images to search for and attach.
    #[serde(default)]
    pub vision_targets: Vec<String>,
}

impl RoutingRequest {
    /// Construct a request with only the required fields set; everything
    /// else takes its default.
    pub fn new(
        conversation_id: impl Into<String>,
        request_id: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            request_id: request_id.into(),
            prompt: prompt.into(),
            user_id: None,
            force_tier: None,
            freshness_required: false,
            model_hint: None,
            provider_override: None,
            use_agent: false,
            tool_mode: ToolMode::Auto,
            allow_paid: false,
            vision_targets: Vec::new(),
        }
    }
}

/// Outcome of routing one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingResult {
    /// The final text shown to the caller.
    pub output: String,
    /// Which tier actually produced (or would have produced) `output`.
    pub tier: Tier,
    /// Heuristic confidence in the answer, in [0, 1].
    pub confidence: f64,
    /// Wall-clock time spent producing this result.
    pub latency_ms: u64,
    /// Whether this result was served from cache.
    #[serde(default)]
    pub cached: bool,
    /// Free-form bookkeeping: provider, model, stop reason, tool trace, etc.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RoutingResult {
    /// Build a result with an empty metadata map.
    pub fn new(output: impl Into<String>, tier: Tier, confidence: f64, latency_ms: u64) -> Self {
        Self {
            output: output.into(),
            tier,
            confidence,
            latency_ms,
            cached: false,
            metadata: HashMap::new(),
        }
    }

    /// Set a metadata entry, builder-style.
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// One iteration of the ReAct tool agent's reason/act/observe loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStep {
    /// The model's reasoning text for this iteration, if it emitted any
    /// alongside its tool call(s).
    pub thought: Option<String>,
    /// Tool invoked this iteration, or `None` if the model produced a
    /// final answer instead of a tool call.
    pub action: Option<String>,
    /// Arguments passed to `action`.
    pub action_input: Option<serde_json::Value>,
    /// Stringified tool result, or the blocked/error message.
    pub observation: Option<String>,
}

impl AgentStep {
    /// Build a tool-call step (thought + action + observation all present
    /// in the common case).
    pub fn tool_call(
        thought: Option<String>,
        action: impl Into<String>,
        action_input: serde_json::Value,
        observation: impl Into<String>,
    ) -> Self {
        Self {
            thought,
            action: Some(action.into()),
            action_input: Some(action_input),
            observation: Some(observation.into()),
        }
    }
}

/// Outcome of a bounded ReAct agent run (see `crate::agent::ReactAgent::run`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    /// The agent's final answer text.
    pub answer: String,
    /// One record per loop iteration that made a tool call.
    pub steps: Vec<AgentStep>,
    /// Number of loop iterations actually used.
    pub iterations: u32,
    /// Whether the loop ended with a natural final answer.
    pub success: bool,
    /// Whether the loop was cut short by the iteration budget.
    pub truncated: bool,
    /// Why the loop stopped (`"final_answer"`, `"iteration_limit"`, ...).
    pub stop_reason: String,
    /// Set when the loop ended abnormally but still produced a usable answer.
    pub error: Option<String>,
}

/// One chunk of a streamed routing result.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RouteChunk {
    /// Incremental output text.
    Delta {
        /// Text produced since the last chunk.
        delta: String,
    },
    /// Incremental "thinking"/reasoning text, if the provider exposes it.
    DeltaThinking {
        /// Reasoning text produced since the last chunk.
        delta_thinking: String,
    },
    /// Terminal chunk carrying the finalized result.
    Done {
        /// The completed routing result.
        routing_result: RoutingResult,
    },
    /// Terminal chunk signalling the stream failed.
    Error {
        /// Human-readable error description.
        error: String,
    },
}
