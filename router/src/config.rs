//! Layered routing configuration: typed sub-structs loaded from an optional
//! JSON file, falling back to [`Default`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which on-device model format backs the LOCAL tier. Generalizes the
/// original's GGUF-quant-vs-MLX format-detection step into a hint the
/// wiring layer (not the routing engine) acts on — which concrete
/// `Provider` serves LOCAL is a deployment decision, not a routing concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    /// GGUF-quantized weights (llama.cpp-style backends).
    Gguf,
    /// MLX-format weights (Apple Silicon backends).
    Mlx,
}

impl Default for ModelFormat {
    fn default() -> Self {
        ModelFormat::Gguf
    }
}

/// Confidence thresholds governing escalation decisions (§4.1 step 6, §9A(b)).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Below this, a local result is considered low-confidence and becomes
    /// an escalation candidate. Defaults to 0.85, matching the "local
    /// produced any text" heuristic: plain local text never auto-escalates
    /// on confidence alone.
    pub local_confidence_threshold: f64,
    /// Default confidence assigned to a WEB-tier result.
    pub web_default: f64,
    /// Default confidence assigned to a FRONTIER-tier result.
    pub frontier_default: f64,
    /// Confidence assigned to a successful agent run.
    pub agent_success: f64,
    /// Confidence assigned to a truncated/failed agent run.
    pub agent_failure: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            local_confidence_threshold: 0.85,
            web_default: 0.6,
            frontier_default: 0.9,
            agent_success: 0.9,
            agent_failure: 0.5,
        }
    }
}

/// Per-suspension-point timeouts (§5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Default MCP tool call timeout, overridable per tool.
    #[serde(with = "duration_secs")]
    pub mcp_tool: Duration,
    /// Printer status poll timeout.
    #[serde(with = "duration_secs")]
    pub printer_status: Duration,
    /// Printer G-code upload timeout.
    #[serde(with = "duration_secs")]
    pub printer_upload: Duration,
    /// Vector-store call timeout.
    #[serde(with = "duration_secs")]
    pub vector_store: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            mcp_tool: Duration::from_secs(60),
            printer_status: Duration::from_secs(5),
            printer_upload: Duration::from_secs(300),
            vector_store: Duration::from_secs(30),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Agent-loop bounds (§4.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum ReAct loop iterations before forced truncation.
    pub max_iterations: u32,
    /// TTL for a pending confirmation before it's silently cleared (§4.8).
    #[serde(with = "duration_secs")]
    pub confirmation_ttl: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            confirmation_ttl: Duration::from_secs(300),
        }
    }
}

/// Case-insensitive whole-word token that, when present anywhere in a
/// prompt, sets `allow_paid=true` and is stripped before routing (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineConfig {
    /// The override keyword, default `"override"`.
    pub override_keyword: String,
}

impl Default for InlineConfig {
    fn default() -> Self {
        Self {
            override_keyword: "override".to_string(),
        }
    }
}

/// Top-level configuration for the routing engine, agent, and cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Which local model backend format is in use.
    #[serde(default)]
    pub model_format: ModelFormat,
    /// Escalation and tier confidence knobs.
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    /// Per-suspension-point timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// ReAct agent loop bounds.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Inline-syntax parsing knobs.
    #[serde(default)]
    pub inline: InlineConfig,
    /// Whether the semantic/exact cache is enabled at all.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// Whether prompt/response bodies may be captured by tracing hooks.
    /// Off by default (§1A).
    #[serde(default)]
    pub capture_content: bool,
}

fn default_true() -> bool {
    true
}

impl RoutingConfig {
    /// Load configuration from a JSON file, or fall back to [`Default`] if
    /// `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, crate::error::RouterError> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|err| crate::error::RouterError::InvalidRequest(format!("reading config: {err}")))?;
                serde_json::from_str(&text)
                    .map_err(|err| crate::error::RouterError::InvalidRequest(format!("parsing config: {err}")))
            }
        }
    }
}
