//! Routing engine (§4.1): the tiered dispatch pipeline — cache short-circuit,
//! local-first call, confidence-gated escalation, and the persistence step
//! that follows every turn.

use crate::agent::{AgentOutcome, ReactToolAgent};
use crate::audit::{AuditRow, AuditStore, CostTracker};
use crate::cache::{fingerprint, is_eligible, Cache, CacheRecord};
use crate::config::RoutingConfig;
use crate::confirmation::{self, PendingConfirmation};
use crate::conversation::{self, ConversationStore, MemoryAdapter};
use crate::error::RouterError;
use crate::inline::parse_inline_syntax;
use crate::mcp::{tool_schemas, McpRegistry};
use crate::permission::PermissionManager;
use crate::provider::DynProvider;
use crate::types::{RouteChunk, RoutingRequest, RoutingResult, Tier};
use neuron_turn::types::{ContentPart, ProviderMessage, ProviderRequest, Role, StopReason};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Which provider a request to an escalatable tier should use. LOCAL always
/// has a provider; WEB/FRONTIER are optional — a deployment without cloud
/// credentials simply never escalates.
pub struct RoutingEngine {
    local: Arc<dyn DynProvider>,
    web: Option<Arc<dyn DynProvider>>,
    frontier: Option<Arc<dyn DynProvider>>,
    summarizer: Option<Arc<dyn DynProvider>>,
    registry: Arc<McpRegistry>,
    cache: Arc<dyn Cache>,
    audit: Arc<dyn AuditStore>,
    cost: Arc<CostTracker>,
    conversations: Arc<ConversationStore>,
    memory: Arc<dyn MemoryAdapter>,
    permission: Arc<dyn PermissionManager>,
    config: RoutingConfig,
}

/// Everything the engine needs wired in at construction. Grouped into one
/// struct so adding a knob doesn't change the constructor's arity.
pub struct RoutingEngineDeps {
    /// The LOCAL-tier model provider. Always required.
    pub local: Arc<dyn DynProvider>,
    /// The WEB-tier model provider, if configured.
    pub web: Option<Arc<dyn DynProvider>>,
    /// The FRONTIER-tier model provider, if configured.
    pub frontier: Option<Arc<dyn DynProvider>>,
    /// Provider used to condense agent transcripts (§9A(c)); defaults to
    /// `local` when unset.
    pub summarizer: Option<Arc<dyn DynProvider>>,
    /// The MCP tool registry.
    pub registry: Arc<McpRegistry>,
    /// The semantic/exact cache.
    pub cache: Arc<dyn Cache>,
    /// The audit log sink.
    pub audit: Arc<dyn AuditStore>,
    /// Running cost/SLO counters.
    pub cost: Arc<CostTracker>,
    /// Per-conversation state store.
    pub conversations: Arc<ConversationStore>,
    /// Long-term memory adapter.
    pub memory: Arc<dyn MemoryAdapter>,
    /// Escalation cost gate.
    pub permission: Arc<dyn PermissionManager>,
    /// Layered configuration.
    pub config: RoutingConfig,
}

impl RoutingEngine {
    /// Wire an engine from its dependencies.
    pub fn new(deps: RoutingEngineDeps) -> Self {
        Self {
            local: deps.local,
            web: deps.web,
            frontier: deps.frontier,
            summarizer: deps.summarizer,
            registry: deps.registry,
            cache: deps.cache,
            audit: deps.audit,
            cost: deps.cost,
            conversations: deps.conversations,
            memory: deps.memory,
            permission: deps.permission,
            config: deps.config,
        }
    }

    /// Route one request to completion, following §4.1's nine-step pipeline.
    pub async fn route(&self, request: RoutingRequest) -> Result<RoutingResult, RouterError> {
        if request.prompt.trim().is_empty() {
            return Err(RouterError::InvalidRequest("prompt must not be empty".to_string()));
        }
        info!(conversation_id = %request.conversation_id, request_id = %request.request_id, "routing turn");

        let start = Instant::now();

        // Step 0: confirmation-reply handling, if a hazardous call is pending.
        if let Some(result) = self.try_resolve_pending_confirmation(&request).await {
            return Ok(result);
        }

        let parsed = parse_inline_syntax(&request.prompt, &self.config.inline);
        let mut request = request;
        if request.model_hint.is_none() {
            request.model_hint = parsed.model_override.clone();
        }
        let allow_paid = request.allow_paid || parsed.allow_paid_override;
        let freshness_required = request.freshness_required;
        let vision_present = !request.vision_targets.is_empty();

        let key = fingerprint(&parsed.prompt);
        if self.config.cache_enabled && is_eligible(freshness_required, vision_present) {
            if let Some(hit) = self.cache.get(&key).await {
                let latency_ms = start.elapsed().as_millis() as u64;
                let mut result = RoutingResult::new(hit.response, Tier::Local, hit.confidence, latency_ms)
                    .with_meta("cache_hit", true)
                    .with_meta("cached_at", hit.created_at.to_rfc3339());
                result.cached = true;
                self.persist(&request, &key, &result, None).await;
                return Ok(result);
            }
        }

        if vision_present {
            if let Some(result) = self.run_vision_step(&request).await {
                self.persist(&request, &key, &result, None).await;
                return Ok(result);
            }
        }

        let enriched_prompt = conversation::enrich_prompt(
            self.memory.as_ref(),
            &parsed.prompt,
            &request.conversation_id,
            request.user_id.as_deref(),
        )
        .await;

        let mut result = if let Some(tier) = request.force_tier {
            self.call_tier(tier, &enriched_prompt, request.model_hint.as_deref()).await?
        } else if request.use_agent {
            match self
                .run_agent(&request, &enriched_prompt, freshness_required, allow_paid)
                .await?
            {
                AgentOutcome::Completed(agent_result) => {
                    let confidence = if agent_result.success {
                        self.config.confidence.agent_success
                    } else {
                        self.config.confidence.agent_failure
                    };
                    let tools_used = agent_result.steps.iter().filter(|s| s.action.is_some()).count();
                    RoutingResult::new(agent_result.answer, Tier::Local, confidence, 0)
                        .with_meta("provider", "react_agent")
                        .with_meta("iterations", agent_result.iterations)
                        .with_meta("truncated", agent_result.truncated)
                        .with_meta("tools_used", tools_used as u64)
                        .with_meta("stop_reason", agent_result.stop_reason.clone())
                }
                AgentOutcome::Confirmation(pending) => {
                    return Ok(self.confirmation_result(&request, pending));
                }
            }
        } else {
            self.call_local_with_tools(&request, &enriched_prompt, allow_paid).await?
        };

        let mut escalation_reason = None;
        let escalation_worthy = request.force_tier.is_none()
            && !request.use_agent
            && (result.confidence < self.config.confidence.local_confidence_threshold || freshness_required);
        if escalation_worthy {
            if !allow_paid {
                result = result.with_meta("paid_override_required", true);
            } else if let Some((escalated, reason)) = self
                .try_escalate(&request, &enriched_prompt, result.confidence)
                .await?
            {
                escalation_reason = Some(reason);
                result = escalated;
            }
        }

        if result.metadata.get("provider").and_then(|v| v.as_str()) == Some("react_agent") {
            result = self.maybe_summarize(result).await;
        }

        if let Some(provider_override) = parsed.provider_override.clone() {
            result = result.with_meta("provider_override", provider_override);
        }
        if let Some(model_override) = parsed.model_override.clone() {
            result = result.with_meta("model_override", model_override);
        }

        result.latency_ms = start.elapsed().as_millis() as u64;
        self.persist(&request, &key, &result, escalation_reason).await;
        Ok(result)
    }

    /// Stream one request, following the same pipeline but emitting
    /// incremental `RouteChunk`s instead of awaiting a full result.
    ///
    /// Streaming does not attempt incremental provider output in this
    /// implementation (providers here return whole responses); it emits a
    /// single `Delta` once the non-streaming pipeline finishes, followed by
    /// `Done`. A streaming-native provider would replace the inner `route`
    /// call with genuine per-token forwarding without changing this
    /// function's shape.
    pub fn route_stream(self: Arc<Self>, request: RoutingRequest) -> mpsc::Receiver<RouteChunk> {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            match self.route(request).await {
                Ok(result) => {
                    let _ = tx.send(RouteChunk::Delta { delta: result.output.clone() }).await;
                    let _ = tx.send(RouteChunk::Done { routing_result: result }).await;
                }
                Err(err) => {
                    let _ = tx.send(RouteChunk::Error { error: err.to_string() }).await;
                }
            }
        });
        rx
    }

    async fn try_resolve_pending_confirmation(&self, request: &RoutingRequest) -> Option<RoutingResult> {
        if !self.conversations.has_pending(&request.conversation_id) {
            return None;
        }
        let pending = self.conversations.take_if_live(&request.conversation_id)?;

        if confirmation::is_cancel_token(&request.prompt) {
            self.conversations.clear_pending(&request.conversation_id);
            return Some(
                RoutingResult::new(confirmation::cancellation_message(&pending.tool), Tier::Local, 1.0, 0)
                    .with_meta("confirmation_cancelled", true),
            );
        }

        if !confirmation::matches_phrase(&pending.required_phrase, &request.prompt) {
            self.conversations
                .set_pending_confirmation(&request.conversation_id, pending.clone());
            return Some(self.confirmation_result(request, pending));
        }

        let outcome = self.registry.dispatch(&pending.tool, pending.args.clone()).await;
        self.conversations.clear_pending(&request.conversation_id);
        Some(
            RoutingResult::new(outcome.as_observation(), Tier::Local, 1.0, 0)
                .with_meta("confirmation_executed", true)
                .with_meta("tool", pending.tool.clone()),
        )
    }

    fn confirmation_result(&self, request: &RoutingRequest, pending: PendingConfirmation) -> RoutingResult {
        self.conversations
            .set_pending_confirmation(&request.conversation_id, pending.clone());
        RoutingResult::new(
            format!(
                "This action requires confirmation. Reply with \"{}\" to proceed, or \"cancel\" to abort.",
                pending.required_phrase
            ),
            Tier::Local,
            1.0,
            0,
        )
        .with_meta("requires_confirmation", true)
        .with_meta("confirmation_phrase", pending.required_phrase.clone())
        .with_meta("pending_tool", pending.tool.clone())
        .with_meta("hazard_class", pending.hazard_class.clone())
    }

    /// §4.1 step 3: compose the vision pipeline over every target and
    /// return a markdown reply without tiering. `None` when the pipeline
    /// produced no references for any target, falling through to normal
    /// tiered routing.
    async fn run_vision_step(&self, request: &RoutingRequest) -> Option<RoutingResult> {
        let mut sections = Vec::new();
        for target in &request.vision_targets {
            if let Some(markdown) = crate::mcp::run_vision_pipeline(&self.registry, target, &request.request_id).await {
                sections.push(format!("**{target}**\n{markdown}"));
            }
        }
        if sections.is_empty() {
            return None;
        }
        Some(
            RoutingResult::new(sections.join("\n\n"), Tier::Local, 1.0, 0)
                .with_meta("provider", "vision_pipeline")
                .with_meta("vision_targets", request.vision_targets.len() as u64),
        )
    }

    async fn run_agent(
        &self,
        request: &RoutingRequest,
        prompt: &str,
        freshness_required: bool,
        allow_paid: bool,
    ) -> Result<AgentOutcome, RouterError> {
        let agent = ReactToolAgent::with_capture_content(
            self.local.clone(),
            self.registry.clone(),
            self.config.agent.max_iterations,
            chrono::Duration::from_std(self.config.agent.confirmation_ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(300)),
            self.config.capture_content,
        );
        agent
            .run(
                prompt,
                &request.request_id,
                freshness_required,
                allow_paid,
                request.tool_mode,
                &request.vision_targets,
            )
            .await
            .map_err(|err| RouterError::Other(Box::new(err)))
    }

    async fn call_tier(&self, tier: Tier, prompt: &str, model_hint: Option<&str>) -> Result<RoutingResult, RouterError> {
        let provider = match tier {
            Tier::Local => Some(&self.local),
            Tier::Web => self.web.as_ref(),
            Tier::Frontier => self.frontier.as_ref(),
        }
        .ok_or_else(|| RouterError::ProviderUnavailable(format!("{tier:?} has no configured provider")))?;

        let request = ProviderRequest {
            model: model_hint.map(str::to_string),
            messages: vec![ProviderMessage {
                role: Role::User,
                content: vec![ContentPart::Text { text: prompt.to_string() }],
            }],
            tools: vec![],
            max_tokens: Some(4096),
            temperature: None,
            system: None,
            extra: serde_json::Value::Null,
        };

        let response = match provider.complete(request).await {
            Ok(response) => response,
            Err(err) if tier == Tier::Local => {
                // §4.1 Failure policy: a local-model exception surfaces as a
                // result with empty output and confidence 0, not an error —
                // the turn still has to reach persist() for its audit row.
                warn!(error = %err, "local model call failed");
                return Ok(RoutingResult::new(String::new(), Tier::Local, 0.0, 0)
                    .with_meta("provider", Tier::Local.as_str())
                    .with_meta("error", err.to_string()));
            }
            Err(err) => return Err(RouterError::Other(Box::new(err))),
        };

        let text = response
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        let confidence = match tier {
            Tier::Local => {
                if response.stop_reason == StopReason::EndTurn && !text.is_empty() {
                    self.config.confidence.local_confidence_threshold
                } else {
                    0.0
                }
            }
            Tier::Web => self.config.confidence.web_default,
            Tier::Frontier => self.config.confidence.frontier_default,
        };

        Ok(RoutingResult::new(text, tier, confidence, 0)
            .with_meta("provider", tier.as_str())
            .with_meta("model", response.model.clone()))
    }

    /// §4.1 step 5: call the local model with tools selected from the
    /// registry; if it answered with tool calls instead of text, dispatch
    /// each one through MCP and make exactly one follow-up local call with
    /// the concatenated tool outputs folded back in.
    async fn call_local_with_tools(
        &self,
        request: &RoutingRequest,
        prompt: &str,
        allow_paid: bool,
    ) -> Result<RoutingResult, RouterError> {
        let tools = self.registry.select(prompt, request.tool_mode, allow_paid);
        let schemas = tool_schemas(&tools);

        let first = ProviderRequest {
            model: request.model_hint.clone(),
            messages: vec![ProviderMessage {
                role: Role::User,
                content: vec![ContentPart::Text { text: prompt.to_string() }],
            }],
            tools: schemas,
            max_tokens: Some(4096),
            temperature: None,
            system: None,
            extra: serde_json::Value::Null,
        };

        let response = match self.local.complete(first).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "local model call failed");
                return Ok(RoutingResult::new(String::new(), Tier::Local, 0.0, 0)
                    .with_meta("provider", Tier::Local.as_str())
                    .with_meta("error", err.to_string()));
            }
        };

        let tool_calls: Vec<(String, serde_json::Value)> = response
            .content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolUse { name, input, .. } => Some((name.clone(), input.clone())),
                _ => None,
            })
            .collect();

        if tool_calls.is_empty() {
            let text = text_of(&response.content);
            let confidence = if response.stop_reason == StopReason::EndTurn && !text.is_empty() {
                self.config.confidence.local_confidence_threshold
            } else {
                0.0
            };
            return Ok(RoutingResult::new(text, Tier::Local, confidence, 0)
                .with_meta("provider", Tier::Local.as_str())
                .with_meta("model", response.model.clone()));
        }

        let mut observations = Vec::with_capacity(tool_calls.len());
        for (name, input) in &tool_calls {
            let definition = self.registry.get_definition(name);
            let observation = match definition {
                Some(def) if def.paid && !allow_paid => {
                    format!("blocked: {name} requires paid-tier authorization (allow_paid=false)")
                }
                _ => self.registry.dispatch(name, input.clone()).await.as_observation(),
            };
            observations.push(format!("tool `{name}` observed: {observation}"));
        }
        let tools_used = observations.len();
        let folded = format!(
            "{prompt}\n\nTool results:\n{}",
            observations.join("\n")
        );

        let follow_up = ProviderRequest {
            model: request.model_hint.clone(),
            messages: vec![ProviderMessage {
                role: Role::User,
                content: vec![ContentPart::Text { text: folded }],
            }],
            tools: vec![],
            max_tokens: Some(4096),
            temperature: None,
            system: None,
            extra: serde_json::Value::Null,
        };
        let follow_up_response = match self.local.complete(follow_up).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "local model call failed");
                return Ok(RoutingResult::new(String::new(), Tier::Local, 0.0, 0)
                    .with_meta("provider", Tier::Local.as_str())
                    .with_meta("error", err.to_string())
                    .with_meta("tools_used", tools_used as u64));
            }
        };
        let text = text_of(&follow_up_response.content);
        let confidence = if !text.is_empty() {
            self.config.confidence.local_confidence_threshold
        } else {
            0.0
        };

        Ok(RoutingResult::new(text, Tier::Local, confidence, 0)
            .with_meta("provider", Tier::Local.as_str())
            .with_meta("model", follow_up_response.model.clone())
            .with_meta("tools_used", tools_used as u64))
    }

    /// Escalate WEB-then-FRONTIER, gated by the permission manager, stopping
    /// at the first tier that both authorizes and improves confidence.
    async fn try_escalate(
        &self,
        request: &RoutingRequest,
        prompt: &str,
        local_confidence: f64,
    ) -> Result<Option<(RoutingResult, String)>, RouterError> {
        for tier in [Tier::Web, Tier::Frontier] {
            let provider = match tier {
                Tier::Web => self.web.as_ref(),
                Tier::Frontier => self.frontier.as_ref(),
                Tier::Local => None,
            };
            let Some(_provider) = provider else { continue };

            if !self.permission.authorize(tier, tier.unit_cost()).await {
                warn!(tier = tier.as_str(), "escalation denied by permission manager");
                continue;
            }

            let result = self.call_tier(tier, prompt, request.model_hint.as_deref()).await?;
            if result.confidence >= local_confidence {
                let reason = format!("local confidence {local_confidence:.2} below threshold");
                return Ok(Some((result, reason)));
            }
        }
        Ok(None)
    }

    /// Condense an agent transcript if it's long, scoped to agent-origin
    /// results only (§9A(c)).
    async fn maybe_summarize(&self, result: RoutingResult) -> RoutingResult {
        const SUMMARIZE_THRESHOLD_CHARS: usize = 2000;
        if result.output.len() < SUMMARIZE_THRESHOLD_CHARS {
            return result;
        }
        let Some(summarizer) = self.summarizer.as_ref().or(Some(&self.local)) else {
            return result;
        };
        let request = ProviderRequest {
            model: None,
            messages: vec![ProviderMessage {
                role: Role::User,
                content: vec![ContentPart::Text {
                    text: format!("Summarize this concisely, preserving the key facts:\n\n{}", result.output),
                }],
            }],
            tools: vec![],
            max_tokens: Some(1024),
            temperature: None,
            system: None,
            extra: serde_json::Value::Null,
        };
        match summarizer.complete(request).await {
            Ok(response) => {
                let text = response
                    .content
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join("");
                if text.is_empty() {
                    result
                } else {
                    result.with_meta("summarized", true).with_output(text)
                }
            }
            Err(err) => {
                warn!(error = %err, "summarization failed, returning full transcript");
                result
            }
        }
    }

    /// Best-effort persistence: cache insert, cost/SLO bookkeeping, memory
    /// write, and the audit row. Every failure here is logged and swallowed.
    async fn persist(&self, request: &RoutingRequest, cache_key: &str, result: &RoutingResult, escalation_reason: Option<String>) {
        let vision_present = !request.vision_targets.is_empty();
        if self.config.cache_enabled
            && !result.cached
            && is_eligible(request.freshness_required, vision_present)
            && !result.output.is_empty()
        {
            let key = cache_key;
            self.cache
                .put(
                    &key,
                    CacheRecord {
                        response: result.output.clone(),
                        confidence: result.confidence,
                        created_at: chrono::Utc::now(),
                        embedding: None,
                    },
                )
                .await;
        }

        let cost = if result.cached { Decimal::ZERO } else { result.tier.unit_cost() };
        self.cost.record(result.tier, cost);

        if !result.cached {
            self.memory
                .add(
                    &request.conversation_id,
                    request.user_id.as_deref(),
                    &format!("Q: {}\nA: {}", request.prompt, result.output),
                )
                .await;
        }

        let row = AuditRow {
            id: format!("{}-audit", request.request_id),
            conversation_id: request.conversation_id.clone(),
            request_id: request.request_id.clone(),
            tier: result.tier,
            confidence: result.confidence,
            latency_ms: result.latency_ms,
            cost_estimate: cost,
            escalation_reason,
            user_id: request.user_id.clone(),
            created_at: chrono::Utc::now(),
        };
        if let Err(err) = self.audit.record(row).await {
            warn!(error = %err, "failed to record audit row");
        }
        info!(tier = result.tier.as_str(), confidence = result.confidence, "turn routed");
    }
}

fn text_of(content: &[ContentPart]) -> String {
    content
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

trait WithOutput {
    fn with_output(self, output: String) -> Self;
}

impl WithOutput for RoutingResult {
    fn with_output(mut self, output: String) -> Self {
        self.output = output;
        self
    }
}
