//! ReAct tool agent (§4.2): a bounded reason/act/observe loop over the MCP
//! tool registry, with paid-tool blocking and hazardous-tool confirmation
//! gating folded into the loop itself rather than left to the caller.

use crate::confirmation::PendingConfirmation;
use crate::error::AgentError;
use crate::hooks::TracingHook;
use crate::mcp::{run_vision_pipeline, tool_schemas, McpRegistry, ToolDefinition};
use crate::provider::DynProvider;
use crate::types::{AgentResult, AgentStep, ToolMode};
use layer0::duration::DurationMs;
use layer0::hook::{HookAction, HookContext, HookPoint};
use neuron_hooks::HookRegistry;
use neuron_turn::types::{ContentPart, ProviderMessage, ProviderRequest, Role, StopReason};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "You are a tool-using assistant. Call tools only when they help \
answer the user's request. When you have enough information, respond with plain text and no \
further tool calls to finish.";

const FRESHNESS_HINT: &str = " The user's request depends on current/time-sensitive \
information; prefer a retrieval tool over relying on prior knowledge.";

/// What the agent produced: either a finished run, or a hazardous tool call
/// that must be confirmed before the loop can proceed.
#[derive(Debug)]
pub enum AgentOutcome {
    /// The loop ran to a final answer, truncation, or an irrecoverable stop.
    Completed(AgentResult),
    /// A hazardous tool call is awaiting the user's confirmation phrase.
    Confirmation(PendingConfirmation),
}

/// Bounded ReAct loop driving tool calls through an [`McpRegistry`].
pub struct ReactToolAgent {
    provider: Arc<dyn DynProvider>,
    registry: Arc<McpRegistry>,
    max_iterations: u32,
    confirmation_ttl: chrono::Duration,
    hooks: HookRegistry,
}

impl ReactToolAgent {
    /// Build an agent over `provider` (the LOCAL-tier model, per §4.2) and
    /// `registry`, bounded to `max_iterations` loop turns. Registers
    /// [`TracingHook`] by default — ambient tracing always runs; swap it
    /// out with [`Self::with_hooks`] only to add more observers, not to
    /// remove observability.
    pub fn new(
        provider: Arc<dyn DynProvider>,
        registry: Arc<McpRegistry>,
        max_iterations: u32,
        confirmation_ttl: chrono::Duration,
    ) -> Self {
        Self::with_capture_content(provider, registry, max_iterations, confirmation_ttl, false)
    }

    /// Like [`Self::new`], but controls whether the default [`TracingHook`]
    /// captures prompt/tool bodies (`RoutingConfig::capture_content`, §1A).
    pub fn with_capture_content(
        provider: Arc<dyn DynProvider>,
        registry: Arc<McpRegistry>,
        max_iterations: u32,
        confirmation_ttl: chrono::Duration,
        capture_content: bool,
    ) -> Self {
        let mut hooks = HookRegistry::new();
        hooks.add(Arc::new(if capture_content {
            TracingHook::with_content_capture()
        } else {
            TracingHook::new()
        }));
        Self {
            provider,
            registry,
            max_iterations,
            confirmation_ttl,
            hooks,
        }
    }

    /// Replace the hook pipeline (e.g. to add a budget or guardrail hook
    /// alongside the default [`TracingHook`]).
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Run the loop to completion (final answer, truncation, or a
    /// confirmation hold) against `prompt`.
    pub async fn run(
        &self,
        prompt: &str,
        session_id: &str,
        freshness_required: bool,
        allow_paid: bool,
        tool_mode: ToolMode,
        vision_targets: &[String],
    ) -> Result<AgentOutcome, AgentError> {
        info!(session_id = %session_id, max_iterations = self.max_iterations, "starting agent run");
        let mut enriched_prompt = prompt.to_string();
        for target in vision_targets {
            if let Some(markdown) = run_vision_pipeline(&self.registry, target, session_id).await {
                enriched_prompt.push_str("\n\n");
                enriched_prompt.push_str(&markdown);
            }
        }

        let tools = self.registry.select(prompt, tool_mode, allow_paid);
        let tool_schemas = tool_schemas(&tools);

        let mut system = SYSTEM_PROMPT.to_string();
        if freshness_required {
            system.push_str(FRESHNESS_HINT);
        }

        let mut messages = vec![ProviderMessage {
            role: Role::User,
            content: vec![ContentPart::Text { text: enriched_prompt }],
        }];

        let mut steps = Vec::new();
        let mut iterations = 0u32;
        let started = Instant::now();

        while iterations < self.max_iterations {
            iterations += 1;
            let request = ProviderRequest {
                model: None,
                messages: messages.clone(),
                tools: tool_schemas.clone(),
                max_tokens: Some(4096),
                temperature: None,
                system: Some(system.clone()),
                extra: serde_json::Value::Null,
            };

            let mut pre = HookContext::new(HookPoint::PreInference);
            pre.turns_completed = iterations - 1;
            pre.elapsed = DurationMs::from_millis(started.elapsed().as_millis() as u64);
            if let HookAction::Halt { reason } = self.hooks.dispatch(&pre).await {
                return Err(layer0::error::OperatorError::NonRetryable(reason).into());
            }

            let response = self.provider.complete(request).await?;

            let mut post = HookContext::new(HookPoint::PostInference);
            post.turns_completed = iterations;
            post.elapsed = DurationMs::from_millis(started.elapsed().as_millis() as u64);
            self.hooks.dispatch(&post).await;

            match response.stop_reason {
                StopReason::EndTurn => {
                    let answer = text_of(&response.content);
                    return Ok(AgentOutcome::Completed(AgentResult {
                        answer,
                        steps,
                        iterations,
                        success: true,
                        truncated: false,
                        stop_reason: "final_answer".to_string(),
                        error: None,
                    }));
                }
                StopReason::MaxTokens | StopReason::ContentFilter => {
                    warn!(stop_reason = ?response.stop_reason, "agent loop stopped abnormally");
                    return Ok(AgentOutcome::Completed(AgentResult {
                        answer: text_of(&response.content),
                        steps,
                        iterations,
                        success: false,
                        truncated: false,
                        stop_reason: "provider_stopped".to_string(),
                        error: Some(format!("{:?}", response.stop_reason)),
                    }));
                }
                StopReason::ToolUse => {
                    let tool_calls: Vec<(String, String, serde_json::Value)> = response
                        .content
                        .iter()
                        .filter_map(|part| match part {
                            ContentPart::ToolUse { id, name, input } => {
                                Some((id.clone(), name.clone(), input.clone()))
                            }
                            _ => None,
                        })
                        .collect();

                    if tool_calls.is_empty() {
                        let answer = text_of(&response.content);
                        return Ok(AgentOutcome::Completed(AgentResult {
                            answer,
                            steps,
                            iterations,
                            success: true,
                            truncated: false,
                            stop_reason: "final_answer".to_string(),
                            error: None,
                        }));
                    }

                    messages.push(ProviderMessage {
                        role: Role::Assistant,
                        content: response.content.clone(),
                    });

                    let mut results = Vec::with_capacity(tool_calls.len());
                    for (id, name, input) in &tool_calls {
                        let definition = self.registry.get_definition(name).cloned();
                        if let Some(def) = &definition {
                            if def.requires_confirmation {
                                info!(tool = %name, "hazardous tool call held for confirmation");
                                let pending = PendingConfirmation::new(
                                    name,
                                    input.clone(),
                                    self.confirmation_ttl,
                                    chrono::Utc::now(),
                                );
                                return Ok(AgentOutcome::Confirmation(pending));
                            }
                        }
                        let mut pre_tool = HookContext::new(HookPoint::PreToolUse);
                        pre_tool.tool_name = Some(name.clone());
                        pre_tool.tool_input = Some(input.clone());
                        pre_tool.turns_completed = iterations;
                        if let HookAction::Halt { reason } = self.hooks.dispatch(&pre_tool).await {
                            return Err(layer0::error::OperatorError::NonRetryable(reason).into());
                        }

                        let observation = self.observe(definition.as_ref(), name, input.clone(), allow_paid).await;
                        steps.push(AgentStep::tool_call(None, name.clone(), input.clone(), observation.clone()));

                        let mut post_tool = HookContext::new(HookPoint::PostToolUse);
                        post_tool.tool_name = Some(name.clone());
                        post_tool.tool_result = Some(observation.clone());
                        post_tool.turns_completed = iterations;
                        self.hooks.dispatch(&post_tool).await;
                        results.push(ContentPart::ToolResult {
                            tool_use_id: id.clone(),
                            content: observation,
                            is_error: false,
                        });
                    }
                    messages.push(ProviderMessage {
                        role: Role::User,
                        content: results,
                    });
                }
            }
        }

        Ok(AgentOutcome::Completed(AgentResult {
            answer: String::new(),
            steps,
            iterations,
            success: false,
            truncated: true,
            stop_reason: "iteration_limit".to_string(),
            error: None,
        }))
    }

    /// Dispatch (or block) one tool call, returning its observation text.
    async fn observe(
        &self,
        definition: Option<&ToolDefinition>,
        name: &str,
        args: serde_json::Value,
        allow_paid: bool,
    ) -> String {
        match definition {
            None => "error: Unknown tool".to_string(),
            Some(def) if def.paid && !allow_paid => {
                format!("blocked: {name} requires paid-tier authorization (allow_paid=false)")
            }
            Some(_) => self.registry.dispatch(name, args).await.as_observation(),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::default_registry;
    use neuron_turn::provider::ProviderError;
    use neuron_turn::types::{ProviderResponse, TokenUsage};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A scripted provider returning one canned response per call, in order.
    struct ScriptedProvider {
        responses: Mutex<Vec<ProviderResponse>>,
        calls: AtomicUsize,
    }

    impl DynProvider for ScriptedProvider {
        fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Pin<Box<dyn Future<Output = Result<ProviderResponse, ProviderError>> + Send + '_>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            let response = if responses.is_empty() {
                ProviderResponse {
                    content: vec![ContentPart::Text { text: "done".into() }],
                    stop_reason: StopReason::EndTurn,
                    usage: TokenUsage::default(),
                    model: "mock".into(),
                    cost: None,
                    truncated: None,
                }
            } else {
                responses.remove(0)
            };
            Box::pin(async move { Ok(response) })
        }
    }

    fn final_answer(text: &str) -> ProviderResponse {
        ProviderResponse {
            content: vec![ContentPart::Text { text: text.into() }],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
            model: "mock".into(),
            cost: None,
            truncated: None,
        }
    }

    fn tool_use(id: &str, name: &str, input: serde_json::Value) -> ProviderResponse {
        ProviderResponse {
            content: vec![ContentPart::ToolUse {
                id: id.into(),
                name: name.into(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage::default(),
            model: "mock".into(),
            cost: None,
            truncated: None,
        }
    }

    #[tokio::test]
    async fn zero_tool_calls_returns_final_answer_on_first_turn() {
        let provider = Arc::new(ScriptedProvider {
            responses: Mutex::new(vec![final_answer("42")]),
            calls: AtomicUsize::new(0),
        });
        let agent = ReactToolAgent::new(provider, Arc::new(default_registry()), 10, chrono::Duration::seconds(300));
        let outcome = agent
            .run("what is 6*7", "s1", false, false, ToolMode::Off, &[])
            .await
            .unwrap();
        match outcome {
            AgentOutcome::Completed(result) => {
                assert_eq!(result.answer, "42");
                assert!(result.success);
                assert!(!result.truncated);
                assert_eq!(result.iterations, 1);
            }
            AgentOutcome::Confirmation(_) => panic!("expected a completed run"),
        }
    }

    #[tokio::test]
    async fn tool_call_then_final_answer_folds_observation() {
        let provider = Arc::new(ScriptedProvider {
            responses: Mutex::new(vec![
                tool_use("t1", "web_search", serde_json::json!({"query": "weather"})),
                final_answer("it's sunny"),
            ]),
            calls: AtomicUsize::new(0),
        });
        let agent = ReactToolAgent::new(provider, Arc::new(default_registry()), 10, chrono::Duration::seconds(300));
        let outcome = agent
            .run("what's the weather", "s1", true, false, ToolMode::On, &[])
            .await
            .unwrap();
        match outcome {
            AgentOutcome::Completed(result) => {
                assert_eq!(result.answer, "it's sunny");
                assert_eq!(result.steps.len(), 1);
                assert_eq!(result.steps[0].action.as_deref(), Some("web_search"));
            }
            AgentOutcome::Confirmation(_) => panic!("expected a completed run"),
        }
    }

    #[tokio::test]
    async fn paid_tool_without_allow_paid_is_blocked_not_executed() {
        let provider = Arc::new(ScriptedProvider {
            responses: Mutex::new(vec![
                tool_use("t1", "generate_cad_model", serde_json::json!({"prompt": "gear"})),
                final_answer("cannot fabricate without authorization"),
            ]),
            calls: AtomicUsize::new(0),
        });
        let agent = ReactToolAgent::new(provider, Arc::new(default_registry()), 10, chrono::Duration::seconds(300));
        let outcome = agent
            .run("print me a gear", "s1", false, false, ToolMode::On, &[])
            .await
            .unwrap();
        match outcome {
            AgentOutcome::Completed(result) => {
                assert!(result.steps[0].observation.as_deref().unwrap().starts_with("blocked:"));
            }
            AgentOutcome::Confirmation(_) => panic!("expected a completed run"),
        }
    }

    #[tokio::test]
    async fn hazardous_tool_yields_confirmation_instead_of_executing() {
        let provider = Arc::new(ScriptedProvider {
            responses: Mutex::new(vec![tool_use(
                "t1",
                "lock.unlock",
                serde_json::json!({"entity_id": "welding bay"}),
            )]),
            calls: AtomicUsize::new(0),
        });
        let agent = ReactToolAgent::new(provider, Arc::new(default_registry()), 10, chrono::Duration::seconds(300));
        let outcome = agent
            .run("unlock the welding bay", "s1", false, true, ToolMode::On, &[])
            .await
            .unwrap();
        match outcome {
            AgentOutcome::Confirmation(pending) => {
                assert_eq!(pending.tool, "lock.unlock");
                assert_eq!(pending.required_phrase, "confirm unlock welding bay");
            }
            AgentOutcome::Completed(_) => panic!("expected a confirmation hold"),
        }
    }

    #[tokio::test]
    async fn exhausting_the_iteration_budget_truncates() {
        let responses: Vec<ProviderResponse> = (0..20)
            .map(|i| tool_use(&format!("t{i}"), "web_search", serde_json::json!({"query": "x"})))
            .collect();
        let provider = Arc::new(ScriptedProvider {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
        });
        let agent = ReactToolAgent::new(provider, Arc::new(default_registry()), 3, chrono::Duration::seconds(300));
        let outcome = agent
            .run("keep searching forever", "s1", false, false, ToolMode::On, &[])
            .await
            .unwrap();
        match outcome {
            AgentOutcome::Completed(result) => {
                assert!(result.truncated);
                assert!(!result.success);
                assert_eq!(result.stop_reason, "iteration_limit");
                assert_eq!(result.iterations, 3);
                assert_eq!(result.steps.len(), 3);
            }
            AgentOutcome::Confirmation(_) => panic!("expected a completed run"),
        }
    }

    #[tokio::test]
    async fn custom_hook_pipeline_observes_without_changing_the_outcome() {
        use layer0::hook::{Hook, HookAction};
        use std::sync::atomic::AtomicU32;

        struct CountingHook {
            pre_tool_calls: Arc<AtomicU32>,
        }

        #[async_trait::async_trait]
        impl Hook for CountingHook {
            fn points(&self) -> &[HookPoint] {
                &[HookPoint::PreToolUse]
            }
            async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, layer0::error::HookError> {
                self.pre_tool_calls.fetch_add(1, Ordering::SeqCst);
                Ok(HookAction::Continue)
            }
        }

        let counter = Arc::new(AtomicU32::new(0));
        let mut hooks = HookRegistry::new();
        hooks.add(Arc::new(CountingHook { pre_tool_calls: counter.clone() }));

        let provider = Arc::new(ScriptedProvider {
            responses: Mutex::new(vec![
                tool_use("t1", "web_search", serde_json::json!({"query": "weather"})),
                final_answer("sunny"),
            ]),
            calls: AtomicUsize::new(0),
        });
        let agent = ReactToolAgent::new(provider, Arc::new(default_registry()), 10, chrono::Duration::seconds(300))
            .with_hooks(hooks);
        let outcome = agent
            .run("what's the weather", "s1", false, true, ToolMode::On, &[])
            .await
            .unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        match outcome {
            AgentOutcome::Completed(result) => assert!(result.success),
            AgentOutcome::Confirmation(_) => panic!("expected a completed run"),
        }
    }

    #[tokio::test]
    async fn a_halting_hook_stops_the_loop_with_an_operator_error() {
        use layer0::hook::{Hook, HookAction};

        struct AlwaysHalt;

        #[async_trait::async_trait]
        impl Hook for AlwaysHalt {
            fn points(&self) -> &[HookPoint] {
                &[HookPoint::PreInference]
            }
            async fn on_event(&self, _ctx: &HookContext) -> Result<HookAction, layer0::error::HookError> {
                Ok(HookAction::Halt { reason: "budget exceeded".to_string() })
            }
        }

        let mut hooks = HookRegistry::new();
        hooks.add(Arc::new(AlwaysHalt));

        let provider = Arc::new(ScriptedProvider {
            responses: Mutex::new(vec![final_answer("should never be reached")]),
            calls: AtomicUsize::new(0),
        });
        let agent = ReactToolAgent::new(provider, Arc::new(default_registry()), 10, chrono::Duration::seconds(300))
            .with_hooks(hooks);
        let err = agent.run("anything", "s1", false, false, ToolMode::Off, &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Operator(_)));
    }

    #[tokio::test]
    async fn unknown_tool_name_is_observed_as_an_error_not_a_panic() {
        let provider = Arc::new(ScriptedProvider {
            responses: Mutex::new(vec![
                tool_use("t1", "nonexistent_tool", serde_json::json!({})),
                final_answer("no luck"),
            ]),
            calls: AtomicUsize::new(0),
        });
        let agent = ReactToolAgent::new(provider, Arc::new(default_registry()), 10, chrono::Duration::seconds(300));
        let outcome = agent
            .run("try something odd", "s1", false, false, ToolMode::On, &[])
            .await
            .unwrap();
        match outcome {
            AgentOutcome::Completed(result) => {
                assert_eq!(result.steps[0].observation.as_deref(), Some("error: Unknown tool"));
            }
            AgentOutcome::Confirmation(_) => panic!("expected a completed run"),
        }
    }
}
