//! Ambient tracing hook (§1A): a [`layer0::hook::Hook`] that mirrors the
//! ReAct loop's Reason/Act/Observe points with GenAI-semantic-convention
//! spans, the way an OpenTelemetry-instrumented hook observes a turn
//! without ever steering it.
//!
//! `TracingHook` never intervenes — it always returns `HookAction::Continue`
//! — so registering it changes what gets logged, never what the agent does.

use async_trait::async_trait;
use layer0::error::HookError;
use layer0::hook::{Hook, HookAction, HookContext, HookPoint};

const ALL_POINTS: &[HookPoint] = &[
    HookPoint::PreInference,
    HookPoint::PostInference,
    HookPoint::PreToolUse,
    HookPoint::PostToolUse,
    HookPoint::ExitCheck,
];

/// Emits `tracing` events named after the OTel GenAI semantic conventions
/// (`gen_ai.chat`, `gen_ai.execute_tool`, `gen_ai.loop.iteration`) at the
/// points the ReAct loop dispatches. Content capture is opt-in and off by
/// default — only shapes/names are logged unless `capture_content` is set.
pub struct TracingHook {
    capture_content: bool,
}

impl TracingHook {
    /// Build a hook that never logs prompt/response bodies.
    pub fn new() -> Self {
        Self { capture_content: false }
    }

    /// Build a hook that also logs tool inputs/outputs and model text.
    /// Off by default; only enable for debugging against non-sensitive data.
    pub fn with_content_capture() -> Self {
        Self { capture_content: true }
    }
}

impl Default for TracingHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Hook for TracingHook {
    fn points(&self) -> &[HookPoint] {
        ALL_POINTS
    }

    async fn on_event(&self, ctx: &HookContext) -> Result<HookAction, HookError> {
        match ctx.point {
            HookPoint::PreInference => {
                tracing::info!(
                    turn = ctx.turns_completed,
                    "gen_ai.chat: dispatching local-model inference"
                );
            }
            HookPoint::PostInference => {
                if self.capture_content {
                    tracing::debug!(output = ?ctx.model_output, "gen_ai.chat: response received");
                } else {
                    tracing::info!("gen_ai.chat: response received");
                }
            }
            HookPoint::PreToolUse => {
                let tool = ctx.tool_name.as_deref().unwrap_or("unknown");
                if self.capture_content {
                    tracing::debug!(gen_ai.tool.name = tool, input = ?ctx.tool_input, "gen_ai.execute_tool: dispatching");
                } else {
                    tracing::info!(gen_ai.tool.name = tool, "gen_ai.execute_tool: dispatching");
                }
            }
            HookPoint::PostToolUse => {
                let tool = ctx.tool_name.as_deref().unwrap_or("unknown");
                tracing::info!(gen_ai.tool.name = tool, "gen_ai.execute_tool: completed");
            }
            HookPoint::ExitCheck => {
                tracing::debug!(
                    turn = ctx.turns_completed,
                    elapsed_ms = ctx.elapsed.as_millis(),
                    "gen_ai.loop.iteration: exit check"
                );
            }
        }
        Ok(HookAction::Continue)
    }
}
