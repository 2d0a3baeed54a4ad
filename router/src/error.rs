//! Error type for the routing engine.

use thiserror::Error;

/// Errors the routing engine can return to its caller.
///
/// Most failure modes in this crate are *not* represented here — cache,
/// audit, cost, and memory-store failures are logged and swallowed per
/// the engine's failure policy, and a blocked escalation is a normal
/// [`crate::types::RoutingResult`] rather than an error. This enum only
/// covers failures the caller must react to.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RouterError {
    /// The request was malformed (e.g. empty prompt, unknown forced tier).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No tier could produce a usable response.
    #[error("no provider available: {0}")]
    ProviderUnavailable(String),

    /// Unexpected internal failure.
    #[error("internal error: {0}")]
    Internal(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors the ReAct tool agent can return to the routing engine (§4.2, §7A).
/// A blocked paid tool or a hazardous tool awaiting confirmation are not
/// errors — they are `AgentOutcome` variants.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AgentError {
    /// The underlying model provider failed.
    #[error("provider error: {0}")]
    Provider(#[from] neuron_turn::provider::ProviderError),

    /// An ambient hook tripped (e.g. an observer `Halt`) or an operator-level
    /// invariant was violated; carries the teacher's generic agent-loop error.
    #[error("operator error: {0}")]
    Operator(#[from] layer0::error::OperatorError),

    /// Internal invariant violation (e.g. a tool call referencing an id not
    /// present in the same turn).
    #[error("internal agent error: {0}")]
    Internal(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
