//! Permission manager: the gate an escalation must clear before a paid tier
//! is actually called (§4.1 step 7). Separate from `allow_paid` — the caller
//! flag says escalation is *allowed*; this says it's *affordable*.

use crate::types::Tier;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Authorizes (or denies) spending estimated `cost` on `tier`.
#[async_trait]
pub trait PermissionManager: Send + Sync {
    /// Returns `true` if the estimated cost is authorized.
    async fn authorize(&self, tier: Tier, estimated_cost: Decimal) -> bool;
}

/// Authorizes everything. Suitable for a deployment with no budget controls,
/// or as the default wiring when none is configured.
pub struct AlwaysAllow;

#[async_trait]
impl PermissionManager for AlwaysAllow {
    async fn authorize(&self, _tier: Tier, _estimated_cost: Decimal) -> bool {
        true
    }
}

/// Denies any single call above a fixed per-call ceiling, independent of
/// tier. A production deployment would track a rolling budget instead; this
/// is the minimal policy that exercises the boundary.
pub struct PerCallBudget {
    /// Maximum cost authorized for a single call.
    pub max_cost: Decimal,
}

#[async_trait]
impl PermissionManager for PerCallBudget {
    async fn authorize(&self, _tier: Tier, estimated_cost: Decimal) -> bool {
        estimated_cost <= self.max_cost
    }
}
