//! Audit log and cost/SLO bookkeeping (§4.1 step 9): one row per turn plus
//! running per-tier cost totals and the LOCAL-ratio SLO counter.
//!
//! Both the audit store and the cost tracker are best-effort from the
//! engine's point of view: a write failure here is logged and swallowed,
//! never surfaced as a [`crate::error::RouterError`].

use crate::types::Tier;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// One persisted row describing how a single turn was routed.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuditRow {
    /// Unique id for this audit row.
    pub id: String,
    /// The conversation this turn belongs to.
    pub conversation_id: String,
    /// The originating request's id.
    pub request_id: String,
    /// Which tier served the turn.
    pub tier: Tier,
    /// The result's confidence score.
    pub confidence: f64,
    /// Wall-clock time spent producing the result.
    pub latency_ms: u64,
    /// Estimated cost of this turn (zero for cache hits).
    pub cost_estimate: Decimal,
    /// Why an escalation happened, if it did.
    pub escalation_reason: Option<String>,
    /// The human behind the request, if known.
    pub user_id: Option<String>,
    /// When this row was recorded.
    pub created_at: DateTime<Utc>,
}

/// Durable sink for [`AuditRow`]s.
#[async_trait::async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist one row. Implementations should treat this as fire-and-forget
    /// from the caller's perspective; the engine does not retry on failure.
    async fn record(&self, row: AuditRow) -> Result<(), crate::error::RouterError>;
}

/// In-process audit store backed by an append-only `Vec`.
#[derive(Default)]
pub struct InMemoryAuditStore {
    rows: RwLock<Vec<AuditRow>>,
}

impl InMemoryAuditStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row recorded so far, oldest first.
    pub fn rows(&self) -> Vec<AuditRow> {
        self.rows.read().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn record(&self, row: AuditRow) -> Result<(), crate::error::RouterError> {
        self.rows.write().unwrap().push(row);
        Ok(())
    }
}

/// Running per-tier cost totals plus the LOCAL-vs-total turn ratio used as
/// the SLO signal (§8's "cost and SLO counters" invariant).
#[derive(Default)]
pub struct CostTracker {
    by_tier: RwLock<HashMap<Tier, Decimal>>,
    total_turns: AtomicU64,
    local_turns: AtomicU64,
}

impl CostTracker {
    /// Construct a zeroed tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one turn's cost against its tier and update the LOCAL ratio.
    pub fn record(&self, tier: Tier, cost: Decimal) {
        *self.by_tier.write().unwrap().entry(tier).or_insert(Decimal::ZERO) += cost;
        self.total_turns.fetch_add(1, Ordering::Relaxed);
        if tier == Tier::Local {
            self.local_turns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Total cost accrued against one tier.
    pub fn total_for(&self, tier: Tier) -> Decimal {
        self.by_tier.read().unwrap().get(&tier).copied().unwrap_or(Decimal::ZERO)
    }

    /// Fraction of all recorded turns that were served by LOCAL, in `[0, 1]`.
    /// Returns `1.0` (fully healthy) when no turns have been recorded yet.
    pub fn local_ratio(&self) -> f64 {
        let total = self.total_turns.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        self.local_turns.load(Ordering::Relaxed) as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn audit_store_appends_rows() {
        let store = InMemoryAuditStore::new();
        store
            .record(AuditRow {
                id: "a1".into(),
                conversation_id: "c1".into(),
                request_id: "r1".into(),
                tier: Tier::Local,
                confidence: 0.9,
                latency_ms: 12,
                cost_estimate: Decimal::ZERO,
                escalation_reason: None,
                user_id: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(store.rows().len(), 1);
    }

    #[test]
    fn cost_tracker_accumulates_per_tier() {
        let tracker = CostTracker::new();
        tracker.record(Tier::Local, Tier::Local.unit_cost());
        tracker.record(Tier::Web, Tier::Web.unit_cost());
        tracker.record(Tier::Local, Tier::Local.unit_cost());
        assert_eq!(tracker.total_for(Tier::Local), Tier::Local.unit_cost() * Decimal::from(2));
        assert_eq!(tracker.total_for(Tier::Web), Tier::Web.unit_cost());
        assert_eq!(tracker.total_for(Tier::Frontier), Decimal::ZERO);
    }

    #[test]
    fn local_ratio_tracks_the_fraction_of_local_turns() {
        let tracker = CostTracker::new();
        assert_eq!(tracker.local_ratio(), 1.0);
        tracker.record(Tier::Local, Decimal::ZERO);
        tracker.record(Tier::Web, Decimal::ZERO);
        assert_eq!(tracker.local_ratio(), 0.5);
    }
}
