//! Semantic & exact cache (§4.4): a short-circuit for repeated prompts.
//!
//! Both lookup modes the spec allows (exact hash, semantic nearest-neighbor)
//! implement the same [`Cache`] trait and share the same eligibility rules;
//! [`InMemoryCache`] here is the exact-hash mode. The cache is advisory —
//! read/write failures are logged and swallowed by the engine, never
//! propagated.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;

/// One cached response. The embedding field is populated by semantic-mode
/// implementations; exact-hash mode leaves it `None`.
#[derive(Debug, Clone)]
pub struct CacheRecord {
    /// The cached response text.
    pub response: String,
    /// Confidence recorded alongside the original response.
    pub confidence: f64,
    /// When this record was inserted.
    pub created_at: DateTime<Utc>,
    /// Optional embedding vector for semantic nearest-neighbor lookup.
    pub embedding: Option<Vec<f32>>,
}

/// SHA-256 of the UTF-8-encoded prompt text, used as the exact-match cache key.
pub fn fingerprint(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether a result is eligible for a cache lookup or insert. Both share one
/// rule set per §4.4: no freshness requirement, no vision targets, and (for
/// insert) non-empty output on a result that wasn't itself served from cache.
pub fn is_eligible(freshness_required: bool, vision_targets_present: bool) -> bool {
    !freshness_required && !vision_targets_present
}

/// A cache backend keyed by prompt fingerprint.
#[async_trait::async_trait]
pub trait Cache: Send + Sync {
    /// Look up a record by fingerprint.
    async fn get(&self, key: &str) -> Option<CacheRecord>;

    /// Insert (or overwrite) a record.
    async fn put(&self, key: &str, record: CacheRecord);
}

/// In-process exact-hash cache, backed by an `RwLock<HashMap>`. Suitable as
/// the reference implementation; a production deployment would back this
/// with a KV or vector store per §5's "implementation-chosen" note.
#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheRecord>>,
}

impl InMemoryCache {
    /// Construct an empty cache.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<CacheRecord> {
        self.entries.read().unwrap().get(key).cloned()
    }

    async fn put(&self, key: &str, record: CacheRecord) {
        self.entries.write().unwrap().insert(key.to_string(), record);
    }
}
