//! Conversation state & memory adapter (§4.9): per-conversation state (the
//! single pending-confirmation slot) plus a best-effort long-term memory
//! interface used to enrich prompts with `<relevant_context>`.

use crate::confirmation::PendingConfirmation;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Per-conversation state. Each conversation gets its own lock so that one
/// busy conversation never blocks lookups for another.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    /// Identifies the human behind this conversation, if known.
    pub user_id: Option<String>,
    /// At most one hazardous tool call can be awaiting confirmation at a
    /// time; a second hazardous call while one is pending replaces it.
    pub pending_confirmation: Option<PendingConfirmation>,
}

/// A map from conversation id to independently-locked state.
#[derive(Default)]
pub struct ConversationStore {
    entries: RwLock<HashMap<String, Arc<Mutex<ConversationState>>>>,
}

impl ConversationStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch (creating if absent) the state handle for `conversation_id`.
    pub fn get_or_create(&self, conversation_id: &str, user_id: Option<&str>) -> Arc<Mutex<ConversationState>> {
        if let Some(entry) = self.entries.read().unwrap().get(conversation_id) {
            return entry.clone();
        }
        let mut entries = self.entries.write().unwrap();
        entries
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ConversationState {
                    user_id: user_id.map(str::to_string),
                    pending_confirmation: None,
                }))
            })
            .clone()
    }

    /// Install a pending confirmation on the given conversation, replacing
    /// any prior one.
    pub fn set_pending_confirmation(&self, conversation_id: &str, pending: PendingConfirmation) {
        let state = self.get_or_create(conversation_id, None);
        state.lock().unwrap().pending_confirmation = Some(pending);
    }

    /// The conversation's pending confirmation, if any and not expired. An
    /// expired slot is cleared as a side effect (§4.8 "silently cleared").
    pub fn take_if_live(&self, conversation_id: &str) -> Option<PendingConfirmation> {
        let state = self.get_or_create(conversation_id, None);
        let mut guard = state.lock().unwrap();
        match guard.pending_confirmation.take() {
            Some(pending) if !pending.is_expired(Utc::now()) => Some(pending),
            _ => None,
        }
    }

    /// Whether a live (unexpired) confirmation is pending, without consuming it.
    pub fn has_pending(&self, conversation_id: &str) -> bool {
        let state = self.get_or_create(conversation_id, None);
        let guard = state.lock().unwrap();
        matches!(&guard.pending_confirmation, Some(p) if !p.is_expired(Utc::now()))
    }

    /// Clear any pending confirmation on the conversation (used after a
    /// successful execution or an explicit cancellation).
    pub fn clear_pending(&self, conversation_id: &str) {
        let state = self.get_or_create(conversation_id, None);
        state.lock().unwrap().pending_confirmation = None;
    }
}

/// One remembered fact, ranked by relevance to a search query.
#[derive(Debug, Clone)]
pub struct Memory {
    /// The remembered text.
    pub content: String,
    /// Relevance score in `[0, 1]`; higher is more relevant.
    pub score: f64,
    /// When the memory was recorded.
    pub created_at: chrono::DateTime<Utc>,
}

/// Long-term memory store. Calls are best-effort: the engine logs and
/// swallows failures rather than propagating them to the caller (§4.9).
#[async_trait::async_trait]
pub trait MemoryAdapter: Send + Sync {
    /// Record one memory scoped to `conversation_id` (and, if known, `user_id`).
    async fn add(&self, conversation_id: &str, user_id: Option<&str>, content: &str);

    /// Search for memories relevant to `query`, scoped to `conversation_id`
    /// first and falling back to `user_id` per §9A(a)'s enrichment order.
    async fn search(
        &self,
        query: &str,
        conversation_id: &str,
        user_id: Option<&str>,
        limit: usize,
    ) -> Vec<Memory>;
}

/// In-process memory store using naive substring overlap as its relevance
/// score. A production deployment would back this with a vector store;
/// the [`MemoryAdapter`] boundary is what the engine depends on.
#[derive(Default)]
pub struct InMemoryMemoryAdapter {
    by_conversation: RwLock<HashMap<String, Vec<(String, chrono::DateTime<Utc>)>>>,
    by_user: RwLock<HashMap<String, Vec<(String, chrono::DateTime<Utc>)>>>,
}

impl InMemoryMemoryAdapter {
    /// Construct an empty adapter.
    pub fn new() -> Self {
        Self::default()
    }

    fn score(query: &str, content: &str) -> f64 {
        let query_words: Vec<&str> = query.to_lowercase().split_whitespace().collect();
        if query_words.is_empty() {
            return 0.0;
        }
        let content_lower = content.to_lowercase();
        let hits = query_words
            .iter()
            .filter(|word| content_lower.contains(*word))
            .count();
        hits as f64 / query_words.len() as f64
    }
}

#[async_trait::async_trait]
impl MemoryAdapter for InMemoryMemoryAdapter {
    async fn add(&self, conversation_id: &str, user_id: Option<&str>, content: &str) {
        let now = Utc::now();
        self.by_conversation
            .write()
            .unwrap()
            .entry(conversation_id.to_string())
            .or_default()
            .push((content.to_string(), now));
        if let Some(user_id) = user_id {
            self.by_user
                .write()
                .unwrap()
                .entry(user_id.to_string())
                .or_default()
                .push((content.to_string(), now));
        }
    }

    async fn search(
        &self,
        query: &str,
        conversation_id: &str,
        user_id: Option<&str>,
        limit: usize,
    ) -> Vec<Memory> {
        let mut matches: Vec<Memory> = self
            .by_conversation
            .read()
            .unwrap()
            .get(conversation_id)
            .into_iter()
            .flatten()
            .map(|(content, created_at)| Memory {
                content: content.clone(),
                score: Self::score(query, content),
                created_at: *created_at,
            })
            .filter(|m| m.score > 0.0)
            .collect();

        if matches.is_empty() {
            if let Some(user_id) = user_id {
                matches = self
                    .by_user
                    .read()
                    .unwrap()
                    .get(user_id)
                    .into_iter()
                    .flatten()
                    .map(|(content, created_at)| Memory {
                        content: content.clone(),
                        score: Self::score(query, content),
                        created_at: *created_at,
                    })
                    .filter(|m| m.score > 0.0)
                    .collect();
            }
        }

        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(limit);
        matches
    }
}

/// Prefix `prompt` with a `<relevant_context>` block built from the top
/// memory hits, or return `prompt` unchanged if none were found.
pub async fn enrich_prompt(
    memory: &dyn MemoryAdapter,
    prompt: &str,
    conversation_id: &str,
    user_id: Option<&str>,
) -> String {
    let hits = memory.search(prompt, conversation_id, user_id, 5).await;
    if hits.is_empty() {
        return prompt.to_string();
    }
    let body = hits
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    format!("<relevant_context>\n{body}\n</relevant_context>\n\n{prompt}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_or_create_is_idempotent_per_conversation() {
        let store = ConversationStore::new();
        let a = store.get_or_create("c1", Some("u1"));
        let b = store.get_or_create("c1", None);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn pending_confirmation_round_trips() {
        let store = ConversationStore::new();
        assert!(!store.has_pending("c1"));
        let pending = PendingConfirmation::new(
            "lock.unlock",
            json!({"entity_id": "welding bay"}),
            chrono::Duration::seconds(300),
            Utc::now(),
        );
        store.set_pending_confirmation("c1", pending);
        assert!(store.has_pending("c1"));
        let taken = store.take_if_live("c1").unwrap();
        assert_eq!(taken.tool, "lock.unlock");
        assert!(!store.has_pending("c1"));
    }

    #[test]
    fn expired_confirmation_is_not_returned() {
        let store = ConversationStore::new();
        let pending = PendingConfirmation::new(
            "lock.unlock",
            json!({}),
            chrono::Duration::seconds(-1),
            Utc::now(),
        );
        store.set_pending_confirmation("c1", pending);
        assert!(!store.has_pending("c1"));
        assert!(store.take_if_live("c1").is_none());
    }

    #[tokio::test]
    async fn memory_search_falls_back_to_user_scope() {
        let memory = InMemoryMemoryAdapter::new();
        memory.add("other-conversation", Some("u1"), "the welding bay door code is 4471").await;
        let hits = memory.search("welding bay door code", "c1", Some("u1"), 5).await;
        assert!(!hits.is_empty());
    }

    #[tokio::test]
    async fn enrich_prompt_prefers_conversation_scope_and_passes_through_on_miss() {
        let memory = InMemoryMemoryAdapter::new();
        let unenriched = enrich_prompt(&memory, "what printer is idle", "c1", None).await;
        assert_eq!(unenriched, "what printer is idle");

        memory.add("c1", None, "bamboo printer prefers PETG").await;
        let enriched = enrich_prompt(&memory, "bamboo printer material", "c1", None).await;
        assert!(enriched.starts_with("<relevant_context>"));
        assert!(enriched.contains("bamboo printer material"));
    }
}
