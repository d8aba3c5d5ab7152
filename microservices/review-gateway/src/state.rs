//! Conversation state storage
//!
//! Per-phone-number conversation markers with a bounded TTL. The state
//! machine depends on the `ConversationStore` trait only; the in-memory
//! implementation here and the signed-cookie implementation in
//! `cookies` are interchangeable backings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use solara_core::PhoneNumber;

/// Reply to the yes/no participation invite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Participation {
    Undecided,
    Accepted,
    Declined,
}

/// The minimal memory kept about one phone number's progress through the
/// review script.
///
/// Invariants: `participation != Undecided` implies `greeted`;
/// `collected_name` is set only once participation is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub greeted: bool,
    pub participation: Participation,
    pub collected_name: Option<String>,
}

impl ConversationState {
    /// A never-contacted (or expired) conversation.
    pub fn fresh() -> Self {
        Self {
            greeted: false,
            participation: Participation::Undecided,
            collected_name: None,
        }
    }

    pub fn is_fresh(&self) -> bool {
        !self.greeted
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::fresh()
    }
}

/// Keyed conversation-state storage with TTL semantics.
///
/// Absent and expired entries are both reported as a fresh state.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get(&self, number: &PhoneNumber) -> ConversationState;
    async fn put(&self, number: &PhoneNumber, state: ConversationState);
    async fn clear(&self, number: &PhoneNumber);
}

#[derive(Debug, Clone)]
struct StoredState {
    state: ConversationState,
    touched_at: DateTime<Utc>,
}

impl StoredState {
    fn is_expired(&self, ttl: Duration) -> bool {
        let elapsed = Utc::now().signed_duration_since(self.touched_at);
        elapsed.num_milliseconds().max(0) as u128 > ttl.as_millis()
    }
}

/// Server-side in-memory conversation store
pub struct MemoryConversationStore {
    entries: DashMap<String, StoredState>,
    ttl: Duration,
}

impl MemoryConversationStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Remove expired entries (called periodically)
    pub fn cleanup_expired(&self) {
        self.entries.retain(|_, stored| !stored.is_expired(self.ttl));
    }

    /// Number of live (unexpired) conversations
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| !e.is_expired(self.ttl))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get(&self, number: &PhoneNumber) -> ConversationState {
        match self.entries.get(number.as_str()) {
            Some(stored) if !stored.is_expired(self.ttl) => stored.state.clone(),
            _ => ConversationState::fresh(),
        }
    }

    async fn put(&self, number: &PhoneNumber, state: ConversationState) {
        self.entries.insert(
            number.as_str().to_string(),
            StoredState {
                state,
                touched_at: Utc::now(),
            },
        );
    }

    async fn clear(&self, number: &PhoneNumber) {
        self.entries.remove(number.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number() -> PhoneNumber {
        PhoneNumber::new("+15551230001")
    }

    #[tokio::test]
    async fn test_absent_state_is_fresh() {
        let store = MemoryConversationStore::new(Duration::from_secs(60));
        assert_eq!(store.get(&number()).await, ConversationState::fresh());
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let store = MemoryConversationStore::new(Duration::from_secs(60));
        let state = ConversationState {
            greeted: true,
            participation: Participation::Accepted,
            collected_name: None,
        };
        store.put(&number(), state.clone()).await;
        assert_eq!(store.get(&number()).await, state);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_state_reads_as_fresh() {
        let store = MemoryConversationStore::new(Duration::from_millis(20));
        let state = ConversationState {
            greeted: true,
            participation: Participation::Undecided,
            collected_name: None,
        };
        store.put(&number(), state).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.get(&number()).await, ConversationState::fresh());

        store.cleanup_expired();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_clear_resets_to_fresh() {
        let store = MemoryConversationStore::new(Duration::from_secs(60));
        let state = ConversationState {
            greeted: true,
            participation: Participation::Accepted,
            collected_name: Some("Ana".to_string()),
        };
        store.put(&number(), state).await;
        store.clear(&number()).await;
        assert_eq!(store.get(&number()).await, ConversationState::fresh());
    }
}
