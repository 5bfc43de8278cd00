// crates/handoff-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Handoff Gate In-Memory Store
// Description: Simple in-memory conversation store for tests and demos.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`ConversationStore`]
//! for tests and local demos. It is not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::ConversationId;
use crate::core::HandlerId;
use crate::core::TurnRecord;
use crate::interfaces::ConversationStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Stored data for one conversation.
#[derive(Debug, Default, Clone)]
struct StoredConversation {
    /// Last persisted active handler.
    active_handler: Option<HandlerId>,
    /// Transcript turns in append order.
    turns: Vec<TurnRecord>,
}

/// In-memory conversation store for tests and demos.
#[derive(Debug, Default, Clone)]
pub struct InMemoryConversationStore {
    /// Conversations protected by a mutex.
    conversations: Arc<Mutex<BTreeMap<ConversationId, StoredConversation>>>,
}

impl InMemoryConversationStore {
    /// Creates a new in-memory conversation store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the persisted active handler without going through the async interface.
    #[must_use]
    pub fn active_handler(&self, conversation_id: &ConversationId) -> Option<HandlerId> {
        self.conversations
            .lock()
            .ok()
            .and_then(|guard| guard.get(conversation_id).and_then(|c| c.active_handler.clone()))
    }

    /// Returns the stored transcript without going through the async interface.
    #[must_use]
    pub fn turns(&self, conversation_id: &ConversationId) -> Vec<TurnRecord> {
        self.conversations
            .lock()
            .ok()
            .and_then(|guard| guard.get(conversation_id).map(|c| c.turns.clone()))
            .unwrap_or_default()
    }

    /// Runs a closure against the locked conversation map.
    fn with_conversations<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<ConversationId, StoredConversation>) -> T,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .conversations
            .lock()
            .map_err(|_| StoreError::Store("conversation store mutex poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load_active_handler(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<HandlerId>, StoreError> {
        self.with_conversations(|map| {
            map.get(conversation_id).and_then(|conversation| conversation.active_handler.clone())
        })
    }

    async fn save_active_handler(
        &self,
        conversation_id: &ConversationId,
        active_handler: Option<&HandlerId>,
    ) -> Result<(), StoreError> {
        self.with_conversations(|map| {
            map.entry(conversation_id.clone()).or_default().active_handler =
                active_handler.cloned();
        })
    }

    async fn load_history(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<TurnRecord>, StoreError> {
        self.with_conversations(|map| {
            map.get(conversation_id)
                .map(|conversation| conversation.turns.clone())
                .unwrap_or_default()
        })
    }

    async fn append_turns(
        &self,
        conversation_id: &ConversationId,
        turns: &[TurnRecord],
    ) -> Result<(), StoreError> {
        self.with_conversations(|map| {
            map.entry(conversation_id.clone()).or_default().turns.extend_from_slice(turns);
        })
    }
}
