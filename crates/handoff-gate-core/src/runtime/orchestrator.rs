// crates/handoff-gate-core/src/runtime/orchestrator.rs
// ============================================================================
// Module: Handoff Gate Conversation Orchestrator
// Description: Per-conversation routing graph and state cache.
// Purpose: Build graphs once per (conversation, scope) and share them safely.
// Dependencies: crate::{core, interfaces, runtime}, tokio
// ============================================================================

//! ## Overview
//! The orchestrator lazily builds a [`RoutingGraph`] and [`ConversationState`]
//! pair for each `(conversation_id, scope_fingerprint)` key. Concurrent first
//! requests for the same key share one [`OnceCell`]: exactly one builds and the
//! rest reuse the result. A fingerprint change replaces the entry on next
//! access and carries the active handler over when the new graph still
//! contains it.
//!
//! The cache is sharded by conversation id. Shard locks are held only for map
//! lookups and inserts, never across an await. Published graphs are immutable
//! and shared by [`Arc`]. The durable [`ConversationStore`] is only read to
//! reseed state on a cold start.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::hash::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::MutexGuard as AsyncMutexGuard;
use tokio::sync::OnceCell;

use crate::core::ConversationId;
use crate::core::ConversationState;
use crate::core::HandlerId;
use crate::core::Scope;
use crate::core::ScopeFingerprint;
use crate::core::Timestamp;
use crate::interfaces::Clock;
use crate::interfaces::ConversationStore;
use crate::interfaces::StoreError;
use crate::runtime::audit::RoutingAuditEvent;
use crate::runtime::audit::RoutingAuditKind;
use crate::runtime::audit::RoutingAuditSink;
use crate::runtime::capability::CapabilityResolver;
use crate::runtime::routing::HandoffRegistry;
use crate::runtime::routing::RoutingGraph;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of cache shards.
const SHARD_COUNT: usize = 16;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Orchestrator errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    /// A cache shard lock was poisoned by a panicking thread.
    #[error("conversation cache shard poisoned")]
    CachePoisoned,
}

// ============================================================================
// SECTION: Eviction Policies
// ============================================================================

/// Cache entry metadata presented to eviction policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryInfo {
    /// Conversation identifier.
    pub conversation_id: ConversationId,
    /// Last time the entry was looked up.
    pub last_accessed_at: Timestamp,
}

/// Pluggable cache eviction policy.
pub trait EvictionPolicy: Send + Sync {
    /// Returns the conversations to evict.
    fn select(&self, entries: &[CacheEntryInfo], now: Timestamp) -> Vec<ConversationId>;

    /// Returns a stable label for audit events.
    fn label(&self) -> &'static str;

    /// Returns true when the policy never evicts, so scans can be skipped.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Policy that never evicts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEviction;

impl EvictionPolicy for NoEviction {
    fn select(&self, _entries: &[CacheEntryInfo], _now: Timestamp) -> Vec<ConversationId> {
        Vec::new()
    }

    fn label(&self) -> &'static str {
        "none"
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Policy bounding the number of cached conversations, least recently used first.
#[derive(Debug, Clone, Copy)]
pub struct MaxEntries(pub usize);

impl EvictionPolicy for MaxEntries {
    fn select(&self, entries: &[CacheEntryInfo], _now: Timestamp) -> Vec<ConversationId> {
        if entries.len() <= self.0 {
            return Vec::new();
        }
        let mut ordered: Vec<&CacheEntryInfo> = entries.iter().collect();
        ordered.sort_by(|a, b| {
            a.last_accessed_at
                .ordinal()
                .cmp(&b.last_accessed_at.ordinal())
                .then_with(|| a.conversation_id.cmp(&b.conversation_id))
        });
        ordered
            .into_iter()
            .take(entries.len() - self.0)
            .map(|entry| entry.conversation_id.clone())
            .collect()
    }

    fn label(&self) -> &'static str {
        "max_entries"
    }
}

/// Policy evicting entries idle for longer than the given milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct IdleTimeout(pub u64);

impl EvictionPolicy for IdleTimeout {
    fn select(&self, entries: &[CacheEntryInfo], now: Timestamp) -> Vec<ConversationId> {
        entries
            .iter()
            .filter(|entry| {
                now.millis_since(&entry.last_accessed_at).is_some_and(|idle| idle > self.0)
            })
            .map(|entry| entry.conversation_id.clone())
            .collect()
    }

    fn label(&self) -> &'static str {
        "idle_timeout"
    }
}

// ============================================================================
// SECTION: Statistics
// ============================================================================

/// Cache counters.
#[derive(Debug, Default)]
struct Counters {
    /// Graphs built.
    builds: AtomicU64,
    /// Lookups served from a published entry.
    hits: AtomicU64,
    /// Builds that replaced an entry with a different fingerprint.
    rebuilds: AtomicU64,
    /// Builds that restored a non-coordinator active handler.
    reseeds: AtomicU64,
    /// Active handlers reset to the coordinator.
    resets: AtomicU64,
    /// Entries removed by the eviction policy.
    evictions: AtomicU64,
}

/// Snapshot of orchestrator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrchestratorStats {
    /// Graphs built.
    pub builds: u64,
    /// Lookups served from a published entry.
    pub hits: u64,
    /// Builds that replaced an entry with a different fingerprint.
    pub rebuilds: u64,
    /// Builds that restored a non-coordinator active handler.
    pub reseeds: u64,
    /// Active handlers reset to the coordinator.
    pub resets: u64,
    /// Entries removed by the eviction policy.
    pub evictions: u64,
}

// ============================================================================
// SECTION: Cache Entries
// ============================================================================

/// Published graph and state pair.
#[derive(Clone)]
struct Published {
    /// Immutable routing graph.
    graph: Arc<RoutingGraph>,
    /// Per-conversation state lock.
    state: Arc<AsyncMutex<ConversationState>>,
}

/// Cache slot for one conversation.
struct Slot {
    /// Fingerprint the slot is keyed on.
    fingerprint: ScopeFingerprint,
    /// Single-flight cell holding the published pair.
    cell: Arc<OnceCell<Published>>,
    /// Last pair published under an earlier fingerprint, kept until this slot publishes.
    previous: Option<Published>,
    /// Last lookup time.
    last_accessed_at: Timestamp,
}

impl Slot {
    /// Creates an empty slot.
    fn new(
        fingerprint: ScopeFingerprint,
        previous: Option<Published>,
        last_accessed_at: Timestamp,
    ) -> Self {
        Self {
            fingerprint,
            cell: Arc::new(OnceCell::new()),
            previous,
            last_accessed_at,
        }
    }
}

/// How a lookup found its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lookup {
    /// The slot existed with the same fingerprint.
    Existing,
    /// The slot was created for a new conversation.
    Inserted,
    /// The slot replaced one with a different fingerprint.
    Replaced,
}

/// Shard of the conversation cache.
type Shard = Mutex<HashMap<ConversationId, Slot>>;

// ============================================================================
// SECTION: Handles
// ============================================================================

/// Handle to a cached conversation entry.
#[derive(Clone)]
pub struct ConversationHandle {
    /// Conversation identifier.
    conversation_id: ConversationId,
    /// Published pair.
    published: Published,
}

impl ConversationHandle {
    /// Returns the conversation identifier.
    #[must_use]
    pub const fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Returns the shared routing graph.
    #[must_use]
    pub const fn graph(&self) -> &Arc<RoutingGraph> {
        &self.published.graph
    }

    /// Locks the per-conversation state.
    pub async fn lock_state(&self) -> AsyncMutexGuard<'_, ConversationState> {
        self.published.state.lock().await
    }
}

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Per-conversation cache of routing graphs and state.
///
/// # Invariants
/// - At most one graph is built per `(conversation_id, scope_fingerprint)` while
///   the entry stays cached.
/// - A cached active handler is always contained in the entry's graph.
pub struct ConversationOrchestrator {
    /// Handoff registry used to build graphs.
    registry: Arc<HandoffRegistry>,
    /// Resolver supplying the plan table for upgrade hints.
    resolver: Arc<CapabilityResolver>,
    /// Durable conversation store.
    store: Arc<dyn ConversationStore>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Audit sink.
    audit: Arc<dyn RoutingAuditSink>,
    /// Eviction policy.
    eviction: Arc<dyn EvictionPolicy>,
    /// Cache shards.
    shards: Box<[Shard]>,
    /// Cache counters.
    counters: Counters,
}

impl ConversationOrchestrator {
    /// Creates an orchestrator that never evicts.
    #[must_use]
    pub fn new(
        registry: Arc<HandoffRegistry>,
        resolver: Arc<CapabilityResolver>,
        store: Arc<dyn ConversationStore>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn RoutingAuditSink>,
    ) -> Self {
        Self {
            registry,
            resolver,
            store,
            clock,
            audit,
            eviction: Arc::new(NoEviction),
            shards: (0 .. SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            counters: Counters::default(),
        }
    }

    /// Sets the eviction policy.
    #[must_use]
    pub fn with_eviction(mut self, eviction: Arc<dyn EvictionPolicy>) -> Self {
        self.eviction = eviction;
        self
    }

    /// Returns the cached entry for the conversation, building it when absent
    /// or when the scope fingerprint changed.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::CachePoisoned`] when a shard lock is poisoned.
    pub async fn get_or_create(
        &self,
        conversation_id: &ConversationId,
        scope: &Arc<Scope>,
    ) -> Result<ConversationHandle, OrchestratorError> {
        let now = self.clock.now();
        let (cell, previous, lookup) = {
            let mut shard =
                self.shard(conversation_id).lock().map_err(|_| OrchestratorError::CachePoisoned)?;
            match shard.get_mut(conversation_id) {
                Some(slot) if &slot.fingerprint == scope.fingerprint() => {
                    slot.last_accessed_at = now;
                    if slot.cell.initialized() {
                        slot.previous = None;
                    }
                    (Arc::clone(&slot.cell), None, Lookup::Existing)
                }
                Some(slot) => {
                    // An unfinished build hands its own predecessor on.
                    let previous = slot.cell.get().cloned().or_else(|| slot.previous.take());
                    *slot = Slot::new(scope.fingerprint().clone(), previous.clone(), now);
                    (Arc::clone(&slot.cell), previous, Lookup::Replaced)
                }
                None => {
                    let slot = Slot::new(scope.fingerprint().clone(), None, now);
                    let cell = Arc::clone(&slot.cell);
                    shard.insert(conversation_id.clone(), slot);
                    (cell, None, Lookup::Inserted)
                }
            }
        };
        if lookup == Lookup::Existing && cell.initialized() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        }
        let published = cell
            .get_or_init(|| {
                self.build(conversation_id, scope, previous, lookup == Lookup::Replaced, now)
            })
            .await
            .clone();
        if lookup == Lookup::Inserted {
            self.apply_eviction(now)?;
        }
        Ok(ConversationHandle {
            conversation_id: conversation_id.clone(),
            published,
        })
    }

    /// Removes a conversation from the cache. Returns true when an entry existed.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::CachePoisoned`] when a shard lock is poisoned.
    pub fn clear(&self, conversation_id: &ConversationId) -> Result<bool, OrchestratorError> {
        let removed = self
            .shard(conversation_id)
            .lock()
            .map_err(|_| OrchestratorError::CachePoisoned)?
            .remove(conversation_id)
            .is_some();
        if removed {
            self.audit.record(&RoutingAuditEvent::new(
                Some(conversation_id.clone()),
                None,
                RoutingAuditKind::CacheEvicted {
                    cause: "cleared",
                },
            ));
        }
        Ok(removed)
    }

    /// Removes every conversation from the cache. Returns the number of removed entries.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::CachePoisoned`] when a shard lock is poisoned.
    pub fn clear_all(&self) -> Result<usize, OrchestratorError> {
        let mut removed = Vec::new();
        for shard in &self.shards {
            let mut shard = shard.lock().map_err(|_| OrchestratorError::CachePoisoned)?;
            removed.extend(shard.drain().map(|(conversation_id, _)| conversation_id));
        }
        for conversation_id in &removed {
            self.audit.record(&RoutingAuditEvent::new(
                Some(conversation_id.clone()),
                None,
                RoutingAuditKind::CacheEvicted {
                    cause: "cleared",
                },
            ));
        }
        Ok(removed.len())
    }

    /// Applies the eviction policy now. Returns the number of evicted entries.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::CachePoisoned`] when a shard lock is poisoned.
    pub fn sweep(&self) -> Result<usize, OrchestratorError> {
        self.apply_eviction(self.clock.now())
    }

    /// Returns the number of cached conversations.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::CachePoisoned`] when a shard lock is poisoned.
    pub fn len(&self) -> Result<usize, OrchestratorError> {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.lock().map_err(|_| OrchestratorError::CachePoisoned)?.len();
        }
        Ok(total)
    }

    /// Returns true when the cache is empty.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::CachePoisoned`] when a shard lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, OrchestratorError> {
        Ok(self.len()? == 0)
    }

    /// Returns a snapshot of the cache counters.
    #[must_use]
    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            builds: self.counters.builds.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            rebuilds: self.counters.rebuilds.load(Ordering::Relaxed),
            reseeds: self.counters.reseeds.load(Ordering::Relaxed),
            resets: self.counters.resets.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Returns the shard owning a conversation.
    fn shard(&self, conversation_id: &ConversationId) -> &Shard {
        let mut hasher = DefaultHasher::new();
        conversation_id.hash(&mut hasher);
        let index = usize::try_from(hasher.finish() % SHARD_COUNT as u64).unwrap_or(0);
        &self.shards[index]
    }

    /// Builds the published pair for a slot.
    async fn build(
        &self,
        conversation_id: &ConversationId,
        scope: &Arc<Scope>,
        previous: Option<Published>,
        rebuild: bool,
        now: Timestamp,
    ) -> Published {
        let plans = self.resolver.plan_table();
        let graph = Arc::new(self.registry.build_graph(scope, &plans));
        self.counters.builds.fetch_add(1, Ordering::Relaxed);
        if rebuild {
            self.counters.rebuilds.fetch_add(1, Ordering::Relaxed);
        }
        self.record(
            conversation_id,
            RoutingAuditKind::GraphBuilt {
                fingerprint: scope.fingerprint().clone(),
                handlers: graph.handlers().cloned().collect(),
                rebuild,
            },
        );

        let (seed, source) = match previous {
            Some(previous) => {
                (previous.state.lock().await.active_handler.clone(), "previous_scope")
            }
            None => match self.store.load_active_handler(conversation_id).await {
                Ok(seed) => (seed, "store"),
                Err(err) => {
                    self.record_store_error(conversation_id, "load_active_handler", &err);
                    (None, "store")
                }
            },
        };
        let active_handler = match seed {
            Some(handler) if graph.contains_handler(&handler) => {
                self.counters.reseeds.fetch_add(1, Ordering::Relaxed);
                self.record(
                    conversation_id,
                    RoutingAuditKind::StateReseeded {
                        handler: handler.clone(),
                        source,
                    },
                );
                Some(handler)
            }
            Some(handler) => {
                self.reset(conversation_id, handler, "not_in_scope").await;
                None
            }
            None => None,
        };

        Published {
            graph,
            state: Arc::new(AsyncMutex::new(ConversationState {
                conversation_id: conversation_id.clone(),
                active_handler,
                scope_fingerprint: scope.fingerprint().clone(),
                created_at: now,
                last_accessed_at: now,
            })),
        }
    }

    /// Records a reset to the coordinator and persists it.
    pub(crate) async fn reset(
        &self,
        conversation_id: &ConversationId,
        handler: HandlerId,
        reason: &'static str,
    ) {
        self.counters.resets.fetch_add(1, Ordering::Relaxed);
        self.record(
            conversation_id,
            RoutingAuditKind::StateReset {
                handler,
                reason,
            },
        );
        if let Err(err) = self.store.save_active_handler(conversation_id, None).await {
            self.record_store_error(conversation_id, "save_active_handler", &err);
        }
    }

    /// Evicts the entries selected by the policy.
    fn apply_eviction(&self, now: Timestamp) -> Result<usize, OrchestratorError> {
        if self.eviction.is_noop() {
            return Ok(0);
        }
        let mut entries = Vec::new();
        for shard in &self.shards {
            let guard = shard.lock().map_err(|_| OrchestratorError::CachePoisoned)?;
            entries.extend(guard.iter().map(|(conversation_id, slot)| CacheEntryInfo {
                conversation_id: conversation_id.clone(),
                last_accessed_at: slot.last_accessed_at,
            }));
        }
        let mut evicted = 0;
        for conversation_id in self.eviction.select(&entries, now) {
            let removed = self
                .shard(&conversation_id)
                .lock()
                .map_err(|_| OrchestratorError::CachePoisoned)?
                .remove(&conversation_id)
                .is_some();
            if removed {
                evicted += 1;
                self.counters.evictions.fetch_add(1, Ordering::Relaxed);
                self.record(
                    &conversation_id,
                    RoutingAuditKind::CacheEvicted {
                        cause: self.eviction.label(),
                    },
                );
            }
        }
        Ok(evicted)
    }

    /// Records a conversation-scoped audit event.
    fn record(&self, conversation_id: &ConversationId, kind: RoutingAuditKind) {
        self.audit.record(&RoutingAuditEvent::new(Some(conversation_id.clone()), None, kind));
    }

    /// Records a store failure.
    fn record_store_error(
        &self,
        conversation_id: &ConversationId,
        operation: &'static str,
        err: &StoreError,
    ) {
        self.record(
            conversation_id,
            RoutingAuditKind::StoreError {
                operation,
                error: err.to_string(),
            },
        );
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
