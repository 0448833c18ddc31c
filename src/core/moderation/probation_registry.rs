// Probation registry - tracks newly joined members until they are trusted.
//
// The registry is the single owner and single writer of `Member` records.
// Writes for one member are serialized by the DashMap entry lock, so two
// messages from the same member arriving at once can't lose an increment.
// Persistence goes through the `ProbationStore` port; infra provides the
// JSON and SQLite implementations.

use super::moderation_models::{Member, MemberId, MemberState, ProbationConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Corrupt probation data: {0}")]
    Corrupt(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Backing store for the registry.
///
/// `save` must be all-or-nothing: a crash halfway through must leave the
/// previous contents readable.
#[async_trait]
pub trait ProbationStore: Send + Sync {
    /// Load every persisted member. A missing or empty store is `Ok(vec![])`.
    async fn load(&self) -> Result<Vec<Member>, PersistenceError>;

    /// Replace the persisted contents with `members`.
    async fn save(&self, members: &[Member]) -> Result<(), PersistenceError>;

    /// Move contents that `load` can't read out of the way, keeping them for
    /// an operator. Afterwards the store loads as empty.
    async fn quarantine(&self) -> Result<(), PersistenceError>;
}

#[async_trait]
impl<T: ProbationStore + ?Sized> ProbationStore for Box<T> {
    async fn load(&self) -> Result<Vec<Member>, PersistenceError> {
        (**self).load().await
    }

    async fn save(&self, members: &[Member]) -> Result<(), PersistenceError> {
        (**self).save(members).await
    }

    async fn quarantine(&self) -> Result<(), PersistenceError> {
        (**self).quarantine().await
    }
}

#[async_trait]
impl<T: ProbationStore + ?Sized> ProbationStore for Arc<T> {
    async fn load(&self) -> Result<Vec<Member>, PersistenceError> {
        (**self).load().await
    }

    async fn save(&self, members: &[Member]) -> Result<(), PersistenceError> {
        (**self).save(members).await
    }

    async fn quarantine(&self) -> Result<(), PersistenceError> {
        (**self).quarantine().await
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ProbationRegistry<S: ProbationStore> {
    store: S,
    config: ProbationConfig,
    members: DashMap<MemberId, Member>,
    /// Set on every mutation, cleared by a successful flush
    dirty: AtomicBool,
    /// The store couldn't be read; it must not be overwritten blindly
    load_failed: AtomicBool,
    /// One flush at a time
    flush_lock: Mutex<()>,
}

impl<S: ProbationStore> ProbationRegistry<S> {
    /// Create an empty registry. Call `load` to restore persisted state.
    pub fn new(store: S, config: ProbationConfig) -> Self {
        Self {
            store,
            config,
            members: DashMap::new(),
            dirty: AtomicBool::new(false),
            load_failed: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        }
    }

    /// Create a registry and restore whatever the store holds.
    pub async fn open(store: S, config: ProbationConfig) -> Self {
        let registry = Self::new(store, config);
        registry.load().await;
        registry
    }

    /// Replace the in-memory state with the store's contents.
    ///
    /// An unreadable store degrades to an empty registry instead of failing.
    /// The next `persist` then deals with the unread contents before saving.
    /// Returns the number of members restored.
    pub async fn load(&self) -> usize {
        match self.store.load().await {
            Ok(members) => {
                self.members.clear();
                for member in members {
                    self.members.insert(member.id, member);
                }
                self.dirty.store(false, Ordering::SeqCst);
                self.load_failed.store(false, Ordering::SeqCst);
                tracing::info!(members = self.members.len(), "Probation registry loaded");
                self.members.len()
            }
            Err(e) => {
                tracing::warn!("Could not load probation registry, starting empty: {}", e);
                self.members.clear();
                self.load_failed.store(true, Ordering::SeqCst);
                0
            }
        }
    }

    /// Start tracking a member who just joined.
    ///
    /// Re-enrolling a known member does nothing; join events can arrive twice.
    pub fn enroll(&self, member_id: MemberId, joined_at: DateTime<Utc>) {
        match self.members.entry(member_id) {
            Entry::Occupied(existing) => {
                tracing::debug!(
                    member_id,
                    state = %existing.get().state,
                    "Ignoring duplicate enroll"
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(Member::new(member_id, joined_at));
                self.mark_dirty();
                tracing::info!(member_id, %joined_at, "Member enrolled in probation");
            }
        }
    }

    pub fn config(&self) -> ProbationConfig {
        self.config
    }

    /// Current trust state. Members never enrolled are trusted.
    pub fn get_state(&self, member_id: MemberId) -> MemberState {
        self.members
            .get(&member_id)
            .map(|m| m.state)
            .unwrap_or(MemberState::Trusted)
    }

    /// Copy of a member's record, if tracked.
    pub fn member(&self, member_id: MemberId) -> Option<Member> {
        self.members.get(&member_id).map(|m| m.clone())
    }

    /// Apply the elapsed-time transition for a member, if it is due.
    ///
    /// Returns the member's state after the check.
    pub fn observe(&self, member_id: MemberId, now: DateTime<Utc>) -> MemberState {
        let Some(mut member) = self.members.get_mut(&member_id) else {
            return MemberState::Trusted;
        };

        if member.state != MemberState::Trusted && self.window_elapsed(&member, now) {
            let previous = member.state;
            member.state = MemberState::Trusted;
            drop(member);
            self.mark_dirty();
            tracing::info!(
                member_id,
                from = %previous,
                "Probation window elapsed, member trusted"
            );
            return MemberState::Trusted;
        }

        member.state
    }

    /// Count a clean message and advance the member's state if a threshold is met.
    ///
    /// No-op for trusted or unknown members. Returns the state afterwards.
    pub fn record_clean_message(&self, member_id: MemberId, now: DateTime<Utc>) -> MemberState {
        let Some(mut member) = self.members.get_mut(&member_id) else {
            return MemberState::Trusted;
        };

        if member.state == MemberState::Trusted {
            return MemberState::Trusted;
        }

        member.clean_message_count = member.clean_message_count.saturating_add(1);

        let previous = member.state;
        let next = if member.clean_message_count >= self.config.clean_messages_to_trust
            || self.window_elapsed(&member, now)
        {
            MemberState::Trusted
        } else {
            MemberState::Probation
        };
        // States only move forward
        member.state = previous.max(next);

        let state = member.state;
        let count = member.clean_message_count;
        drop(member);
        self.mark_dirty();

        if state != previous {
            tracing::info!(
                member_id,
                from = %previous,
                to = %state,
                clean_messages = count,
                "Member state advanced"
            );
        }

        state
    }

    /// All tracked members, ordered by id.
    pub fn snapshot(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self.members.iter().map(|m| m.value().clone()).collect();
        members.sort_by_key(|m| m.id);
        members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Flush the registry to the store if anything changed.
    ///
    /// On failure the registry stays dirty so the next flush retries.
    /// Returns the number of members written (0 when there was nothing to do).
    pub async fn persist(&self) -> Result<usize, PersistenceError> {
        let _flush = self.flush_lock.lock().await;

        // Clear before taking the snapshot so concurrent writes re-mark it.
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(0);
        }

        if self.load_failed.load(Ordering::SeqCst) {
            if let Err(e) = self.recover_unread_store().await {
                self.mark_dirty();
                tracing::error!("Refusing to overwrite unreadable probation store: {}", e);
                return Err(e);
            }
        }

        let snapshot = self.snapshot();
        match self.store.save(&snapshot).await {
            Ok(()) => {
                tracing::debug!(members = snapshot.len(), "Probation registry flushed");
                Ok(snapshot.len())
            }
            Err(e) => {
                self.mark_dirty();
                tracing::error!("Failed to flush probation registry: {}", e);
                Err(e)
            }
        }
    }

    /// Called before the first save after a failed load.
    ///
    /// A store that reads fine now is merged in, with members enrolled since
    /// startup taking precedence. One that still can't be read is moved aside.
    async fn recover_unread_store(&self) -> Result<(), PersistenceError> {
        match self.store.load().await {
            Ok(stored) => {
                let mut restored = 0usize;
                for member in stored {
                    if let Entry::Vacant(slot) = self.members.entry(member.id) {
                        slot.insert(member);
                        restored += 1;
                    }
                }
                tracing::info!(restored, "Probation store readable again, merged");
            }
            Err(e) => {
                tracing::warn!("Probation store still unreadable, moving it aside: {}", e);
                self.store.quarantine().await?;
            }
        }

        self.load_failed.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    fn window_elapsed(&self, member: &Member, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(member.joined_at) >= self.config.window()
    }
}

// ============================================================================
// TESTS
// ============================================================================
