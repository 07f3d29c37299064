//! In-memory table of active turtle swarms.
//!
//! The danger scheduler owns the table and hands a clone of it to the
//! defense coordinator. Each chat has its own async slot, so work on one
//! chat's swarm never waits on another chat.
//!
//! # Generations
//!
//! Every spawn draws a fresh generation stamp from a process-wide counter.
//! Delayed damage ticks carry the stamp of the swarm that scheduled them and
//! do nothing once the slot holds a different swarm, or a swarm that has
//! already ended. A repelled swarm stays in its slot as `Resolved` until the
//! next spawn; a swarm overwritten while forming leaves as `Expired`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use peatnet_types::{ChatId, DefenseState, HazardKind, UserId};
use serde::{Deserialize, Serialize};

/// A swarm being defended against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHazard {
    /// Kind of hazard.
    pub kind: HazardKind,
    /// Stamp identifying this particular spawn.
    pub generation: u64,
    /// When it spawned.
    pub spawned_at: DateTime<Utc>,
    /// Number of turtles.
    pub severity: u32,
    /// Users who joined the defense.
    pub participants: BTreeSet<UserId>,
    /// Lifecycle state.
    pub state: DefenseState,
}

impl ActiveHazard {
    /// A fresh swarm with nobody defending yet.
    pub const fn forming(
        kind: HazardKind,
        generation: u64,
        spawned_at: DateTime<Utc>,
        severity: u32,
    ) -> Self {
        Self {
            kind,
            generation,
            spawned_at,
            severity,
            participants: BTreeSet::new(),
            state: DefenseState::Forming,
        }
    }

    /// Whether the swarm still awaits defenders.
    pub const fn is_active(&self) -> bool {
        matches!(self.state, DefenseState::Forming)
    }

    /// Whether this is the swarm stamped `generation` and it still awaits
    /// defenders.
    pub const fn is_forming(&self, generation: u64) -> bool {
        self.generation == generation && self.is_active()
    }

    /// Close a forming swarm as repelled. Returns `false` if it had already
    /// ended.
    pub const fn resolve(&mut self) -> bool {
        self.finish(DefenseState::Resolved)
    }

    /// Close a forming swarm as overwritten, handing it back only if it was
    /// still forming.
    pub fn into_expired(mut self) -> Option<Self> {
        self.finish(DefenseState::Expired).then_some(self)
    }

    const fn finish(&mut self, state: DefenseState) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = state;
        true
    }
}

/// Async slot holding a chat's current swarm.
pub type HazardSlot = Arc<tokio::sync::Mutex<Option<ActiveHazard>>>;

/// Per-chat hazard slots plus the generation counter.
#[derive(Debug, Clone, Default)]
pub struct HazardTable {
    slots: Arc<Mutex<BTreeMap<ChatId, HazardSlot>>>,
    generation: Arc<AtomicU64>,
}

impl HazardTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, BTreeMap<ChatId, HazardSlot>> {
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The slot for `chat`, created empty on first use.
    pub fn slot(&self, chat: ChatId) -> HazardSlot {
        Arc::clone(self.slots().entry(chat).or_default())
    }

    /// A new, never reused generation stamp.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed).saturating_add(1)
    }

    /// Copy of the chat's current swarm, if any.
    pub async fn snapshot(&self, chat: ChatId) -> Option<ActiveHazard> {
        self.slot(chat).lock().await.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn generations_increase() {
        let table = HazardTable::new();
        let first = table.next_generation();
        let second = table.clone().next_generation();
        assert!(second > first);
    }

    #[tokio::test]
    async fn slots_are_shared_between_clones() {
        let table = HazardTable::new();
        let other = table.clone();
        *table.slot(ChatId(4)).lock().await = Some(ActiveHazard::forming(
            HazardKind::Turtles,
            7,
            Utc::now(),
            5,
        ));
        let seen = other.snapshot(ChatId(4)).await;
        assert!(seen.is_some_and(|h| h.is_forming(7) && !h.is_forming(8)));
        assert!(other.snapshot(ChatId(5)).await.is_none());
    }

    #[test]
    fn swarm_ends_exactly_once() {
        let mut repelled = ActiveHazard::forming(HazardKind::Turtles, 3, Utc::now(), 4);
        assert!(repelled.resolve());
        assert_eq!(repelled.state, DefenseState::Resolved);
        assert!(!repelled.is_forming(3));
        assert!(!repelled.resolve());
        assert!(repelled.into_expired().is_none());

        let replaced = ActiveHazard::forming(HazardKind::Turtles, 4, Utc::now(), 4)
            .into_expired()
            .unwrap();
        assert_eq!(replaced.state, DefenseState::Expired);
        assert!(!replaced.is_active());
    }
}
