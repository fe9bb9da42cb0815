//! crates/logosnap_core/src/favorites.rs
//!
//! The bounded, insertion-ordered collection of favorite logos.

use crate::domain::{FavoriteEntry, LogoId};

/// Default upper bound on the number of favorites a session may hold.
pub const MAX_FAVORITES: usize = 50;

/// What happens when a new favorite arrives while the collection is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapacityPolicy {
    /// Refuse the new favorite; the user has to free a slot first.
    #[default]
    Reject,
    /// Drop the oldest favorite to make room.
    EvictOldest,
}

/// Returned by [`Favorites::insert`] when the collection is full under [`CapacityPolicy::Reject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Favorites are full ({capacity}/{capacity})")]
pub struct CapacityReached {
    pub capacity: usize,
}

#[derive(Debug, Clone)]
pub struct Favorites {
    // Oldest first.
    entries: Vec<FavoriteEntry>,
    capacity: usize,
    policy: CapacityPolicy,
}

impl Favorites {
    pub fn new(capacity: usize, policy: CapacityPolicy) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn contains(&self, id: LogoId) -> bool {
        self.entries.iter().any(|e| e.id() == id)
    }

    pub fn get(&self, id: LogoId) -> Option<&FavoriteEntry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Adds `entry`, returning the entry evicted to make room, if any.
    ///
    /// Inserting an id that is already present replaces nothing and returns `Ok(None)`.
    pub fn insert(&mut self, entry: FavoriteEntry) -> Result<Option<FavoriteEntry>, CapacityReached> {
        if self.contains(entry.id()) {
            return Ok(None);
        }
        if self.capacity == 0 {
            return Err(CapacityReached { capacity: 0 });
        }

        let mut evicted = None;
        if self.is_full() {
            match self.policy {
                CapacityPolicy::Reject => {
                    return Err(CapacityReached {
                        capacity: self.capacity,
                    })
                }
                CapacityPolicy::EvictOldest => evicted = Some(self.entries.remove(0)),
            }
        }
        self.entries.push(entry);
        Ok(evicted)
    }

    pub fn remove(&mut self, id: LogoId) -> Option<FavoriteEntry> {
        let pos = self.entries.iter().position(|e| e.id() == id)?;
        Some(self.entries.remove(pos))
    }

    /// Empties the collection and hands back what it held.
    pub fn clear(&mut self) -> Vec<FavoriteEntry> {
        std::mem::take(&mut self.entries)
    }

    /// Entries sorted by `favorited_at`, newest first. Ties keep insertion order.
    pub fn newest_first(&self) -> Vec<FavoriteEntry> {
        let mut sorted = self.entries.clone();
        // `sort_by` is stable, so equal timestamps stay in insertion order.
        sorted.sort_by(|a, b| b.favorited_at.cmp(&a.favorited_at));
        sorted
    }
}
