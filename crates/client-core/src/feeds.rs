//! Fixed-capacity registry of subscribed remote feeds
//!
//! Slots are numbered from 1. A new feed always lands in the lowest free
//! slot, a remote feed id occupies at most one slot, and a released slot is
//! immediately reusable.

use std::fmt;

use crate::error::{ClientError, ClientResult};

/// Number of remote feeds presented at once
pub const MAX_FEEDS: usize = 5;

/// Identifier the room assigns to a participant's published feed
pub type FeedId = u64;

/// 1-based slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeedSlot(pub usize);

impl fmt::Display for FeedSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct Entry<T> {
    feed: FeedId,
    value: T,
}

/// Slot-indexed map of active feeds
#[derive(Debug)]
pub struct FeedRegistry<T> {
    slots: Vec<Option<Entry<T>>>,
}

impl<T> Default for FeedRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FeedRegistry<T> {
    /// Registry with [`MAX_FEEDS`] slots
    pub fn new() -> Self {
        Self::with_capacity(MAX_FEEDS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(|s| s.is_some())
    }

    /// Lowest free slot, if any
    pub fn next_free_slot(&self) -> Option<FeedSlot> {
        self.slots.iter().position(|s| s.is_none()).map(|i| FeedSlot(i + 1))
    }

    /// Check that `feed` could be admitted right now
    pub fn check_admission(&self, feed: FeedId) -> ClientResult<()> {
        if self.find_by_remote_id(feed).is_some() {
            return Err(ClientError::FeedAlreadySubscribed { feed });
        }
        if self.is_full() {
            return Err(ClientError::FeedRegistryFull { capacity: self.capacity() });
        }
        Ok(())
    }

    /// Place `feed` in the lowest free slot
    pub fn acquire_slot(&mut self, feed: FeedId, value: T) -> ClientResult<FeedSlot> {
        self.check_admission(feed)?;
        let slot = self
            .next_free_slot()
            .ok_or(ClientError::FeedRegistryFull { capacity: self.capacity() })?;
        self.slots[slot.0 - 1] = Some(Entry { feed, value });
        Ok(slot)
    }

    /// Free `slot`, returning what occupied it
    pub fn release_slot(&mut self, slot: FeedSlot) -> Option<(FeedId, T)> {
        let index = slot.0.checked_sub(1)?;
        self.slots
            .get_mut(index)
            .and_then(Option::take)
            .map(|entry| (entry.feed, entry.value))
    }

    /// Free the slot held by `feed`
    pub fn release_by_remote_id(&mut self, feed: FeedId) -> Option<(FeedSlot, T)> {
        let slot = self.find_by_remote_id(feed)?;
        self.release_slot(slot).map(|(_, value)| (slot, value))
    }

    /// Slot occupied by `feed`
    pub fn find_by_remote_id(&self, feed: FeedId) -> Option<FeedSlot> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some(entry) if entry.feed == feed))
            .map(|i| FeedSlot(i + 1))
    }

    pub fn get(&self, slot: FeedSlot) -> Option<(FeedId, &T)> {
        let index = slot.0.checked_sub(1)?;
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .map(|entry| (entry.feed, &entry.value))
    }

    /// Slot whose value matches `pred`
    pub fn slot_of<F>(&self, mut pred: F) -> Option<FeedSlot>
    where
        F: FnMut(&T) -> bool,
    {
        self.slots
            .iter()
            .position(|s| matches!(s, Some(entry) if pred(&entry.value)))
            .map(|i| FeedSlot(i + 1))
    }

    /// Occupied slots in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (FeedSlot, FeedId, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.as_ref().map(|entry| (FeedSlot(i + 1), entry.feed, &entry.value))
        })
    }

    /// Empty every slot, returning the previous occupants
    pub fn drain(&mut self) -> Vec<(FeedSlot, FeedId, T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.take().map(|entry| (FeedSlot(i + 1), entry.feed, entry.value)))
            .collect()
    }
}
