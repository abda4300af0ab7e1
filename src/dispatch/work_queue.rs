//! Work queue with per-item ownership tracking.

use std::collections::VecDeque;

use crate::arena::SessionKey;
use crate::job::WorkItem;

/// Where a work item is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Waiting in the queue.
    Queued,
    /// Owned by one session.
    Assigned(SessionKey),
    /// Pixels are on the canvas.
    Merged,
}

/// FIFO of queued items plus the state of every item in the job.
///
/// An item is owned by at most one session: only `Queued` items are handed
/// out, and only the owning session can return or merge one.
#[derive(Debug)]
pub struct WorkQueue {
    items: Vec<WorkItem>,
    states: Vec<ItemState>,
    queue: VecDeque<usize>,
    merged: usize,
}

impl WorkQueue {
    /// Queue every item, in order. `items[i].index` must equal `i`.
    pub fn new(items: Vec<WorkItem>) -> Self {
        debug_assert!(items.iter().enumerate().all(|(i, item)| item.index == i));
        Self {
            states: vec![ItemState::Queued; items.len()],
            queue: (0..items.len()).collect(),
            items,
            merged: 0,
        }
    }

    /// Hand the front item to `session`.
    pub fn pop_for(&mut self, session: SessionKey) -> Option<WorkItem> {
        let index = self.queue.pop_front()?;
        self.states[index] = ItemState::Assigned(session);
        Some(self.items[index])
    }

    /// Return an item owned by `session` to the back of the queue.
    ///
    /// Returns false (and changes nothing) if `session` does not own it.
    pub fn requeue(&mut self, index: usize, session: SessionKey) -> bool {
        if self.state(index) != Some(ItemState::Assigned(session)) {
            return false;
        }
        self.states[index] = ItemState::Queued;
        self.queue.push_back(index);
        true
    }

    /// Record that an item owned by `session` has been stitched.
    ///
    /// Returns false (and changes nothing) if `session` does not own it.
    pub fn merge(&mut self, index: usize, session: SessionKey) -> bool {
        if self.state(index) != Some(ItemState::Assigned(session)) {
            return false;
        }
        self.states[index] = ItemState::Merged;
        self.merged += 1;
        true
    }

    /// State of item `index`.
    pub fn state(&self, index: usize) -> Option<ItemState> {
        self.states.get(index).copied()
    }

    /// Items waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Items not yet merged (queued or assigned).
    pub fn remaining(&self) -> usize {
        self.items.len() - self.merged
    }

    /// Whether the queue is empty (items may still be assigned).
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Whether every item has been merged.
    pub fn is_drained(&self) -> bool {
        self.merged == self.items.len()
    }

    /// Total number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }
}
