//! Mutation buffers for LazyQuery
//!
//! Records created, edited or removed through the view are held here until
//! the view commits them to the query or discards them.
//!
//! # Buffers
//!
//! - `added`: new records, newest first. They occupy the lowest visible
//!   indices, in front of every queried record.
//! - `modified`: records whose values changed since the last commit/discard.
//!   Deduplicated by identity; editing one record twice lists it once.
//! - `removed`: records marked for deletion. They stay visible until the
//!   sequence is recomputed by a refresh.

use crate::record::Item;
use std::collections::VecDeque;
use std::rc::Rc;

/// Disjoint batches handed to `Query::save_items`.
#[derive(Debug, Default, Clone)]
pub struct SaveBatches {
    pub added: Vec<Item>,
    pub modified: Vec<Item>,
    pub removed: Vec<Item>,
}

impl SaveBatches {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct MutationBuffers {
    added: VecDeque<Item>,
    modified: Vec<Item>,
    removed: Vec<Item>,
}

fn contains(list: &[Item], item: &Item) -> bool {
    list.iter().any(|i| Rc::ptr_eq(i, item))
}

impl MutationBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record at the front of the added buffer.
    pub fn push_added(&mut self, item: Item) {
        self.added.push_front(item);
    }

    pub fn added_len(&self) -> usize {
        self.added.len()
    }

    pub fn added_at(&self, index: usize) -> Option<&Item> {
        self.added.get(index)
    }

    pub fn added_position(&self, item: &Item) -> Option<usize> {
        self.added.iter().position(|i| Rc::ptr_eq(i, item))
    }

    /// Record a modification. Returns false if the record was already listed.
    pub fn mark_modified(&mut self, item: Item) -> bool {
        if contains(&self.modified, &item) {
            return false;
        }
        self.modified.push(item);
        true
    }

    /// Record a removal. Returns false if the record was already listed.
    pub fn mark_removed(&mut self, item: Item) -> bool {
        if contains(&self.removed, &item) {
            return false;
        }
        self.removed.push(item);
        true
    }

    pub fn is_added(&self, item: &Item) -> bool {
        self.added.iter().any(|i| Rc::ptr_eq(i, item))
    }

    pub fn is_modified_item(&self, item: &Item) -> bool {
        contains(&self.modified, item)
    }

    pub fn is_removed(&self, item: &Item) -> bool {
        contains(&self.removed, item)
    }

    /// True if the record must stay cached until the buffers are resolved.
    pub fn is_pinned(&self, item: &Item) -> bool {
        self.is_modified_item(item) || self.is_removed(item)
    }

    /// True if any buffer holds a record.
    pub fn is_modified(&self) -> bool {
        !self.added.is_empty() || !self.modified.is_empty() || !self.removed.is_empty()
    }

    /// Number of buffered entries across all three buffers.
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.is_modified()
    }

    pub fn added_items(&self) -> Vec<Item> {
        self.added.iter().cloned().collect()
    }

    pub fn modified_items(&self) -> Vec<Item> {
        self.modified.clone()
    }

    pub fn removed_items(&self) -> Vec<Item> {
        self.removed.clone()
    }

    /// Every buffered record once, in added / modified / removed order.
    pub fn all_items(&self) -> Vec<Item> {
        let mut all: Vec<Item> = Vec::with_capacity(self.len());
        for item in self.added.iter().chain(&self.modified).chain(&self.removed) {
            if !contains(&all, item) {
                all.push(item.clone());
            }
        }
        all
    }

    /// Split the buffers into disjoint save batches.
    ///
    /// A record added and then removed is never persisted. A record added and
    /// then edited is saved once, as added. A record edited and then removed
    /// is saved once, as removed.
    pub fn save_batches(&self) -> SaveBatches {
        let added = self
            .added
            .iter()
            .filter(|i| !contains(&self.removed, i))
            .cloned()
            .collect();
        let modified = self
            .modified
            .iter()
            .filter(|i| !self.is_added(i) && !contains(&self.removed, i))
            .cloned()
            .collect();
        let removed = self
            .removed
            .iter()
            .filter(|i| !self.is_added(i))
            .cloned()
            .collect();
        SaveBatches {
            added,
            modified,
            removed,
        }
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.modified.clear();
        self.removed.clear();
    }
}
