//! Bounded item cache
//!
//! Maps queried positions to loaded records and keeps them in an
//! `AccessLog` for recency. When the cache grows past its bound the oldest
//! entries are evicted, except those the caller reports as pinned; a pinned
//! entry is requeued at the most recently used end instead.

use crate::access_log::AccessLog;
use crate::record::{Item, SubscriptionId};
use log::{trace, warn};
use std::collections::HashMap;

pub const DEFAULT_MAX_CACHE_SIZE: usize = 1000;

/// A cached record and the observer subscriptions the view holds on it.
#[derive(Debug)]
pub struct CachedEntry {
    pub item: Item,
    pub subscriptions: Vec<(String, SubscriptionId)>,
}

impl CachedEntry {
    pub fn new(item: Item) -> Self {
        CachedEntry {
            item,
            subscriptions: Vec::new(),
        }
    }

    /// Drop every subscription this entry holds on its record.
    pub fn unsubscribe(&mut self) {
        for (property_id, subscription) in self.subscriptions.drain(..) {
            self.item.unsubscribe(&property_id, subscription);
        }
    }
}

#[derive(Debug)]
pub struct ItemCache {
    entries: HashMap<usize, CachedEntry>,
    log: AccessLog,
    max_size: usize,
}

impl ItemCache {
    pub fn new(max_size: usize) -> Self {
        ItemCache {
            entries: HashMap::new(),
            log: AccessLog::new(),
            max_size: max_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn contains(&self, position: usize) -> bool {
        self.entries.contains_key(&position)
    }

    /// Look up a position and mark it most recently used.
    pub fn get(&mut self, position: usize) -> Option<Item> {
        let item = self.entries.get(&position)?.item.clone();
        self.log.touch(position);
        Some(item)
    }

    /// Insert an entry as most recently used, replacing (and returning) any
    /// previous entry at the same position.
    pub fn insert(&mut self, position: usize, entry: CachedEntry) -> Option<CachedEntry> {
        let previous = self.entries.insert(position, entry);
        self.log.push_back(position);
        previous
    }

    /// Remove a single entry regardless of pinning.
    pub fn remove(&mut self, position: usize) -> Option<CachedEntry> {
        self.log.remove(position);
        self.entries.remove(&position)
    }

    /// Evict least recently used entries until the bound holds.
    ///
    /// Entries for which `is_pinned` returns true are never evicted; each is
    /// moved to the most recently used end instead. Requeues are bounded by
    /// the cache size at entry, so the loop ends even when everything is pinned.
    pub fn evict(&mut self, is_pinned: impl Fn(&Item) -> bool) -> Vec<(usize, CachedEntry)> {
        let mut evicted = Vec::new();
        let mut requeues = 0;
        let requeue_limit = self.entries.len();

        while self.entries.len() > self.max_size {
            let Some(oldest) = self.log.front() else {
                break;
            };
            let pinned = match self.entries.get(&oldest) {
                Some(entry) => is_pinned(&entry.item),
                None => {
                    // Log and map disagree; drop the stray log key.
                    self.log.remove(oldest);
                    continue;
                }
            };

            if pinned {
                if requeues >= requeue_limit {
                    warn!(
                        "cache holds {} entries over its bound of {}; all remaining are pinned",
                        self.entries.len(),
                        self.max_size
                    );
                    break;
                }
                self.log.touch(oldest);
                requeues += 1;
                continue;
            }

            self.log.remove(oldest);
            if let Some(entry) = self.entries.remove(&oldest) {
                trace!("evicted cached position {}", oldest);
                evicted.push((oldest, entry));
            }
        }

        evicted
    }

    /// Remove every entry, returning them so their subscriptions can be released.
    pub fn drain(&mut self) -> Vec<CachedEntry> {
        self.log.clear();
        self.entries.drain().map(|(_, e)| e).collect()
    }

    /// Cached position of `item`, by identity.
    pub fn position_of(&self, item: &Item) -> Option<usize> {
        self.entries
            .iter()
            .find(|(_, e)| std::rc::Rc::ptr_eq(&e.item, item))
            .map(|(p, _)| *p)
    }

    /// Cached entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Item)> {
        self.entries.iter().map(|(p, e)| (*p, &e.item))
    }

    /// Cached positions from least to most recently used.
    pub fn positions_by_recency(&self) -> Vec<usize> {
        self.log.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::QueryDefinition;
    use crate::record::same_item;
    use crate::value::{PropertyType, Value};
    use std::collections::HashSet;

    fn definition() -> QueryDefinition {
        QueryDefinition::builder()
            .property("n", PropertyType::Int32, Value::Null)
            .build()
            .unwrap()
    }

    fn filled(max: usize, count: usize) -> (ItemCache, Vec<Item>) {
        let def = definition();
        let mut cache = ItemCache::new(max);
        let mut items = Vec::new();
        for i in 0..count {
            let item = def.new_record();
            items.push(item.clone());
            cache.insert(i, CachedEntry::new(item));
        }
        (cache, items)
    }

    #[test]
    fn test_get_touches() {
        let (mut cache, items) = filled(10, 3);
        assert!(same_item(&cache.get(0).unwrap(), &items[0]));
        assert_eq!(cache.positions_by_recency(), vec![1, 2, 0]);
        assert!(cache.contains(1));
        assert_eq!(cache.positions_by_recency(), vec![1, 2, 0]);
        assert!(cache.get(9).is_none());
    }

    #[test]
    fn test_evict_oldest_first() {
        let (mut cache, _) = filled(3, 5);
        let evicted: Vec<usize> = cache.evict(|_| false).into_iter().map(|(p, _)| p).collect();
        assert_eq!(evicted, vec![0, 1]);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.positions_by_recency(), vec![2, 3, 4]);
    }

    #[test]
    fn test_evict_skips_pinned() {
        let (mut cache, items) = filled(2, 4);
        let pinned = items[0].clone();
        let evicted: Vec<usize> = cache
            .evict(|item| same_item(item, &pinned))
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        assert_eq!(evicted, vec![1, 2]);
        assert!(cache.contains(0));
        assert_eq!(cache.positions_by_recency(), vec![3, 0]);
    }

    #[test]
    fn test_evict_terminates_when_all_pinned() {
        let (mut cache, _) = filled(2, 5);
        assert!(cache.evict(|_| true).is_empty());
        assert_eq!(cache.len(), 5);
    }

    #[test]
    fn test_drain_and_position_of() {
        let (mut cache, items) = filled(10, 3);
        assert_eq!(cache.position_of(&items[2]), Some(2));
        let drained = cache.drain();
        assert_eq!(drained.len(), 3);
        assert!(cache.is_empty());
        assert!(cache.positions_by_recency().is_empty());
        assert_eq!(cache.position_of(&items[2]), None);
        let keys: HashSet<usize> = cache.iter().map(|(p, _)| p).collect();
        assert!(keys.is_empty());
    }
}
