//! LazyQueryView - the lazy, cached, buffered view over a query
//!
//! The view presents every row of the current query, plus records added but
//! not yet committed, as one index-addressed sequence:
//!
//! ```text
//! visible index:  0 .. added.len()          added.len() .. size()
//!                 [ added buffer, newest ]  [ queried rows, in sort order ]
//! ```
//!
//! Queried rows are fetched in batch-aligned windows on first access and kept
//! in a bounded cache. Edits made to cached records are noticed through
//! property observers and buffered, as are additions and removals, until
//! `commit()` saves them through the query or `discard()` drops them.
//! Sorting (or refreshing) throws away the current query and the cache; the
//! next access builds a new query through the factory.
//!
//! # Examples
//!
//! ```
//! use lazyquery::{ItemStatus, LazyQueryView, MemoryQueryFactory, MemoryStore, PropertyDefinition,
//!                 PropertyType, QueryDefinition, Value, ViewConfig};
//! use std::cell::RefCell;
//! use std::collections::HashMap;
//! use std::rc::Rc;
//!
//! let store = Rc::new(RefCell::new(MemoryStore::new("tasks", "id")));
//! for i in 0..100 {
//!     let mut row = HashMap::new();
//!     row.insert("title".to_string(), Value::from(format!("task {}", i)));
//!     store.borrow_mut().append_row(row).unwrap();
//! }
//!
//! let definition = QueryDefinition::builder()
//!     .property_with(PropertyDefinition::new("id", PropertyType::Int64).read_only(true))
//!     .property("title", PropertyType::String, Value::from(""))
//!     .batch_size(10)
//!     .status_property(true)
//!     .build()
//!     .unwrap();
//!
//! let factory = MemoryQueryFactory::new(store.clone());
//! let mut view = LazyQueryView::new(definition, Box::new(factory), ViewConfig::default()).unwrap();
//!
//! // Loads rows 20..30 in one batch
//! let item = view.get_item(23).unwrap();
//! assert_eq!(store.borrow().stats().load_calls, vec![(20, 10)]);
//!
//! // Edits are buffered until commit
//! item.set_value("title", Value::from("renamed")).unwrap();
//! assert!(view.is_modified());
//! assert_eq!(view.item_status(&item), ItemStatus::Modified);
//!
//! view.commit().unwrap();
//! assert!(!view.is_modified());
//! assert_eq!(store.borrow().row_by_key(24).unwrap()["title"], Value::from("renamed"));
//! ```

use crate::buffers::MutationBuffers;
use crate::cache::{CachedEntry, ItemCache};
use crate::config::{PendingPolicy, ViewConfig};
use crate::definition::{
    QueryDefinition, PROPERTY_ID_DEBUG_BATCH_INDEX, PROPERTY_ID_DEBUG_BATCH_QUERY_TIME,
    PROPERTY_ID_DEBUG_QUERY_INDEX,
};
use crate::error::ViewError;
use crate::query::{Query, QueryFactory, SortKey};
use crate::record::{Item, PropertyObserver, Record};
use crate::value::{ItemStatus, Value};
use log::{debug, trace, warn};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Instant;

/// Turns value-change notifications into buffered modifications.
struct ChangeTracker {
    buffers: RefCell<MutationBuffers>,
    status_property: Option<&'static str>,
}

impl ChangeTracker {
    fn item_changed(&self, item: &Item, property_id: &str) {
        if self.status_property == Some(property_id) {
            return;
        }
        if let Some(status) = self.status_property {
            if item.value(status).and_then(|v| v.as_status()) != Some(ItemStatus::Modified) {
                if let Err(err) = item.write_privileged(status, Value::Status(ItemStatus::Modified)) {
                    warn!("cannot mark record as modified: {}", err);
                }
            }
        }
        if self.buffers.borrow_mut().mark_modified(item.clone()) {
            trace!("property '{}' changed, record buffered as modified", property_id);
        }
    }
}

/// Observer attached to each observable cell of a cached record. Binds the
/// cell back to its owning record.
struct ItemObserver {
    item: Weak<Record>,
    tracker: Weak<ChangeTracker>,
}

impl PropertyObserver for ItemObserver {
    fn value_changed(&self, property_id: &str) {
        if let (Some(item), Some(tracker)) = (self.item.upgrade(), self.tracker.upgrade()) {
            tracker.item_changed(&item, property_id);
        }
    }
}

/// Lazy, batch-loading view with a bounded cache and buffered mutations.
pub struct LazyQueryView {
    definition: Rc<QueryDefinition>,
    factory: Box<dyn QueryFactory>,
    config: ViewConfig,
    sort_keys: Vec<SortKey>,
    /// Built on first use, dropped by refresh
    query: Option<Box<dyn Query>>,
    /// `query.size()`, read once per query
    query_size: Option<usize>,
    /// Number of queries constructed so far
    query_count: u64,
    cache: ItemCache,
    tracker: Rc<ChangeTracker>,
}

impl LazyQueryView {
    /// Create a view. The definition is bound to the factory here; no query
    /// is built until the first access.
    pub fn new(
        definition: QueryDefinition,
        mut factory: Box<dyn QueryFactory>,
        config: ViewConfig,
    ) -> Result<Self, ViewError> {
        config.validate()?;
        let definition = Rc::new(definition);
        factory.set_query_definition(definition.clone());

        let tracker = Rc::new(ChangeTracker {
            buffers: RefCell::new(MutationBuffers::new()),
            status_property: definition.status_property_id(),
        });

        Ok(LazyQueryView {
            cache: ItemCache::new(config.max_cache_size),
            definition,
            factory,
            config,
            sort_keys: Vec::new(),
            query: None,
            query_size: None,
            query_count: 0,
            tracker,
        })
    }

    pub fn definition(&self) -> &QueryDefinition {
        &self.definition
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort_keys
    }

    /// Number of queries constructed over the view's lifetime.
    pub fn query_generation(&self) -> u64 {
        self.query_count
    }

    fn current_query(&mut self) -> Result<&mut dyn Query, ViewError> {
        let query = match self.query.take() {
            Some(query) => query,
            None => {
                let query = self
                    .factory
                    .construct_query(&self.sort_keys)
                    .map_err(ViewError::Persistence)?;
                self.query_count += 1;
                debug!(
                    "constructed query #{} sorted by {:?}",
                    self.query_count, self.sort_keys
                );
                query
            }
        };
        Ok(self.query.insert(query).as_mut())
    }

    fn query_size(&mut self) -> Result<usize, ViewError> {
        if let Some(size) = self.query_size {
            return Ok(size);
        }
        let size = self.current_query()?.size().map_err(ViewError::Persistence)?;
        self.query_size = Some(size);
        Ok(size)
    }

    fn added_len(&self) -> usize {
        self.tracker.buffers.borrow().added_len()
    }

    /// Visible row count: queried rows plus uncommitted added records.
    pub fn size(&mut self) -> Result<usize, ViewError> {
        Ok(self.query_size()? + self.added_len())
    }

    /// Record at a visible index, loading its batch if necessary.
    pub fn get_item(&mut self, index: usize) -> Result<Item, ViewError> {
        let added = self.added_len();
        if index < added {
            return self
                .tracker
                .buffers
                .borrow()
                .added_at(index)
                .cloned()
                .ok_or(ViewError::out_of_range(index, added));
        }

        let position = index - added;
        let queried = self.query_size()?;
        if position >= queried {
            return Err(ViewError::out_of_range(index, queried + added));
        }

        if let Some(item) = self.cache.get(position) {
            return Ok(item);
        }
        self.query_item(position)
    }

    /// Load the batch containing queried `position` and return its record.
    fn query_item(&mut self, position: usize) -> Result<Item, ViewError> {
        let batch_size = self.definition.batch_size();
        let start = position - position % batch_size;
        let count = batch_size.min(self.query_size()? - start);

        let started = Instant::now();
        let items = self
            .current_query()?
            .load_items(start, count)
            .map_err(ViewError::Persistence)?;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        if items.len() != count {
            return Err(ViewError::Persistence(
                format!("query returned {} records for a batch of {}", items.len(), count).into(),
            ));
        }
        debug!(
            "loaded batch [{}, {}) of query #{} in {} ms",
            start,
            start + count,
            self.query_count,
            elapsed_ms
        );

        for (offset, item) in items.into_iter().enumerate() {
            let pos = start + offset;
            // A cached record may carry unsaved edits; keep it over the fresh copy.
            if self.cache.get(pos).is_some() {
                continue;
            }

            if self.definition.has_debug_properties() {
                item.write_privileged(
                    PROPERTY_ID_DEBUG_BATCH_INDEX,
                    Value::Int32((start / batch_size) as i32),
                )?;
                item.write_privileged(
                    PROPERTY_ID_DEBUG_QUERY_INDEX,
                    Value::Int32(self.query_count as i32),
                )?;
                item.write_privileged(PROPERTY_ID_DEBUG_BATCH_QUERY_TIME, Value::Int64(elapsed_ms))?;
            }

            let entry = self.observe(item);
            self.cache.insert(pos, entry);
        }

        // The requested record becomes most recently used and survives this
        // eviction even when the cache is smaller than a batch.
        let requested = self
            .cache
            .get(position)
            .ok_or(ViewError::out_of_range(position, start + count))?;
        self.evict(Some(&requested));
        Ok(requested)
    }

    /// Subscribe to every observable cell of a freshly cached record.
    fn observe(&self, item: Item) -> CachedEntry {
        let observer: Rc<dyn PropertyObserver> = Rc::new(ItemObserver {
            item: Rc::downgrade(&item),
            tracker: Rc::downgrade(&self.tracker),
        });
        let mut entry = CachedEntry::new(item);
        for property_id in entry.item.observable_property_ids() {
            if let Some(subscription) = entry.item.subscribe(&property_id, observer.clone()) {
                entry.subscriptions.push((property_id, subscription));
            }
        }
        entry
    }

    /// Evict down to the cache bound, sparing pinned records and `keep`.
    fn evict(&mut self, keep: Option<&Item>) {
        let buffers = self.tracker.buffers.borrow();
        let evicted = self.cache.evict(|item| {
            buffers.is_pinned(item) || keep.map_or(false, |k| Rc::ptr_eq(k, item))
        });
        for (_, mut entry) in evicted {
            entry.unsubscribe();
        }
    }

    /// Drop every cached record and its subscriptions.
    fn release_cache(&mut self) {
        for mut entry in self.cache.drain() {
            entry.unsubscribe();
        }
    }

    fn set_status(&self, item: &Item, status: ItemStatus) -> Result<(), ViewError> {
        if let Some(property) = self.definition.status_property_id() {
            item.write_privileged(property, Value::Status(status))?;
        }
        Ok(())
    }

    /// Construct a new record and insert it at index 0. Records added
    /// earlier and still uncommitted shift right by one.
    pub fn add_item(&mut self) -> Result<usize, ViewError> {
        let item = self
            .current_query()?
            .construct_item()
            .map_err(ViewError::Construction)?;
        self.set_status(&item, ItemStatus::Added)?;
        self.tracker.buffers.borrow_mut().push_added(item);
        trace!("added record, {} pending additions", self.added_len());
        Ok(0)
    }

    /// Mark the record at `index` for removal. It stays visible, frozen
    /// read-only, until the sequence is recomputed.
    pub fn remove_item(&mut self, index: usize) -> Result<(), ViewError> {
        let item = self.get_item(index)?;
        self.set_status(&item, ItemStatus::Removed)?;
        item.set_frozen(true);
        self.tracker.buffers.borrow_mut().mark_removed(item);
        Ok(())
    }

    /// Delete every persisted row immediately, bypassing the buffers.
    /// Buffered changes are left as they are and cannot restore the rows.
    pub fn remove_all_items(&mut self) -> Result<bool, ViewError> {
        let deleted = self
            .current_query()?
            .delete_all_items()
            .map_err(ViewError::Persistence)?;
        self.release_cache();
        self.query_size = None;
        debug!("deleted all rows (reported {})", deleted);
        Ok(deleted)
    }

    pub fn is_modified(&self) -> bool {
        self.tracker.buffers.borrow().is_modified()
    }

    /// Save buffered changes through the current query.
    ///
    /// Statuses are reset and buffers cleared only once the save succeeds;
    /// after a failure the view still holds every buffered change.
    pub fn commit(&mut self) -> Result<(), ViewError> {
        let (batches, items) = {
            let buffers = self.tracker.buffers.borrow();
            (buffers.save_batches(), buffers.all_items())
        };

        self.current_query()?
            .save_items(&batches.added, &batches.modified, &batches.removed)
            .map_err(ViewError::Persistence)?;

        for item in &items {
            self.set_status(item, ItemStatus::None)?;
        }
        self.tracker.buffers.borrow_mut().clear();
        debug!(
            "committed {} added, {} modified, {} removed",
            batches.added.len(),
            batches.modified.len(),
            batches.removed.len()
        );

        // Additions and removals shift queried positions.
        if !batches.added.is_empty() || !batches.removed.is_empty() {
            self.release_cache();
            self.query_size = None;
        }
        Ok(())
    }

    /// Drop buffered changes without saving. Removed records are unfrozen and
    /// edited records leave the cache so their next access reloads them.
    pub fn discard(&mut self) -> Result<(), ViewError> {
        let (items, modified) = {
            let buffers = self.tracker.buffers.borrow();
            (buffers.all_items(), buffers.modified_items())
        };

        for item in &items {
            self.set_status(item, ItemStatus::None)?;
            item.set_frozen(false);
        }
        for item in &modified {
            if let Some(position) = self.cache.position_of(item) {
                if let Some(mut entry) = self.cache.remove(position) {
                    entry.unsubscribe();
                }
            }
        }
        self.tracker.buffers.borrow_mut().clear();
        debug!("discarded {} buffered record(s)", items.len());
        Ok(())
    }

    fn check_pending(&self) -> Result<(), ViewError> {
        let buffers = self.tracker.buffers.borrow();
        if self.config.pending_on_refresh == PendingPolicy::Reject && buffers.is_modified() {
            return Err(ViewError::PendingChanges(buffers.len()));
        }
        Ok(())
    }

    /// Drop the query and the cache; the next access requeries.
    ///
    /// Under the default `PendingPolicy::Discard` any buffered change is
    /// discarded; under `PendingPolicy::Reject` the call fails instead.
    pub fn refresh(&mut self) -> Result<(), ViewError> {
        self.check_pending()?;
        self.release_cache();
        self.query = None;
        self.query_size = None;
        debug!("refreshed view, {} queries constructed so far", self.query_count);
        self.discard()
    }

    /// Sort by parallel property id / ascending flag lists.
    pub fn sort<S: AsRef<str>>(&mut self, property_ids: &[S], ascending: &[bool]) -> Result<(), ViewError> {
        let keys = SortKey::from_flags(property_ids, ascending)?;
        self.sort_by(keys)
    }

    /// Replace the sort keys and refresh. Every key must name a sortable property.
    pub fn sort_by(&mut self, sort_keys: Vec<SortKey>) -> Result<(), ViewError> {
        for key in &sort_keys {
            match self.definition.is_sortable(&key.property) {
                Some(true) => {}
                Some(false) => {
                    return Err(ViewError::InvalidSort(format!(
                        "property '{}' is not sortable",
                        key.property
                    )))
                }
                None => return Err(ViewError::UnknownProperty(key.property.clone())),
            }
        }
        self.check_pending()?;
        self.sort_keys = sort_keys;
        self.refresh()
    }

    /// Buffer-derived status: removal wins over addition, addition over modification.
    pub fn item_status(&self, item: &Item) -> ItemStatus {
        let buffers = self.tracker.buffers.borrow();
        if buffers.is_removed(item) {
            ItemStatus::Removed
        } else if buffers.is_added(item) {
            ItemStatus::Added
        } else if buffers.is_modified_item(item) {
            ItemStatus::Modified
        } else {
            ItemStatus::None
        }
    }

    /// Visible index of a record that is buffered as added or currently cached.
    pub fn index_of(&self, item: &Item) -> Option<usize> {
        let buffers = self.tracker.buffers.borrow();
        if let Some(i) = buffers.added_position(item) {
            return Some(i);
        }
        self.cache
            .position_of(item)
            .map(|position| position + buffers.added_len())
    }

    /// True if the record at a visible index is available without a load.
    pub fn is_loaded(&self, index: usize) -> bool {
        let added = self.added_len();
        index < added || self.cache.contains(index - added)
    }

    /// Cached records as (visible index, record) pairs, in no particular order.
    pub fn loaded_items(&self) -> Vec<(usize, Item)> {
        let added = self.added_len();
        self.cache
            .iter()
            .map(|(position, item)| (position + added, item.clone()))
            .collect()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn added_items(&self) -> Vec<Item> {
        self.tracker.buffers.borrow().added_items()
    }

    pub fn modified_items(&self) -> Vec<Item> {
        self.tracker.buffers.borrow().modified_items()
    }

    pub fn removed_items(&self) -> Vec<Item> {
        self.tracker.buffers.borrow().removed_items()
    }
}

impl Drop for LazyQueryView {
    fn drop(&mut self) {
        self.release_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{PropertyDefinition, PROPERTY_ID_ITEM_STATUS};
    use crate::error::QueryError;
    use crate::memory::{MemoryQueryFactory, MemoryStore};
    use crate::record::same_item;
    use crate::value::PropertyType;
    use std::cell::Cell;
    use std::collections::HashMap;

    fn store(rows: usize) -> Rc<RefCell<MemoryStore>> {
        let store = Rc::new(RefCell::new(MemoryStore::new("rows", "id")));
        for i in 0..rows {
            let mut row = HashMap::new();
            row.insert("value".to_string(), Value::Int32(i as i32));
            row.insert("label".to_string(), Value::from(format!("row {}", i)));
            store.borrow_mut().append_row(row).unwrap();
        }
        store
    }

    fn definition(batch_size: usize) -> QueryDefinition {
        QueryDefinition::builder()
            .property_with(PropertyDefinition::new("id", PropertyType::Int64).read_only(true))
            .property("value", PropertyType::Int32, Value::Int32(0))
            .property_with(PropertyDefinition::new("label", PropertyType::String).sortable(false))
            .batch_size(batch_size)
            .status_property(true)
            .debug_properties(true)
            .build()
            .unwrap()
    }

    fn view(store: &Rc<RefCell<MemoryStore>>, batch_size: usize, config: ViewConfig) -> LazyQueryView {
        let factory = MemoryQueryFactory::new(store.clone());
        LazyQueryView::new(definition(batch_size), Box::new(factory), config).unwrap()
    }

    fn value_of(item: &Item) -> i32 {
        item.value("value").unwrap().as_i32().unwrap()
    }

    fn status_of(item: &Item) -> ItemStatus {
        item.value(PROPERTY_ID_ITEM_STATUS).unwrap().as_status().unwrap()
    }

    #[test]
    fn test_batch_alignment() {
        let store = store(100);
        let mut view = view(&store, 10, ViewConfig::default());

        assert_eq!(value_of(&view.get_item(23).unwrap()), 23);
        assert_eq!(store.borrow().stats().load_calls, vec![(20, 10)]);

        for i in 20..30 {
            assert_eq!(value_of(&view.get_item(i).unwrap()), i as i32);
        }
        assert_eq!(store.borrow().stats().load_calls.len(), 1);
        assert_eq!(view.cached_len(), 10);
    }

    #[test]
    fn test_last_batch_is_short() {
        let store = store(25);
        let mut view = view(&store, 10, ViewConfig::default());
        view.get_item(24).unwrap();
        assert_eq!(store.borrow().stats().load_calls, vec![(20, 5)]);
    }

    #[test]
    fn test_size_read_once_per_query() {
        let store = store(10);
        let mut view = view(&store, 5, ViewConfig::default());
        assert_eq!(view.size().unwrap(), 10);
        assert_eq!(view.size().unwrap(), 10);
        view.get_item(7).unwrap();
        assert_eq!(store.borrow().stats().size_calls, 1);
    }

    #[test]
    fn test_out_of_range() {
        let store = store(5);
        let mut view = view(&store, 10, ViewConfig::default());
        assert!(matches!(
            view.get_item(5),
            Err(ViewError::IndexOutOfRange { index: 5, size: 5 })
        ));
        assert!(view.remove_item(9).is_err());
    }

    #[test]
    fn test_debug_properties_populated() {
        let store = store(30);
        let mut view = view(&store, 10, ViewConfig::default());
        let item = view.get_item(15).unwrap();
        assert_eq!(item.value(PROPERTY_ID_DEBUG_BATCH_INDEX), Some(Value::Int32(1)));
        assert_eq!(item.value(PROPERTY_ID_DEBUG_QUERY_INDEX), Some(Value::Int32(1)));
        assert!(item.value(PROPERTY_ID_DEBUG_BATCH_QUERY_TIME).unwrap().as_i64().is_some());
        assert_eq!(item.is_read_only(PROPERTY_ID_DEBUG_BATCH_INDEX), Some(true));
    }

    #[test]
    fn test_concrete_sort_scenario() {
        let store = store(100);
        let mut view = view(&store, 10, ViewConfig::default().with_max_cache_size(1000));

        view.get_item(23).unwrap();
        for i in 20..30 {
            view.get_item(i).unwrap();
        }
        assert_eq!(store.borrow().stats().load_calls.len(), 1);
        assert_eq!(view.query_generation(), 1);

        view.sort(&["value"], &[false]).unwrap();
        let first = view.get_item(0).unwrap();
        assert_eq!(value_of(&first), 99);
        assert_eq!(view.query_generation(), 2);

        let stats = store.borrow().stats().clone();
        assert_eq!(stats.queries_constructed, 2);
        assert_eq!(stats.load_calls, vec![(20, 10), (0, 10)]);
    }

    #[test]
    fn test_sort_validation() {
        let store = store(3);
        let mut view = view(&store, 10, ViewConfig::default());
        assert!(matches!(view.sort(&["label"], &[true]), Err(ViewError::InvalidSort(_))));
        assert!(matches!(view.sort(&["nope"], &[true]), Err(ViewError::UnknownProperty(_))));
        assert!(matches!(view.sort(&["value"], &[]), Err(ViewError::InvalidSort(_))));
        assert!(view.sort_keys().is_empty());
    }

    #[test]
    fn test_add_item_inserts_at_front() {
        let store = store(10);
        let mut view = view(&store, 10, ViewConfig::default());
        assert_eq!(view.size().unwrap(), 10);

        assert_eq!(view.add_item().unwrap(), 0);
        let first = view.get_item(0).unwrap();
        assert_eq!(view.size().unwrap(), 11);

        assert_eq!(view.add_item().unwrap(), 0);
        let second = view.get_item(0).unwrap();
        assert_eq!(view.size().unwrap(), 12);

        assert!(same_item(&view.get_item(1).unwrap(), &first));
        assert!(!same_item(&first, &second));
        assert_eq!(status_of(&second), ItemStatus::Added);
        assert_eq!(view.item_status(&second), ItemStatus::Added);
        assert_eq!(value_of(&view.get_item(2).unwrap()), 0);
        assert!(view.is_modified());
    }

    #[test]
    fn test_add_commit_refresh() {
        let store = store(3);
        let mut view = view(&store, 10, ViewConfig::default());
        view.add_item().unwrap();
        view.get_item(0).unwrap().set_value("value", Value::Int32(-1)).unwrap();

        view.commit().unwrap();
        view.sort(&["value"], &[true]).unwrap();

        assert!(!view.is_modified());
        assert_eq!(view.size().unwrap(), 4);
        let first = view.get_item(0).unwrap();
        assert_eq!(value_of(&first), -1);
        assert_eq!(status_of(&first), ItemStatus::None);
        assert_eq!(store.borrow().len(), 4);
    }

    #[test]
    fn test_edit_marks_modified_once() {
        let store = store(5);
        let mut view = view(&store, 10, ViewConfig::default());
        let item = view.get_item(2).unwrap();

        item.set_value("value", Value::Int32(200)).unwrap();
        item.set_value("value", Value::Int32(201)).unwrap();

        assert_eq!(status_of(&item), ItemStatus::Modified);
        assert_eq!(view.modified_items().len(), 1);
        assert!(view.is_modified());
    }

    #[test]
    fn test_discard_reverts_edits() {
        let store = store(5);
        let mut view = view(&store, 10, ViewConfig::default());
        let item = view.get_item(2).unwrap();
        item.set_value("value", Value::Int32(200)).unwrap();

        view.discard().unwrap();
        view.refresh().unwrap();

        assert!(!view.is_modified());
        assert_eq!(status_of(&item), ItemStatus::None);
        assert_eq!(value_of(&view.get_item(2).unwrap()), 2);
        assert_eq!(store.borrow().stats().save_calls, 0);
    }

    #[test]
    fn test_discard_alone_reloads_edited_rows() {
        let store = store(5);
        let mut view = view(&store, 10, ViewConfig::default());
        view.get_item(1).unwrap().set_value("value", Value::Int32(100)).unwrap();
        view.discard().unwrap();
        assert_eq!(value_of(&view.get_item(1).unwrap()), 1);
        assert_eq!(view.query_generation(), 1);
    }

    #[test]
    fn test_deferred_removal() {
        let store = store(5);
        let mut view = view(&store, 10, ViewConfig::default());
        let item = view.get_item(3).unwrap();

        view.remove_item(3).unwrap();
        assert_eq!(view.size().unwrap(), 5);
        let again = view.get_item(3).unwrap();
        assert!(same_item(&item, &again));
        assert_eq!(status_of(&again), ItemStatus::Removed);
        for property in again.property_ids() {
            assert_eq!(again.is_read_only(&property), Some(true));
        }
        assert!(again.set_value("value", Value::Int32(7)).is_err());

        view.commit().unwrap();
        view.refresh().unwrap();
        assert_eq!(view.size().unwrap(), 4);
        assert_eq!(value_of(&view.get_item(3).unwrap()), 4);
    }

    #[test]
    fn test_discard_unfreezes_removed() {
        let store = store(5);
        let mut view = view(&store, 10, ViewConfig::default());
        view.remove_item(0).unwrap();
        let item = view.get_item(0).unwrap();
        view.discard().unwrap();
        assert!(!item.is_frozen());
        assert_eq!(status_of(&item), ItemStatus::None);
        assert_eq!(view.size().unwrap(), 5);
    }

    #[test]
    fn test_remove_all_bypasses_buffers() {
        let store = store(20);
        let mut view = view(&store, 10, ViewConfig::default());
        view.get_item(5).unwrap().set_value("value", Value::Int32(55)).unwrap();
        assert!(view.is_modified());

        assert!(view.remove_all_items().unwrap());
        assert_eq!(view.size().unwrap(), 0);
        assert!(view.is_modified());
        assert_eq!(view.modified_items().len(), 1);
        assert_eq!(view.cached_len(), 0);

        // Discard cannot bring the rows back
        view.discard().unwrap();
        view.refresh().unwrap();
        assert_eq!(view.size().unwrap(), 0);
    }

    #[test]
    fn test_eviction_bound_and_pinning() {
        let store = store(100);
        let mut view = view(&store, 10, ViewConfig::default().with_max_cache_size(15));

        let edited = view.get_item(0).unwrap();
        edited.set_value("value", Value::Int32(-5)).unwrap();
        view.remove_item(1).unwrap();

        for i in (0..100).step_by(7) {
            view.get_item(i).unwrap();
            assert!(view.cached_len() <= 15);
        }

        // Pinned records survive and keep their edits
        assert!(same_item(&view.get_item(0).unwrap(), &edited));
        assert_eq!(value_of(&view.get_item(0).unwrap()), -5);
        let removed = view.get_item(1).unwrap();
        assert_eq!(view.item_status(&removed), ItemStatus::Removed);
    }

    #[test]
    fn test_evicted_records_lose_observers() {
        let store = store(40);
        let mut view = view(&store, 10, ViewConfig::default().with_max_cache_size(10));
        let item = view.get_item(0).unwrap();
        assert!(item.observer_count() > 0);
        view.get_item(35).unwrap();
        assert!(!view.is_loaded(0));
        assert_eq!(item.observer_count(), 0);

        // Edits on an evicted record are no longer tracked
        item.set_value("value", Value::Int32(9)).unwrap();
        assert!(!view.is_modified());
    }

    #[test]
    fn test_cache_smaller_than_batch() {
        let store = store(50);
        let mut view = view(&store, 20, ViewConfig::default().with_max_cache_size(5));
        let item = view.get_item(3).unwrap();
        assert_eq!(value_of(&item), 3);
        assert_eq!(view.cached_len(), 5);
        assert!(view.is_loaded(3));
        assert!(item.observer_count() > 0);

        // The requested record stays attached to the view
        item.set_value("value", Value::Int32(33)).unwrap();
        assert!(view.is_modified());
        assert_eq!(status_of(&item), ItemStatus::Modified);

        view.remove_item(3).unwrap();
        let again = view.get_item(3).unwrap();
        assert!(same_item(&item, &again));
        assert_eq!(status_of(&again), ItemStatus::Removed);
        assert_eq!(again.is_read_only("value"), Some(true));
    }

    #[test]
    fn test_requested_record_survives_with_pinned_cache() {
        let store = store(60);
        let mut view = view(&store, 20, ViewConfig::default().with_max_cache_size(2));
        for i in 0..2 {
            view.get_item(i).unwrap().set_value("value", Value::Int32(-1)).unwrap();
        }

        // Every slot is pinned; the record from the new batch is still cached
        let item = view.get_item(45).unwrap();
        assert_eq!(value_of(&item), 45);
        assert!(view.is_loaded(45));
        assert!(same_item(&view.get_item(45).unwrap(), &item));
        assert!(view.is_loaded(0));
        assert!(view.is_loaded(1));
    }

    #[test]
    fn test_reload_keeps_pinned_record() {
        let store = store(30);
        let mut view = view(&store, 10, ViewConfig::default().with_max_cache_size(10));
        let edited = view.get_item(4).unwrap();
        edited.set_value("value", Value::Int32(44)).unwrap();

        view.get_item(15).unwrap();
        // Batch 0 reloads around the pinned record
        let reloaded = view.get_item(3).unwrap();
        assert_eq!(value_of(&reloaded), 3);
        assert!(same_item(&view.get_item(4).unwrap(), &edited));
    }

    #[test]
    fn test_refresh_discards_pending_by_default() {
        let store = store(5);
        let mut view = view(&store, 10, ViewConfig::default());
        view.add_item().unwrap();
        view.sort(&["value"], &[false]).unwrap();
        assert!(!view.is_modified());
        assert_eq!(view.size().unwrap(), 5);
    }

    #[test]
    fn test_reject_policy() {
        let store = store(5);
        let config = ViewConfig::default().with_pending_policy(PendingPolicy::Reject);
        let mut view = view(&store, 10, config);
        view.add_item().unwrap();

        assert!(matches!(view.refresh(), Err(ViewError::PendingChanges(1))));
        assert!(matches!(view.sort(&["value"], &[false]), Err(ViewError::PendingChanges(1))));
        assert!(view.sort_keys().is_empty());
        assert!(view.is_modified());

        view.discard().unwrap();
        view.sort(&["value"], &[false]).unwrap();
        assert_eq!(value_of(&view.get_item(0).unwrap()), 4);
    }

    #[test]
    fn test_added_then_removed_is_not_saved() {
        let store = store(2);
        let mut view = view(&store, 10, ViewConfig::default());
        view.add_item().unwrap();
        view.remove_item(0).unwrap();
        view.commit().unwrap();
        assert_eq!(store.borrow().len(), 2);
        assert_eq!(view.size().unwrap(), 2);
    }

    #[test]
    fn test_index_of() {
        let store = store(20);
        let mut view = view(&store, 10, ViewConfig::default());
        view.add_item().unwrap();
        let added = view.get_item(0).unwrap();
        let queried = view.get_item(6).unwrap();
        assert_eq!(view.index_of(&added), Some(0));
        assert_eq!(view.index_of(&queried), Some(6));
        assert!(view.is_loaded(10));
        assert!(!view.is_loaded(11));
        assert_eq!(view.loaded_items().len(), 10);
    }

    /// Factory whose queries fail on demand.
    struct FlakyFactory {
        inner: MemoryQueryFactory,
        fail_saves: Rc<Cell<bool>>,
        fail_construct: Rc<Cell<bool>>,
    }

    struct FlakyQuery {
        inner: Box<dyn Query>,
        fail_saves: Rc<Cell<bool>>,
        fail_construct: Rc<Cell<bool>>,
    }

    impl QueryFactory for FlakyFactory {
        fn set_query_definition(&mut self, definition: Rc<QueryDefinition>) {
            self.inner.set_query_definition(definition);
        }

        fn construct_query(&self, sort_keys: &[SortKey]) -> Result<Box<dyn Query>, QueryError> {
            Ok(Box::new(FlakyQuery {
                inner: self.inner.construct_query(sort_keys)?,
                fail_saves: self.fail_saves.clone(),
                fail_construct: self.fail_construct.clone(),
            }))
        }
    }

    impl Query for FlakyQuery {
        fn size(&self) -> Result<usize, QueryError> {
            self.inner.size()
        }

        fn load_items(&self, start: usize, count: usize) -> Result<Vec<Item>, QueryError> {
            self.inner.load_items(start, count)
        }

        fn save_items(&mut self, added: &[Item], modified: &[Item], removed: &[Item]) -> Result<(), QueryError> {
            if self.fail_saves.get() {
                return Err("connection reset".into());
            }
            self.inner.save_items(added, modified, removed)
        }

        fn delete_all_items(&mut self) -> Result<bool, QueryError> {
            self.inner.delete_all_items()
        }

        fn construct_item(&self) -> Result<Item, QueryError> {
            if self.fail_construct.get() {
                return Err("no default constructor".into());
            }
            self.inner.construct_item()
        }
    }

    fn flaky_view(store: &Rc<RefCell<MemoryStore>>) -> (LazyQueryView, Rc<Cell<bool>>, Rc<Cell<bool>>) {
        let fail_saves = Rc::new(Cell::new(false));
        let fail_construct = Rc::new(Cell::new(false));
        let factory = FlakyFactory {
            inner: MemoryQueryFactory::new(store.clone()),
            fail_saves: fail_saves.clone(),
            fail_construct: fail_construct.clone(),
        };
        let view = LazyQueryView::new(definition(10), Box::new(factory), ViewConfig::default()).unwrap();
        (view, fail_saves, fail_construct)
    }

    #[test]
    fn test_failed_commit_keeps_buffers_and_status() {
        let store = store(5);
        let (mut view, fail_saves, _) = flaky_view(&store);
        let item = view.get_item(1).unwrap();
        item.set_value("value", Value::Int32(10)).unwrap();

        fail_saves.set(true);
        assert!(matches!(view.commit(), Err(ViewError::Persistence(_))));
        assert!(view.is_modified());
        assert_eq!(status_of(&item), ItemStatus::Modified);

        fail_saves.set(false);
        view.commit().unwrap();
        assert!(!view.is_modified());
        assert_eq!(status_of(&item), ItemStatus::None);
        assert_eq!(store.borrow().row_by_key(2).unwrap()["value"], Value::Int32(10));
    }

    #[test]
    fn test_construction_error_propagates() {
        let store = store(5);
        let (mut view, _, fail_construct) = flaky_view(&store);
        fail_construct.set(true);
        assert!(matches!(view.add_item(), Err(ViewError::Construction(_))));
        assert!(!view.is_modified());
        assert_eq!(view.size().unwrap(), 5);
    }
}
