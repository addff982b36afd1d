//! In-memory backend
//!
//! `MemoryStore` holds rows as property maps keyed by an integer key
//! property. `MemoryQueryFactory` builds `MemoryQuery` cursors over it: each
//! query snapshots the sorted order of row keys at construction and serves
//! batches from that snapshot.
//!
//! The store counts the calls made against it (`MemoryStats`), which makes
//! the view's loading behaviour observable in tests and benchmarks.
//!
//! # Examples
//!
//! ```
//! use lazyquery::{LazyQueryView, MemoryQueryFactory, MemoryStore, PropertyDefinition,
//!                 PropertyType, QueryDefinition, Value, ViewConfig};
//! use std::cell::RefCell;
//! use std::collections::HashMap;
//! use std::rc::Rc;
//!
//! let store = Rc::new(RefCell::new(MemoryStore::new("people", "id")));
//! for name in ["Carol", "Alice", "Bob"] {
//!     let mut row = HashMap::new();
//!     row.insert("name".to_string(), Value::from(name));
//!     store.borrow_mut().append_row(row).unwrap();
//! }
//!
//! let definition = QueryDefinition::builder()
//!     .property_with(PropertyDefinition::new("id", PropertyType::Int64).read_only(true))
//!     .property("name", PropertyType::String, Value::Null)
//!     .build()
//!     .unwrap();
//!
//! let factory = MemoryQueryFactory::new(store.clone());
//! let mut view = LazyQueryView::new(definition, Box::new(factory), ViewConfig::default()).unwrap();
//! view.sort(&["name"], &[true]).unwrap();
//!
//! assert_eq!(view.size().unwrap(), 3);
//! assert_eq!(view.get_item(0).unwrap().value("name"), Some(Value::from("Alice")));
//! ```

use crate::definition::QueryDefinition;
use crate::error::{QueryError, ViewError};
use crate::query::{Query, QueryFactory, SortKey, SortOrder};
use crate::record::Item;
use crate::value::Value;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Counters of calls made against a `MemoryStore`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryStats {
    pub queries_constructed: u64,
    pub size_calls: u64,
    /// `(start, count)` of every `load_items` call, in call order.
    pub load_calls: Vec<(usize, usize)>,
    pub save_calls: u64,
    pub delete_all_calls: u64,
}

/// Rows held in memory, in insertion order.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    key_property: String,
    rows: Vec<HashMap<String, Value>>,
    next_key: i64,
    stats: MemoryStats,
}

fn key_of(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::Int64(k)) => Some(*k),
        Some(Value::Int32(k)) => Some(*k as i64),
        _ => None,
    }
}

fn fail(message: String) -> QueryError {
    message.into()
}

impl MemoryStore {
    /// Create an empty store whose rows are identified by `key_property`.
    pub fn new(name: impl Into<String>, key_property: impl Into<String>) -> Self {
        MemoryStore {
            name: name.into(),
            key_property: key_property.into(),
            rows: Vec::new(),
            next_key: 1,
            stats: MemoryStats::default(),
        }
    }

    /// Load rows from a JSON array of objects.
    pub fn from_json_rows(
        name: impl Into<String>,
        key_property: impl Into<String>,
        json: &str,
    ) -> Result<Self, ViewError> {
        let rows: Vec<HashMap<String, Value>> = serde_json::from_str(json)?;
        let mut store = MemoryStore::new(name, key_property);
        for row in rows {
            store.append_row(row)?;
        }
        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_property(&self) -> &str {
        &self.key_property
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row, assigning a fresh key when the row has none.
    /// Returns the row's key.
    pub fn append_row(&mut self, mut row: HashMap<String, Value>) -> Result<i64, ViewError> {
        let key = match row.get(&self.key_property) {
            None | Some(Value::Null) => {
                let key = self.allocate_key();
                row.insert(self.key_property.clone(), Value::Int64(key));
                key
            }
            Some(value) => {
                let key = key_of(Some(value)).ok_or_else(|| ViewError::TypeMismatch {
                    property: self.key_property.clone(),
                    expected: crate::value::PropertyType::Int64,
                    actual: format!("{:?}", value),
                })?;
                if self.position_of(key).is_some() {
                    return Err(ViewError::Config(format!("duplicate key {} in '{}'", key, self.name)));
                }
                row.insert(self.key_property.clone(), Value::Int64(key));
                self.next_key = self.next_key.max(key + 1);
                key
            }
        };
        self.rows.push(row);
        Ok(key)
    }

    pub fn row_by_key(&self, key: i64) -> Option<&HashMap<String, Value>> {
        self.position_of(key).map(|i| &self.rows[i])
    }

    pub fn keys(&self) -> Vec<i64> {
        self.rows
            .iter()
            .filter_map(|r| key_of(r.get(&self.key_property)))
            .collect()
    }

    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = MemoryStats::default();
    }

    fn allocate_key(&mut self) -> i64 {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    fn position_of(&self, key: i64) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| key_of(r.get(&self.key_property)) == Some(key))
    }

    /// Keys of all rows in the order given by `sort_keys`. Rows comparing
    /// equal keep insertion order.
    fn sorted_keys(&self, sort_keys: &[SortKey]) -> Vec<i64> {
        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.sort_by(|&a, &b| {
            for key in sort_keys {
                let cmp = compare_values(
                    self.rows[a].get(&key.property),
                    self.rows[b].get(&key.property),
                    key,
                );
                if cmp != Ordering::Equal {
                    return cmp;
                }
            }
            Ordering::Equal
        });
        order
            .into_iter()
            .filter_map(|i| key_of(self.rows[i].get(&self.key_property)))
            .collect()
    }
}

/// Compare two stored values according to a sort key
fn compare_values(a: Option<&Value>, b: Option<&Value>, key: &SortKey) -> Ordering {
    let a_is_null = a.map(|v| v.is_null()).unwrap_or(true);
    let b_is_null = b.map(|v| v.is_null()).unwrap_or(true);

    // Null placement is independent of the sort order
    match (a_is_null, b_is_null) {
        (true, true) => return Ordering::Equal,
        (true, false) => {
            return if key.nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }
        (false, true) => {
            return if key.nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }
        (false, false) => {}
    }

    let base = match (a, b) {
        (Some(a), Some(b)) => a.compare(b),
        _ => Ordering::Equal,
    };
    match key.order {
        SortOrder::Ascending => base,
        SortOrder::Descending => base.reverse(),
    }
}

/// Builds `MemoryQuery` cursors over a shared store.
pub struct MemoryQueryFactory {
    store: Rc<RefCell<MemoryStore>>,
    definition: Option<Rc<QueryDefinition>>,
}

impl MemoryQueryFactory {
    pub fn new(store: Rc<RefCell<MemoryStore>>) -> Self {
        MemoryQueryFactory {
            store,
            definition: None,
        }
    }
}

impl QueryFactory for MemoryQueryFactory {
    fn set_query_definition(&mut self, definition: Rc<QueryDefinition>) {
        self.definition = Some(definition);
    }

    fn construct_query(&self, sort_keys: &[SortKey]) -> Result<Box<dyn Query>, QueryError> {
        let definition = self
            .definition
            .clone()
            .ok_or_else(|| fail("query definition not bound to factory".to_string()))?;

        for key in sort_keys {
            if definition.property(&key.property).is_none() {
                return Err(Box::new(ViewError::UnknownProperty(key.property.clone())));
            }
        }

        let mut store = self.store.borrow_mut();
        store.stats.queries_constructed += 1;
        let order = store.sorted_keys(sort_keys);
        drop(store);

        Ok(Box::new(MemoryQuery {
            store: self.store.clone(),
            definition,
            order,
        }))
    }
}

/// Snapshot cursor over a `MemoryStore`.
pub struct MemoryQuery {
    store: Rc<RefCell<MemoryStore>>,
    definition: Rc<QueryDefinition>,
    /// Row keys in sort order at construction, adjusted by this query's saves
    order: Vec<i64>,
}

impl MemoryQuery {
    /// Persistable values of a record: reserved properties are not stored.
    fn stored_values(item: &Item) -> HashMap<String, Value> {
        item.values()
            .into_iter()
            .filter(|(id, _)| !QueryDefinition::is_reserved(id))
            .collect()
    }

    fn item_key(&self, item: &Item, key_property: &str) -> Result<i64, QueryError> {
        key_of(item.value(key_property).as_ref())
            .ok_or_else(|| fail(format!("record has no '{}' key", key_property)))
    }
}

impl Query for MemoryQuery {
    fn size(&self) -> Result<usize, QueryError> {
        self.store.borrow_mut().stats.size_calls += 1;
        Ok(self.order.len())
    }

    fn load_items(&self, start: usize, count: usize) -> Result<Vec<Item>, QueryError> {
        let end = start
            .checked_add(count)
            .filter(|&end| end <= self.order.len())
            .ok_or_else(|| {
                fail(format!(
                    "rows [{}, {}) out of range for {} rows",
                    start,
                    start.saturating_add(count),
                    self.order.len()
                ))
            })?;

        let mut store = self.store.borrow_mut();
        store.stats.load_calls.push((start, count));

        let mut items = Vec::with_capacity(count);
        for &key in &self.order[start..end] {
            let row = store
                .row_by_key(key)
                .ok_or_else(|| fail(format!("row {} no longer exists in '{}'", key, store.name)))?;
            let values = row
                .iter()
                .filter(|(id, _)| self.definition.property(id).is_some())
                .map(|(id, v)| (id.clone(), v.clone()))
                .collect();
            items.push(self.definition.build_record(values)?);
        }
        Ok(items)
    }

    fn save_items(&mut self, added: &[Item], modified: &[Item], removed: &[Item]) -> Result<(), QueryError> {
        let mut store = self.store.borrow_mut();
        let key_property = store.key_property.clone();

        // Validate everything before touching the rows.
        let mut added_keys = HashSet::new();
        for item in added {
            let key = self.item_key(item, &key_property)?;
            if store.position_of(key).is_some() || !added_keys.insert(key) {
                return Err(fail(format!("duplicate key {} in added records", key)));
            }
        }
        let mut modified_keys = Vec::with_capacity(modified.len());
        for item in modified {
            let key = self.item_key(item, &key_property)?;
            if store.position_of(key).is_none() {
                return Err(fail(format!("modified row {} does not exist", key)));
            }
            modified_keys.push(key);
        }
        let mut removed_keys = HashSet::new();
        for item in removed {
            let key = self.item_key(item, &key_property)?;
            if store.position_of(key).is_none() {
                return Err(fail(format!("removed row {} does not exist", key)));
            }
            removed_keys.insert(key);
        }

        for item in added {
            store.append_row(Self::stored_values(item))?;
        }
        for (item, key) in modified.iter().zip(modified_keys) {
            if let Some(pos) = store.position_of(key) {
                store.rows[pos] = Self::stored_values(item);
            }
        }
        store
            .rows
            .retain(|r| !key_of(r.get(&key_property)).map_or(false, |k| removed_keys.contains(&k)));
        store.stats.save_calls += 1;

        self.order.retain(|k| !removed_keys.contains(k));
        self.order.extend(added_keys_in_order(added, &key_property));
        Ok(())
    }

    fn delete_all_items(&mut self) -> Result<bool, QueryError> {
        let mut store = self.store.borrow_mut();
        store.rows.clear();
        store.stats.delete_all_calls += 1;
        self.order.clear();
        Ok(true)
    }

    fn construct_item(&self) -> Result<Item, QueryError> {
        let item = self.definition.new_record();
        let mut store = self.store.borrow_mut();
        let key_property = store.key_property.clone();
        if item.has_property(&key_property) {
            let key = store.allocate_key();
            item.write_privileged(&key_property, Value::Int64(key))?;
        }
        Ok(item)
    }
}

fn added_keys_in_order(added: &[Item], key_property: &str) -> Vec<i64> {
    added
        .iter()
        .filter_map(|i| key_of(i.value(key_property).as_ref()))
        .collect()
}
