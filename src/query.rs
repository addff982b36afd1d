//! Query collaborator contracts
//!
//! A `Query` is one sort-bound cursor over the backing store: it can count,
//! load a contiguous batch, persist buffered changes, bulk delete and
//! construct new records. A `QueryFactory` builds a fresh `Query` whenever
//! the view needs one (first access, after a sort or a refresh).
//!
//! Implementations may block (database round trips, HTTP calls); the view
//! calls them synchronously and propagates their errors unchanged.

use crate::definition::QueryDefinition;
use crate::error::{QueryError, ViewError};
use crate::record::Item;
use std::rc::Rc;

/// Sort order for a sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A single sort key specifying a property and order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Property id to sort by
    pub property: String,
    /// Sort order (ascending or descending)
    pub order: SortOrder,
    /// Whether null values should be placed first or last
    pub nulls_first: bool,
}

impl SortKey {
    /// Create a new sort key with ascending order (nulls last)
    pub fn ascending(property: impl Into<String>) -> Self {
        SortKey {
            property: property.into(),
            order: SortOrder::Ascending,
            nulls_first: false,
        }
    }

    /// Create a new sort key with descending order (nulls last)
    pub fn descending(property: impl Into<String>) -> Self {
        SortKey {
            property: property.into(),
            order: SortOrder::Descending,
            nulls_first: false,
        }
    }

    pub fn new(property: impl Into<String>, order: SortOrder, nulls_first: bool) -> Self {
        SortKey {
            property: property.into(),
            order,
            nulls_first,
        }
    }

    pub fn is_ascending(&self) -> bool {
        self.order == SortOrder::Ascending
    }

    /// Build sort keys from parallel property id / ascending flag lists.
    pub fn from_flags<S: AsRef<str>>(property_ids: &[S], ascending: &[bool]) -> Result<Vec<SortKey>, ViewError> {
        if property_ids.len() != ascending.len() {
            return Err(ViewError::InvalidSort(format!(
                "{} property ids but {} ascending flags",
                property_ids.len(),
                ascending.len()
            )));
        }
        Ok(property_ids
            .iter()
            .zip(ascending)
            .map(|(id, &asc)| {
                if asc {
                    SortKey::ascending(id.as_ref())
                } else {
                    SortKey::descending(id.as_ref())
                }
            })
            .collect())
    }
}

/// One materialized, sort-specific cursor over the data source.
pub trait Query {
    /// Number of persisted rows under the current sort.
    fn size(&self) -> Result<usize, QueryError>;

    /// Rows `[start, start + count)`, in sort order. Must return exactly
    /// `count` records and be deterministic for unchanged backing data.
    fn load_items(&self, start: usize, count: usize) -> Result<Vec<Item>, QueryError>;

    /// Persist three disjoint batches. A failure aborts the whole batch.
    fn save_items(&mut self, added: &[Item], modified: &[Item], removed: &[Item]) -> Result<(), QueryError>;

    /// Immediately and irreversibly delete every row.
    fn delete_all_items(&mut self) -> Result<bool, QueryError>;

    /// A new record populated with the definition's defaults.
    fn construct_item(&self) -> Result<Item, QueryError>;
}

/// Builds queries bound to one query definition.
pub trait QueryFactory {
    /// Bind the definition. Called once by the view before the first query is built.
    fn set_query_definition(&mut self, definition: Rc<QueryDefinition>);

    fn construct_query(&self, sort_keys: &[SortKey]) -> Result<Box<dyn Query>, QueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        let keys = SortKey::from_flags(&["a", "b"], &[true, false]).unwrap();
        assert_eq!(keys, vec![SortKey::ascending("a"), SortKey::descending("b")]);
        assert!(keys[0].is_ascending());
        assert!(!keys[1].is_ascending());
    }

    #[test]
    fn test_from_flags_length_mismatch() {
        assert!(matches!(
            SortKey::from_flags(&["a"], &[true, true]),
            Err(ViewError::InvalidSort(_))
        ));
    }
}
