//! LazyQuery - Lazy, Cached, Buffered Views over Sortable Datasets
//!
//! Random-access, index-addressed viewing of a large, remotely sourced and
//! sortable dataset with bounded memory use and deferred writes. Rows are
//! loaded in batches through a pluggable `Query`, cached up to a configured
//! bound, and edits, additions and removals are buffered until committed.

pub mod value;
pub mod error;
pub mod record;
pub mod definition;
pub mod query;
pub mod access_log;
pub mod cache;
pub mod buffers;
pub mod config;
pub mod view;
pub mod id_list;
pub mod container;
pub mod memory;

pub use value::{ItemStatus, PropertyType, Value};
pub use error::{QueryError, ViewError};
pub use record::{same_item, Item, PropertyObserver, Record, SubscriptionId};
pub use definition::{
    PropertyDefinition, QueryDefinition, QueryDefinitionBuilder, DEFAULT_BATCH_SIZE,
    PROPERTY_ID_DEBUG_BATCH_INDEX, PROPERTY_ID_DEBUG_BATCH_QUERY_TIME,
    PROPERTY_ID_DEBUG_QUERY_INDEX, PROPERTY_ID_ITEM_STATUS,
};
pub use query::{Query, QueryFactory, SortKey, SortOrder};
pub use access_log::AccessLog;
pub use cache::{ItemCache, DEFAULT_MAX_CACHE_SIZE};
pub use buffers::{MutationBuffers, SaveBatches};
pub use config::{PendingPolicy, ViewConfig};
pub use view::LazyQueryView;
pub use id_list::{LazyIdList, NaturalNumbersList};
pub use container::{ItemIds, LazyQueryContainer};
pub use memory::{MemoryQuery, MemoryQueryFactory, MemoryStats, MemoryStore};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    fn orders(rows: usize) -> Rc<RefCell<MemoryStore>> {
        let store = Rc::new(RefCell::new(MemoryStore::new("orders", "id")));
        for i in 0..rows {
            let mut row = HashMap::new();
            row.insert("customer".to_string(), Value::from(format!("customer {:03}", i % 37)));
            row.insert("amount".to_string(), Value::Float64((i * 7 % 100) as f64 + 0.5));
            row.insert("shipped".to_string(), Value::Bool(i % 3 == 0));
            store.borrow_mut().append_row(row).unwrap();
        }
        store
    }

    fn definition() -> QueryDefinition {
        QueryDefinition::from_json(
            r#"{
                "properties": [
                    {"id": "id", "type": "Int64", "read_only": true},
                    {"id": "customer", "type": "String", "default": ""},
                    {"id": "amount", "type": "Float64", "default": 0.0},
                    {"id": "shipped", "type": "Bool", "default": false, "sortable": false}
                ],
                "batch_size": 25,
                "status_property": true,
                "debug_properties": true,
                "id_property": "id"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_complete_workflow() {
        let store = orders(500);
        let config = ViewConfig::from_json(r#"{"max_cache_size": 100}"#).unwrap();
        let factory = MemoryQueryFactory::new(store.clone());
        let mut view = LazyQueryView::new(definition(), Box::new(factory), config).unwrap();

        assert_eq!(view.size().unwrap(), 500);

        // Walk the whole dataset; memory stays bounded
        let mut total = 0.0;
        for i in 0..500 {
            total += view.get_item(i).unwrap().value("amount").unwrap().as_f64().unwrap();
            assert!(view.cached_len() <= 100);
        }
        assert!(total > 0.0);
        assert_eq!(store.borrow().stats().load_calls.len(), 20);

        // Sort by amount descending and edit the top row
        view.sort(&["amount", "customer"], &[false, true]).unwrap();
        let top = view.get_item(0).unwrap();
        assert_eq!(top.value("amount"), Some(Value::Float64(99.5)));
        top.set_value("shipped", Value::Bool(true)).unwrap();

        // Buffer a new order and a removal
        view.add_item().unwrap();
        let new_order = view.get_item(0).unwrap();
        new_order.set_value("customer", Value::from("walk-in")).unwrap();
        new_order.set_value("amount", Value::Float64(1000.0)).unwrap();
        view.remove_item(499).unwrap();

        assert_eq!(view.size().unwrap(), 501);
        assert_eq!(view.added_items().len(), 1);
        assert_eq!(view.modified_items().len(), 1);
        assert_eq!(view.removed_items().len(), 1);

        view.commit().unwrap();
        view.refresh().unwrap();

        assert!(!view.is_modified());
        assert_eq!(view.size().unwrap(), 500);
        let first = view.get_item(0).unwrap();
        assert_eq!(first.value("customer"), Some(Value::from("walk-in")));
        assert_eq!(first.value(PROPERTY_ID_ITEM_STATUS), Some(Value::Status(ItemStatus::None)));
        assert_eq!(first.value(PROPERTY_ID_DEBUG_QUERY_INDEX), Some(Value::Int32(3)));
    }

    #[test]
    fn test_container_over_sorted_view() {
        let store = orders(60);
        let factory = MemoryQueryFactory::new(store.clone());
        let mut container =
            LazyQueryContainer::new(definition(), Box::new(factory), ViewConfig::default()).unwrap();

        container.sort(&["customer"], &[true]).unwrap();
        let first_id = container.id_by_index(0).unwrap();
        // customer 000 appears at rows 0 and 37 (keys 1 and 38)
        assert_eq!(first_id, Value::Int64(1));
        assert_eq!(container.index_of_id(&Value::Int64(38)).unwrap(), Some(1));

        assert!(container.remove_item(&Value::Int64(38)).unwrap());
        container.commit().unwrap();
        container.refresh().unwrap();
        assert_eq!(container.size().unwrap(), 59);
        assert!(store.borrow().row_by_key(38).is_none());
    }
}
