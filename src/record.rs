//! Records (items) for LazyQuery
//!
//! A `Record` is one row: an ordered set of property cells, each carrying a
//! value, a type tag, a read-only flag and, optionally, a list of observers
//! that are told when the cell's value changes through the public write path.
//!
//! Records are shared as `Item = Rc<Record>` and use interior mutability, so
//! the view, its buffers and the caller can all hold the same row.
//!
//! # Write paths
//!
//! - `set_value()` is the public path. It honours the read-only contract
//!   (including a record-wide freeze) and notifies observers.
//! - `write_privileged()` is crate-internal. It bypasses the read-only flag
//!   and does not notify, and is used for status and instrumentation cells.
//!
//! # Examples
//!
//! ```
//! use lazyquery::{PropertyType, QueryDefinition, Value};
//!
//! let definition = QueryDefinition::builder()
//!     .property("name", PropertyType::String, Value::from("unnamed"))
//!     .build()
//!     .unwrap();
//!
//! let item = definition.new_record();
//! assert_eq!(item.value("name"), Some(Value::from("unnamed")));
//!
//! item.set_value("name", Value::from("Alice")).unwrap();
//! assert_eq!(item.value("name").unwrap().as_string(), Some("Alice"));
//! ```

use crate::error::ViewError;
use crate::value::{PropertyType, Value};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a record.
pub type Item = Rc<Record>;

/// Identifier of one observer subscription on one record.
pub type SubscriptionId = u64;

/// Receives value-change notifications from observable property cells.
pub trait PropertyObserver {
    fn value_changed(&self, property_id: &str);
}

/// Static description of one cell, used to construct records.
#[derive(Debug, Clone)]
pub struct CellSpec {
    pub id: String,
    pub property_type: PropertyType,
    pub value: Value,
    pub read_only: bool,
    pub observable: bool,
}

struct Property {
    id: String,
    property_type: PropertyType,
    value: Value,
    read_only: bool,
    observable: bool,
    observers: Vec<(SubscriptionId, Rc<dyn PropertyObserver>)>,
}

impl Property {
    fn check_type(&self, value: &Value) -> Result<(), ViewError> {
        if value.fits(self.property_type) {
            Ok(())
        } else {
            Err(ViewError::TypeMismatch {
                property: self.id.clone(),
                expected: self.property_type,
                actual: format!("{:?}", value),
            })
        }
    }
}

pub struct Record {
    properties: RefCell<Vec<Property>>,
    /// Set while the record is buffered for removal; every cell reads as read-only.
    frozen: Cell<bool>,
    next_subscription: Cell<SubscriptionId>,
}

impl Record {
    pub(crate) fn from_cells(cells: Vec<CellSpec>) -> Self {
        let properties = cells
            .into_iter()
            .map(|c| Property {
                id: c.id,
                property_type: c.property_type,
                value: c.value,
                read_only: c.read_only,
                observable: c.observable,
                observers: Vec::new(),
            })
            .collect();

        Record {
            properties: RefCell::new(properties),
            frozen: Cell::new(false),
            next_subscription: Cell::new(0),
        }
    }

    fn position(&self, property_id: &str) -> Option<usize> {
        self.properties.borrow().iter().position(|p| p.id == property_id)
    }

    pub fn len(&self) -> usize {
        self.properties.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.borrow().is_empty()
    }

    pub fn property_ids(&self) -> Vec<String> {
        self.properties.borrow().iter().map(|p| p.id.clone()).collect()
    }

    pub fn has_property(&self, property_id: &str) -> bool {
        self.position(property_id).is_some()
    }

    pub fn value(&self, property_id: &str) -> Option<Value> {
        self.properties
            .borrow()
            .iter()
            .find(|p| p.id == property_id)
            .map(|p| p.value.clone())
    }

    pub fn property_type(&self, property_id: &str) -> Option<PropertyType> {
        self.properties
            .borrow()
            .iter()
            .find(|p| p.id == property_id)
            .map(|p| p.property_type)
    }

    /// Returns whether the cell rejects public writes, or None if the
    /// property does not exist.
    pub fn is_read_only(&self, property_id: &str) -> Option<bool> {
        let frozen = self.frozen.get();
        self.properties
            .borrow()
            .iter()
            .find(|p| p.id == property_id)
            .map(|p| frozen || p.read_only)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    /// Snapshot of all values keyed by property id.
    pub fn values(&self) -> HashMap<String, Value> {
        self.properties
            .borrow()
            .iter()
            .map(|p| (p.id.clone(), p.value.clone()))
            .collect()
    }

    /// Write a value through the public path.
    ///
    /// Fails on unknown properties, read-only or frozen cells and type
    /// mismatches. On success every observer of the cell is notified once
    /// the write is complete.
    pub fn set_value(&self, property_id: &str, value: Value) -> Result<(), ViewError> {
        let observers: Vec<Rc<dyn PropertyObserver>> = {
            let mut properties = self.properties.borrow_mut();
            let property = properties
                .iter_mut()
                .find(|p| p.id == property_id)
                .ok_or_else(|| ViewError::UnknownProperty(property_id.to_string()))?;

            if self.frozen.get() || property.read_only {
                return Err(ViewError::ReadOnly(property_id.to_string()));
            }
            property.check_type(&value)?;

            if property.value == value {
                return Ok(());
            }
            property.value = value;
            property.observers.iter().map(|(_, o)| o.clone()).collect()
        };

        // Borrow released: observers may read or privileged-write this record.
        for observer in observers {
            observer.value_changed(property_id);
        }
        Ok(())
    }

    /// Write a value ignoring the read-only flag, without notifying observers.
    pub(crate) fn write_privileged(&self, property_id: &str, value: Value) -> Result<(), ViewError> {
        let mut properties = self.properties.borrow_mut();
        let property = properties
            .iter_mut()
            .find(|p| p.id == property_id)
            .ok_or_else(|| ViewError::UnknownProperty(property_id.to_string()))?;
        property.check_type(&value)?;
        property.value = value;
        Ok(())
    }

    pub(crate) fn set_frozen(&self, frozen: bool) {
        self.frozen.set(frozen);
    }

    /// Ids of the cells that accept observers.
    pub fn observable_property_ids(&self) -> Vec<String> {
        self.properties
            .borrow()
            .iter()
            .filter(|p| p.observable)
            .map(|p| p.id.clone())
            .collect()
    }

    /// Attach an observer to a cell. Returns None if the property does not
    /// exist or is not observable.
    pub fn subscribe(
        &self,
        property_id: &str,
        observer: Rc<dyn PropertyObserver>,
    ) -> Option<SubscriptionId> {
        let mut properties = self.properties.borrow_mut();
        let property = properties
            .iter_mut()
            .find(|p| p.id == property_id && p.observable)?;

        let id = self.next_subscription.get();
        self.next_subscription.set(id + 1);
        property.observers.push((id, observer));
        Some(id)
    }

    /// Detach a previously attached observer. Returns false if it was not found.
    pub fn unsubscribe(&self, property_id: &str, subscription: SubscriptionId) -> bool {
        let mut properties = self.properties.borrow_mut();
        match properties.iter_mut().find(|p| p.id == property_id) {
            Some(property) => {
                let before = property.observers.len();
                property.observers.retain(|(id, _)| *id != subscription);
                property.observers.len() != before
            }
            None => false,
        }
    }

    /// Total number of observers across all cells.
    pub fn observer_count(&self) -> usize {
        self.properties.borrow().iter().map(|p| p.observers.len()).sum()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let properties = self.properties.borrow();
        let mut map = f.debug_map();
        for p in properties.iter() {
            map.entry(&p.id, &p.value);
        }
        map.finish()
    }
}

/// Identity comparison for shared records.
pub fn same_item(a: &Item, b: &Item) -> bool {
    Rc::ptr_eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn cell(id: &str, ty: PropertyType, value: Value, read_only: bool) -> CellSpec {
        CellSpec {
            id: id.to_string(),
            property_type: ty,
            value,
            read_only,
            observable: !read_only,
        }
    }

    fn sample() -> Record {
        Record::from_cells(vec![
            cell("id", PropertyType::Int32, Value::Int32(1), true),
            cell("name", PropertyType::String, Value::from("Alice"), false),
        ])
    }

    struct Recorder(RefCell<Vec<String>>);

    impl PropertyObserver for Recorder {
        fn value_changed(&self, property_id: &str) {
            self.0.borrow_mut().push(property_id.to_string());
        }
    }

    #[test]
    fn test_public_write_respects_read_only() {
        let record = sample();
        assert!(matches!(
            record.set_value("id", Value::Int32(2)),
            Err(ViewError::ReadOnly(_))
        ));
        record.set_value("name", Value::from("Bob")).unwrap();
        assert_eq!(record.value("name"), Some(Value::from("Bob")));
    }

    #[test]
    fn test_type_mismatch() {
        let record = sample();
        let err = record.set_value("name", Value::Int32(3)).unwrap_err();
        assert!(matches!(err, ViewError::TypeMismatch { .. }));
    }

    #[test]
    fn test_privileged_write_bypasses_read_only() {
        let record = sample();
        record.write_privileged("id", Value::Int32(42)).unwrap();
        assert_eq!(record.value("id"), Some(Value::Int32(42)));
        assert_eq!(record.is_read_only("id"), Some(true));
    }

    #[test]
    fn test_freeze() {
        let record = sample();
        record.set_frozen(true);
        assert_eq!(record.is_read_only("name"), Some(true));
        assert!(record.set_value("name", Value::from("Carol")).is_err());
        record.set_frozen(false);
        assert_eq!(record.is_read_only("name"), Some(false));
    }

    #[test]
    fn test_observers_notified_and_removed() {
        let record = sample();
        let recorder = Rc::new(Recorder(RefCell::new(Vec::new())));

        assert!(record.subscribe("id", recorder.clone()).is_none());
        let sub = record.subscribe("name", recorder.clone()).unwrap();
        assert_eq!(record.observer_count(), 1);

        record.set_value("name", Value::from("Bob")).unwrap();
        // Same value again is not a change
        record.set_value("name", Value::from("Bob")).unwrap();
        record.write_privileged("name", Value::from("Dan")).unwrap();
        assert_eq!(*recorder.0.borrow(), vec!["name".to_string()]);

        assert!(record.unsubscribe("name", sub));
        assert!(!record.unsubscribe("name", sub));
        record.set_value("name", Value::from("Eve")).unwrap();
        assert_eq!(recorder.0.borrow().len(), 1);
    }
}
