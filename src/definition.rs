//! Query definitions (schemas) for LazyQuery
//!
//! A `QueryDefinition` lists the properties every record carries, with their
//! type, default value and read-only/sortable flags, plus the batch size used
//! for loading. It can also reserve the item status property and the
//! instrumentation properties filled in on batch load.
//!
//! # Examples
//!
//! ```
//! use lazyquery::{PropertyDefinition, PropertyType, QueryDefinition, Value};
//!
//! let definition = QueryDefinition::builder()
//!     .property_with(PropertyDefinition::new("id", PropertyType::Int64).read_only(true))
//!     .property("name", PropertyType::String, Value::Null)
//!     .property_with(PropertyDefinition::new("notes", PropertyType::String).sortable(false))
//!     .batch_size(25)
//!     .status_property(true)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(definition.batch_size(), 25);
//! assert_eq!(definition.sortable_property_ids(), vec!["id", "name"]);
//! assert!(definition.status_property_id().is_some());
//! ```

use crate::error::ViewError;
use crate::record::{CellSpec, Item, Record};
use crate::value::{ItemStatus, PropertyType, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Reserved property holding the record's `ItemStatus`.
pub const PROPERTY_ID_ITEM_STATUS: &str = "__ITEM_STATUS__";
/// Reserved property holding the index of the batch the record was loaded in.
pub const PROPERTY_ID_DEBUG_BATCH_INDEX: &str = "__DEBUG_BATCH_INDEX__";
/// Reserved property holding the query generation the record was loaded by.
pub const PROPERTY_ID_DEBUG_QUERY_INDEX: &str = "__DEBUG_QUERY_INDEX__";
/// Reserved property holding the batch load latency in milliseconds.
pub const PROPERTY_ID_DEBUG_BATCH_QUERY_TIME: &str = "__DEBUG_BATCH_QUERY_TIME__";

pub const DEFAULT_BATCH_SIZE: usize = 50;

const RESERVED_PROPERTY_IDS: [&str; 4] = [
    PROPERTY_ID_ITEM_STATUS,
    PROPERTY_ID_DEBUG_BATCH_INDEX,
    PROPERTY_ID_DEBUG_QUERY_INDEX,
    PROPERTY_ID_DEBUG_BATCH_QUERY_TIME,
];

fn default_true() -> bool {
    true
}

fn null_value() -> Value {
    Value::Null
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Definition of a single property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    #[serde(default = "null_value")]
    pub default: Value,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_true")]
    pub sortable: bool,
}

impl PropertyDefinition {
    /// A writable, sortable property with a null default.
    pub fn new(id: impl Into<String>, property_type: PropertyType) -> Self {
        PropertyDefinition {
            id: id.into(),
            property_type,
            default: Value::Null,
            read_only: false,
            sortable: true,
        }
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = value;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    fn reserved(id: &str, property_type: PropertyType, default: Value) -> Self {
        PropertyDefinition {
            id: id.to_string(),
            property_type,
            default,
            read_only: true,
            sortable: false,
        }
    }

    fn cell(&self, value: Value, reserved: bool) -> CellSpec {
        CellSpec {
            id: self.id.clone(),
            property_type: self.property_type,
            value,
            read_only: self.read_only,
            observable: !reserved && !self.read_only,
        }
    }
}

/// JSON document form of a definition.
#[derive(Debug, Deserialize)]
struct DefinitionDocument {
    properties: Vec<PropertyDefinition>,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default)]
    status_property: bool,
    #[serde(default)]
    debug_properties: bool,
    #[serde(default)]
    id_property: Option<String>,
}

/// Schema shared by a query factory, its queries and the view.
#[derive(Debug, Clone)]
pub struct QueryDefinition {
    properties: Vec<PropertyDefinition>,
    batch_size: usize,
    status_property: bool,
    debug_properties: bool,
    id_property: Option<String>,
}

impl QueryDefinition {
    pub fn builder() -> QueryDefinitionBuilder {
        QueryDefinitionBuilder::default()
    }

    /// Parse a definition from JSON.
    ///
    /// ```
    /// use lazyquery::QueryDefinition;
    ///
    /// let definition = QueryDefinition::from_json(r#"{
    ///     "properties": [
    ///         {"id": "id", "type": "Int64", "read_only": true},
    ///         {"id": "title", "type": "String", "default": ""}
    ///     ],
    ///     "batch_size": 20,
    ///     "id_property": "id"
    /// }"#).unwrap();
    ///
    /// assert_eq!(definition.batch_size(), 20);
    /// assert_eq!(definition.id_property(), Some("id"));
    /// ```
    pub fn from_json(json: &str) -> Result<Self, ViewError> {
        let doc: DefinitionDocument = serde_json::from_str(json)?;
        let mut builder = QueryDefinition::builder()
            .batch_size(doc.batch_size)
            .status_property(doc.status_property)
            .debug_properties(doc.debug_properties);
        for property in doc.properties {
            builder = builder.property_with(property);
        }
        if let Some(id) = doc.id_property {
            builder = builder.id_property(id);
        }
        builder.build()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// All property ids, reserved ones included, in definition order.
    pub fn property_ids(&self) -> Vec<&str> {
        self.properties.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn sortable_property_ids(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|p| p.sortable)
            .map(|p| p.id.as_str())
            .collect()
    }

    pub fn property(&self, id: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.id == id)
    }

    pub fn property_type(&self, id: &str) -> Option<PropertyType> {
        self.property(id).map(|p| p.property_type)
    }

    pub fn default_value(&self, id: &str) -> Option<&Value> {
        self.property(id).map(|p| &p.default)
    }

    pub fn is_read_only(&self, id: &str) -> Option<bool> {
        self.property(id).map(|p| p.read_only)
    }

    pub fn is_sortable(&self, id: &str) -> Option<bool> {
        self.property(id).map(|p| p.sortable)
    }

    pub fn is_reserved(id: &str) -> bool {
        RESERVED_PROPERTY_IDS.contains(&id)
    }

    pub fn status_property_id(&self) -> Option<&'static str> {
        self.status_property.then_some(PROPERTY_ID_ITEM_STATUS)
    }

    pub fn has_debug_properties(&self) -> bool {
        self.debug_properties
    }

    /// Property whose value identifies a record, if any.
    pub fn id_property(&self) -> Option<&str> {
        self.id_property.as_deref()
    }

    /// Construct a record populated with default values.
    pub fn new_record(&self) -> Item {
        let cells = self
            .properties
            .iter()
            .map(|p| p.cell(p.default.clone(), Self::is_reserved(&p.id)))
            .collect();
        Rc::new(Record::from_cells(cells))
    }

    /// Construct a record from stored values. Missing properties take their
    /// defaults; values are coerced to the property type where lossless.
    pub fn build_record(&self, mut values: HashMap<String, Value>) -> Result<Item, ViewError> {
        if let Some(unknown) = values.keys().find(|k| self.property(k).is_none()) {
            return Err(ViewError::UnknownProperty(unknown.clone()));
        }

        let mut cells = Vec::with_capacity(self.properties.len());
        for p in &self.properties {
            let value = match values.remove(&p.id) {
                Some(v) => {
                    let shown = format!("{:?}", v);
                    v.coerce(p.property_type).ok_or_else(|| ViewError::TypeMismatch {
                        property: p.id.clone(),
                        expected: p.property_type,
                        actual: shown,
                    })?
                }
                None => p.default.clone(),
            };
            cells.push(p.cell(value, Self::is_reserved(&p.id)));
        }
        Ok(Rc::new(Record::from_cells(cells)))
    }
}

/// Builder for `QueryDefinition`.
#[derive(Debug, Clone)]
pub struct QueryDefinitionBuilder {
    properties: Vec<PropertyDefinition>,
    batch_size: usize,
    status_property: bool,
    debug_properties: bool,
    id_property: Option<String>,
}

impl Default for QueryDefinitionBuilder {
    fn default() -> Self {
        QueryDefinitionBuilder {
            properties: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            status_property: false,
            debug_properties: false,
            id_property: None,
        }
    }
}

impl QueryDefinitionBuilder {
    /// Add a writable, sortable property.
    pub fn property(self, id: impl Into<String>, property_type: PropertyType, default: Value) -> Self {
        self.property_with(PropertyDefinition::new(id, property_type).default_value(default))
    }

    pub fn property_with(mut self, property: PropertyDefinition) -> Self {
        self.properties.push(property);
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn status_property(mut self, enabled: bool) -> Self {
        self.status_property = enabled;
        self
    }

    pub fn debug_properties(mut self, enabled: bool) -> Self {
        self.debug_properties = enabled;
        self
    }

    pub fn id_property(mut self, id: impl Into<String>) -> Self {
        self.id_property = Some(id.into());
        self
    }

    pub fn build(self) -> Result<QueryDefinition, ViewError> {
        if self.batch_size == 0 {
            return Err(ViewError::Config("batch size must be at least 1".to_string()));
        }

        let mut properties = Vec::with_capacity(self.properties.len() + 4);
        let mut seen = HashSet::new();
        for mut p in self.properties {
            if QueryDefinition::is_reserved(&p.id) {
                return Err(ViewError::Config(format!("property id '{}' is reserved", p.id)));
            }
            if !seen.insert(p.id.clone()) {
                return Err(ViewError::Config(format!("duplicate property id '{}'", p.id)));
            }
            let shown = format!("{:?}", p.default);
            p.default = p.default.coerce(p.property_type).ok_or_else(|| ViewError::TypeMismatch {
                property: p.id.clone(),
                expected: p.property_type,
                actual: shown,
            })?;
            properties.push(p);
        }
        if let Some(id) = &self.id_property {
            if !seen.contains(id) {
                return Err(ViewError::UnknownProperty(id.clone()));
            }
        }

        if self.status_property {
            properties.push(PropertyDefinition::reserved(
                PROPERTY_ID_ITEM_STATUS,
                PropertyType::Status,
                Value::Status(ItemStatus::None),
            ));
        }
        if self.debug_properties {
            properties.push(PropertyDefinition::reserved(
                PROPERTY_ID_DEBUG_BATCH_INDEX,
                PropertyType::Int32,
                Value::Null,
            ));
            properties.push(PropertyDefinition::reserved(
                PROPERTY_ID_DEBUG_QUERY_INDEX,
                PropertyType::Int32,
                Value::Null,
            ));
            properties.push(PropertyDefinition::reserved(
                PROPERTY_ID_DEBUG_BATCH_QUERY_TIME,
                PropertyType::Int64,
                Value::Null,
            ));
        }

        Ok(QueryDefinition {
            properties,
            batch_size: self.batch_size,
            status_property: self.status_property,
            debug_properties: self.debug_properties,
            id_property: self.id_property,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> QueryDefinition {
        QueryDefinition::builder()
            .property_with(PropertyDefinition::new("id", PropertyType::Int64).read_only(true))
            .property("name", PropertyType::String, Value::from(""))
            .property("age", PropertyType::Int32, Value::Null)
            .status_property(true)
            .debug_properties(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_reserved_properties_appended() {
        let definition = people();
        assert_eq!(
            definition.property_ids(),
            vec![
                "id",
                "name",
                "age",
                PROPERTY_ID_ITEM_STATUS,
                PROPERTY_ID_DEBUG_BATCH_INDEX,
                PROPERTY_ID_DEBUG_QUERY_INDEX,
                PROPERTY_ID_DEBUG_BATCH_QUERY_TIME,
            ]
        );
        assert_eq!(definition.sortable_property_ids(), vec!["id", "name", "age"]);
        assert_eq!(definition.is_read_only(PROPERTY_ID_ITEM_STATUS), Some(true));
    }

    #[test]
    fn test_new_record_defaults() {
        let item = people().new_record();
        assert_eq!(item.value("name"), Some(Value::from("")));
        assert_eq!(item.value(PROPERTY_ID_ITEM_STATUS), Some(Value::Status(ItemStatus::None)));
        assert_eq!(item.observable_property_ids(), vec!["name", "age"]);
    }

    #[test]
    fn test_build_record_coerces_and_rejects() {
        let definition = people();
        let mut values = HashMap::new();
        values.insert("id".to_string(), Value::Int32(7));
        values.insert("name".to_string(), Value::from("Ann"));
        let item = definition.build_record(values).unwrap();
        assert_eq!(item.value("id"), Some(Value::Int64(7)));
        assert_eq!(item.value("age"), Some(Value::Null));

        let mut bad = HashMap::new();
        bad.insert("nope".to_string(), Value::Null);
        assert!(matches!(definition.build_record(bad), Err(ViewError::UnknownProperty(_))));

        let mut mismatched = HashMap::new();
        mismatched.insert("age".to_string(), Value::from("old"));
        assert!(matches!(
            definition.build_record(mismatched),
            Err(ViewError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_build_validation() {
        assert!(QueryDefinition::builder().batch_size(0).build().is_err());
        assert!(QueryDefinition::builder()
            .property("a", PropertyType::Int32, Value::Null)
            .property("a", PropertyType::Int32, Value::Null)
            .build()
            .is_err());
        assert!(QueryDefinition::builder()
            .property(PROPERTY_ID_ITEM_STATUS, PropertyType::Int32, Value::Null)
            .build()
            .is_err());
        assert!(QueryDefinition::builder()
            .property("a", PropertyType::Int32, Value::from("x"))
            .build()
            .is_err());
        assert!(QueryDefinition::builder().id_property("missing").build().is_err());
    }

    #[test]
    fn test_from_json_defaults() {
        let definition = QueryDefinition::from_json(
            r#"{"properties": [{"id": "n", "type": "Int32", "sortable": false}]}"#,
        )
        .unwrap();
        assert_eq!(definition.batch_size(), DEFAULT_BATCH_SIZE);
        assert_eq!(definition.is_sortable("n"), Some(false));
        assert!(definition.status_property_id().is_none());
        assert!(QueryDefinition::from_json("{").is_err());
    }
}
