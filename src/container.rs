//! LazyQueryContainer - id-addressed facade over a LazyQueryView
//!
//! Table and grid adapters usually address rows by item id rather than by
//! position. The container provides that addressing on top of the view:
//!
//! - Without an id property the ids are the visible indices
//!   (`ItemIds::Natural`), and an id is valid only until the sequence changes.
//! - With an id property (see `QueryDefinitionBuilder::id_property`) the id of
//!   a row is the value of that property (`ItemIds::Lazy`), resolved on demand.
//!
//! # Examples
//!
//! ```
//! use lazyquery::{LazyQueryContainer, MemoryQueryFactory, MemoryStore, PropertyDefinition,
//!                 PropertyType, QueryDefinition, Value, ViewConfig};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let store = Rc::new(RefCell::new(
//!     MemoryStore::from_json_rows("books", "id", r#"[{"title": "Dune"}, {"title": "Emma"}]"#).unwrap(),
//! ));
//! let definition = QueryDefinition::builder()
//!     .property_with(PropertyDefinition::new("id", PropertyType::Int64).read_only(true))
//!     .property("title", PropertyType::String, Value::Null)
//!     .id_property("id")
//!     .build()
//!     .unwrap();
//!
//! let factory = MemoryQueryFactory::new(store);
//! let mut container = LazyQueryContainer::new(definition, Box::new(factory), ViewConfig::default()).unwrap();
//!
//! let emma = container.get_item(&Value::Int64(2)).unwrap().unwrap();
//! assert_eq!(emma.value("title"), Some(Value::from("Emma")));
//! assert_eq!(container.index_of_id(&Value::Int64(2)).unwrap(), Some(1));
//! ```

use crate::config::ViewConfig;
use crate::definition::QueryDefinition;
use crate::error::ViewError;
use crate::id_list::{LazyIdList, NaturalNumbersList};
use crate::query::{QueryFactory, SortKey};
use crate::record::Item;
use crate::value::{ItemStatus, PropertyType, Value};
use crate::view::LazyQueryView;

/// The container's item ids.
pub enum ItemIds<'v> {
    Natural(NaturalNumbersList),
    Lazy(LazyIdList<'v>),
}

impl<'v> ItemIds<'v> {
    pub fn len(&mut self) -> Result<usize, ViewError> {
        match self {
            ItemIds::Natural(list) => Ok(list.len()),
            ItemIds::Lazy(list) => list.len(),
        }
    }

    pub fn is_empty(&mut self) -> Result<bool, ViewError> {
        Ok(self.len()? == 0)
    }

    pub fn get(&mut self, index: usize) -> Result<Value, ViewError> {
        match self {
            ItemIds::Natural(list) => list.get(index).map(index_id),
            ItemIds::Lazy(list) => list.get(index),
        }
    }

    pub fn index_of(&mut self, id: &Value) -> Result<Option<usize>, ViewError> {
        match self {
            ItemIds::Natural(list) => Ok(id_index(id).and_then(|i| list.index_of(i))),
            ItemIds::Lazy(list) => list.index_of(id),
        }
    }
}

fn index_id(index: usize) -> Value {
    Value::Int64(index as i64)
}

fn id_index(id: &Value) -> Option<usize> {
    match id {
        Value::Int64(i) => usize::try_from(*i).ok(),
        Value::Int32(i) => usize::try_from(*i).ok(),
        _ => None,
    }
}

pub struct LazyQueryContainer {
    view: LazyQueryView,
}

impl LazyQueryContainer {
    pub fn new(
        definition: QueryDefinition,
        factory: Box<dyn QueryFactory>,
        config: ViewConfig,
    ) -> Result<Self, ViewError> {
        Ok(Self::from_view(LazyQueryView::new(definition, factory, config)?))
    }

    pub fn from_view(view: LazyQueryView) -> Self {
        LazyQueryContainer { view }
    }

    pub fn view(&self) -> &LazyQueryView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut LazyQueryView {
        &mut self.view
    }

    pub fn into_view(self) -> LazyQueryView {
        self.view
    }

    pub fn size(&mut self) -> Result<usize, ViewError> {
        self.view.size()
    }

    pub fn container_property_ids(&self) -> Vec<&str> {
        self.view.definition().property_ids()
    }

    pub fn property_type(&self, property_id: &str) -> Option<PropertyType> {
        self.view.definition().property_type(property_id)
    }

    pub fn sortable_property_ids(&self) -> Vec<&str> {
        self.view.definition().sortable_property_ids()
    }

    pub fn item_ids(&mut self) -> Result<ItemIds<'_>, ViewError> {
        let id_property = self.view.definition().id_property().map(str::to_string);
        match id_property {
            Some(id_property) => Ok(ItemIds::Lazy(LazyIdList::new(&mut self.view, id_property))),
            None => Ok(ItemIds::Natural(NaturalNumbersList::new(self.view.size()?))),
        }
    }

    pub fn id_by_index(&mut self, index: usize) -> Result<Value, ViewError> {
        self.item_ids()?.get(index)
    }

    pub fn index_of_id(&mut self, id: &Value) -> Result<Option<usize>, ViewError> {
        self.item_ids()?.index_of(id)
    }

    pub fn contains_id(&mut self, id: &Value) -> Result<bool, ViewError> {
        Ok(self.index_of_id(id)?.is_some())
    }

    /// Record with the given id, or None if no visible row has it.
    pub fn get_item(&mut self, id: &Value) -> Result<Option<Item>, ViewError> {
        match self.index_of_id(id)? {
            Some(index) => self.view.get_item(index).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_item_at(&mut self, index: usize) -> Result<Item, ViewError> {
        self.view.get_item(index)
    }

    /// Add a record at the front and return its id.
    pub fn add_item(&mut self) -> Result<Value, ViewError> {
        let index = self.view.add_item()?;
        self.id_by_index(index)
    }

    pub fn add_item_at(&mut self, _index: usize) -> Result<Value, ViewError> {
        Err(ViewError::Unsupported("adding an item at an arbitrary index"))
    }

    pub fn add_item_after(&mut self, _previous_id: &Value) -> Result<Value, ViewError> {
        Err(ViewError::Unsupported("adding an item after another item"))
    }

    /// Buffer the removal of the record with `id`. Returns false if no
    /// visible row has that id.
    pub fn remove_item(&mut self, id: &Value) -> Result<bool, ViewError> {
        match self.index_of_id(id)? {
            Some(index) => {
                self.view.remove_item(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn remove_all_items(&mut self) -> Result<bool, ViewError> {
        self.view.remove_all_items()
    }

    pub fn item_status(&self, item: &Item) -> ItemStatus {
        self.view.item_status(item)
    }

    pub fn sort<S: AsRef<str>>(&mut self, property_ids: &[S], ascending: &[bool]) -> Result<(), ViewError> {
        self.view.sort(property_ids, ascending)
    }

    pub fn sort_by(&mut self, sort_keys: Vec<SortKey>) -> Result<(), ViewError> {
        self.view.sort_by(sort_keys)
    }

    pub fn refresh(&mut self) -> Result<(), ViewError> {
        self.view.refresh()
    }

    pub fn is_modified(&self) -> bool {
        self.view.is_modified()
    }

    pub fn commit(&mut self) -> Result<(), ViewError> {
        self.view.commit()
    }

    pub fn discard(&mut self) -> Result<(), ViewError> {
        self.view.discard()
    }
}
