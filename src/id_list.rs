//! Index-list helpers
//!
//! Two read-only lists that expose item ids without materializing them:
//!
//! - `NaturalNumbersList`: the ids are the visible indices themselves,
//!   `start..end`, computed on demand.
//! - `LazyIdList`: the id of the item at index `i` is the value of the id
//!   property of `view.get_item(i)`, resolved (and loaded) only when asked.
//!
//! Both refuse every mutating operation with `ViewError::Unsupported`.

use crate::error::ViewError;
use crate::record::Item;
use crate::value::Value;
use crate::view::LazyQueryView;
use std::collections::HashSet;

/// The list `start, start + 1, .., end - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NaturalNumbersList {
    start: usize,
    end: usize,
}

impl NaturalNumbersList {
    /// The list `0..size`.
    pub fn new(size: usize) -> Self {
        NaturalNumbersList { start: 0, end: size }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn get(&self, index: usize) -> Result<usize, ViewError> {
        if index >= self.len() {
            return Err(ViewError::out_of_range(index, self.len()));
        }
        Ok(self.start + index)
    }

    pub fn contains(&self, value: usize) -> bool {
        (self.start..self.end).contains(&value)
    }

    pub fn index_of(&self, value: usize) -> Option<usize> {
        self.contains(value).then(|| value - self.start)
    }

    /// Elements `[from, to)` of this list.
    pub fn sub_list(&self, from: usize, to: usize) -> Result<NaturalNumbersList, ViewError> {
        if from > to {
            return Err(ViewError::out_of_range(from, to));
        }
        if to > self.len() {
            return Err(ViewError::out_of_range(to, self.len()));
        }
        Ok(NaturalNumbersList {
            start: self.start + from,
            end: self.start + to,
        })
    }

    pub fn iter(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.iter().collect()
    }

    pub fn push(&mut self, _value: usize) -> Result<(), ViewError> {
        Err(ViewError::Unsupported("natural number lists are read-only"))
    }

    pub fn remove(&mut self, _index: usize) -> Result<usize, ViewError> {
        Err(ViewError::Unsupported("natural number lists are read-only"))
    }
}

impl IntoIterator for NaturalNumbersList {
    type Item = usize;
    type IntoIter = std::ops::Range<usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ids resolved lazily from the id property of the view's items.
pub struct LazyIdList<'v> {
    view: &'v mut LazyQueryView,
    id_property: String,
}

impl<'v> LazyIdList<'v> {
    pub fn new(view: &'v mut LazyQueryView, id_property: impl Into<String>) -> Self {
        LazyIdList {
            view,
            id_property: id_property.into(),
        }
    }

    pub fn id_property(&self) -> &str {
        &self.id_property
    }

    pub fn len(&mut self) -> Result<usize, ViewError> {
        self.view.size()
    }

    pub fn is_empty(&mut self) -> Result<bool, ViewError> {
        Ok(self.len()? == 0)
    }

    fn id_of(&self, item: &Item) -> Result<Value, ViewError> {
        item.value(&self.id_property)
            .ok_or_else(|| ViewError::UnknownProperty(self.id_property.clone()))
    }

    /// Id of the item at `index`, loading its batch if necessary.
    pub fn get(&mut self, index: usize) -> Result<Value, ViewError> {
        let item = self.view.get_item(index)?;
        self.id_of(&item)
    }

    /// Index of the item whose id equals `id`.
    ///
    /// Added and already loaded items are searched first; otherwise the
    /// list is scanned from the start, loading batches as it goes.
    pub fn index_of(&mut self, id: &Value) -> Result<Option<usize>, ViewError> {
        let mut checked = HashSet::new();
        for (index, item) in self.view.added_items().iter().enumerate() {
            if self.id_of(item)? == *id {
                return Ok(Some(index));
            }
            checked.insert(index);
        }

        let mut loaded = self.view.loaded_items();
        loaded.sort_by_key(|(index, _)| *index);
        for (index, item) in &loaded {
            if self.id_of(item)? == *id {
                return Ok(Some(*index));
            }
            checked.insert(*index);
        }

        let size = self.view.size()?;
        for index in 0..size {
            if checked.contains(&index) {
                continue;
            }
            if self.get(index)? == *id {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    pub fn contains(&mut self, id: &Value) -> Result<bool, ViewError> {
        Ok(self.index_of(id)?.is_some())
    }

    /// Materializing every id would load the whole dataset.
    pub fn to_vec(&self) -> Result<Vec<Value>, ViewError> {
        Err(ViewError::Unsupported("materializing a lazily resolved id list"))
    }

    pub fn push(&mut self, _id: Value) -> Result<(), ViewError> {
        Err(ViewError::Unsupported("lazy id lists are read-only"))
    }

    pub fn remove(&mut self, _index: usize) -> Result<Value, ViewError> {
        Err(ViewError::Unsupported("lazy id lists are read-only"))
    }
}
