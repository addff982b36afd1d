/// LazyQuery Demo
///
/// Browses an in-memory dataset through a LazyQueryView and logs every
/// batch load, eviction and commit. Optional JSON inputs are read from the
/// environment:
///
/// - `LAZYQUERY_DEFINITION`: path to a query definition document
/// - `LAZYQUERY_CONFIG`: path to a view configuration document
/// - `LAZYQUERY_ROWS`: path to a JSON array of rows
/// - `LAZYQUERY_GENERATE`: number of rows to generate when no rows are given

use lazyquery::{
    LazyQueryView, MemoryQueryFactory, MemoryStore, QueryDefinition, Value, ViewConfig, ViewError,
};
use log::{error, info};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

const DEFAULT_DEFINITION: &str = r#"{
    "properties": [
        {"id": "id", "type": "Int64", "read_only": true},
        {"id": "name", "type": "String", "default": ""},
        {"id": "score", "type": "Int32", "default": 0}
    ],
    "batch_size": 50,
    "status_property": true,
    "debug_properties": true,
    "id_property": "id"
}"#;

fn read_env_file(var: &str) -> Result<Option<String>, ViewError> {
    match std::env::var(var) {
        Ok(path) => std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| ViewError::Config(format!("cannot read {} ({}): {}", var, path, e))),
        Err(_) => Ok(None),
    }
}

fn load_store() -> Result<MemoryStore, ViewError> {
    if let Some(rows) = read_env_file("LAZYQUERY_ROWS")? {
        return MemoryStore::from_json_rows("demo", "id", &rows);
    }

    let count: usize = std::env::var("LAZYQUERY_GENERATE")
        .unwrap_or_else(|_| "1000".to_string())
        .parse()
        .map_err(|e| ViewError::Config(format!("LAZYQUERY_GENERATE must be a number: {}", e)))?;

    let mut store = MemoryStore::new("demo", "id");
    for i in 0..count {
        let mut row = HashMap::new();
        row.insert("name".to_string(), Value::from(format!("entry {}", i)));
        row.insert("score".to_string(), Value::Int32(((i * 7919) % 1000) as i32));
        store.append_row(row)?;
    }
    Ok(store)
}

fn run() -> Result<(), ViewError> {
    let definition = match read_env_file("LAZYQUERY_DEFINITION")? {
        Some(json) => QueryDefinition::from_json(&json)?,
        None => QueryDefinition::from_json(DEFAULT_DEFINITION)?,
    };
    let config = match read_env_file("LAZYQUERY_CONFIG")? {
        Some(json) => ViewConfig::from_json(&json)?,
        None => ViewConfig::default().with_max_cache_size(200),
    };

    let store = Rc::new(RefCell::new(load_store()?));
    let factory = MemoryQueryFactory::new(store.clone());
    let mut view = LazyQueryView::new(definition, Box::new(factory), config)?;

    let size = view.size()?;
    info!("dataset has {} rows", size);

    // Scroll through the whole dataset
    for index in 0..size {
        view.get_item(index)?;
    }
    info!(
        "scrolled {} rows with {} batch loads, {} records cached",
        size,
        store.borrow().stats().load_calls.len(),
        view.cached_len()
    );

    let sort_property = view
        .definition()
        .sortable_property_ids()
        .into_iter()
        .find(|p| *p != "id")
        .map(str::to_string);
    if let Some(property) = sort_property {
        view.sort(&[property.as_str()], &[false])?;
        let top = view.get_item(0)?;
        info!("top row by '{}' descending: {:?}", property, top.values());
    }

    view.add_item()?;
    if view.definition().property("name").is_some() {
        view.get_item(0)?.set_value("name", Value::from("added by demo"))?;
    }
    if view.size()? > 1 {
        view.remove_item(1)?;
    }
    view.commit()?;
    view.refresh()?;
    info!(
        "after commit: {} rows, {} queries constructed",
        view.size()?,
        store.borrow().stats().queries_constructed
    );
    Ok(())
}

fn main() {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}
