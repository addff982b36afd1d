/// Browse Example
///
/// This example demonstrates:
/// - Defining the properties a view exposes
/// - Lazy, batch-aligned loading with a bounded cache
/// - Sorting, which rebuilds the query
/// - Buffered add/edit/remove with commit and discard
/// - Addressing rows by id through LazyQueryContainer

use lazyquery::{
    ItemStatus, LazyQueryContainer, LazyQueryView, MemoryQueryFactory, MemoryStore,
    PropertyDefinition, PropertyType, QueryDefinition, Value, ViewConfig, PROPERTY_ID_ITEM_STATUS,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

fn products() -> Rc<RefCell<MemoryStore>> {
    let store = Rc::new(RefCell::new(MemoryStore::new("products", "id")));
    let categories = ["Electronics", "Furniture", "Garden", "Toys"];
    for i in 0..240 {
        let mut row = HashMap::new();
        row.insert("product".to_string(), Value::from(format!("Product {:03}", i)));
        row.insert("category".to_string(), Value::from(categories[i % categories.len()]));
        row.insert("price".to_string(), Value::Float64(((i * 37) % 500) as f64 + 0.99));
        store.borrow_mut().append_row(row).unwrap();
    }
    store
}

fn definition() -> QueryDefinition {
    QueryDefinition::builder()
        .property_with(PropertyDefinition::new("id", PropertyType::Int64).read_only(true))
        .property("product", PropertyType::String, Value::from(""))
        .property("category", PropertyType::String, Value::from("Uncategorized"))
        .property("price", PropertyType::Float64, Value::Float64(0.0))
        .batch_size(20)
        .status_property(true)
        .id_property("id")
        .build()
        .unwrap()
}

fn print_row(label: &str, view: &mut LazyQueryView, index: usize) {
    let item = view.get_item(index).unwrap();
    println!(
        "   {} [{}] {} / {} / {} ({})",
        label,
        index,
        item.value("product").unwrap(),
        item.value("category").unwrap(),
        item.value("price").unwrap(),
        item.value(PROPERTY_ID_ITEM_STATUS).unwrap()
    );
}

fn main() {
    println!("=== LazyQuery Browse Example ===\n");

    let store = products();
    let factory = MemoryQueryFactory::new(store.clone());
    let config = ViewConfig::default().with_max_cache_size(60);
    let mut view = LazyQueryView::new(definition(), Box::new(factory), config).unwrap();

    // 1. Lazy loading
    println!("1. Opening a view over {} products...", store.borrow().len());
    println!("   Visible rows: {}", view.size().unwrap());
    print_row("row", &mut view, 45);
    println!("   Batches loaded: {:?}\n", store.borrow().stats().load_calls);

    // 2. Scrolling with a bounded cache
    println!("2. Scrolling through every row...");
    for i in 0..view.size().unwrap() {
        view.get_item(i).unwrap();
    }
    println!(
        "   {} batch loads, {} records cached (bound {})\n",
        store.borrow().stats().load_calls.len(),
        view.cached_len(),
        view.config().max_cache_size
    );

    // 3. Sorting
    println!("3. Sorting by price descending...");
    view.sort(&["price", "product"], &[false, true]).unwrap();
    for i in 0..3 {
        print_row("top", &mut view, i);
    }
    println!();

    // 4. Buffered changes
    println!("4. Editing, adding and removing...");
    view.get_item(0).unwrap().set_value("price", Value::Float64(9.99)).unwrap();
    view.add_item().unwrap();
    view.get_item(0).unwrap().set_value("product", Value::from("New Gadget")).unwrap();
    view.remove_item(5).unwrap();
    print_row("added", &mut view, 0);
    print_row("edited", &mut view, 1);
    print_row("removed", &mut view, 5);
    println!(
        "   Pending: {} added, {} modified, {} removed",
        view.added_items().len(),
        view.modified_items().len(),
        view.removed_items().len()
    );
    view.commit().unwrap();
    view.refresh().unwrap();
    println!("   Committed; store now holds {} products\n", store.borrow().len());

    // 5. Discarding
    println!("5. Discarding an edit...");
    let item = view.get_item(10).unwrap();
    item.set_value("category", Value::from("Clearance")).unwrap();
    assert_eq!(view.item_status(&item), ItemStatus::Modified);
    view.discard().unwrap();
    print_row("reloaded", &mut view, 10);
    println!();

    // 6. Id-addressed access
    println!("6. Addressing rows by id...");
    let mut container = LazyQueryContainer::from_view(view);
    let id = container.id_by_index(3).unwrap();
    println!("   Row 3 has id {}", id);
    println!("   Id {} is at index {:?}", id, container.index_of_id(&id).unwrap());
    let new_id = container.add_item().unwrap();
    println!("   Added a row with id {}", new_id);
    container.discard().unwrap();

    println!("\n=== Example Complete ===");
}
