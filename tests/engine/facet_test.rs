//! Facet expansion: one labeled result set per distinct facet value.

use std::sync::Arc;

use serde_json::json;
use tally::catalog::demo_registry;
use tally::compiler::{CompileError, RawReportQuery};
use tally::engine::{EngineError, FacetedRows, ReportEngine, ReportOutput};
use tally::store::Pool;

const SEED: &str = "
CREATE TABLE products (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    price REAL NOT NULL,
    category TEXT NOT NULL,
    stock INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE customers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT NOT NULL,
    city TEXT NOT NULL,
    country TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE orders (
    id INTEGER PRIMARY KEY,
    customer_id INTEGER NOT NULL,
    product_id INTEGER NOT NULL,
    quantity INTEGER NOT NULL,
    total_amount REAL NOT NULL,
    order_date TEXT NOT NULL,
    status TEXT NOT NULL
);

INSERT INTO products VALUES
    (1, 'Desk Lamp', 49.5, 'Lighting', 12, '2023-11-02'),
    (2, 'Office Chair', 189.0, 'Furniture', 4, '2023-12-14'),
    (3, 'Standing Desk', 499.0, 'Furniture', 2, '2024-01-20');

INSERT INTO customers VALUES
    (1, 'Anna', 'anna@example.com', '555-0101', 'Berlin', 'Germany', '2023-10-01'),
    (2, 'Bruno', 'bruno@example.com', '555-0102', 'Lisbon', 'Portugal', '2023-10-05');

INSERT INTO orders VALUES
    (1, 1, 1, 2, 99.0, '2024-01-15', 'completed'),
    (2, 1, 2, 1, 189.0, '2024-02-03', 'completed'),
    (3, 2, 3, 1, 499.0, '2024-02-10', 'pending'),
    (4, 2, 1, 3, 148.5, '2024-03-21', 'completed'),
    (5, 1, 3, 1, 499.0, '2024-03-22', 'cancelled');
";

async fn setup() -> (tempfile::TempDir, ReportEngine) {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::open(dir.path().join("reports.db"), 4, None).unwrap();
    pool.with_conn(|conn| conn.execute_batch(SEED)).await.unwrap();
    let engine = ReportEngine::new(Arc::new(demo_registry()), pool);
    (dir, engine)
}

fn facets_of(output: ReportOutput) -> Vec<FacetedRows> {
    match output {
        ReportOutput::Faceted(sets) => sets,
        ReportOutput::Rows(_) => panic!("expected faceted output"),
    }
}

#[tokio::test]
async fn facet_without_filter_produces_one_set_per_value() {
    let (_dir, engine) = setup().await;
    let raw: RawReportQuery = serde_json::from_value(json!({
        "columns": ["count."],
        "facets": ["products.category"]
    }))
    .unwrap();

    let sets = facets_of(engine.run("products", &raw).await.unwrap());
    assert_eq!(sets.len(), 2);

    // Ascending by facet value.
    assert_eq!(sets[0].facets[0].column, "products.category");
    assert_eq!(sets[0].facets[0].value, "Furniture");
    assert_eq!(sets[1].facets[0].value, "Lighting");

    assert_eq!(sets[0].rows[0]["count."], json!(2));
    assert_eq!(sets[1].rows[0]["count."], json!(1));
}

#[tokio::test]
async fn facet_combines_with_an_existing_filter() {
    let (_dir, engine) = setup().await;
    let raw: RawReportQuery = serde_json::from_value(json!({
        "columns": ["count."],
        "query": {
            "glue": "and",
            "rules": [
                { "field": "orders.quantity", "condition": { "type": "greater", "filter": 1 } }
            ]
        },
        "facets": ["orders.status"]
    }))
    .unwrap();

    let sets = facets_of(engine.run("orders", &raw).await.unwrap());
    let labels: Vec<&str> = sets.iter().map(|s| s.facets[0].value.as_str()).collect();
    assert_eq!(labels, ["cancelled", "completed", "pending"]);

    // Only the two completed orders have quantity > 1.
    assert_eq!(sets[0].rows[0]["count."], json!(0));
    assert_eq!(sets[1].rows[0]["count."], json!(2));
    assert_eq!(sets[2].rows[0]["count."], json!(0));
}

#[tokio::test]
async fn numeric_facet_values_get_string_labels() {
    let (_dir, engine) = setup().await;
    let raw: RawReportQuery = serde_json::from_value(json!({
        "columns": ["products.name"],
        "facets": ["products.stock"]
    }))
    .unwrap();

    let sets = facets_of(engine.run("products", &raw).await.unwrap());
    let labels: Vec<&str> = sets.iter().map(|s| s.facets[0].value.as_str()).collect();
    assert_eq!(labels, ["2", "4", "12"]);
    assert_eq!(sets[0].rows[0]["products.name"], json!("Standing Desk"));
}

#[tokio::test]
async fn only_the_first_facet_column_is_expanded() {
    let (_dir, engine) = setup().await;
    let raw: RawReportQuery = serde_json::from_value(json!({
        "columns": ["count."],
        "facets": ["products.category", "products.stock"]
    }))
    .unwrap();

    let sets = facets_of(engine.run("products", &raw).await.unwrap());
    assert_eq!(sets.len(), 2);
    for set in &sets {
        assert_eq!(set.facets.len(), 1);
        assert_eq!(set.facets[0].column, "products.category");
    }
}

#[tokio::test]
async fn invalid_facet_tokens_are_rejected() {
    let (_dir, engine) = setup().await;

    let raw: RawReportQuery =
        serde_json::from_value(json!({ "facets": ["payments.region"] })).unwrap();
    let err = engine.run("products", &raw).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Compile(CompileError::UnknownTable(_))
    ));

    let raw: RawReportQuery = serde_json::from_value(json!({ "facets": ["category"] })).unwrap();
    let err = engine.run("products", &raw).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Compile(CompileError::InvalidFieldToken(_))
    ));
}
