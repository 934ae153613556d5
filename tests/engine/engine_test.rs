//! Store-backed engine tests: compile, execute, and shape real rows.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tally::catalog::{demo_registry, Registry, Schema};
use tally::compiler::{CompileError, RawReportQuery};
use tally::engine::{EngineError, ReportEngine, ReportOutput};
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

fn rows_of(output: ReportOutput) -> Vec<tally::store::Row> {
    match output {
        ReportOutput::Rows(rows) => rows,
        ReportOutput::Faceted(_) => panic!("expected flat rows"),
    }
}

#[tokio::test]
async fn grouped_joined_filtered_report_returns_aliased_rows() {
    let (_dir, engine) = setup().await;
    let raw: RawReportQuery = serde_json::from_value(json!({
        "columns": ["customers.name", "sum.orders.total_amount"],
        "group": ["customers.name"],
        "joinSpecs": [{ "sid": "orders", "tid": "customers", "sf": "customer_id" }],
        "query": {
            "glue": "and",
            "rules": [
                { "field": "orders.status", "condition": { "type": "equal", "filter": "completed" } }
            ]
        },
        "sort": [{ "id": "customers.name", "direction": "asc" }]
    }))
    .unwrap();

    let rows = rows_of(engine.run("orders", &raw).await.unwrap());
    assert_eq!(rows.len(), 2);

    let keys: Vec<&String> = rows[0].keys().collect();
    assert_eq!(keys, ["customers.name", "sum.orders.total_amount"]);

    assert_eq!(rows[0]["customers.name"], json!("Anna"));
    assert_eq!(rows[0]["sum.orders.total_amount"], json!(288.0));
    assert_eq!(rows[1]["customers.name"], json!("Bruno"));
    assert_eq!(rows[1]["sum.orders.total_amount"], json!(148.5));
}

#[tokio::test]
async fn bare_source_returns_every_schema_field() {
    let (_dir, engine) = setup().await;
    let rows = rows_of(
        engine
            .run("products", &RawReportQuery::default())
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 3);

    let keys: Vec<&String> = rows[0].keys().collect();
    assert_eq!(
        keys,
        [
            "products.id",
            "products.name",
            "products.price",
            "products.category",
            "products.stock",
            "products.created_at",
        ]
    );
}

#[tokio::test]
async fn fieldless_schema_falls_back_to_star_with_rekeying() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Pool::open(dir.path().join("reports.db"), 2, None).unwrap();
    pool.with_conn(|conn| {
        conn.execute_batch(
            "CREATE TABLE events (id INTEGER PRIMARY KEY, kind TEXT);
             INSERT INTO events VALUES (1, 'signup'), (2, 'login');",
        )
    })
    .await
    .unwrap();

    let registry = Registry::new(
        vec![Schema {
            id: "events".to_string(),
            display_name: "Events".to_string(),
            fields: Vec::new(),
            relationships: Vec::new(),
        }],
        BTreeMap::new(),
    );
    let engine = ReportEngine::new(Arc::new(registry), pool);

    let rows = rows_of(
        engine
            .run("events", &RawReportQuery::default())
            .await
            .unwrap(),
    );
    assert_eq!(rows.len(), 2);
    let keys: Vec<&String> = rows[0].keys().collect();
    assert_eq!(keys, ["events.id", "events.kind"]);
}

#[tokio::test]
async fn sort_and_limit_apply_end_to_end() {
    let (_dir, engine) = setup().await;
    let raw: RawReportQuery = serde_json::from_value(json!({
        "columns": ["products.name", "products.price"],
        "sort": [{ "id": "products.price", "mod": "desc" }],
        "limit": 2
    }))
    .unwrap();

    let rows = rows_of(engine.run("products", &raw).await.unwrap());
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["products.name"], json!("Standing Desk"));
    assert_eq!(rows[1]["products.name"], json!("Office Chair"));
}

#[tokio::test]
async fn unknown_source_is_a_validation_error() {
    let (_dir, engine) = setup().await;
    let err = engine
        .run("payments", &RawReportQuery::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Compile(CompileError::UnknownSource(_))
    ));
}

// ============================================================================
// Field options & suggestions
// ============================================================================

#[tokio::test]
async fn enum_field_options_come_from_the_picklist() {
    let (_dir, engine) = setup().await;
    let options = engine.field_options("orders.status").await.unwrap();
    let ids: Vec<&str> = options.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, ["pending", "completed", "cancelled"]);
    assert_eq!(options[1].value, "Completed");
}

#[tokio::test]
async fn reference_field_options_resolve_key_and_label() {
    let (_dir, engine) = setup().await;
    let options = engine.field_options("orders.customer_id").await.unwrap();
    assert_eq!(options.len(), 2);
    assert_eq!(options[0].id, "1");
    assert_eq!(options[0].value, "Anna");
    assert_eq!(options[1].id, "2");
    assert_eq!(options[1].value, "Bruno");
}

#[tokio::test]
async fn plain_field_options_are_distinct_values() {
    let (_dir, engine) = setup().await;
    let options = engine.field_options("products.category").await.unwrap();
    let values: Vec<&str> = options.iter().map(|o| o.value.as_str()).collect();
    assert_eq!(values, ["Furniture", "Lighting"]);
}

#[tokio::test]
async fn suggestions_are_distinct_and_ascending() {
    let (_dir, engine) = setup().await;
    let values = engine.suggest("customers.city").await.unwrap();
    assert_eq!(values, ["Berlin", "Lisbon"]);

    let statuses = engine.suggest("orders.status").await.unwrap();
    assert_eq!(statuses, ["cancelled", "completed", "pending"]);
}

#[tokio::test]
async fn malformed_field_tokens_are_rejected() {
    let (_dir, engine) = setup().await;

    let err = engine.field_options("status").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Compile(CompileError::InvalidFieldToken(_))
    ));

    let err = engine.field_options("payments.amount").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Compile(CompileError::UnknownTable(_))
    ));

    let err = engine.suggest("orders.no_such_field").await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Compile(CompileError::InvalidFieldToken(_))
    ));
}
