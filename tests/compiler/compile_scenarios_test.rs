//! Full compile scenarios: wire-shaped request in, exact SQL out.

use serde_json::json;
use tally::catalog::demo_registry;
use tally::compiler::{assemble, RawReportQuery};

#[test]
fn grouped_joined_filtered_report() {
    // Revenue by customer over completed orders.
    let reg = demo_registry();
    let raw: RawReportQuery = serde_json::from_value(json!({
        "columns": ["customers.name", "sum.orders.total_amount"],
        "group": ["customers.name"],
        "joinSpecs": [
            { "sid": "orders", "tid": "customers", "sf": "customer_id" }
        ],
        "query": {
            "glue": "and",
            "rules": [
                { "field": "orders.status", "includes": [], "condition": { "type": "equal", "filter": "completed" } }
            ]
        }
    }))
    .unwrap();

    let (query, diags) = raw.normalize("orders");
    assert!(diags.is_empty());

    let compiled = assemble(&reg, &query).unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT customers.name AS \"customers.name\", \
         SUM(orders.total_amount) AS \"sum.orders.total_amount\" \
         FROM orders \
         LEFT JOIN customers ON orders.customer_id = customers.id \
         WHERE orders.status = ? \
         GROUP BY customers.name"
    );
    assert_eq!(compiled.params, vec![json!("completed")]);
    assert!(compiled.diagnostics.is_empty());
}

#[test]
fn bare_source_selects_every_schema_field() {
    let reg = demo_registry();
    let raw = RawReportQuery::default();
    let (query, _) = raw.normalize("products");

    let compiled = assemble(&reg, &query).unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT products.id AS \"products.id\", products.name AS \"products.name\", \
         products.price AS \"products.price\", products.category AS \"products.category\", \
         products.stock AS \"products.stock\", products.created_at AS \"products.created_at\" \
         FROM products"
    );
}

#[test]
fn monthly_order_counts() {
    let reg = demo_registry();
    let raw: RawReportQuery = serde_json::from_value(json!({
        "columns": ["yearmonth.orders.order_date", "count."],
        "group": ["yearmonth.orders.order_date"],
        "sort": [{ "id": "yearmonth.orders.order_date", "mod": "asc" }]
    }))
    .unwrap();

    let (query, _) = raw.normalize("orders");
    let compiled = assemble(&reg, &query).unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT strftime('%Y-%m', orders.order_date) AS \"yearmonth.orders.order_date\", \
         COUNT(*) AS \"count.\" \
         FROM orders \
         GROUP BY strftime('%Y-%m', orders.order_date) \
         ORDER BY \"yearmonth.orders.order_date\" ASC"
    );
}

#[test]
fn includes_compiles_to_set_membership() {
    let reg = demo_registry();
    let raw: RawReportQuery = serde_json::from_value(json!({
        "columns": ["orders.id", "orders.status"],
        "query": {
            "glue": "and",
            "rules": [
                {
                    "field": "orders.status",
                    "includes": ["pending", "completed"],
                    "condition": { "type": "notEqual", "filter": "cancelled" }
                }
            ]
        }
    }))
    .unwrap();

    let (query, _) = raw.normalize("orders");
    let compiled = assemble(&reg, &query).unwrap();
    assert!(compiled.sql.contains("WHERE orders.status IN (?, ?)"));
    assert_eq!(compiled.params, vec![json!("pending"), json!("completed")]);
    // The scalar operator never leaks through.
    assert!(!compiled.sql.contains("!="));
}

#[test]
fn multi_hop_join_chain() {
    // Source products, hop through orders to customers.
    let reg = demo_registry();
    let raw: RawReportQuery = serde_json::from_value(json!({
        "columns": ["products.name", "customers.city", "sum.orders.quantity"],
        "group": ["products.name", "customers.city"],
        "joinSpecs": [
            { "sid": "orders", "tid": "products", "tf": "product_id" },
            { "sid": "orders", "tid": "customers", "sf": "customer_id" }
        ]
    }))
    .unwrap();

    let (query, _) = raw.normalize("products");
    let compiled = assemble(&reg, &query).unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT products.name AS \"products.name\", customers.city AS \"customers.city\", \
         SUM(orders.quantity) AS \"sum.orders.quantity\" \
         FROM products \
         LEFT JOIN orders ON orders.product_id = products.id \
         LEFT JOIN customers ON orders.customer_id = customers.id \
         GROUP BY products.name, customers.city"
    );
}
