//! Static catalog of queryable tables.
//!
//! The registry is built once at process start from configuration and is
//! immutable afterwards. It doubles as the allow-list: any table identifier
//! that is not registered here never reaches the compiled SQL. Field
//! identifiers are checked against the owning schema's declared fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Data type of a catalog field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    Text,
    Date,
    /// Foreign key into another schema; `references` names the target.
    Reference,
    /// Value restricted to a picklist; `references` names the picklist.
    Enum,
}

/// A single field declared on a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub id: String,
    pub display_name: String,
    #[serde(default = "default_true")]
    pub filterable: bool,
    #[serde(default)]
    pub editable: bool,
    pub data_type: FieldType,
    /// Referenced schema id (reference fields) or picklist id (enum fields).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
    /// Primary key flag. Join conditions resolve against this field.
    #[serde(default)]
    pub key: bool,
    /// Human-readable label field, used when this table is referenced from
    /// elsewhere. One field per schema should carry this flag; the registry
    /// does not enforce it and uses the first match.
    #[serde(default)]
    pub display: bool,
}

fn default_true() -> bool {
    true
}

/// A foreign-key relationship between two schemas.
///
/// Descriptors are bidirectional in the sense that either side's schema may
/// list the same logical relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: u32,
    pub source: String,
    pub target: String,
    pub display_name: String,
}

/// One queryable table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl Schema {
    /// Look up a declared field by id.
    pub fn field(&self, id: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// The declared key field, falling back to `id`.
    pub fn key_field(&self) -> &str {
        self.fields
            .iter()
            .find(|f| f.key)
            .map(|f| f.id.as_str())
            .unwrap_or("id")
    }

    /// The declared display field, if any.
    pub fn display_field(&self) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.display)
            .map(|f| f.id.as_str())
    }
}

/// A labeled picklist option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicklistOption {
    pub id: String,
    pub value: String,
}

/// Immutable catalog of schemas and picklists.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registry {
    tables: BTreeMap<String, Schema>,
    picklists: BTreeMap<String, Vec<PicklistOption>>,
}

impl Registry {
    /// Build a registry from schema and picklist definitions.
    pub fn new(
        tables: Vec<Schema>,
        picklists: BTreeMap<String, Vec<PicklistOption>>,
    ) -> Self {
        let tables = tables.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self { tables, picklists }
    }

    /// Whether `id` names a registered table.
    pub fn is_allowed(&self, id: &str) -> bool {
        self.tables.contains_key(id)
    }

    /// Look up a schema by table id.
    pub fn get(&self, id: &str) -> Option<&Schema> {
        self.tables.get(id)
    }

    /// All registered schemas, keyed by table id.
    pub fn tables(&self) -> &BTreeMap<String, Schema> {
        &self.tables
    }

    /// Look up a picklist by id.
    pub fn picklist(&self, id: &str) -> Option<&[PicklistOption]> {
        self.picklists.get(id).map(|v| v.as_slice())
    }

    /// Check that a field identifier is safe to emit for `table`.
    ///
    /// When the table has a registered schema the field must be declared on
    /// it; otherwise the field only needs to be a plausible identifier. This
    /// is the membership half of the allow-list invariant: table names are
    /// checked with [`Registry::is_allowed`], field names here, and literal
    /// values never enter query text at all.
    pub fn is_valid_field(&self, table: &str, field: &str) -> bool {
        match self.tables.get(table) {
            Some(schema) => schema.field(field).is_some(),
            None => is_safe_identifier(field),
        }
    }
}

/// Whether `s` looks like a bare SQL identifier.
pub fn is_safe_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The demo catalog: a small order-management data set.
///
/// Used by tests and by `tally serve` when no catalog is configured.
pub fn demo_registry() -> Registry {
    let field = |id: &str, name: &str, ty: FieldType| FieldDescriptor {
        id: id.to_string(),
        display_name: name.to_string(),
        filterable: true,
        editable: false,
        data_type: ty,
        references: None,
        key: false,
        display: false,
    };
    let key = |id: &str, name: &str| FieldDescriptor {
        key: true,
        ..field(id, name, FieldType::Number)
    };
    let label = |id: &str, name: &str| FieldDescriptor {
        display: true,
        ..field(id, name, FieldType::Text)
    };
    let reference = |id: &str, name: &str, target: &str| FieldDescriptor {
        references: Some(target.to_string()),
        ..field(id, name, FieldType::Reference)
    };

    let product_rel = Relationship {
        id: 1,
        source: "orders".to_string(),
        target: "products".to_string(),
        display_name: "Product".to_string(),
    };
    let customer_rel = Relationship {
        id: 2,
        source: "orders".to_string(),
        target: "customers".to_string(),
        display_name: "Customer".to_string(),
    };

    let products = Schema {
        id: "products".to_string(),
        display_name: "Products".to_string(),
        fields: vec![
            key("id", "ID"),
            label("name", "Name"),
            field("price", "Price", FieldType::Number),
            field("category", "Category", FieldType::Text),
            field("stock", "Stock", FieldType::Number),
            field("created_at", "Created", FieldType::Date),
        ],
        relationships: vec![product_rel.clone()],
    };

    let customers = Schema {
        id: "customers".to_string(),
        display_name: "Customers".to_string(),
        fields: vec![
            key("id", "ID"),
            label("name", "Name"),
            field("email", "Email", FieldType::Text),
            field("phone", "Phone", FieldType::Text),
            field("city", "City", FieldType::Text),
            field("country", "Country", FieldType::Text),
            field("created_at", "Created", FieldType::Date),
        ],
        relationships: vec![customer_rel.clone()],
    };

    let orders = Schema {
        id: "orders".to_string(),
        display_name: "Orders".to_string(),
        fields: vec![
            key("id", "ID"),
            reference("customer_id", "Customer", "customers"),
            reference("product_id", "Product", "products"),
            field("quantity", "Quantity", FieldType::Number),
            FieldDescriptor {
                display: true,
                ..field("total_amount", "Total", FieldType::Number)
            },
            field("order_date", "Order Date", FieldType::Date),
            FieldDescriptor {
                references: Some("order_statuses".to_string()),
                ..field("status", "Status", FieldType::Enum)
            },
        ],
        relationships: vec![product_rel, customer_rel],
    };

    let option = |id: &str, value: &str| PicklistOption {
        id: id.to_string(),
        value: value.to_string(),
    };
    let mut picklists = BTreeMap::new();
    picklists.insert(
        "order_statuses".to_string(),
        vec![
            option("pending", "Pending"),
            option("completed", "Completed"),
            option("cancelled", "Cancelled"),
        ],
    );

    Registry::new(vec![products, customers, orders], picklists)
}
