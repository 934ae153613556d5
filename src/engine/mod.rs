//! Report execution.
//!
//! [`ReportEngine`] glues the stateless compiler to the store: it normalizes
//! the raw request, assembles SQL, runs it, and shapes the result. It also
//! serves the field-introspection queries (value options and autocomplete
//! suggestions) that report designers need around the main data path.
//!
//! Failures split two ways: [`EngineError::Compile`] is a validation failure
//! the caller can fix, [`EngineError::Store`] is an execution failure.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::{FieldType, PicklistOption, Registry};
use crate::compiler::filter::{ConditionSpec, FilterCondition, FilterGroup, FilterNode, Glue};
use crate::compiler::{assemble, CompileError, RawReportQuery, ReportQuery};
use crate::store::{Pool, Row, StoreError};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced to the serving layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Request validation failed; the compiler never ran to completion.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The relational store failed while executing a compiled query.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The label attached to one faceted result set.
#[derive(Debug, Clone, Serialize)]
pub struct FacetLabel {
    pub column: String,
    pub value: String,
}

/// One result set of a faceted report.
#[derive(Debug, Serialize)]
pub struct FacetedRows {
    pub rows: Vec<Row>,
    pub facets: Vec<FacetLabel>,
}

/// The outcome of a report request: flat rows, or one labeled result set per
/// facet value.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ReportOutput {
    Rows(Vec<Row>),
    Faceted(Vec<FacetedRows>),
}

/// Compiles and executes report queries against one registry and store.
#[derive(Clone)]
pub struct ReportEngine {
    registry: Arc<Registry>,
    pool: Pool,
}

impl ReportEngine {
    pub fn new(registry: Arc<Registry>, pool: Pool) -> Self {
        Self { registry, pool }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run a raw report request against `source`.
    ///
    /// Faceted requests expand into one query per distinct facet value;
    /// everything else runs as a single query.
    pub async fn run(&self, source: &str, raw: &RawReportQuery) -> EngineResult<ReportOutput> {
        if !self.registry.is_allowed(source) {
            return Err(CompileError::UnknownSource(source.to_string()).into());
        }

        let (query, diagnostics) = raw.normalize(source);
        for d in &diagnostics {
            warn!(source, "{}", d);
        }

        if query.facets.is_empty() {
            Ok(ReportOutput::Rows(self.execute(&query).await?))
        } else {
            Ok(ReportOutput::Faceted(self.expand_facets(&query).await?))
        }
    }

    /// Compile and execute one normalized query.
    async fn execute(&self, query: &ReportQuery) -> EngineResult<Vec<Row>> {
        let compiled = assemble(&self.registry, query)?;
        for d in &compiled.diagnostics {
            warn!(source = %query.source, "{}", d);
        }
        debug!(sql = %compiled.sql, params = ?compiled.params, "executing report query");

        let rows = self
            .pool
            .query(compiled.sql, compiled.params)
            .await?;

        if compiled.star_select {
            // Bare `table.*` output has unqualified column names; re-key so
            // callers always see table.field addressing.
            let source = query.source.clone();
            return Ok(rows
                .into_iter()
                .map(|row| {
                    row.into_iter()
                        .map(|(k, v)| (format!("{}.{}", source, k), v))
                        .collect()
                })
                .collect());
        }

        Ok(rows)
    }

    /// Expand a faceted request: one filtered query per distinct value of
    /// the first facet column, in ascending value order.
    ///
    /// Sub-queries run sequentially; the pool bounds total store pressure
    /// and ordering falls out of the distinct-values query.
    async fn expand_facets(&self, query: &ReportQuery) -> EngineResult<Vec<FacetedRows>> {
        let token = &query.facets[0];
        let (table, field) = self.split_field_token(token)?;

        let distinct_sql = format!(
            "SELECT DISTINCT {t}.{f} AS value FROM {t} WHERE {t}.{f} IS NOT NULL ORDER BY {t}.{f}",
            t = table,
            f = field,
        );
        let values = self.pool.query(distinct_sql, Vec::new()).await?;

        let mut results = Vec::with_capacity(values.len());
        for row in values {
            let value = row.get("value").cloned().unwrap_or(Value::Null);

            let facet_condition = FilterNode::Condition(FilterCondition {
                field: token.clone(),
                includes: Vec::new(),
                condition: ConditionSpec {
                    kind: "equal".to_string(),
                    filter: value.clone(),
                },
            });

            // A real existing filter gets ANDed with the facet equality;
            // otherwise the facet equality stands alone.
            let filter = match &query.filter {
                Some(FilterNode::Group(g)) if !g.rules.is_empty() => {
                    FilterNode::Group(FilterGroup {
                        glue: Glue::And,
                        rules: vec![FilterNode::Group(g.clone()), facet_condition],
                    })
                }
                _ => facet_condition,
            };

            let sub = ReportQuery {
                filter: Some(filter),
                facets: Vec::new(),
                ..query.clone()
            };
            let rows = self.execute(&sub).await?;

            results.push(FacetedRows {
                rows,
                facets: vec![FacetLabel {
                    column: token.clone(),
                    value: display_text(&value),
                }],
            });
        }

        Ok(results)
    }

    /// Value options for a `table.field` token.
    ///
    /// Enum fields resolve from the registry's picklists; reference fields
    /// resolve key/label pairs from the referenced table; anything else
    /// falls back to distinct raw values.
    pub async fn field_options(&self, token: &str) -> EngineResult<Vec<PicklistOption>> {
        let (table, field) = self.split_field_token(token)?;

        if let Some(descriptor) = self.registry.get(&table).and_then(|s| s.field(&field)) {
            match descriptor.data_type {
                FieldType::Enum => {
                    if let Some(options) = descriptor
                        .references
                        .as_deref()
                        .and_then(|id| self.registry.picklist(id))
                    {
                        return Ok(options.to_vec());
                    }
                }
                FieldType::Reference => {
                    if let Some(target) = descriptor
                        .references
                        .as_deref()
                        .and_then(|id| self.registry.get(id))
                    {
                        let key = target.key_field();
                        let label = target.display_field().unwrap_or(key);
                        let sql = format!(
                            "SELECT {key} AS id, {label} AS value FROM {t} ORDER BY {label}",
                            key = key,
                            label = label,
                            t = target.id,
                        );
                        let rows = self.pool.query(sql, Vec::new()).await?;
                        return Ok(rows.into_iter().map(option_from_row).collect());
                    }
                }
                _ => {}
            }
        }

        let sql = format!(
            "SELECT DISTINCT {f} AS id, {f} AS value FROM {t} WHERE {f} IS NOT NULL ORDER BY {f}",
            t = table,
            f = field,
        );
        let rows = self.pool.query(sql, Vec::new()).await?;
        Ok(rows.into_iter().map(option_from_row).collect())
    }

    /// Autocomplete suggestions: up to 100 distinct non-null values,
    /// ascending.
    pub async fn suggest(&self, token: &str) -> EngineResult<Vec<String>> {
        let (table, field) = self.split_field_token(token)?;

        let sql = format!(
            "SELECT DISTINCT {f} AS value FROM {t} WHERE {f} IS NOT NULL ORDER BY {f} LIMIT 100",
            t = table,
            f = field,
        );
        let rows = self.pool.query(sql, Vec::new()).await?;
        Ok(rows
            .iter()
            .map(|row| display_text(row.get("value").unwrap_or(&Value::Null)))
            .collect())
    }

    /// Validate and split a `table.field` token.
    fn split_field_token(&self, token: &str) -> EngineResult<(String, String)> {
        let (table, field) = match token.split_once('.') {
            Some((t, f)) if !t.is_empty() && !f.is_empty() && !f.contains('.') => (t, f),
            _ => return Err(CompileError::InvalidFieldToken(token.to_string()).into()),
        };
        if !self.registry.is_allowed(table) {
            return Err(CompileError::UnknownTable(table.to_string()).into());
        }
        if !self.registry.is_valid_field(table, field) {
            return Err(CompileError::InvalidFieldToken(token.to_string()).into());
        }
        Ok((table.to_string(), field.to_string()))
    }
}

fn option_from_row(row: Row) -> PicklistOption {
    PicklistOption {
        id: display_text(row.get("id").unwrap_or(&Value::Null)),
        value: display_text(row.get("value").unwrap_or(&Value::Null)),
    }
}

/// Human-readable rendering of a store value, used for facet labels and
/// option lists.
fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
