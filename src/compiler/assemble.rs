//! Query assembly.
//!
//! [`assemble`] takes a normalized [`ReportQuery`] and produces one
//! executable SQL statement plus its bound parameter list. Assembly is a pure
//! function of its inputs: identical requests compile to identical text and
//! parameters.
//!
//! Column, group, and sort tokens that fail to parse or name unregistered
//! identifiers are skipped rather than failing the request; each skip is
//! recorded in [`CompiledQuery::diagnostics`] so degraded output stays
//! observable.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::Registry;
use crate::compiler::column::ColumnRef;
use crate::compiler::decode::flexible;
use crate::compiler::filter::{self, FilterNode};
use crate::compiler::join::{resolve_joins, JoinSpec};
use crate::compiler::CompileError;

/// A report request as it arrives on the wire.
///
/// Every structured field may be a native value or a JSON-encoded string;
/// [`RawReportQuery::normalize`] resolves both through the flexible decode
/// contract. `source` is carried in the URL for HTTP callers and in the body
/// for file-based ones; the HTTP layer overrides it from the path.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReportQuery {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub columns: Value,
    /// The filter tree. `query` is the historical wire name.
    #[serde(default, alias = "query")]
    pub filter: Value,
    #[serde(default, alias = "joinSpecs", alias = "join_specs")]
    pub joins: Value,
    #[serde(default)]
    pub group: Value,
    #[serde(default)]
    pub sort: Value,
    #[serde(default)]
    pub limit: Value,
    #[serde(default)]
    pub facets: Value,
}

/// One sort entry on the wire: either a bare token or `{id, direction}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawSortEntry {
    Token(String),
    Spec {
        #[serde(default)]
        id: String,
        /// `mod` is the historical wire name for the direction.
        #[serde(default, alias = "mod")]
        direction: String,
    },
}

/// A normalized sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub token: String,
    pub descending: bool,
}

/// A fully normalized report request, ready for assembly.
#[derive(Debug, Clone, Default)]
pub struct ReportQuery {
    pub source: String,
    pub columns: Vec<String>,
    pub joins: Vec<JoinSpec>,
    pub group: Vec<String>,
    pub sort: Vec<SortKey>,
    pub limit: Option<u32>,
    pub filter: Option<FilterNode>,
    pub facets: Vec<String>,
}

impl RawReportQuery {
    /// Normalize the raw request.
    ///
    /// Undecodable fields degrade to their empty forms, with one diagnostic
    /// per dropped field; a malformed filter in particular becomes "no
    /// filter" rather than an error.
    pub fn normalize(&self, source: &str) -> (ReportQuery, Vec<String>) {
        let mut diagnostics = Vec::new();

        let columns: Vec<String> =
            decode_field("columns", &self.columns, &mut diagnostics).unwrap_or_default();
        let joins: Vec<JoinSpec> =
            decode_field("joins", &self.joins, &mut diagnostics).unwrap_or_default();
        let group: Vec<String> =
            decode_field("group", &self.group, &mut diagnostics).unwrap_or_default();
        let filter: Option<FilterNode> = decode_field("filter", &self.filter, &mut diagnostics);
        let facets: Vec<String> =
            decode_field("facets", &self.facets, &mut diagnostics).unwrap_or_default();

        let sort: Vec<RawSortEntry> =
            decode_field("sort", &self.sort, &mut diagnostics).unwrap_or_default();
        let sort = sort
            .into_iter()
            .map(|entry: RawSortEntry| match entry {
                RawSortEntry::Token(token) => SortKey {
                    token,
                    descending: false,
                },
                RawSortEntry::Spec { id, direction } => SortKey {
                    token: id,
                    descending: direction.eq_ignore_ascii_case("desc"),
                },
            })
            .collect();

        let limit = match &self.limit {
            Value::Null => None,
            Value::Number(n) => n.as_u64().map(|n| n as u32),
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => s.trim().parse::<u32>().ok(),
            _ => None,
        }
        .filter(|n| *n > 0);

        let query = ReportQuery {
            source: source.to_string(),
            columns,
            joins,
            group,
            sort,
            limit,
            filter,
            facets,
        };
        (query, diagnostics)
    }
}

/// Decode one flexible request field, recording a diagnostic on failure.
fn decode_field<T: serde::de::DeserializeOwned>(
    name: &str,
    value: &Value,
    diagnostics: &mut Vec<String>,
) -> Option<T> {
    match flexible(value) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(format!("dropped undecodable field '{}': {}", name, e));
            None
        }
    }
}

/// A compiled, executable query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    /// Bound parameter values in placeholder order.
    pub params: Vec<Value>,
    /// True when the degenerate `table.*` fallback was used and result rows
    /// must be re-keyed with `table.` prefixes.
    pub star_select: bool,
    /// Tokens and fields that were skipped during compilation.
    pub diagnostics: Vec<String>,
}

/// Compile a report query into SQL plus parameters.
///
/// The clause order is fixed: SELECT, FROM, JOINs, WHERE, GROUP BY,
/// ORDER BY, LIMIT, concatenated with single spaces.
pub fn assemble(registry: &Registry, query: &ReportQuery) -> Result<CompiledQuery, CompileError> {
    if !registry.is_allowed(&query.source) {
        return Err(CompileError::UnknownSource(query.source.clone()));
    }

    let mut diagnostics = Vec::new();
    let joins = resolve_joins(registry, &query.joins, &query.source);

    let mut select_fields: Vec<String> = Vec::new();
    let mut group_by: Vec<String> = Vec::new();
    let mut selected_aliases: HashSet<String> = HashSet::new();

    let grouped = !query.group.is_empty();

    // Grouping tokens first: they own the leading select positions so the
    // output keys line up with the grouping keys.
    for token in &query.group {
        let Some(parsed) = ColumnRef::parse(token, &query.source) else {
            diagnostics.push(format!("skipped group token '{}'", token));
            continue;
        };
        match &parsed {
            ColumnRef::Plain {
                table,
                field,
                alias,
            } => {
                if !valid_column(registry, table, field) {
                    diagnostics.push(format!("skipped group token '{}'", token));
                    continue;
                }
                select_fields.push(format!("{}.{} AS \"{}\"", table, field, alias));
                selected_aliases.insert(alias.clone());
                group_by.push(format!("{}.{}", table, field));
            }
            ColumnRef::DateBucketed {
                bucket,
                table,
                field,
                alias,
            } => {
                if !valid_column(registry, table, field) {
                    diagnostics.push(format!("skipped group token '{}'", token));
                    continue;
                }
                select_fields.push(format!("{} AS \"{}\"", bucket.select_expr(table, field), alias));
                selected_aliases.insert(alias.clone());
                group_by.push(bucket.group_expr(table, field));
            }
            ColumnRef::Aggregate { .. } => {
                // Grouping by an aggregate is never meaningful.
                diagnostics.push(format!("skipped group token '{}'", token));
            }
        }
    }

    for token in &query.columns {
        let Some(parsed) = ColumnRef::parse(token, &query.source) else {
            diagnostics.push(format!("skipped column token '{}'", token));
            continue;
        };
        match &parsed {
            ColumnRef::Aggregate {
                op,
                table,
                field,
                alias,
            } => match field {
                Some(f) => {
                    if !valid_column(registry, table, f) {
                        diagnostics.push(format!("skipped column token '{}'", token));
                        continue;
                    }
                    select_fields.push(format!("{}({}.{}) AS \"{}\"", op.sql(), table, f, alias));
                    selected_aliases.insert(alias.clone());
                }
                None => {
                    select_fields.push(format!("{}(*) AS \"{}\"", op.sql(), alias));
                    selected_aliases.insert(alias.clone());
                }
            },
            ColumnRef::DateBucketed {
                bucket,
                table,
                field,
                alias,
            } => {
                if !valid_column(registry, table, field) {
                    diagnostics.push(format!("skipped column token '{}'", token));
                    continue;
                }
                // Already selected when the same token appears in the
                // grouping list.
                if selected_aliases.insert(alias.clone()) {
                    select_fields
                        .push(format!("{} AS \"{}\"", bucket.select_expr(table, field), alias));
                }
            }
            ColumnRef::Plain {
                table,
                field,
                alias,
            } => {
                // Under grouping, plain output columns come exclusively from
                // the grouping list; repeating them here would produce an
                // inconsistent column list.
                if grouped {
                    continue;
                }
                if !valid_column(registry, table, field) {
                    diagnostics.push(format!("skipped column token '{}'", token));
                    continue;
                }
                select_fields.push(format!("{}.{} AS \"{}\"", table, field, alias));
                selected_aliases.insert(alias.clone());
            }
        }
    }

    // Fallback: no usable columns at all, select the full schema (or the
    // bare star when the source has no registered schema).
    let mut star_select = false;
    if select_fields.is_empty() {
        match registry.get(&query.source) {
            Some(schema) if !schema.fields.is_empty() => {
                for f in &schema.fields {
                    select_fields.push(format!(
                        "{}.{} AS \"{}.{}\"",
                        query.source, f.id, query.source, f.id
                    ));
                }
            }
            _ => {
                select_fields.push(format!("{}.*", query.source));
                star_select = true;
            }
        }
    }

    let predicate = match &query.filter {
        Some(node) => filter::compile(registry, node),
        None => filter::Predicate::default(),
    };
    diagnostics.extend(
        predicate
            .skipped
            .iter()
            .map(|f| format!("skipped filter condition on '{}'", f)),
    );

    let mut order_by: Vec<String> = Vec::new();
    for key in &query.sort {
        let direction = if key.descending { "DESC" } else { "ASC" };
        let Some(parsed) = ColumnRef::parse(&key.token, &query.source) else {
            diagnostics.push(format!("skipped sort token '{}'", key.token));
            continue;
        };
        let entry = match &parsed {
            // Computed columns sort by their output alias.
            ColumnRef::Aggregate {
                table,
                field,
                alias,
                ..
            } => match field {
                Some(f) if !valid_column(registry, table, f) => None,
                _ => Some(format!("\"{}\" {}", alias, direction)),
            },
            ColumnRef::DateBucketed {
                table,
                field,
                alias,
                ..
            } => valid_column(registry, table, field)
                .then(|| format!("\"{}\" {}", alias, direction)),
            ColumnRef::Plain { table, field, .. } => valid_column(registry, table, field)
                .then(|| format!("{}.{} {}", table, field, direction)),
        };
        match entry {
            Some(e) => order_by.push(e),
            None => diagnostics.push(format!("skipped sort token '{}'", key.token)),
        }
    }

    let mut clauses: Vec<String> = Vec::new();
    clauses.push(format!("SELECT {}", select_fields.join(", ")));
    clauses.push(format!("FROM {}", query.source));
    for join in &joins {
        clauses.push(join.to_string());
    }
    if !predicate.is_empty() {
        clauses.push(format!("WHERE {}", predicate.text));
    }
    if !group_by.is_empty() {
        clauses.push(format!("GROUP BY {}", group_by.join(", ")));
    }
    if !order_by.is_empty() {
        clauses.push(format!("ORDER BY {}", order_by.join(", ")));
    }
    if let Some(limit) = query.limit.filter(|n| *n > 0) {
        clauses.push(format!("LIMIT {}", limit));
    }

    Ok(CompiledQuery {
        sql: clauses.join(" "),
        params: predicate.params,
        star_select,
        diagnostics,
    })
}

/// Both halves of the identifier allow-list check.
fn valid_column(registry: &Registry, table: &str, field: &str) -> bool {
    registry.is_allowed(table) && registry.is_valid_field(table, field)
}
