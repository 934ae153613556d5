//! Filter tree compilation.
//!
//! Filters arrive as nested boolean groups of conditions. Compilation yields
//! a predicate string plus the bound parameter list; literal values only ever
//! travel through parameters, never through the predicate text.
//!
//! Conditions that cannot be compiled (malformed field token, unknown table
//! or field, unrecognized operator) contribute nothing to the predicate but
//! are recorded on the output so callers can surface them. A condition whose
//! value is simply empty is dropped quietly; that is the normal state of a
//! half-filled filter form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::Registry;

/// Boolean combinator joining sibling nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Glue {
    #[default]
    And,
    Or,
}

impl Glue {
    fn sql(&self) -> &'static str {
        match self {
            Glue::And => "AND",
            Glue::Or => "OR",
        }
    }
}

/// A node in the filter tree: either a boolean group or a leaf condition.
///
/// The wire shape distinguishes the two by the presence of `rules`, so the
/// group variant must be tried first when decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Group(FilterGroup),
    Condition(FilterCondition),
}

/// A boolean group of child nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterGroup {
    #[serde(default)]
    pub glue: Glue,
    pub rules: Vec<FilterNode>,
}

/// A leaf condition on a `table.field` token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterCondition {
    #[serde(default)]
    pub field: String,
    /// Multi-select values. When non-empty this compiles to set membership
    /// and `condition` is ignored entirely.
    #[serde(default)]
    pub includes: Vec<Value>,
    #[serde(default)]
    pub condition: ConditionSpec,
}

/// Operator and comparison value for a leaf condition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionSpec {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub filter: Value,
}

/// Comparison operator of a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    NotEqual,
    Contains,
    NotContains,
    BeginsWith,
    EndsWith,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

impl FilterOp {
    /// Parse the operator name used on the wire.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "equal" => Some(Self::Equal),
            "notEqual" => Some(Self::NotEqual),
            "contains" => Some(Self::Contains),
            "notContains" => Some(Self::NotContains),
            "beginsWith" => Some(Self::BeginsWith),
            "endsWith" => Some(Self::EndsWith),
            "greater" => Some(Self::Greater),
            "greaterOrEqual" => Some(Self::GreaterOrEqual),
            "less" => Some(Self::Less),
            "lessOrEqual" => Some(Self::LessOrEqual),
            _ => None,
        }
    }
}

/// A compiled predicate: text with `?` placeholders and the values bound to
/// them, in placeholder order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub text: String,
    pub params: Vec<Value>,
    /// Field tokens of conditions that were dropped because they could not
    /// be compiled.
    pub skipped: Vec<String>,
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Compile a filter tree into a predicate.
///
/// An empty group (or a tree whose conditions all drop out) compiles to an
/// empty predicate with no parameters. Nested groups are parenthesized;
/// siblings are joined by the group's glue.
pub fn compile(registry: &Registry, node: &FilterNode) -> Predicate {
    match node {
        FilterNode::Group(group) => compile_group(registry, group),
        FilterNode::Condition(cond) => {
            let mut out = Predicate::default();
            compile_condition(registry, cond, &mut out);
            out
        }
    }
}

fn compile_group(registry: &Registry, group: &FilterGroup) -> Predicate {
    let mut parts: Vec<String> = Vec::new();
    let mut out = Predicate::default();

    for child in &group.rules {
        match child {
            FilterNode::Group(nested) => {
                let inner = compile_group(registry, nested);
                out.skipped.extend(inner.skipped);
                if !inner.text.is_empty() {
                    parts.push(format!("({})", inner.text));
                    out.params.extend(inner.params);
                }
            }
            FilterNode::Condition(cond) => {
                if let Some(text) = compile_condition(registry, cond, &mut out) {
                    parts.push(text);
                }
            }
        }
    }

    out.text = parts.join(&format!(" {} ", group.glue.sql()));
    out
}

/// Compile one condition, pushing its parameters onto `out`.
///
/// Returns the predicate text, or `None` when the condition contributes
/// nothing.
fn compile_condition(
    registry: &Registry,
    cond: &FilterCondition,
    out: &mut Predicate,
) -> Option<String> {
    let (table, field) = match cond.field.split_once('.') {
        Some((t, f)) if !t.is_empty() && !f.is_empty() && !f.contains('.') => (t, f),
        _ => {
            out.skipped.push(cond.field.clone());
            return None;
        }
    };
    if !registry.is_allowed(table) || !registry.is_valid_field(table, field) {
        out.skipped.push(cond.field.clone());
        return None;
    }

    let column = format!("{}.{}", table, field);

    // Multi-select membership overrides the scalar operator entirely.
    if !cond.includes.is_empty() {
        let placeholders = vec!["?"; cond.includes.len()].join(", ");
        out.params.extend(cond.includes.iter().cloned());
        return Some(format!("{} IN ({})", column, placeholders));
    }

    if is_empty_value(&cond.condition.filter) {
        return None;
    }

    let op = match FilterOp::parse(&cond.condition.kind) {
        Some(op) => op,
        None => {
            out.skipped.push(cond.field.clone());
            return None;
        }
    };

    let value = &cond.condition.filter;
    let (text, param) = match op {
        FilterOp::Equal => (format!("{} = ?", column), value.clone()),
        FilterOp::NotEqual => (format!("{} != ?", column), value.clone()),
        FilterOp::Contains => (
            format!("{} LIKE ?", column),
            Value::String(format!("%{}%", value_text(value))),
        ),
        FilterOp::NotContains => (
            format!("{} NOT LIKE ?", column),
            Value::String(format!("%{}%", value_text(value))),
        ),
        FilterOp::BeginsWith => (
            format!("{} LIKE ?", column),
            Value::String(format!("{}%", value_text(value))),
        ),
        FilterOp::EndsWith => (
            format!("{} LIKE ?", column),
            Value::String(format!("%{}", value_text(value))),
        ),
        FilterOp::Greater => (format!("{} > ?", column), value.clone()),
        FilterOp::GreaterOrEqual => (format!("{} >= ?", column), value.clone()),
        FilterOp::Less => (format!("{} < ?", column), value.clone()),
        FilterOp::LessOrEqual => (format!("{} <= ?", column), value.clone()),
    };

    out.params.push(param);
    Some(text)
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Render a comparison value for use inside a LIKE pattern.
fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
