//! Join resolution from relationship descriptors.
//!
//! Callers send flat join specs describing foreign-key relationships; which
//! table actually gets joined depends on where the request's source table
//! sits in the descriptor. All joins are emitted as LEFT JOINs so source rows
//! without a matching related row survive.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::catalog::Registry;

/// A relationship descriptor as sent by the caller.
///
/// At least one of `source_field`/`target_field` must be present to derive a
/// join condition. The short aliases match the wire format used by report
/// front ends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinSpec {
    #[serde(default, alias = "sid")]
    pub source: String,
    #[serde(default, alias = "tid")]
    pub target: String,
    /// Foreign-key field declared on the source side.
    #[serde(default, alias = "sf", skip_serializing_if = "Option::is_none")]
    pub source_field: Option<String>,
    /// Foreign-key field declared on the target side.
    #[serde(default, alias = "tf", skip_serializing_if = "Option::is_none")]
    pub target_field: Option<String>,
}

/// A resolved join: the table to add and its ON condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    pub condition: String,
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LEFT JOIN {} ON {}", self.table, self.condition)
    }
}

/// Which of the spec's two fields to try first when both are present.
#[derive(Clone, Copy)]
enum Preference {
    TargetField,
    SourceField,
}

/// Resolve the ordered, de-duplicated join list for `source`.
///
/// Each spec is classified by which side equals the source table:
///
/// 1. target == source: reverse relation, join the spec's source side,
///    preferring the foreign key declared on the side being joined.
/// 2. source == source: forward relation, join the spec's target side.
/// 3. neither side matches: chained relation (the spec hangs off an earlier
///    join rather than the root), join the target side with the condition
///    built against the spec's own source.
/// 4. both sides match: self-join, skipped (no alias mechanism).
///
/// Specs naming unregistered tables, or carrying no usable field, contribute
/// nothing. A table is joined at most once; the first spec that reaches it
/// wins.
pub fn resolve_joins(registry: &Registry, specs: &[JoinSpec], source: &str) -> Vec<Join> {
    let mut joins = Vec::new();
    let mut joined: HashSet<String> = HashSet::new();

    for spec in specs {
        let sid = spec.source.as_str();
        let tid = spec.target.as_str();

        let resolved = if tid == source && sid != source {
            derive(registry, sid, source, spec, Preference::TargetField)
        } else if sid == source && tid != source {
            derive(registry, tid, source, spec, Preference::SourceField)
        } else if sid != source && tid != source {
            // The chained anchor table is emitted into the condition, so it
            // must be registered too.
            if registry.is_allowed(sid) {
                derive(registry, tid, sid, spec, Preference::SourceField)
            } else {
                None
            }
        } else {
            // Self-join; skip.
            None
        };

        if let Some(join) = resolved {
            if joined.insert(join.table.clone()) {
                joins.push(join);
            }
        }
    }

    joins
}

/// Build the join for `join_table` against `anchor`.
///
/// The target field is the foreign key on the joined table pointing back at
/// the anchor (`join_table.tf = anchor.<key>`); the source field is the
/// foreign key on the anchor pointing at the joined table
/// (`anchor.sf = join_table.<key>`). Fields that are not declared on their
/// owning schema are ignored.
fn derive(
    registry: &Registry,
    join_table: &str,
    anchor: &str,
    spec: &JoinSpec,
    preference: Preference,
) -> Option<Join> {
    if !registry.is_allowed(join_table) {
        return None;
    }

    let tf = spec
        .target_field
        .as_deref()
        .filter(|f| registry.is_valid_field(join_table, f));
    let sf = spec
        .source_field
        .as_deref()
        .filter(|f| registry.is_valid_field(anchor, f));

    let by_tf =
        |f: &str| format!("{}.{} = {}.{}", join_table, f, anchor, key_of(registry, anchor));
    let by_sf =
        |f: &str| format!("{}.{} = {}.{}", anchor, f, join_table, key_of(registry, join_table));

    let condition = match preference {
        Preference::TargetField => tf.map(by_tf).or_else(|| sf.map(by_sf)),
        Preference::SourceField => sf.map(by_sf).or_else(|| tf.map(by_tf)),
    }?;

    Some(Join {
        table: join_table.to_string(),
        condition,
    })
}

fn key_of<'a>(registry: &'a Registry, table: &str) -> &'a str {
    registry.get(table).map(|s| s.key_field()).unwrap_or("id")
}
