//! Column token parsing.
//!
//! Report definitions address columns with dotted string tokens:
//!
//! ```text
//! "products.name"             plain column
//! "sum.orders.total_amount"   aggregated column
//! "count."                    COUNT(*) against the request's source table
//! "year.orders.order_date"    date-bucketed column
//! ```
//!
//! Parsing turns a token into a tagged [`ColumnRef`]; anything that does not
//! match the grammar is `None` and the caller skips it. A partially-formed
//! reference is never produced.

use std::fmt;

/// Aggregation function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Sum,
    Avg,
    Count,
    Min,
    Max,
}

impl AggFunc {
    /// Parse a function name as it appears in a column token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sum" => Some(Self::Sum),
            "avg" => Some(Self::Avg),
            "count" => Some(Self::Count),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    /// SQL function name.
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Count => "COUNT",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }
}

/// Date bucketing function, reducing a date field to a coarser grouping key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBucket {
    Year,
    Month,
    YearMonth,
    Day,
}

impl DateBucket {
    /// Parse a bucket name as it appears in a column token.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "year" => Some(Self::Year),
            "month" => Some(Self::Month),
            "yearmonth" => Some(Self::YearMonth),
            "day" => Some(Self::Day),
            _ => None,
        }
    }

    /// The SELECT expression for this bucket over `table.field`.
    ///
    /// The identical expression is used for grouping so that SELECT and
    /// GROUP BY stay consistent under relational grouping rules.
    pub fn select_expr(&self, table: &str, field: &str) -> String {
        match self {
            Self::Year => format!("CAST(strftime('%Y', {table}.{field}) AS INTEGER)"),
            Self::Month => format!("CAST(strftime('%m', {table}.{field}) AS INTEGER)"),
            Self::YearMonth => format!("strftime('%Y-%m', {table}.{field})"),
            Self::Day => format!("CAST(strftime('%d', {table}.{field}) AS INTEGER)"),
        }
    }

    /// The GROUP BY expression for this bucket over `table.field`.
    pub fn group_expr(&self, table: &str, field: &str) -> String {
        self.select_expr(table, field)
    }
}

/// A parsed column reference.
///
/// Every variant carries the original token as its `alias`; selected output
/// columns are labeled with it and sort clauses refer back to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    Plain {
        table: String,
        field: String,
        alias: String,
    },
    Aggregate {
        op: AggFunc,
        table: String,
        /// `None` is the `*` form, e.g. `COUNT(*)`.
        field: Option<String>,
        alias: String,
    },
    DateBucketed {
        bucket: DateBucket,
        table: String,
        field: String,
        alias: String,
    },
}

impl ColumnRef {
    /// Parse a column token.
    ///
    /// `default_table` is the request's source table; it anchors the
    /// no-column aggregate forms (`count.`, bare `count`).
    pub fn parse(token: &str, default_table: &str) -> Option<Self> {
        let parts: Vec<&str> = token.split('.').collect();

        match parts.as_slice() {
            [prefix, table, field] => {
                if let Some(op) = AggFunc::parse(prefix) {
                    return Some(Self::Aggregate {
                        op,
                        table: (*table).to_string(),
                        field: Some((*field).to_string()),
                        alias: token.to_string(),
                    });
                }
                if let Some(bucket) = DateBucket::parse(prefix) {
                    return Some(Self::DateBucketed {
                        bucket,
                        table: (*table).to_string(),
                        field: (*field).to_string(),
                        alias: token.to_string(),
                    });
                }
                None
            }
            [prefix, rest] => {
                // `count.` is COUNT(*) against the source table; everything
                // else with one dot is a plain table.field reference.
                if let Some(op) = AggFunc::parse(prefix) {
                    if rest.is_empty() {
                        return Some(Self::Aggregate {
                            op,
                            table: default_table.to_string(),
                            field: None,
                            alias: token.to_string(),
                        });
                    }
                }
                Some(Self::Plain {
                    table: (*prefix).to_string(),
                    field: (*rest).to_string(),
                    alias: token.to_string(),
                })
            }
            [single] => AggFunc::parse(single).map(|op| Self::Aggregate {
                op,
                table: default_table.to_string(),
                field: None,
                alias: token.to_string(),
            }),
            _ => None,
        }
    }

    /// The original token, used to label output columns.
    pub fn alias(&self) -> &str {
        match self {
            Self::Plain { alias, .. }
            | Self::Aggregate { alias, .. }
            | Self::DateBucketed { alias, .. } => alias,
        }
    }

    /// The table this reference addresses.
    pub fn table(&self) -> &str {
        match self {
            Self::Plain { table, .. }
            | Self::Aggregate { table, .. }
            | Self::DateBucketed { table, .. } => table,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alias())
    }
}
