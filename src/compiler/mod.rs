//! The report-query compiler.
//!
//! Declarative report definitions come in, parameterized SQL goes out:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │   RawReportQuery (wire: tokens, specs, filter tree)  │
//! └──────────────────────────────────────────────────────┘
//!                  │
//!                  ▼ [decode + normalize]
//! ┌──────────────────────────────────────────────────────┐
//! │                 ReportQuery                          │
//! └──────────────────────────────────────────────────────┘
//!                  │
//!                  ▼ [column parse / join resolve / filter compile]
//! ┌──────────────────────────────────────────────────────┐
//! │       CompiledQuery (SQL text + bound params)        │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The compiler is stateless and deterministic: it holds no connection, runs
//! nothing, and compiles identical input to identical output.

pub mod assemble;
pub mod column;
pub mod decode;
pub mod filter;
pub mod join;

pub use assemble::{assemble, CompiledQuery, RawReportQuery, ReportQuery, SortKey};
pub use column::{AggFunc, ColumnRef, DateBucket};
pub use decode::{flexible, DecodeError};
pub use filter::{FilterCondition, FilterGroup, FilterNode, FilterOp, Glue, Predicate};
pub use join::{resolve_joins, Join, JoinSpec};

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Validation errors raised before any SQL is built.
///
/// These reject the request outright; they are distinct from the lenient
/// token skipping recorded in [`CompiledQuery::diagnostics`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum CompileError {
    #[error("unknown data source: {0}")]
    UnknownSource(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("invalid field token '{0}', expected table.field")]
    InvalidFieldToken(String),
}
