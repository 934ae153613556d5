//! # Tally
//!
//! A report-query compiler: declarative report definitions in, safe
//! parameterized SQL out.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          Report Definition (front-end originated)        │
//! │  (source, column tokens, joins, group, sort, filter)     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [decode + normalize]
//! ┌─────────────────────────────────────────────────────────┐
//! │                     ReportQuery                          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compiler: columns, joins, filter]
//! ┌─────────────────────────────────────────────────────────┐
//! │          CompiledQuery (SQL + bound parameters)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [engine + store]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Rows / Faceted result sets (aliased keys)         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The compiler itself is stateless and deterministic; the only shared
//! resources are the immutable schema registry and the bounded store pool.

pub mod catalog;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod store;
pub mod web;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::catalog::{
        demo_registry, FieldDescriptor, FieldType, PicklistOption, Registry, Relationship, Schema,
    };
    pub use crate::compiler::{
        assemble, AggFunc, ColumnRef, CompileError, CompiledQuery, DateBucket, FilterNode,
        JoinSpec, RawReportQuery, ReportQuery, SortKey,
    };
    pub use crate::engine::{EngineError, FacetedRows, ReportEngine, ReportOutput};
    pub use crate::store::{Pool, Row, StoreError};
}

// Also export the core types at crate root for convenience
pub use catalog::Registry;
pub use compiler::{assemble, CompiledQuery, RawReportQuery, ReportQuery};
pub use engine::ReportEngine;
pub use store::Pool;
