//! HTTP serving layer.
//!
//! Exposes the report engine, the catalog, field introspection, and the
//! saved-definition CRUD over a JSON API.

mod server;

pub use server::{router, serve, AppState};
