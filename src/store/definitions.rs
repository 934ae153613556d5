//! Saved report and query definitions.
//!
//! Definitions are opaque to the compiler: a name plus the designer's
//! serialized state. They live in two metadata tables inside the same
//! database the reports run against, listed most recently updated first.

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Pool, StoreResult};

/// Which definition collection to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    /// Saved report modules.
    Report,
    /// Saved ad hoc queries.
    Query,
}

impl DefinitionKind {
    fn table(&self) -> &'static str {
        match self {
            Self::Report => "modules",
            Self::Query => "queries",
        }
    }

    fn default_name(&self) -> &'static str {
        match self {
            Self::Report => "New Report",
            Self::Query => "New Query",
        }
    }
}

/// A stored definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Definition {
    pub id: i64,
    pub name: String,
    pub text: String,
    pub updated: String,
}

/// CRUD over saved definitions.
#[derive(Clone)]
pub struct DefinitionStore {
    pool: Pool,
}

impl DefinitionStore {
    /// Wrap a pool and make sure both definition tables exist.
    pub async fn open(pool: Pool) -> StoreResult<Self> {
        pool.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS modules (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     name TEXT NOT NULL,
                     text TEXT NOT NULL,
                     updated TEXT NOT NULL DEFAULT (datetime('now'))
                 );
                 CREATE TABLE IF NOT EXISTS queries (
                     id INTEGER PRIMARY KEY AUTOINCREMENT,
                     name TEXT NOT NULL,
                     text TEXT NOT NULL,
                     updated TEXT NOT NULL DEFAULT (datetime('now'))
                 );",
            )
        })
        .await?;
        Ok(Self { pool })
    }

    /// List definitions, most recently updated first.
    pub async fn list(&self, kind: DefinitionKind) -> StoreResult<Vec<Definition>> {
        let sql = format!(
            "SELECT id, name, text, updated FROM {} ORDER BY updated DESC, id DESC",
            kind.table()
        );
        self.pool
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], |row| {
                    Ok(Definition {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        text: row.get(2)?,
                        updated: row.get(3)?,
                    })
                })?;
                rows.collect()
            })
            .await
    }

    /// Create a definition, returning its new id.
    ///
    /// Missing name and body fall back to a placeholder, matching what
    /// report designers expect from a bare "new" action.
    pub async fn create(
        &self,
        kind: DefinitionKind,
        name: Option<String>,
        text: Option<String>,
    ) -> StoreResult<i64> {
        let sql = format!("INSERT INTO {} (name, text) VALUES (?, ?)", kind.table());
        let name = name.unwrap_or_else(|| kind.default_name().to_string());
        let text = text.unwrap_or_else(|| "{}".to_string());
        self.pool
            .with_conn(move |conn| {
                conn.execute(&sql, rusqlite::params![name, text])?;
                Ok(conn.last_insert_rowid())
            })
            .await
    }

    /// Update a definition's name and body, bumping its freshness.
    pub async fn update(
        &self,
        kind: DefinitionKind,
        id: i64,
        name: String,
        text: String,
    ) -> StoreResult<usize> {
        let sql = format!(
            "UPDATE {} SET name = ?, text = ?, updated = datetime('now') WHERE id = ?",
            kind.table()
        );
        self.pool
            .execute(sql, vec![json!(name), json!(text), json!(id)])
            .await
    }

    /// Delete a definition.
    pub async fn delete(&self, kind: DefinitionKind, id: i64) -> StoreResult<usize> {
        let sql = format!("DELETE FROM {} WHERE id = ?", kind.table());
        self.pool.execute(sql, vec![json!(id)]).await
    }
}
