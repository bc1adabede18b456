// src/memory/mod.rs — Memory manager

pub mod schema;
pub mod store;
pub mod store_server;
pub mod vector;

use rusqlite::Connection;
use std::path::Path;

pub use store::{MemoryRecord, MemorySearchResult, MemoryStats};
pub use store_server::{spawn_store_server, StoreHandle};

/// Central memory manager owning the SQLite connection.
pub struct MemoryManager {
    pub store: store::Store,
}

impl MemoryManager {
    /// Open (or create) the database at the given path. Idempotent:
    /// migrations only apply what is missing.
    pub fn open(path: &Path, vector_dimensions: usize) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        // Run migrations
        schema::run_migrations(&conn)?;

        Ok(Self {
            store: store::Store::new(conn, vector_dimensions),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory(vector_dimensions: usize) -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::run_migrations(&conn)?;
        Ok(Self {
            store: store::Store::new(conn, vector_dimensions),
        })
    }
}
