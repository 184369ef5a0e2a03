//! In-memory SQLite query layer for derived parcel records.
//!
//! The startup pipeline loads [`DerivedRecord`](canopy_data::DerivedRecord)s
//! (and optional optical-only records) once; after that the tables are only
//! read. Every query method takes `&self`, and the connection sits behind a
//! mutex so a [`Database`] can be cloned into concurrent request handlers.
//!
//! # Usage
//!
//! ```rust
//! use canopy_db::{Database, QueryFilter};
//!
//! let db = Database::new().unwrap();
//! db.load_derived(&[]).unwrap();
//!
//! let filter = QueryFilter::parse(Some("Kibwezi,Makongo"), Some("2021"), None).unwrap();
//! let rows = db.query_records(&filter).unwrap();
//! let health = db.query_health(&filter).unwrap();
//! assert_eq!(rows.total_record_count, 0);
//! assert_eq!(health.health, 100.0);
//! ```
//!
//! # Tables
//!
//! See [`schema::create_schema`] for the full SQL schema.
//!
//! - `derived_records` - one row per cleaned (parcel, date) with every index
//! - `optical_records` - standalone optical readings with their index
//!
//! Monthly summaries are derived on-the-fly via `GROUP BY year, month`
//! (plus `parcel` for multi-parcel comparisons).

pub mod filter;
mod loader;
pub mod models;
mod queries;
pub mod schema;

pub use filter::{Grouping, IndexColumn, InputError, QueryFilter};
pub use models::{AggregateBucket, HealthScore, QueryResult, YearValue};

use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory SQLite database holding the derived table.
///
/// Cheaply cloneable; clones share the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Create a new in-memory database with the full schema applied.
    ///
    /// The database is empty after creation; use the `load_*` methods
    /// to populate it.
    pub fn new() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::create_schema())?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection lock poisoned"))
    }
}
