//! SQL schema definitions for the in-memory SQLite database.

/// Returns the full SQL schema as a single batch string.
///
/// - `derived_records` - cleaned observations with every derived column,
///   keyed by (parcel, date). Dates are stored as `YYYY-MM-DD` text so
///   lexical order is chronological.
/// - `optical_records` - optical-only readings; `parcel` is NULL when the
///   source did not name one.
pub fn create_schema() -> &'static str {
    r#"
    CREATE TABLE IF NOT EXISTS derived_records (
        parcel TEXT NOT NULL,
        date TEXT NOT NULL,
        year INTEGER NOT NULL,
        month INTEGER NOT NULL,
        vv_db REAL NOT NULL,
        vh_db REAL NOT NULL,
        vv_lin REAL NOT NULL,
        vh_lin REAL NOT NULL,
        vh_vv_ratio REAL NOT NULL,
        rvi REAL NOT NULL,
        rfdi REAL NOT NULL,
        red_ref REAL NOT NULL,
        nir_ref REAL NOT NULL,
        ndvi REAL NOT NULL,
        filled INTEGER NOT NULL,
        alert INTEGER NOT NULL,
        PRIMARY KEY (parcel, date)
    );
    CREATE INDEX IF NOT EXISTS idx_derived_parcel ON derived_records(parcel);
    CREATE INDEX IF NOT EXISTS idx_derived_year_month ON derived_records(year, month);

    CREATE TABLE IF NOT EXISTS optical_records (
        parcel TEXT,
        date TEXT NOT NULL,
        year INTEGER NOT NULL,
        month INTEGER NOT NULL,
        red_ref REAL NOT NULL,
        nir_ref REAL NOT NULL,
        ndvi REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_optical_year_month ON optical_records(year, month);
    "#
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn schema_is_valid_sql() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(create_schema())
            .expect("Schema SQL should be valid");
    }

    #[test]
    fn schema_creates_all_tables_and_indexes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(create_schema()).unwrap();

        for (kind, name) in [
            ("table", "derived_records"),
            ("table", "optical_records"),
            ("index", "idx_derived_parcel"),
            ("index", "idx_derived_year_month"),
            ("index", "idx_optical_year_month"),
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
                    [kind, name],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "{} '{}' should exist", kind, name);
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(create_schema()).unwrap();
        conn.execute_batch(create_schema())
            .expect("Applying schema twice should succeed due to IF NOT EXISTS");
    }
}
