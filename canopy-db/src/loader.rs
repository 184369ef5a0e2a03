//! Bulk loading of pipeline output into the in-memory database.
//!
//! Loading happens once at startup, inside a single transaction per table.
//! Re-loading the same (parcel, date) replaces the earlier row.

use crate::Database;
use canopy_data::{DerivedRecord, OpticalRecord};
use rusqlite::params;

impl Database {
    /// Load derived records into `derived_records`.
    pub fn load_derived(&self, records: &[DerivedRecord]) -> anyhow::Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO derived_records
                 (parcel, date, year, month, vv_db, vh_db, vv_lin, vh_lin,
                  vh_vv_ratio, rvi, rfdi, red_ref, nir_ref, ndvi, filled, alert)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            )?;
            for r in records {
                stmt.execute(params![
                    r.parcel,
                    r.date,
                    r.year,
                    r.month,
                    r.vv_db,
                    r.vh_db,
                    r.vv_lin,
                    r.vh_lin,
                    r.vh_vv_ratio,
                    r.rvi,
                    r.rfdi,
                    r.red_ref,
                    r.nir_ref,
                    r.ndvi,
                    r.filled,
                    r.alert,
                ])?;
            }
        }
        tx.commit()?;
        log::info!("[Canopy Debug] loader: Loaded {} derived records", records.len());
        Ok(())
    }

    /// Load optical-only records into `optical_records`.
    pub fn load_optical(&self, records: &[OpticalRecord]) -> anyhow::Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO optical_records (parcel, date, year, month, red_ref, nir_ref, ndvi)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for r in records {
                stmt.execute(params![
                    r.parcel, r.date, r.year, r.month, r.red_ref, r.nir_ref, r.ndvi,
                ])?;
            }
        }
        tx.commit()?;
        log::info!("[Canopy Debug] loader: Loaded {} optical records", records.len());
        Ok(())
    }
}
