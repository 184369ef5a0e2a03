//! Typed query methods over the derived table.
//!
//! # Grouping convention
//!
//! Aggregates group by calendar `(year, month)`. When the filter selects two
//! or more parcels the grouping gains `parcel` as a third key, producing one
//! parallel series per parcel for comparison. Output is always ordered by the
//! grouping keys.

use crate::filter::{parcel_key, Grouping, IndexColumn, QueryFilter};
use crate::models::{AggregateBucket, HealthScore, QueryResult, YearValue};
use crate::Database;
use canopy_data::DerivedRecord;
use rusqlite::{params, params_from_iter, Row};
use std::collections::BTreeMap;

const RECORD_COLUMNS: &str = "parcel, date, year, month, vv_db, vh_db, vv_lin, vh_lin, \
     vh_vv_ratio, rvi, rfdi, red_ref, nir_ref, ndvi, filled, alert";

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<DerivedRecord> {
    Ok(DerivedRecord {
        parcel: row.get(0)?,
        date: row.get(1)?,
        year: row.get(2)?,
        month: row.get(3)?,
        vv_db: row.get(4)?,
        vh_db: row.get(5)?,
        vv_lin: row.get(6)?,
        vh_lin: row.get(7)?,
        vh_vv_ratio: row.get(8)?,
        rvi: row.get(9)?,
        rfdi: row.get(10)?,
        red_ref: row.get(11)?,
        nir_ref: row.get(12)?,
        ndvi: row.get(13)?,
        filled: row.get(14)?,
        alert: row.get(15)?,
    })
}

impl Database {
    /// Get filtered derived rows sorted by date ascending (ties by parcel),
    /// with their alert sum and row count.
    pub fn query_records(&self, filter: &QueryFilter) -> anyhow::Result<QueryResult> {
        let conn = self.lock()?;
        let (where_sql, values) = filter.where_clause();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM derived_records {where_sql} ORDER BY date, parcel"
        ))?;
        let records = stmt
            .query_map(params_from_iter(values.iter()), row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        let alert_count = records.iter().map(|r| i64::from(r.alert)).sum();
        log::info!(
            "[Canopy Debug] query: query_records returned {} records",
            records.len()
        );
        Ok(QueryResult {
            total_record_count: records.len(),
            alert_count,
            records,
        })
    }

    /// Get monthly means of `columns` plus the alert sum.
    ///
    /// Grouping follows [`QueryFilter::grouping`]. An empty `columns` slice
    /// averages `rfdi`.
    pub fn query_aggregate(
        &self,
        filter: &QueryFilter,
        columns: &[IndexColumn],
    ) -> anyhow::Result<Vec<AggregateBucket>> {
        let columns: Vec<IndexColumn> = if columns.is_empty() {
            vec![IndexColumn::Rfdi]
        } else {
            columns.to_vec()
        };
        let grouping = filter.grouping();
        let keys = match grouping {
            Grouping::Single => "year, month",
            Grouping::PerParcel => "year, month, parcel",
        };
        let parcel_select = match grouping {
            Grouping::Single => "NULL",
            Grouping::PerParcel => "parcel",
        };
        let means_sql = columns
            .iter()
            .map(|c| format!("AVG({})", c.as_str()))
            .collect::<Vec<_>>()
            .join(", ");

        let conn = self.lock()?;
        let (where_sql, values) = filter.where_clause();
        let mut stmt = conn.prepare(&format!(
            "SELECT year, month, {parcel_select}, COUNT(*), SUM(alert), {means_sql}
             FROM derived_records
             {where_sql}
             GROUP BY {keys}
             ORDER BY {keys}"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let mut means = BTreeMap::new();
                for (i, column) in columns.iter().enumerate() {
                    means.insert(column.as_str().to_string(), row.get::<_, f64>(5 + i)?);
                }
                Ok(AggregateBucket {
                    year: row.get(0)?,
                    month: row.get(1)?,
                    parcel: row.get(2)?,
                    count: row.get(3)?,
                    alert_sum: Some(row.get(4)?),
                    means,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "[Canopy Debug] query: query_aggregate ({:?}) returned {} buckets",
            grouping,
            rows.len()
        );
        Ok(rows)
    }

    /// Health score for the filter's parcel selection.
    ///
    /// The numerator counts alerts under the full filter; the denominator
    /// counts alerts under the same year/month filter across all parcels.
    pub fn query_health(&self, filter: &QueryFilter) -> anyhow::Result<HealthScore> {
        let alert_count = self.sum_alerts(filter)?;
        let total_alerts_overall = self.sum_alerts(&filter.without_parcels())?;
        let score = HealthScore::from_counts(alert_count, total_alerts_overall);
        log::info!(
            "[Canopy Debug] query: query_health {} of {} alerts, health {:.2}",
            score.alert_count,
            score.total_alerts_overall,
            score.health
        );
        Ok(score)
    }

    fn sum_alerts(&self, filter: &QueryFilter) -> anyhow::Result<i64> {
        let conn = self.lock()?;
        let (where_sql, values) = filter.where_clause();
        let total: i64 = conn.query_row(
            &format!("SELECT COALESCE(SUM(alert), 0) FROM derived_records {where_sql}"),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Monthly mean optical index from the standalone optical table.
    ///
    /// Only the year/month part of the filter applies; optical exports are
    /// usually area-wide rather than per parcel.
    pub fn query_optical_trend(&self, filter: &QueryFilter) -> anyhow::Result<Vec<AggregateBucket>> {
        let conn = self.lock()?;
        let (where_sql, values) = filter.without_parcels().where_clause();
        let mut stmt = conn.prepare(&format!(
            "SELECT year, month, COUNT(*), AVG(ndvi)
             FROM optical_records
             {where_sql}
             GROUP BY year, month
             ORDER BY year, month"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let mut means = BTreeMap::new();
                means.insert(IndexColumn::Ndvi.as_str().to_string(), row.get::<_, f64>(3)?);
                Ok(AggregateBucket {
                    year: row.get(0)?,
                    month: row.get(1)?,
                    parcel: None,
                    count: row.get(2)?,
                    alert_sum: None,
                    means,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "[Canopy Debug] query: query_optical_trend returned {} buckets",
            rows.len()
        );
        Ok(rows)
    }

    /// Yearly mean of `column` for one parcel, ordered by year.
    pub fn query_yearly_index(
        &self,
        parcel: &str,
        column: IndexColumn,
    ) -> anyhow::Result<Vec<YearValue>> {
        let parcel = parcel_key(parcel)?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT year, AVG({}) FROM derived_records
             WHERE parcel = ?1
             GROUP BY year
             ORDER BY year",
            column.as_str()
        ))?;
        let rows = stmt
            .query_map(params![parcel], |row| {
                Ok(YearValue {
                    year: row.get(0)?,
                    value: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        log::info!(
            "[Canopy Debug] query: query_yearly_index({}, {}) returned {} years",
            parcel,
            column,
            rows.len()
        );
        Ok(rows)
    }

    /// Get the distinct parcel ids, alphabetically.
    pub fn query_parcels(&self) -> anyhow::Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT DISTINCT parcel FROM derived_records ORDER BY parcel")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }
}
