//! CSV ingestion for the radar and optical source tables.
//!
//! Columns are located by header name so exports with extra metadata
//! columns (`system:index`, `.geo`, `orbit`, `relative_orbit`,
//! `image_count`, `interpolated_flag`) load unchanged; those columns are
//! simply never read.

use crate::error::{Result, SatError};
use crate::observation::{Observation, OpticalObservation};
use canopy_utils::dates::parse_date;
use canopy_utils::numbers::{parse_flag, parse_measurement};
use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::HashMap;
use std::path::Path;

/// Parcel identifier column.
pub const PARCEL_COLUMN: &str = "forest";
/// Observation date column.
pub const DATE_COLUMN: &str = "date";
/// Primary (co-polarised) radar channel column, in dB.
pub const PRIMARY_COLUMN: &str = "VV";
/// Secondary (cross-polarised) radar channel column, in dB.
pub const SECONDARY_COLUMN: &str = "VH";
/// Optional source validity flag column.
pub const VALID_COLUMN: &str = "valid";
/// Red band mean digital counts (Landsat B4).
pub const RED_COLUMN: &str = "B4_mean";
/// Near-infrared band mean digital counts (Landsat B5).
pub const NIR_COLUMN: &str = "B5_mean";

/// Both source tables, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct SourceTables {
    pub observations: Vec<Observation>,
    pub optical: Vec<OpticalObservation>,
}

/// Read the radar table and, when given, the optical table from disk.
///
/// Optical readings are attached to the radar observations before
/// returning. Any I/O or structural problem is fatal.
pub fn load_tables(radar_path: &Path, optical_path: Option<&Path>) -> Result<SourceTables> {
    let radar_csv = read_file(radar_path)?;
    let mut observations = parse_radar_csv(&radar_csv)?;

    let optical = match optical_path {
        Some(path) => parse_optical_csv(&read_file(path)?)?,
        None => Vec::new(),
    };
    attach_optical(&mut observations, &optical);

    Ok(SourceTables {
        observations,
        optical,
    })
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| SatError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Parse the radar table.
///
/// Expected format (with headers): `forest,date,VV,VH[,valid]`, in any column
/// order. Rows with an empty parcel or an unparseable date are skipped.
///
/// # Example CSV
/// ```text
/// system:index,forest,date,VV,VH,orbit
/// 0,Kibwezi,2021-01-05,-9.8,-16.2,DESCENDING
/// ```
pub fn parse_radar_csv(csv_data: &str) -> Result<Vec<Observation>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let headers = rdr.headers()?.clone();
    let parcel_idx = require_column(&headers, "radar", PARCEL_COLUMN)?;
    let date_idx = require_column(&headers, "radar", DATE_COLUMN)?;
    let vv_idx = require_column(&headers, "radar", PRIMARY_COLUMN)?;
    let vh_idx = require_column(&headers, "radar", SECONDARY_COLUMN)?;
    let valid_idx = column_index(&headers, VALID_COLUMN);

    let mut observations = Vec::new();
    let mut skipped = 0u32;
    for result in rdr.records() {
        let r = result?;
        let parcel = r.get(parcel_idx).unwrap_or("").trim();
        let date = match parse_row_date(&r, date_idx) {
            Some(d) if !parcel.is_empty() => d,
            _ => {
                skipped += 1;
                continue;
            }
        };

        observations.push(Observation {
            parcel: parcel.to_string(),
            date,
            vv_db: r.get(vv_idx).and_then(parse_measurement),
            vh_db: r.get(vh_idx).and_then(parse_measurement),
            red: None,
            nir: None,
            valid: valid_idx
                .and_then(|i| r.get(i))
                .map_or(true, |s| parse_flag(s, true)),
        });
    }

    if skipped > 0 {
        log::warn!("ingest: skipped {} radar rows without parcel or date", skipped);
    }
    log::info!("ingest: loaded {} radar observations", observations.len());
    Ok(observations)
}

/// Parse the optical table.
///
/// Expected format (with headers): `date,B4_mean,B5_mean[,forest]`.
///
/// # Example CSV
/// ```text
/// date,B4_mean,B5_mean
/// 2021-01-07,9120.5,14310.0
/// ```
pub fn parse_optical_csv(csv_data: &str) -> Result<Vec<OpticalObservation>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes());

    let headers = rdr.headers()?.clone();
    let date_idx = require_column(&headers, "optical", DATE_COLUMN)?;
    let red_idx = require_column(&headers, "optical", RED_COLUMN)?;
    let nir_idx = require_column(&headers, "optical", NIR_COLUMN)?;
    let parcel_idx = column_index(&headers, PARCEL_COLUMN);

    let mut optical = Vec::new();
    let mut skipped = 0u32;
    for result in rdr.records() {
        let r = result?;
        let Some(date) = parse_row_date(&r, date_idx) else {
            skipped += 1;
            continue;
        };
        let parcel = parcel_idx
            .and_then(|i| r.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        optical.push(OpticalObservation {
            parcel,
            date,
            red: r.get(red_idx).and_then(parse_measurement),
            nir: r.get(nir_idx).and_then(parse_measurement),
        });
    }

    if skipped > 0 {
        log::warn!("ingest: skipped {} optical rows without a date", skipped);
    }
    log::info!("ingest: loaded {} optical observations", optical.len());
    Ok(optical)
}

/// Attach optical band values to radar observations.
///
/// Parcel-specific optical rows match on `(parcel, date)`; rows without a
/// parcel match every parcel on `date`. A parcel-specific match takes
/// precedence, and within a key the last optical row wins.
pub fn attach_optical(observations: &mut [Observation], optical: &[OpticalObservation]) {
    if optical.is_empty() {
        return;
    }

    let mut by_parcel: HashMap<(&str, NaiveDate), &OpticalObservation> = HashMap::new();
    let mut by_date: HashMap<NaiveDate, &OpticalObservation> = HashMap::new();
    for row in optical {
        match &row.parcel {
            Some(p) => {
                by_parcel.insert((p.as_str(), row.date), row);
            }
            None => {
                by_date.insert(row.date, row);
            }
        }
    }

    let mut matched = 0usize;
    for obs in observations.iter_mut() {
        let hit = by_parcel
            .get(&(obs.parcel.as_str(), obs.date))
            .or_else(|| by_date.get(&obs.date));
        if let Some(row) = hit {
            obs.red = row.red;
            obs.nir = row.nir;
            matched += 1;
        }
    }
    log::debug!(
        "ingest: attached optical bands to {} of {} observations",
        matched,
        observations.len()
    );
}

fn column_index(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn require_column(headers: &StringRecord, table: &'static str, column: &'static str) -> Result<usize> {
    column_index(headers, column).ok_or(SatError::MissingColumn { table, column })
}

fn parse_row_date(record: &StringRecord, idx: usize) -> Option<NaiveDate> {
    record.get(idx).and_then(|s| parse_date(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RADAR_CSV: &str = "\
system:index,forest,date,VV,VH,orbit,relative_orbit,.geo
0,Kibwezi,2021-01-05,-9.5,-16.0,DESCENDING,79,{}
1,Kibwezi,2021-01-17T00:00:00,,-15.5,DESCENDING,79,{}
2,Makongo,2021-01-05,-8.0,inf,ASCENDING,130,{}
3,,2021-01-05,-8.0,-14.0,ASCENDING,130,{}
4,Makongo,not-a-date,-8.0,-14.0,ASCENDING,130,{}
";

    const OPTICAL_CSV: &str = "\
date,B4_mean,B5_mean,image_count
2021-01-05,9000,15000,3
2021-01-17,9500,,2
";

    #[test]
    fn parse_radar_reads_named_columns() {
        let obs = parse_radar_csv(RADAR_CSV).unwrap();
        assert_eq!(obs.len(), 3, "rows without parcel or date are skipped");
        assert_eq!(obs[0].parcel, "Kibwezi");
        assert_eq!(obs[0].vv_db, Some(-9.5));
        assert_eq!(obs[0].vh_db, Some(-16.0));
        assert!(obs[0].valid);
        assert_eq!(obs[1].date, NaiveDate::from_ymd_opt(2021, 1, 17).unwrap());
        assert_eq!(obs[1].vv_db, None);
        assert_eq!(obs[2].vh_db, Some(f64::INFINITY));
    }

    #[test]
    fn parse_radar_reads_validity_flag() {
        let csv = "forest,date,VV,VH,valid\nA,2021-01-01,-9,-15,0\nA,2021-01-02,-9,-15,1\nA,2021-01-03,-9,-15,\n";
        let obs = parse_radar_csv(csv).unwrap();
        assert!(!obs[0].valid);
        assert!(obs[1].valid);
        assert!(obs[2].valid, "empty flag defaults to valid");
    }

    #[test]
    fn parse_radar_missing_column_is_error() {
        let csv = "forest,date,VV\nA,2021-01-01,-9\n";
        let err = parse_radar_csv(csv).unwrap_err();
        assert!(matches!(
            err,
            SatError::MissingColumn {
                table: "radar",
                column: "VH"
            }
        ));
    }

    #[test]
    fn parse_optical_without_parcel() {
        let optical = parse_optical_csv(OPTICAL_CSV).unwrap();
        assert_eq!(optical.len(), 2);
        assert!(optical[0].parcel.is_none());
        assert_eq!(optical[0].red, Some(9000.0));
        assert_eq!(optical[1].nir, None);
    }

    #[test]
    fn attach_optical_by_date_applies_to_every_parcel() {
        let mut obs = parse_radar_csv(RADAR_CSV).unwrap();
        let optical = parse_optical_csv(OPTICAL_CSV).unwrap();
        attach_optical(&mut obs, &optical);
        // Kibwezi 01-05 and Makongo 01-05 both match the area-wide row
        assert_eq!(obs[0].red, Some(9000.0));
        assert_eq!(obs[2].red, Some(9000.0));
        assert_eq!(obs[1].red, Some(9500.0));
        assert_eq!(obs[1].nir, None);
    }

    #[test]
    fn attach_optical_prefers_parcel_match() {
        let mut obs = parse_radar_csv(RADAR_CSV).unwrap();
        let optical = parse_optical_csv(
            "forest,date,B4_mean,B5_mean\n,2021-01-05,1,2\nMakongo,2021-01-05,7,8\nMakongo,2021-01-05,70,80\n",
        )
        .unwrap();
        attach_optical(&mut obs, &optical);
        assert_eq!(obs[0].red, Some(1.0));
        // last parcel-specific row wins
        assert_eq!(obs[2].red, Some(70.0));
        assert_eq!(obs[2].nir, Some(80.0));
    }

    #[test]
    fn load_tables_missing_file_is_fatal() {
        let err = load_tables(Path::new("/definitely/not/here.csv"), None).unwrap_err();
        assert!(matches!(err, SatError::Io { .. }));
    }
}
