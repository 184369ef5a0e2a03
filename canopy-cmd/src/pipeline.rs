//! Startup pipeline: ingest, clean, derive, load.
//!
//! Runs once before any command. Any failure here is fatal; no partially
//! loaded database is ever handed to a command.

use crate::settings::Settings;
use anyhow::Context;
use canopy_data::{clean, CleanedObservation, FeatureEngine};
use canopy_db::Database;
use canopy_sat::ingest::load_tables;
use log::info;

/// Everything the commands read after startup.
pub struct Pipeline {
    pub db: Database,
    pub cleaned: Vec<CleanedObservation>,
}

pub fn run_startup(settings: &Settings) -> anyhow::Result<Pipeline> {
    let tables = load_tables(&settings.radar_csv, settings.optical_csv.as_deref())
        .with_context(|| {
            format!(
                "failed to load source tables from {}",
                settings.radar_csv.display()
            )
        })?;
    info!(
        "pipeline: {} radar observations, {} optical readings",
        tables.observations.len(),
        tables.optical.len()
    );

    let cleaned = clean(tables.observations);
    let engine = FeatureEngine::new(settings.feature_config());
    let derived = engine.derive(&cleaned);
    let optical = engine.derive_optical(&tables.optical);

    let db = Database::new()?;
    db.load_derived(&derived)?;
    db.load_optical(&optical)?;
    info!(
        "pipeline: loaded {} derived and {} optical records",
        derived.len(),
        optical.len()
    );

    Ok(Pipeline { db, cleaned })
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_db::QueryFilter;
    use clap::Parser;
    use std::path::PathBuf;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: Settings,
    }

    fn settings(radar: &PathBuf, optical: Option<&PathBuf>) -> Settings {
        let mut args = vec![
            "canopy".to_string(),
            "--radar-csv".to_string(),
            radar.display().to_string(),
        ];
        if let Some(optical) = optical {
            args.push("--optical-csv".to_string());
            args.push(optical.display().to_string());
        }
        TestCli::try_parse_from(args).unwrap().settings
    }

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("canopy-{}-{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn startup_loads_derived_and_optical_tables() {
        let radar = write_temp(
            "radar.csv",
            "system:index,forest,date,VV,VH,orbit\n\
             0,Kibwezi,2021-01-05,-7,-14,DESC\n\
             1,Kibwezi,2021-01-17,,-12,DESC\n\
             2,Kibwezi,2021-01-29,-9,-13,DESC\n\
             3,Makongo,2021-01-05,-10,-12,DESC\n",
        );
        let optical = write_temp("optical.csv", "date,B4_mean,B5_mean\n2021-01-05,10000,20000\n");

        let pipeline = run_startup(&settings(&radar, Some(&optical))).unwrap();
        assert_eq!(pipeline.cleaned.len(), 4);
        assert!(pipeline.cleaned[1].filled);

        let all = pipeline.db.query_records(&QueryFilter::all()).unwrap();
        assert_eq!(all.total_record_count, 4);
        // date-only optical row joins every parcel on that date
        let joined = all.records.iter().filter(|r| r.ndvi > 0.0).count();
        assert_eq!(joined, 2);
        assert_eq!(
            pipeline.db.query_optical_trend(&QueryFilter::all()).unwrap().len(),
            1
        );

        std::fs::remove_file(radar).ok();
        std::fs::remove_file(optical).ok();
    }

    #[test]
    fn missing_source_table_is_fatal() {
        let missing = std::env::temp_dir().join("canopy-does-not-exist.csv");
        let err = run_startup(&settings(&missing, None)).err().unwrap();
        assert!(format!("{err:#}").contains("failed to load source tables"));
    }
}
