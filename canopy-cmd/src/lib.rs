//! Command implementations for the canopy CLI.
//!
//! Every command first runs the startup pipeline (ingest, clean, derive,
//! load) and then reads the in-memory tables. Results print as JSON.

use clap::Subcommand;
use std::path::PathBuf;

pub mod evaluate;
pub mod pipeline;
pub mod query;
pub mod settings;

pub use settings::Settings;

use query::FilterArgs;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List filtered derived records sorted by date
    Query {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Monthly means of index columns plus alert sums
    Aggregate {
        #[command(flatten)]
        filter: FilterArgs,

        /// Comma separated index columns (vh_vv_ratio, rvi, rfdi, ndvi, vv_lin, vh_lin)
        #[arg(short = 'c', long, default_value = "rfdi")]
        columns: String,
    },

    /// Alert-normalised health score of a parcel selection
    Health {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Monthly mean optical index from the optical table (parcel filter ignored)
    OpticalTrend {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// List known parcels
    Parcels,

    /// Write the cleaned, gap-filled radar table as CSV
    Clean {
        /// Output path for the cleaned CSV
        #[arg(short = 'o', long)]
        output: PathBuf,
    },

    /// Policy evaluation for one or more parcels (cached per parcel)
    Evaluate {
        /// Comma separated parcel names
        #[arg(short = 'p', long)]
        parcels: String,
    },

    /// Predict the economic value for an index value via regression
    Predict {
        #[arg(short = 'p', long)]
        parcel: String,

        /// Index value to predict from
        #[arg(short = 'v', long, allow_hyphen_values = true)]
        value: f64,
    },
}

pub async fn run(command: Command, settings: Settings) -> anyhow::Result<()> {
    let pipeline = pipeline::run_startup(&settings)?;

    match command {
        Command::Query { filter } => query::run_query(&pipeline, &filter),
        Command::Aggregate { filter, columns } => {
            query::run_aggregate(&pipeline, &filter, &columns)
        }
        Command::Health { filter } => query::run_health(&pipeline, &filter),
        Command::OpticalTrend { filter } => query::run_optical_trend(&pipeline, &filter),
        Command::Parcels => query::run_parcels(&pipeline),
        Command::Clean { output } => query::run_clean(&pipeline, &output),
        Command::Evaluate { parcels } => {
            evaluate::run_evaluate(&pipeline, &settings, &parcels).await
        }
        Command::Predict { parcel, value } => {
            evaluate::run_predict(&pipeline, &settings, &parcel, value).await
        }
    }
}
