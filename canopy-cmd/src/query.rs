//! Read-only commands over the derived table.

use crate::pipeline::Pipeline;
use anyhow::Context;
use canopy_data::clean::write_csv;
use canopy_db::{IndexColumn, QueryFilter};
use clap::Args;
use log::info;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Filters shared by the query commands.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Comma separated parcel names (default: all parcels)
    #[arg(short = 'p', long)]
    pub parcels: Option<String>,

    /// Calendar year
    #[arg(short = 'y', long)]
    pub year: Option<String>,

    /// Month number, 1-12
    #[arg(short = 'm', long)]
    pub month: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> anyhow::Result<QueryFilter> {
        Ok(QueryFilter::parse(
            self.parcels.as_deref(),
            self.year.as_deref(),
            self.month.as_deref(),
        )?)
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn run_query(pipeline: &Pipeline, args: &FilterArgs) -> anyhow::Result<()> {
    let result = pipeline.db.query_records(&args.to_filter()?)?;
    print_json(&result)
}

pub fn run_aggregate(pipeline: &Pipeline, args: &FilterArgs, columns: &str) -> anyhow::Result<()> {
    let filter = args.to_filter()?;
    let columns = IndexColumn::parse_list(columns)?;
    let buckets = pipeline.db.query_aggregate(&filter, &columns)?;
    print_json(&serde_json::json!({
        "grouping": filter.grouping(),
        "buckets": buckets,
    }))
}

pub fn run_health(pipeline: &Pipeline, args: &FilterArgs) -> anyhow::Result<()> {
    let health = pipeline.db.query_health(&args.to_filter()?)?;
    print_json(&health)
}

pub fn run_optical_trend(pipeline: &Pipeline, args: &FilterArgs) -> anyhow::Result<()> {
    let trend = pipeline.db.query_optical_trend(&args.to_filter()?)?;
    print_json(&trend)
}

pub fn run_parcels(pipeline: &Pipeline) -> anyhow::Result<()> {
    print_json(&pipeline.db.query_parcels()?)
}

/// Write the cleaned, gap-filled observations to `output`.
pub fn run_clean(pipeline: &Pipeline, output: &Path) -> anyhow::Result<()> {
    let file = File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    write_csv(&pipeline.cleaned, BufWriter::new(file))?;
    let filled = pipeline.cleaned.iter().filter(|c| c.filled).count();
    info!(
        "Wrote {} cleaned observations ({} interpolated) to {}",
        pipeline.cleaned.len(),
        filled,
        output.display()
    );
    Ok(())
}
