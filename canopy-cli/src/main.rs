//! Canopy CLI - forest parcel monitoring from radar and optical satellite data.

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "canopy-cli",
    version,
    about = "Forest parcel vegetation indices, alerts and policy evaluation"
)]
struct Cli {
    #[command(flatten)]
    settings: canopy_cmd::Settings,

    #[command(subcommand)]
    command: canopy_cmd::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    canopy_cmd::run(cli.command, cli.settings).await
}
