mod config;
mod data;
mod manager;

use crate::manager::{Manager, Overrides, Trim};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cptprofile::engine::ModelChoice;
use cptprofile::tables::Quantile;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about)]
struct CLI {
    #[arg(long)]
    project_dir: PathBuf,

    /// Upper bound quantile in percent, overrides the config file.
    #[arg(long)]
    quantile: Option<u32>,

    /// Outlier model (dependent, independent or auto), overrides the config file.
    #[arg(long)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Profile,

    Query {
        #[arg(long)]
        borehole: String,

        #[arg(long)]
        channel: String,

        #[arg(long)]
        depth: f64,

        #[arg(long)]
        drop_above: Option<f64>,

        #[arg(long)]
        drop_below: Option<f64>,

        #[arg(long)]
        remove: Vec<f64>,
    },

    Clean,
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_cli() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let args = CLI::parse();
    log::info!("{args:#?}");

    let overrides = Overrides {
        quantile: args
            .quantile
            .map(Quantile::new)
            .transpose()
            .context("invalid quantile")?,
        model: args
            .model
            .as_deref()
            .map(str::parse::<ModelChoice>)
            .transpose()
            .context("invalid model")?,
    };

    let mgr = Manager::new(args.project_dir, overrides).context("failed to construct mgr")?;

    match args.command {
        Command::Profile => mgr.profile_project()?,
        Command::Query {
            borehole,
            channel,
            depth,
            drop_above,
            drop_below,
            remove,
        } => {
            let trim = Trim {
                drop_above,
                drop_below,
                remove,
            };
            mgr.query_depth(&borehole, &channel, depth, &trim)?
        }
        Command::Clean => mgr.clean_project()?,
    }

    Ok(())
}
