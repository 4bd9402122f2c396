use clap::{Parser, Subcommand, ValueEnum};
use engdb::filename::parse_filename;
use engdb::retrieval::{InventoryCache, MastClient};
use engdb::time::parse_obstime;
use chrono::TimeDelta;
use engdb::{get_mnemonic, EngdbConfig, EngdbError, EngdbResult};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "engdb-cli", version, about = "Query and summarize JWST engineering telemetry")]
struct Cli {
    /// JSON configuration file; environment variables are used otherwise
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatsKind {
    Full,
    Block,
    Daily,
    Timed,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Retrieve one mnemonic and print windowed statistics
    Fetch {
        mnemonic: String,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        #[arg(long, value_enum, default_value = "full")]
        stats: StatsKind,

        #[arg(long, default_value_t = 3600)]
        duration_secs: i64,

        #[arg(long)]
        sigma: Option<f64>,

        /// Export the samples as a two-column table
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// List mnemonics known to the archive
    Inventory {
        #[arg(long)]
        filter: Option<String>,
    },

    /// Show the fields encoded in an exposure file name
    ParseFilename { name: String },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> EngdbResult<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngdbConfig::from_file(path)?,
        None => EngdbConfig::from_env(),
    };
    info!("Using archive at {}", config.base_url);

    match cli.command {
        Command::Fetch {
            mnemonic,
            start,
            end,
            stats,
            duration_secs,
            sigma,
            save,
        } => {
            let client = MastClient::new(&config)?;
            let start = parse_obstime(&start)?;
            let end = parse_obstime(&end)?;
            let sigma = sigma.unwrap_or(config.default_sigma);

            let mut result = get_mnemonic(&client, &mnemonic, start, end).await?;
            match stats {
                StatsKind::Full => result.full_stats(sigma)?,
                StatsKind::Block => result.block_stats(sigma)?,
                StatsKind::Daily => result.daily_stats(sigma)?,
                StatsKind::Timed => result.timed_stats(window_duration(duration_secs)?, sigma)?,
            }

            println!("{}", result);
            println!("unit: {}", result.display_unit());
            let windows = result.stats();
            for i in 0..windows.len() {
                println!(
                    "{}  mean={}  median={}  stdev={:.6}",
                    windows.median_times[i], windows.mean[i], windows.median[i], windows.stdev[i]
                );
            }

            if let Some(path) = save {
                result.save_table(&path)?;
                println!("Saved table to {}", path.display());
            }
        }
        Command::Inventory { filter } => {
            let client = MastClient::new(&config)?;
            let cache = InventoryCache::from_config(&config);
            let inventory = cache.get(&client).await?;

            let entries = match &filter {
                Some(pattern) => inventory.matching(pattern),
                None => inventory.entries().iter().collect(),
            };
            for entry in &entries {
                println!("{:<32} {}", entry.tlm_mnemonic, entry.description);
            }
            println!("{} of {} mnemonics", entries.len(), inventory.len());
        }
        Command::ParseFilename { name } => {
            let props = parse_filename(&name)?;
            println!("{}", serde_json::to_string_pretty(&props)?);
        }
    }

    Ok(())
}

fn window_duration(seconds: i64) -> EngdbResult<TimeDelta> {
    TimeDelta::try_seconds(seconds).ok_or_else(|| {
        EngdbError::validation(format!("Window duration of {} seconds is out of range", seconds))
    })
}
