use anyhow::Result;
use clap::{Parser, Subcommand};
use radmap_cli::summary;
use radmap_core::config;
use radmap_core::pipeline::{self, PipelineMode};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    info!(config = ?cli.config, threshold = cfg.mapping.threshold, "configuration loaded");

    let (mode, json) = match cli.command {
        Commands::Extract { json } => (PipelineMode::Extract, json),
        Commands::Map { json } => (PipelineMode::Map, json),
        Commands::All { json } => (PipelineMode::All, json),
    };

    let registry = pipeline::build_registry(&cfg);
    let result = pipeline::run_with_mode_summary(&cfg, &registry, mode).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary::to_json(&result))?);
    } else {
        for line in summary::render(&result) {
            println!("{line}");
        }
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "radmap")]
#[command(about = "Extract findings from radiology reports and map them to finding models", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract findings from the configured reports file
    Extract {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Map extracted findings onto the finding model catalog
    Map {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Run extraction followed by mapping
    All {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
}
