//! Nuggetizer CLI: batch nugget creation, scoring, assignment and metrics.
//!
//! Commands:
//! - `create`: extract and score nuggets for each query record
//! - `score`: label existing nuggets vital/okay
//! - `assign`: label nuggets against an answer or candidate passages
//! - `metrics`: per-query and global recall over assigned records

use clap::{Args, Parser, Subcommand};
use nuggetizer_config::{ConfigError, NuggetizerConfig};
use nuggetizer_pipeline::Nuggetizer;
use std::path::PathBuf;

mod batch;
mod commands;
mod records;

use batch::BatchArgs;

#[derive(Parser)]
#[command(
    name = "nuggetizer",
    about = "Nuggetizer: LLM nugget creation, scoring and assignment",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Logging level: 0=warnings only, 1=info, 2=debug
    #[arg(
        long,
        alias = "log_level",
        global = true,
        value_parser = clap::value_parser!(u8).range(0..=2)
    )]
    log_level: Option<u8>,

    #[command(flatten)]
    settings: Settings,
}

/// Configuration source plus command-line overrides.
#[derive(Args)]
struct Settings {
    /// Path to config.toml (default: ~/.nuggetizer/config.toml)
    #[arg(short, long, global = true, env = "NUGGETIZER_CONFIG")]
    config: Option<PathBuf>,

    /// Model for every stage
    #[arg(long, global = true)]
    model: Option<String>,

    /// Window size for every stage
    #[arg(long, alias = "window_size", global = true)]
    window_size: Option<usize>,

    /// Nugget cap for creation and scoring
    #[arg(long, alias = "max_nuggets", global = true)]
    max_nuggets: Option<usize>,

    /// Do not attach provenance traces to output nuggets
    #[arg(long, alias = "no_trace", global = true)]
    no_trace: bool,
}

impl Settings {
    fn load(&self) -> Result<NuggetizerConfig, ConfigError> {
        let mut config = NuggetizerConfig::load(self.config.as_deref())?;
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
        if self.window_size.is_some() {
            config.window_size = self.window_size;
        }
        if self.max_nuggets.is_some() {
            config.max_nuggets = self.max_nuggets;
        }
        if self.no_trace {
            config.store_trace = false;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and score nuggets from judged candidate documents
    Create {
        #[command(flatten)]
        io: BatchArgs,

        /// Also write the nugget list after every window
        #[arg(long, alias = "store_trajectory")]
        store_trajectory: bool,
    },

    /// Label nuggets vital or okay
    Score {
        #[command(flatten)]
        io: BatchArgs,
    },

    /// Label nuggets against an answer text or candidate passages
    Assign {
        #[command(flatten)]
        io: BatchArgs,
    },

    /// Compute recall metrics over assigned records
    Metrics {
        /// Path to input JSONL file
        #[arg(long, alias = "input_file")]
        input_file: PathBuf,

        /// Path to output JSONL file (default: stdout)
        #[arg(long, alias = "output_file")]
        output_file: Option<PathBuf>,
    },
}

impl Cli {
    fn log_filter(&self) -> &'static str {
        if self.verbose {
            return "debug";
        }
        match self.log_level {
            Some(0) => "warn",
            Some(2) => "debug",
            _ => "info",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_filter())),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.settings.load()?;

    match cli.command {
        Commands::Create {
            io,
            store_trajectory,
        } => {
            let nuggetizer = Nuggetizer::from_config(&config)?;
            commands::create::run(&nuggetizer, &io, store_trajectory).await?;
        }
        Commands::Score { io } => {
            let nuggetizer = Nuggetizer::from_config(&config)?;
            commands::score::run(&nuggetizer, &io).await?;
        }
        Commands::Assign { io } => {
            let nuggetizer = Nuggetizer::from_config(&config)?;
            commands::assign::run(&nuggetizer, &io).await?;
        }
        Commands::Metrics {
            input_file,
            output_file,
        } => commands::metrics::run(&input_file, output_file.as_deref())?,
    }

    Ok(())
}
