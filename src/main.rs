//! trial-transcript - Export Discord channel history as a markdown transcript
//!
//! Reads a range of a channel's messages, groups them by speaker and writes
//! a transcript document with its attachments alongside.

mod api;
mod config;
mod export;
mod models;
mod transcript;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use models::Snowflake;

#[derive(Parser)]
#[command(name = "trial-transcript")]
#[command(about = "Export Discord channel history as a markdown trial transcript", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Settings that can be given on the command line instead of the config file
#[derive(clap::Args)]
struct RangeArgs {
    /// Transcript title
    #[arg(long)]
    trial_name: Option<String>,

    /// Channel to read
    #[arg(long)]
    channel: Option<Snowflake>,

    /// Read history from just before this message
    #[arg(long)]
    start: Option<Snowflake>,

    /// Last message included in the transcript
    #[arg(long)]
    end: Option<Snowflake>,
}

impl RangeArgs {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.trial_name {
            config.trial_name = Some(v);
        }
        if let Some(v) = self.channel {
            config.channel_id = Some(v);
        }
        if let Some(v) = self.start {
            config.start_msg_id = Some(v);
        }
        if let Some(v) = self.end {
            config.end_msg_id = Some(v);
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the configured range and write the transcript with its attachments
    Export {
        #[command(flatten)]
        range: RangeArgs,

        /// Folder that receives the transcript folder
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Fetch the configured range and print it without writing anything
    Preview {
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Write a template config file
    Init {
        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Init { force } => {
            let path = match cli.config {
                Some(p) => p,
                None => Config::default_path()?,
            };
            Config::write_template(&path, force)?;
            println!("Wrote {}", path.display());
        }
        Commands::Export { range, output_dir } => {
            let mut config = Config::load(cli.config.as_deref())?;
            range.apply(&mut config);
            if let Some(dir) = output_dir {
                config.output_dir = Some(dir);
            }
            let settings = config.validate()?;

            let report = export::run(&settings).await?;
            if !report.failures.is_empty() {
                tracing::warn!(
                    "{} of {} attachments could not be saved:",
                    report.failures.len(),
                    report.failures.len() + report.attachments_saved
                );
                for failure in &report.failures {
                    tracing::warn!("  {}", failure);
                }
            }
        }
        Commands::Preview { range } => {
            let mut config = Config::load(cli.config.as_deref())?;
            range.apply(&mut config);
            let settings = config.validate()?;

            let client = api::DiscordClient::new(&settings)?;
            let assembled = export::collect(&client, &settings).await?;
            print!("{}", transcript::preview(&assembled));

            match assembled.stats() {
                Some(stats) => println!("{}", stats),
                None => bail!("Transcript is empty"),
            }
        }
    }

    Ok(())
}
