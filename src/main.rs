//! `yomibot` CLI - run the translation bot or exercise its pieces offline

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "yomibot")]
#[command(about = "Reddit bot that overlays English translations on comic images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the subreddit and reply with translated images until Ctrl-C
    Run {
        /// Config file (default: platform config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Composite translation regions onto a local image
    Overlay {
        /// Source image (PNG, JPEG, ...)
        image: PathBuf,

        /// JSON array of translation regions
        regions: PathBuf,

        /// Where to write the PNG result
        output: PathBuf,

        /// Font file (overrides render.font_path)
        #[arg(short, long)]
        font: Option<PathBuf>,

        /// Config file (default: platform config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check whether an image URL passes the host allow-list
    CheckUrl {
        /// Image URL
        url: String,

        /// Config file (default: platform config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            cmd::cmd_run(config.as_deref()).await?;
        }
        Commands::Overlay { image, regions, output, font, config } => {
            cmd::cmd_overlay(&image, &regions, &output, font.as_deref(), config.as_deref())?;
        }
        Commands::CheckUrl { url, config } => {
            cmd::cmd_check_url(&url, config.as_deref())?;
        }
    }

    Ok(())
}
