mod error;
mod infer;
mod notion;
mod publish;
mod schema;
mod settings;
mod watcher;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use notion::NotionClient;
use publish::Publisher;
use settings::Settings;
use watcher::{InMemoryProcessed, MeetingNotesWatcher};

#[derive(Parser)]
#[command(
    name = "meeting_sync",
    about = "Upload new meeting transcripts to a Notion database"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the database property schema and cache it locally
    FetchSchema {
        /// Output file (default: SCHEMA_FILE or notion_schema.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Watch a directory and upload each new .txt transcript
    Watch {
        /// Directory to watch (default: WATCH_DIRECTORY)
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Cached schema file (default: SCHEMA_FILE or notion_schema.json)
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    init_tracing(settings.log_file.as_deref())?;

    match cli.command {
        Commands::FetchSchema { output } => {
            let notion = settings.notion()?;
            let client = NotionClient::new(&notion)?;
            let output = output.unwrap_or_else(|| settings.schema_file.clone());
            schema::fetch_and_store(&client, &notion.database_id, &output).await?;
            Ok(())
        }
        Commands::Watch { dir, schema: schema_file } => {
            let (notion, dir) = settings.watch(dir)?;
            let schema_path = schema_file.unwrap_or_else(|| settings.schema_file.clone());

            let properties = schema::load_schema(&schema_path);
            schema::validate_schema(&properties)
                .with_context(|| format!("Incompatible schema in {}", schema_path.display()))?;

            if !dir.is_dir() {
                bail!(
                    "Watch directory {} does not exist. Please make sure it exists and is accessible",
                    dir.display()
                );
            }

            let client = NotionClient::new(&notion)?;
            let publisher = Publisher::new(
                Arc::new(client),
                notion.database_id.clone(),
                settings.page_ready_timeout(),
            );
            let watcher =
                MeetingNotesWatcher::new(publisher, InMemoryProcessed::default(), settings.settle());
            watcher.run(&dir).await?;
            info!("Watcher shut down");
            Ok(())
        }
    }
}

/// Log to stderr, and additionally to `log_file` when one is configured.
fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let file_layer = match log_file.filter(|p| !p.as_os_str().is_empty()) {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}
