//! Manga Crawler CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use manga_crawler::{
    error::Result,
    models::Config,
    pipeline::{ImportReport, Importer},
    services::{self, AnimePlanetSuggestions},
    storage::{ActivityStore, LocalStorage, MangaStore},
    utils::http,
};

/// Manga catalog crawler
#[derive(Parser, Debug)]
#[command(
    name = "manga-crawler",
    version,
    about = "Imports manga catalogs and chapter pages from content sources"
)]
struct Cli {
    /// Path to storage directory containing config.toml and the catalog
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wipe the catalog and import every configured source from scratch
    Full,

    /// Re-crawl every stored manga, keeping gathered detail
    Merge,

    /// Crawl recent updates and record activities
    Update,

    /// Refresh suggestions of every stored manga
    Suggestions,

    /// Validate the configuration file
    Validate,

    /// Show catalog info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_report(report: &ImportReport) -> Result<()> {
    log::debug!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Manga crawler starting...");

    let config_path = cli.storage_dir.join("config.toml");
    let config = if config_path.exists() {
        Config::load(&config_path)?
    } else {
        Config::load_or_default(&config_path)
    };

    if let Command::Validate = cli.command {
        log::info!("Validating configuration...");
        if let Err(e) = config.validate() {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
        log::info!(
            "Config OK: {} sources, {} workers",
            config.import.sources.len(),
            config.import.workers
        );
        return Ok(());
    }

    config.validate()?;
    let storage = Arc::new(LocalStorage::open(&cli.storage_dir).await?);
    log::info!("Catalog storage at {}", storage.root_dir().display());

    let client = http::create_client(&config.crawler)?;
    let sources = services::build_sources(&config.import.sources, &client)?;
    let importer = Importer::new(sources, storage.clone(), storage.clone()).with_config(&config);

    match cli.command {
        Command::Full => {
            let report = importer.full_import().await?;
            print_report(&report)?;
        }

        Command::Merge => {
            let report = importer.merge_import().await?;
            print_report(&report)?;
        }

        Command::Update => {
            let report = importer.update_import().await?;
            print_report(&report)?;
        }

        Command::Suggestions => {
            if !config.suggestions.enabled {
                log::warn!("Suggestions are disabled in {}", config_path.display());
                return Ok(());
            }
            let finder = AnimePlanetSuggestions::new(client.clone());
            importer.update_suggestions(&finder).await?;
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());
            log::info!("Stored mangas: {}", storage.count().await?);
            log::info!("Activities: {}", storage.load_activities().await?.len());
            log::info!(
                "Sources: {}",
                config
                    .import
                    .sources
                    .iter()
                    .map(|s| s.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        Command::Validate => {}
    }

    log::info!("Done!");

    Ok(())
}
