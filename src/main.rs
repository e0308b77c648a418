mod config;
mod importer;
mod model;
mod normalizer;
mod storage;

use clap::{Parser, Subcommand};
use config::{load_config, AppConfig};
use normalizer::normalize_collection;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use storage::SqliteStorage;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Splits quantity multipliers out of award labels", long_about = None)]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize every unmigrated record of the configured collection
    Migrate,
    /// List collections with their counts and a few sample documents
    Inspect,
    /// Load a JSON array of documents into the configured collection
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let config = match load_config(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Config load error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // The connection lives for the whole command and closes on drop
    let storage = match SqliteStorage::new(&config.db_path) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to open storage {}: {}", config.db_path, e);
            return ExitCode::FAILURE;
        }
    };

    let ok = match args.command {
        Command::Migrate => run_migrate(&storage, &config),
        Command::Inspect => run_inspect(&storage, &config),
        Command::Import { file } => run_import(&storage, &config, &file),
    };

    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn run_migrate(storage: &SqliteStorage, config: &AppConfig) -> bool {
    match normalize_collection(storage, &config.collection) {
        Ok(report) => {
            info!(
                "Migration done in {} ms: {} scanned, {} skipped, {} updated",
                (report.finished_at - report.started_at).num_milliseconds(),
                report.scanned,
                report.skipped,
                report.updated
            );
            true
        }
        Err(e) => {
            error!("Migration halted: {}", e);
            false
        }
    }
}

fn run_inspect(storage: &SqliteStorage, config: &AppConfig) -> bool {
    let stats = match storage.collection_stats() {
        Ok(stats) => stats,
        Err(e) => {
            error!("Failed to list collections: {}", e);
            return false;
        }
    };

    let names: Vec<&str> = stats.iter().map(|(name, _)| name.as_str()).collect();
    info!("Collections found: {:?}", names);

    for (name, count) in &stats {
        if *count == 0 {
            continue;
        }
        match storage.sample(name, config.sample_limit) {
            Ok(docs) => {
                info!("{} ({} docs):", name, count);
                for doc in docs {
                    info!("  {} {}", doc.id, serde_json::Value::Object(doc.fields));
                }
            }
            Err(e) => {
                error!("Failed to sample {}: {}", name, e);
                return false;
            }
        }
    }

    true
}

fn run_import(storage: &SqliteStorage, config: &AppConfig, file: &Path) -> bool {
    let content = match fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) => {
            error!("Cannot read {}: {}", file.display(), e);
            return false;
        }
    };

    match importer::import_documents(storage, &config.collection, &content) {
        Ok(count) => {
            info!("Imported {} documents into {}", count, config.collection);
            true
        }
        Err(e) => {
            error!("Import failed: {}", e);
            false
        }
    }
}
