//! Merges every cache directory below a root.
//!
//! Run it only while no jobs are writing to the caches.
use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use dirdb::store::merging::StoreDirectory;
use dirdb::{
    merge_directory, BincodeSerializerDeserializer, JsonSerializerDeserializer, MergeOutcome,
    StoreConfig,
};
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Bincode,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Merge the writer files of directory caches")]
struct Args {
    /// Directory to search for caches, itself included
    root: PathBuf,

    /// Encoding the caches were written with
    #[arg(long, value_enum, default_value = "bincode")]
    format: Format,

    /// Keep writer files after merging
    #[arg(long)]
    no_clear: bool,

    /// Only list the caches that would be merged
    #[arg(long)]
    dry_run: bool,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: Level,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_string().to_lowercase()));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();

    if !args.root.is_dir() {
        bail!("{} is not a directory", args.root.display());
    }

    let stores = find_stores(&args.root);
    info!("Found {} caches below {}", stores.len(), args.root.display());

    let config = StoreConfig::default();
    let mut failed = 0;
    for store in &stores {
        if args.dry_run {
            println!("{}", store.display());
            continue;
        }

        info!("Now merging {}", store.display());
        match merge(store, args.format, !args.no_clear, &config) {
            Ok(outcome) if outcome.succeeded() => report(store, &outcome),
            Ok(_) => {
                error!("Verification failed for {}", store.display());
                failed += 1;
            }
            Err(e) => {
                error!("Failed to merge {}: {}", store.display(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} caches failed to merge", stores.len());
    }
    Ok(())
}

fn find_stores(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                error!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .filter(|path| StoreDirectory::looks_like_store(path))
        .collect()
}

fn merge(
    store: &Path,
    format: Format,
    clear: bool,
    config: &StoreConfig,
) -> dirdb::Result<MergeOutcome> {
    match format {
        Format::Bincode => merge_directory::<BincodeSerializerDeserializer>(store, clear, config),
        Format::Json => merge_directory::<JsonSerializerDeserializer>(store, clear, config),
    }
}

fn report(store: &Path, outcome: &MergeOutcome) {
    match outcome {
        MergeOutcome::NothingToMerge => info!("Nothing to merge in {}", store.display()),
        MergeOutcome::Merged {
            writer_files,
            keys,
            removed,
            retained,
        } => info!(
            "Merged {} writer files into {} keys in {} (removed {}, kept {})",
            writer_files,
            keys,
            store.display(),
            removed,
            retained
        ),
        MergeOutcome::VerificationFailed { .. } => {}
    }
}
