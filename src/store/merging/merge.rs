//! Offline consolidation of a merging store.
//!
//! Merging must only run while no writer session is adding to the directory:
//! a key added to a writer file after it was folded in, but before the file is
//! deleted, would be lost. As a best effort, writer files whose modification
//! time changed since they were scanned are left in place.

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::store::files::{self, ReadFailure};
use crate::store::format::SerializerDeserializer;
use crate::store::merging::layout::StoreDirectory;
use crate::store::merging::table::{read_table, write_table, Table};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// There were no writer files, nothing was touched.
    NothingToMerge,

    /// A new merged file was written.
    Merged {
        /// Writer files folded into the merged file.
        writer_files: usize,
        /// Keys in the new merged file.
        keys: usize,
        /// Writer files deleted afterwards.
        removed: usize,
        /// Writer files kept although clearing was requested, because they
        /// changed during the merge or could not be deleted. Files that
        /// changed are touched afterwards, so until the next merge their
        /// values win over the merged file's, as if they had not been merged.
        retained: usize,
    },

    /// The merged file was written but reading it back did not yield what was
    /// written, every writer file was kept.
    VerificationFailed { writer_files: usize },
}

impl MergeOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, MergeOutcome::VerificationFailed { .. })
    }
}

/// Folds all writer files of `directory`, oldest first, on top of its merged
/// file and writes the result back as the new merged file.
///
/// Any unreadable writer file or a corrupt merged file aborts the merge
/// before anything is written. With `clear`, writer files are deleted once
/// the new merged file has been read back and matches what was written;
/// staging files older than the merge are deleted too.
pub fn merge_directory<Serde>(
    directory: &Path,
    clear: bool,
    config: &StoreConfig,
) -> Result<MergeOutcome>
where
    Serde: SerializerDeserializer,
{
    let scan_started = SystemTime::now();
    let store = StoreDirectory::new(directory);
    let writer_files = store
        .writer_files()
        .map_err(|e| Error::io(directory, "list writer files in", e))?;

    if writer_files.is_empty() {
        debug!("No writer files in {}, nothing to merge", directory.display());
        return Ok(MergeOutcome::NothingToMerge);
    }

    let merged_file = store.merged_file();
    let mut merged = load_merged_file::<Serde>(&merged_file)?;

    let mut scanned: Vec<(PathBuf, SystemTime)> = Vec::with_capacity(writer_files.len());
    for path in writer_files {
        let modified = files::modified(&path).map_err(|e| Error::io(&path, "stat", e))?;
        scanned.push((path, modified));
    }
    scanned.sort_by(|(a_path, a_time), (b_path, b_time)| {
        a_time.cmp(b_time).then_with(|| a_path.cmp(b_path))
    });

    for (path, _) in &scanned {
        let table = read_table::<Serde>(path).map_err(|failure| failure.into_error(path))?;
        debug!("Folding {} entries from {}", table.len(), path.display());
        merged.extend(table);
    }

    write_table::<Serde>(&merged_file, &merged, config.sync_writes)?;
    info!(
        "Merged {} writer files into {} ({} keys)",
        scanned.len(),
        merged_file.display(),
        merged.len()
    );

    if !clear {
        return Ok(MergeOutcome::Merged {
            writer_files: scanned.len(),
            keys: merged.len(),
            removed: 0,
            retained: 0,
        });
    }

    Ok(clear_writer_files::<Serde>(&store, &merged, &scanned, scan_started))
}

/// Reads the new merged file back and, only if it holds exactly `merged`,
/// deletes the consumed writer files and leftover staging files.
fn clear_writer_files<Serde>(
    store: &StoreDirectory,
    merged: &Table,
    scanned: &[(PathBuf, SystemTime)],
    scan_started: SystemTime,
) -> MergeOutcome
where
    Serde: SerializerDeserializer,
{
    let merged_file = store.merged_file();
    if let Err(reason) = verify::<Serde>(&merged_file, merged) {
        error!(
            "Could not load merged file {}: {}. Will not delete writer files.",
            merged_file.display(),
            reason
        );
        return MergeOutcome::VerificationFailed {
            writer_files: scanned.len(),
        };
    }
    info!(
        "Merged file {} seems OK, will delete writer files.",
        merged_file.display()
    );

    let mut removed = 0;
    let mut retained = 0;
    for (path, scanned_at) in scanned {
        if remove_if_unchanged(path, *scanned_at) {
            removed += 1;
        } else {
            retained += 1;
        }
    }

    remove_stale_staging_files(store, scan_started);

    MergeOutcome::Merged {
        writer_files: scanned.len(),
        keys: merged.len(),
        removed,
        retained,
    }
}

fn load_merged_file<Serde>(path: &Path) -> Result<Table>
where
    Serde: SerializerDeserializer,
{
    match read_table::<Serde>(path) {
        Ok(table) => Ok(table),
        Err(failure) if failure.is_not_found() => Ok(Table::new()),
        Err(ReadFailure::Decode(source)) => Err(Error::CorruptMergedFile {
            path: path.to_path_buf(),
            source,
        }),
        Err(ReadFailure::Io(source)) => Err(Error::io(path, "read", source)),
    }
}

fn verify<Serde>(path: &Path, expected: &Table) -> std::result::Result<(), String>
where
    Serde: SerializerDeserializer,
{
    let written = read_table::<Serde>(path).map_err(|failure| failure.to_string())?;
    if written.len() != expected.len() {
        return Err(format!(
            "expected {} keys, found {}",
            expected.len(),
            written.len()
        ));
    }
    if written != *expected {
        return Err("content differs from what was written".to_string());
    }
    Ok(())
}

/// Deletes a consumed writer file unless it was written to after the scan.
///
/// A kept file is touched so it stays newer than the merged file just
/// written, otherwise readers would prefer the merged file's older values.
fn remove_if_unchanged(path: &Path, scanned_at: SystemTime) -> bool {
    match files::modified(path) {
        Ok(modified) if modified != scanned_at => {
            warn!(
                "Writer file {} changed during the merge, keeping it",
                path.display()
            );
            let touched = fs::File::options()
                .write(true)
                .open(path)
                .and_then(|file| file.set_modified(SystemTime::now()));
            if let Err(e) = touched {
                warn!("Failed to touch writer file {}: {}", path.display(), e);
            }
            false
        }
        Ok(_) => match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!("Failed to delete writer file {}: {}", path.display(), e);
                false
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("Writer file {} already gone", path.display());
            true
        }
        Err(e) => {
            warn!("Failed to stat writer file {}: {}", path.display(), e);
            false
        }
    }
}

/// Deletes staging files left by writers that died between staging and
/// renaming. Only files older than the start of this merge are touched.
fn remove_stale_staging_files(store: &StoreDirectory, scan_started: SystemTime) {
    let staging_files = match store.staging_files() {
        Ok(staging_files) => staging_files,
        Err(e) => {
            warn!(
                "Failed to list staging files in {}: {}",
                store.root().display(),
                e
            );
            return;
        }
    };

    for path in staging_files {
        match files::modified(&path) {
            Ok(modified) if modified < scan_started => match fs::remove_file(&path) {
                Ok(()) => info!("Deleted stale staging file {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete staging file {}: {}", path.display(), e),
            },
            Ok(_) => debug!("Staging file {} is recent, keeping it", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to stat staging file {}: {}", path.display(), e),
        }
    }
}
