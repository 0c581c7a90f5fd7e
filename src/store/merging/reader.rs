//! Lock-free lookups across every file of a merging store.
//!
//! Writer files can be rewritten or deleted underneath us at any moment, so a
//! file that cannot be read is treated as not holding the key instead of
//! failing the lookup. Recency is approximated by file modification time.

use crate::error::{Error, Result};
use crate::store::files::{self, ReadFailure};
use crate::store::format::SerializerDeserializer;
use crate::store::merging::layout::StoreDirectory;
use crate::store::merging::table::{read_table, Table};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// What one file says about one key.
#[derive(Debug)]
pub(crate) enum ReadOutcome<Value> {
    Found(Value),
    AbsentInFile,
    CorruptFile(ReadFailure),
}

/// A readable file together with the time it was last written.
struct Source {
    path: PathBuf,
    modified: SystemTime,
    table: Table,
}

/// Candidate files in examination order: writer files by name, merged file last.
fn candidate_files(directory: &StoreDirectory) -> (Vec<PathBuf>, PathBuf) {
    let writer_files = directory.writer_files().unwrap_or_else(|e| {
        debug!(
            "Could not list writer files in {}: {}",
            directory.root().display(),
            e
        );
        Vec::new()
    });

    (writer_files, directory.merged_file())
}

fn load_source<Serde>(path: &Path) -> std::result::Result<Option<Source>, ReadFailure>
where
    Serde: SerializerDeserializer,
{
    // A file that disappeared was consumed by a merge; its content lives on in
    // the merged file.
    let modified = match files::modified(path) {
        Ok(modified) => modified,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ReadFailure::Io(e)),
    };

    match read_table::<Serde>(path) {
        Ok(table) => Ok(Some(Source {
            path: path.to_path_buf(),
            modified,
            table,
        })),
        Err(failure) if failure.is_not_found() => Ok(None),
        Err(failure) => Err(failure),
    }
}

pub(crate) fn read_key_from_file<Serde, Value>(
    path: &Path,
    key: &[u8],
) -> (ReadOutcome<Value>, Option<SystemTime>)
where
    Serde: SerializerDeserializer,
    Value: DeserializeOwned,
{
    let source = match load_source::<Serde>(path) {
        Ok(Some(source)) => source,
        Ok(None) => return (ReadOutcome::AbsentInFile, None),
        Err(failure) => return (ReadOutcome::CorruptFile(failure), None),
    };

    let outcome = match source.table.get(key) {
        None => ReadOutcome::AbsentInFile,
        Some(blob) => match Serde::from_blob(blob) {
            Ok(value) => ReadOutcome::Found(value),
            Err(e) => ReadOutcome::CorruptFile(ReadFailure::Decode(e)),
        },
    };

    (outcome, Some(source.modified))
}

/// Returns the value for `key` from whichever file holding it was written
/// last.
///
/// Only fails when the merged file is the sole file in the directory and it
/// cannot be read; any other unreadable file is skipped.
pub(crate) fn read_from_all_files<Serde, Value>(
    directory: &StoreDirectory,
    key: &[u8],
) -> Result<Option<Value>>
where
    Serde: SerializerDeserializer,
    Value: DeserializeOwned,
{
    let (writer_files, merged_file) = candidate_files(directory);
    let mut newest: Option<(Value, SystemTime)> = None;
    let mut found = 0usize;
    let mut merged_failure = None;

    for (path, is_merged) in writer_files
        .iter()
        .map(|path| (path.as_path(), false))
        .chain(std::iter::once((merged_file.as_path(), true)))
    {
        match read_key_from_file::<Serde, Value>(path, key) {
            (ReadOutcome::Found(value), Some(modified)) => {
                found += 1;
                // `>=` so that the last file examined wins a tie.
                let newer = newest
                    .as_ref()
                    .map_or(true, |(_, current)| modified >= *current);
                if newer {
                    newest = Some((value, modified));
                }
            }
            (ReadOutcome::CorruptFile(failure), _) => {
                debug!("Skipping unreadable file {}: {}", path.display(), failure);
                if is_merged {
                    merged_failure = Some(failure);
                }
            }
            _ => {}
        }
    }

    if found > 1 {
        warn!(
            "Found {} results with different timestamps in {}. Returning the newest.",
            found,
            directory.root().display()
        );
    }

    match (newest, merged_failure) {
        (Some((value, _)), _) => Ok(Some(value)),
        (None, Some(failure)) if writer_files.is_empty() => {
            Err(corrupt_merged_file(&merged_file, failure))
        }
        (None, _) => Ok(None),
    }
}

/// Resolves every key of the directory at once, applying the same rules as
/// [`read_from_all_files`] key by key.
pub(crate) fn resolve_all<Serde>(directory: &StoreDirectory) -> Result<Table>
where
    Serde: SerializerDeserializer,
{
    let (writer_files, merged_file) = candidate_files(directory);
    let mut sources = Vec::with_capacity(writer_files.len() + 1);
    let mut merged_failure = None;

    for path in writer_files.iter().chain(std::iter::once(&merged_file)) {
        match load_source::<Serde>(path) {
            Ok(Some(source)) => sources.push(source),
            Ok(None) => {}
            Err(failure) => {
                debug!("Skipping unreadable file {}: {}", path.display(), failure);
                if *path == merged_file {
                    merged_failure = Some(failure);
                }
            }
        }
    }

    if let Some(failure) = merged_failure {
        if writer_files.is_empty() {
            return Err(corrupt_merged_file(&merged_file, failure));
        }
    }

    // Stable sort keeps examination order between equal timestamps, so the
    // fold below lets the last examined file win a tie.
    sources.sort_by_key(|source| source.modified);

    let mut resolved = Table::new();
    for source in sources {
        debug!(
            "Folding {} entries from {}",
            source.table.len(),
            source.path.display()
        );
        resolved.extend(source.table);
    }

    Ok(resolved)
}

fn corrupt_merged_file(path: &Path, failure: ReadFailure) -> Error {
    match failure {
        ReadFailure::Decode(source) => Error::CorruptMergedFile {
            path: path.to_path_buf(),
            source,
        },
        ReadFailure::Io(source) => Error::io(path, "read", source),
    }
}
