use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const WRITER_FILE_PREFIX: &str = "tmp_";
pub const MERGED_FILE_NAME: &str = "merged";
/// Prefix of the hidden files new content is staged in before being renamed
/// into place.
pub const STAGING_FILE_PREFIX: &str = ".tmp";

/// The files making up one merging store:
///
/// ```text
/// <store-dir>/
///   merged        consolidated snapshot, optional
///   tmp_<uuid>    one per writer session not yet merged
///   .tmpXXXXXX    staged content, only left behind by a crashed writer
/// ```
#[derive(Debug, Clone)]
pub struct StoreDirectory {
    root: PathBuf,
}

impl StoreDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn merged_file(&self) -> PathBuf {
        self.root.join(MERGED_FILE_NAME)
    }

    pub fn writer_file(&self, session_id: Uuid) -> PathBuf {
        self.root
            .join(format!("{WRITER_FILE_PREFIX}{}", session_id.hyphenated()))
    }

    /// Writer files currently present, sorted by file name.
    pub fn writer_files(&self) -> io::Result<Vec<PathBuf>> {
        self.files_matching(is_writer_file_name)
    }

    /// Staging files currently present, sorted by file name.
    pub fn staging_files(&self) -> io::Result<Vec<PathBuf>> {
        self.files_matching(|name| name.starts_with(STAGING_FILE_PREFIX))
    }

    fn files_matching(&self, matches: impl Fn(&str) -> bool) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !matches(&entry.file_name().to_string_lossy()) {
                continue;
            }
            // Entries can vanish while we list them, a merge may be running.
            match entry.file_type() {
                Ok(file_type) if file_type.is_file() => files.push(entry.path()),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        files.sort();
        Ok(files)
    }

    /// Whether `directory` holds a merged file or any writer file.
    pub fn looks_like_store(directory: &Path) -> bool {
        let Ok(entries) = fs::read_dir(directory) else {
            return false;
        };

        entries.flatten().any(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name == MERGED_FILE_NAME || is_writer_file_name(&name)
        })
    }
}

fn is_writer_file_name(name: &str) -> bool {
    name.starts_with(WRITER_FILE_PREFIX)
}
