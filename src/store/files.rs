use crate::error::{Error, Result};
use crate::store::format::{FormatError, SerializerDeserializer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::SystemTime;
use tempfile::Builder;

/// Why a single file could not be read.
#[derive(Debug)]
pub(crate) enum ReadFailure {
    Io(io::Error),
    Decode(FormatError),
}

impl ReadFailure {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReadFailure::Io(e) if e.kind() == io::ErrorKind::NotFound)
    }

    pub fn into_error(self, path: &Path) -> Error {
        match self {
            ReadFailure::Io(source) => Error::io(path, "read", source),
            ReadFailure::Decode(source) => Error::Format {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

impl std::fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadFailure::Io(e) => write!(f, "{e}"),
            ReadFailure::Decode(e) => write!(f, "{e}"),
        }
    }
}

pub(crate) fn get<Serde, Value>(path: &Path) -> std::result::Result<Value, ReadFailure>
where
    Value: DeserializeOwned,
    Serde: SerializerDeserializer,
{
    let file = File::open(path).map_err(ReadFailure::Io)?;
    Serde::deserialize(BufReader::new(file)).map_err(ReadFailure::Decode)
}

/// Replaces `path` with the encoding of `value`.
///
/// The bytes are staged in a hidden temporary file next to `path` and renamed
/// over it, so a concurrent reader sees either the old or the new content.
pub(crate) fn put<Serde, Value>(path: &Path, value: &Value, sync: bool) -> Result<()>
where
    Value: Serialize + ?Sized,
    Serde: SerializerDeserializer,
{
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Other accounts sharing the cache must be able to read the file, so the
    // staged file gets the destination's mode, or the umask for new files,
    // instead of tempfile's private 0600.
    let existing = fs::metadata(path).ok().map(|metadata| metadata.permissions());
    let mut builder = Builder::new();
    if let Some(permissions) = new_file_permissions() {
        builder.permissions(permissions);
    }
    let mut staged = builder
        .tempfile_in(directory)
        .map_err(|e| Error::io(directory, "stage a file in", e))?;
    if let Some(permissions) = existing {
        staged
            .as_file()
            .set_permissions(permissions)
            .map_err(|e| Error::io(path, "set permissions of", e))?;
    }
    {
        let mut writer = BufWriter::new(staged.as_file_mut());
        Serde::serialize(&mut writer, value).map_err(|source| Error::Encode {
            what: "file contents",
            source,
        })?;
        writer
            .flush()
            .map_err(|e| Error::io(path, "write", e))?;
    }

    if sync {
        staged
            .as_file()
            .sync_all()
            .map_err(|e| Error::io(path, "sync", e))?;
    }

    staged.persist(path).map_err(|e| Error::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(())
}

/// Mode requested for freshly created files, filtered by the process umask
/// the same way `File::create` is.
#[cfg(unix)]
fn new_file_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(0o666))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<fs::Permissions> {
    None
}

pub(crate) fn modified(path: &Path) -> io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}
