pub mod layout;
pub mod merge;
pub(crate) mod reader;
pub(crate) mod table;

pub use layout::{StoreDirectory, MERGED_FILE_NAME, WRITER_FILE_PREFIX};
pub use merge::{merge_directory, MergeOutcome};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::store::format::{
    BincodeSerializerDeserializer, FormatError, JsonSerializerDeserializer,
    SerializerDeserializer,
};
use crate::store::CacheStoreStrategy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use table::Table;
use tracing::{debug, warn};
use uuid::Uuid;

/// A writer session on a directory shared by many independent processes.
///
/// Every session owns exactly one writer file, `tmp_<uuid>`, holding all keys
/// it has added. Each [`add`](CacheStoreStrategy::add) rewrites that whole
/// file, so other processes reading it see either the previous or the new
/// content and never race with this session. Lookups scan the merged file and
/// every writer file and return the most recently written value.
///
/// Writer files pile up until [`merge`](Self::merge) folds them into the
/// merged file. Merging is an offline maintenance operation: run it only when
/// no session is adding to the directory.
pub struct MergingDirDb<Key, Value, Serde = BincodeSerializerDeserializer>
where
    Serde: SerializerDeserializer,
{
    directory: StoreDirectory,
    session_id: Uuid,
    writer_file: PathBuf,
    /// Everything this session has added, mirrored in `writer_file`.
    data: Table,
    /// Directory content resolved when the session opened, if requested.
    preloaded: Option<Table>,
    config: StoreConfig,
    phantom_key: std::marker::PhantomData<fn(&Key)>,
    phantom_value: std::marker::PhantomData<Value>,
    phantom_serde: std::marker::PhantomData<Serde>,
}

impl<Key, Value, Serde> MergingDirDb<Key, Value, Serde>
where
    Key: Serialize + Debug,
    Value: Serialize + DeserializeOwned,
    Serde: SerializerDeserializer,
{
    /// Opens a session with the default [`StoreConfig`], creating `directory`
    /// if it doesn't exist.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(directory, StoreConfig::default())
    }

    pub fn open_with(directory: impl Into<PathBuf>, config: StoreConfig) -> Result<Self> {
        let directory = StoreDirectory::new(directory);
        fs::create_dir_all(directory.root())
            .map_err(|e| Error::io(directory.root(), "create directory", e))?;

        let session_id = Uuid::new_v4();
        let writer_file = directory.writer_file(session_id);

        let preloaded = if config.init_on_start {
            let table = reader::resolve_all::<Serde>(&directory)?;
            debug!(
                "Preloaded {} keys from {}",
                table.len(),
                directory.root().display()
            );
            Some(table)
        } else {
            None
        };

        debug!(
            "Opened session {} on {}",
            session_id,
            directory.root().display()
        );

        Ok(Self {
            directory,
            session_id,
            writer_file,
            data: Table::new(),
            preloaded,
            config,
            phantom_key: Default::default(),
            phantom_value: Default::default(),
            phantom_serde: Default::default(),
        })
    }

    pub fn directory(&self) -> &Path {
        self.directory.root()
    }

    /// The file this session writes to. It only exists after the first add.
    pub fn writer_file(&self) -> &Path {
        &self.writer_file
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Consolidates the directory, see [`merge_directory`].
    ///
    /// This session's own entries stay visible through its in-memory copy;
    /// its writer file is recreated on the next add.
    pub fn merge(&mut self, clear: bool) -> Result<MergeOutcome> {
        merge_directory::<Serde>(self.directory.root(), clear, &self.config)
    }

    fn encode_key(key: &Key) -> Result<Vec<u8>> {
        Serde::to_blob(key).map_err(|source| Error::Encode { what: "key", source })
    }

    fn decode_value(&self, blob: &[u8], origin: &Path) -> Result<Value> {
        Serde::from_blob(blob).map_err(|source: FormatError| Error::Format {
            path: origin.to_path_buf(),
            source,
        })
    }

    fn lookup(&self, key: &[u8]) -> Result<Option<Value>> {
        if let Some(blob) = self.data.get(key) {
            return self.decode_value(blob, &self.writer_file).map(Some);
        }

        if let Some(blob) = self.preloaded.as_ref().and_then(|table| table.get(key)) {
            return self.decode_value(blob, self.directory.root()).map(Some);
        }

        reader::read_from_all_files::<Serde, Value>(&self.directory, key)
    }

    fn flush(&self) -> Result<()> {
        table::write_table::<Serde>(&self.writer_file, &self.data, self.config.sync_writes)
    }
}

impl<Key, Value, Serde> MergingDirDb<Key, Value, Serde>
where
    Key: Serialize + DeserializeOwned + Debug,
    Value: Serialize + DeserializeOwned,
    Serde: SerializerDeserializer,
{
    /// Every key of the directory with its most recent value.
    ///
    /// Unreadable files are skipped as in lookups; entries whose key or
    /// value does not decode as `Key`/`Value` are skipped with a warning.
    pub fn snapshot(&self) -> Result<Vec<(Key, Value)>> {
        let resolved = reader::resolve_all::<Serde>(&self.directory)?;
        let mut entries = Vec::with_capacity(resolved.len());
        for (key, value) in &resolved {
            match (Serde::from_blob(key), Serde::from_blob(value)) {
                (Ok(key), Ok(value)) => entries.push((key, value)),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(
                        "Skipping undecodable entry in {}: {}",
                        self.directory.root().display(),
                        e
                    );
                }
            }
        }
        Ok(entries)
    }
}

impl<Key, Value, Serde> CacheStoreStrategy<Key, Value> for MergingDirDb<Key, Value, Serde>
where
    Key: Serialize + Debug,
    Value: Serialize + DeserializeOwned,
    Serde: SerializerDeserializer,
{
    fn get(&self, key: &Key) -> Result<Option<Value>> {
        let key = Self::encode_key(key)?;
        self.lookup(&key)
    }

    fn add(&mut self, key: Key, value: Value, overwrite: bool) -> Result<Value> {
        let key_blob = Self::encode_key(&key)?;

        if !overwrite {
            // A stale or corrupt merged file reads as absent here, the value
            // is then stored again.
            match self.lookup(&key_blob) {
                Ok(Some(existing)) => {
                    warn!("Already found key {:?}. Do not store data.", key);
                    return Ok(existing);
                }
                Ok(None) => {}
                Err(e) => debug!("Lookup of {:?} failed, storing anyway: {}", key, e),
            }
        }

        let value_blob =
            Serde::to_blob(&value).map_err(|source| Error::Encode { what: "value", source })?;
        let previous = self.data.insert(key_blob.clone(), value_blob);

        if let Err(e) = self.flush() {
            match previous {
                Some(previous) => self.data.insert(key_blob, previous),
                None => self.data.remove(&key_blob),
            };
            return Err(e);
        }

        debug!(
            "Added key {:?} to file {}",
            key,
            self.writer_file.display()
        );
        Ok(value)
    }
}

pub type MergingDirDbBincode<Key, Value> =
    MergingDirDb<Key, Value, BincodeSerializerDeserializer>;
pub type MergingDirDbJson<Key, Value> = MergingDirDb<Key, Value, JsonSerializerDeserializer>;
