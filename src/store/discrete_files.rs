use crate::error::{Error, Result};
use crate::store::files;
use crate::store::format::{
    Blob, BincodeSerializerDeserializer, JsonSerializerDeserializer, Record,
    SerializerDeserializer,
};
use crate::store::CacheStoreStrategy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Number of hex digits of the key digest used as the shard directory.
const SHARD_PREFIX_LEN: usize = 4;

/// One file per key, at a path derived from the SHA-256 of the encoded key:
/// `<cache_directory>/<first 4 hex digits>/<remaining hex digits>`.
///
/// There is no merging and no recency resolution, so this store is only safe
/// when each key has a single writer. Prefer
/// [`MergingDirDb`](crate::store::merging::MergingDirDb) whenever several jobs
/// may compute the same key.
pub struct DirDb<Key, Value, Serde = BincodeSerializerDeserializer>
where
    Serde: SerializerDeserializer,
{
    cache_directory: PathBuf,
    sync_writes: bool,
    phantom_key: std::marker::PhantomData<fn(&Key)>,
    phantom_value: std::marker::PhantomData<Value>,
    phantom_serde: std::marker::PhantomData<Serde>,
}

impl<Key, Value, Serde> DirDb<Key, Value, Serde>
where
    Key: Serialize + Debug,
    Value: Serialize + DeserializeOwned,
    Serde: SerializerDeserializer,
{
    /// Will create the directory if it doesn't exist.
    pub fn open(cache_directory: impl Into<PathBuf>) -> Result<Self> {
        let cache_directory = cache_directory.into();
        fs::create_dir_all(&cache_directory)
            .map_err(|e| Error::io(&cache_directory, "create directory", e))?;

        Ok(Self {
            cache_directory,
            sync_writes: true,
            phantom_key: Default::default(),
            phantom_value: Default::default(),
            phantom_serde: Default::default(),
        })
    }

    pub fn with_sync_writes(mut self, enabled: bool) -> Self {
        self.sync_writes = enabled;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.cache_directory
    }

    /// The file `key` is stored in, whether or not it exists yet.
    pub fn path_for(&self, key: &Key) -> Result<PathBuf> {
        Ok(self.path_for_blob(&Self::encode_key(key)?))
    }

    fn path_for_blob(&self, key: &[u8]) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key));
        let (shard, rest) = digest.split_at(SHARD_PREFIX_LEN);
        self.cache_directory.join(shard).join(rest)
    }

    fn encode_key(key: &Key) -> Result<Blob> {
        Serde::to_blob(key).map_err(|source| Error::Encode { what: "key", source })
    }

    fn read(&self, path: &Path, key: &[u8]) -> Option<Value> {
        match files::get::<Serde, Record<Blob, Value>>(path) {
            Ok(record) if record.key == key => Some(record.value),
            Ok(_) => {
                warn!("Key digest collision in {}, ignoring entry", path.display());
                None
            }
            Err(failure) => {
                if !failure.is_not_found() {
                    debug!("Could not read {}: {}", path.display(), failure);
                }
                None
            }
        }
    }
}

impl<Key, Value, Serde> CacheStoreStrategy<Key, Value> for DirDb<Key, Value, Serde>
where
    Key: Serialize + Debug,
    Value: Serialize + DeserializeOwned,
    Serde: SerializerDeserializer,
{
    /// Any I/O or decode failure reads as absent.
    fn get(&self, key: &Key) -> Result<Option<Value>> {
        let key = Self::encode_key(key)?;
        Ok(self.read(&self.path_for_blob(&key), &key))
    }

    fn add(&mut self, key: Key, value: Value, overwrite: bool) -> Result<Value> {
        let key_blob = Self::encode_key(&key)?;
        let path = self.path_for_blob(&key_blob);

        if let Some(shard) = path.parent() {
            fs::create_dir_all(shard).map_err(|e| Error::io(shard, "create directory", e))?;
        }

        if !overwrite && path.exists() {
            warn!("Already found key {:?}. Do not store data.", key);
            return Ok(self.read(&path, &key_blob).unwrap_or(value));
        }

        let record = Record {
            key: key_blob,
            value,
        };
        files::put::<Serde, _>(&path, &record, self.sync_writes)?;
        debug!("Added key {:?} to file {}", key, path.display());

        Ok(record.value)
    }
}

pub type DirDbBincode<Key, Value> = DirDb<Key, Value, BincodeSerializerDeserializer>;
pub type DirDbJson<Key, Value> = DirDb<Key, Value, JsonSerializerDeserializer>;
