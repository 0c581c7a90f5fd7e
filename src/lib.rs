//! Directory-backed result caches for batch jobs sharing a network filesystem.
//!
//! [`MergingDirDb`] lets any number of independent processes memoize values in
//! one directory without locks: each process writes only its own file, reads
//! scan every file and pick the most recently written value, and an offline
//! [`merge`](MergingDirDb::merge) folds everything into a single `merged`
//! file. [`DirDb`] is the simpler one-file-per-key variant for workloads with
//! a single writer per key.
//!
//! ```no_run
//! use dirdb::{CacheStoreStrategy, MergingDirDb};
//!
//! # fn main() -> dirdb::Result<()> {
//! let mut cache: MergingDirDb<(String, u32), f64> = dirdb::open_store("/scratch/cache/yields")?;
//! let key = ("run".to_string(), 316899);
//! if !cache.contains(&key)? {
//!     cache.add(key.clone(), 1.25, false)?;
//! }
//! assert_eq!(cache.get(&key)?, Some(1.25));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hydration;
pub mod source_of_record;
pub mod store;

pub use config::StoreConfig;
pub use error::{Error, Result};
pub use store::discrete_files::{DirDb, DirDbBincode, DirDbJson};
pub use store::format::{
    BincodeSerializerDeserializer, FormatError, JsonSerializerDeserializer, SerializerDeserializer,
};
pub use store::merging::{
    merge_directory, MergeOutcome, MergingDirDb, MergingDirDbBincode, MergingDirDbJson,
};
pub use store::CacheStoreStrategy;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::path::PathBuf;

/// Opens a bincode-encoded [`MergingDirDb`] session with default settings.
pub fn open_store<Key, Value>(path: impl Into<PathBuf>) -> Result<MergingDirDb<Key, Value>>
where
    Key: Serialize + Debug,
    Value: Serialize + DeserializeOwned,
{
    MergingDirDb::open(path)
}
