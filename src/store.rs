pub mod discrete_files;
pub(crate) mod files;
pub mod format;
pub mod merging;

use crate::error::Result;

/// The lookup surface shared by the directory stores.
///
/// A missing key is `Ok(None)`; errors are reserved for failures the caller
/// has to act on.
pub trait CacheStoreStrategy<Key, Value> {
    fn get(&self, key: &Key) -> Result<Option<Value>>;

    /// Stores `value` under `key` and returns what the store now holds.
    ///
    /// Without `overwrite`, a key that is already present is left alone and
    /// its existing value is returned: the first writer wins.
    fn add(&mut self, key: Key, value: Value, overwrite: bool) -> Result<Value>;

    fn contains(&self, key: &Key) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}
