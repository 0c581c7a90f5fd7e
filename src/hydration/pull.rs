use crate::error::Result;
use crate::hydration::{CacheHydrationStrategy, CacheLookupSuccess};
use crate::source_of_record::SourceOfRecord;
use crate::store::CacheStoreStrategy;

/// Memoizes a [`SourceOfRecord`] in a store: look up first, compute and add
/// on a miss.
pub struct PullCacheHydrator<Key, Value> {
    store: Box<dyn CacheStoreStrategy<Key, Value>>,
    data_source: Box<dyn SourceOfRecord<Key, Value>>,
}

impl<Key: Clone, Value> PullCacheHydrator<Key, Value> {
    pub fn new(
        store: Box<dyn CacheStoreStrategy<Key, Value>>,
        data_source: Box<dyn SourceOfRecord<Key, Value>>,
    ) -> Self {
        PullCacheHydrator { store, data_source }
    }

    pub fn store(&self) -> &dyn CacheStoreStrategy<Key, Value> {
        self.store.as_ref()
    }

    fn try_hydrate(&mut self, key: &Key, overwrite: bool) -> Result<Option<Value>> {
        match self.data_source.retrieve(key) {
            None => Ok(None),
            Some(value) => Ok(Some(self.store.add(key.clone(), value, overwrite)?)),
        }
    }
}

impl<Key: Clone, Value> CacheHydrationStrategy<Key, Value> for PullCacheHydrator<Key, Value> {
    fn get(&mut self, key: &Key) -> Result<Option<CacheLookupSuccess<Value>>> {
        if let Some(value) = self.store.get(key)? {
            return Ok(Some(CacheLookupSuccess::Hit(value)));
        }

        // Another process may have stored the key in the meantime, `add`
        // then hands back its value instead of ours.
        Ok(self.try_hydrate(key, false)?.map(CacheLookupSuccess::Miss))
    }

    fn refresh(&mut self, key: &Key) -> Result<Option<CacheLookupSuccess<Value>>> {
        Ok(self.try_hydrate(key, true)?.map(CacheLookupSuccess::Refresh))
    }
}
