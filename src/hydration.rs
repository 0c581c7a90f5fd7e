pub mod pull;

use crate::error::Result;

#[derive(Debug, Eq, PartialEq)]
pub enum CacheLookupSuccess<Value> {
    /// Value was not present in the underlying store and had to be fetched from source of record.
    Miss(Value),

    /// Value was recomputed from source of record on request and replaced the stored one.
    Refresh(Value),

    /// Value found in underlying store.
    Hit(Value),
}

impl<Value> CacheLookupSuccess<Value> {
    pub fn into_value(self) -> Value {
        match self {
            CacheLookupSuccess::Miss(value)
            | CacheLookupSuccess::Refresh(value)
            | CacheLookupSuccess::Hit(value) => value,
        }
    }
}

pub trait CacheHydrationStrategy<Key, Value> {
    /// Returns the cached value, fetching and storing it on a miss.
    fn get(&mut self, key: &Key) -> Result<Option<CacheLookupSuccess<Value>>>;

    /// Fetches a fresh value and stores it over whatever is cached.
    fn refresh(&mut self, key: &Key) -> Result<Option<CacheLookupSuccess<Value>>>;
}
