/// Where values come from when the cache doesn't have them yet, typically an
/// expensive but deterministic computation.
pub trait SourceOfRecord<Key, Value> {
    /// `None` when no value can be produced for `key`; nothing is cached then.
    fn retrieve(&self, key: &Key) -> Option<Value>;
}

impl<Key, Value, F> SourceOfRecord<Key, Value> for F
where
    F: Fn(&Key) -> Option<Value>,
{
    fn retrieve(&self, key: &Key) -> Option<Value> {
        self(key)
    }
}
