use serde::{Deserialize, Serialize};

/// Knobs for a [`MergingDirDb`](crate::store::merging::MergingDirDb) session.
///
/// The defaults are what batch jobs want; most callers never touch this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Resolve the whole directory once when the session opens, so later
    /// lookups of pre-existing keys do not rescan every file.
    pub init_on_start: bool,

    /// `fsync` staged files before renaming them into place.
    pub sync_writes: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            init_on_start: false,
            sync_writes: true,
        }
    }
}

impl StoreConfig {
    pub fn init_on_start(mut self, enabled: bool) -> Self {
        self.init_on_start = enabled;
        self
    }

    pub fn sync_writes(mut self, enabled: bool) -> Self {
        self.sync_writes = enabled;
        self
    }
}
