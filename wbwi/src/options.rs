//! Construction options for [`crate::WriteBatchWithIndex`].

use std::sync::Arc;

use crate::comparator::{Comparator, bytewise};
use crate::skiplist::DEFAULT_SEED;

/// Bytes reserved for the record buffer when nothing else is requested.
pub const DEFAULT_RESERVED_BYTES: usize = 0;

/// Default size limit (0 = unlimited).
pub const DEFAULT_MAX_BYTES: usize = 0;

/// Options for building a batch with an index.
///
/// ```ignore
/// let options = WriteBatchWithIndexOptions::new()
///     .with_overwrite_key(true)
///     .with_max_bytes(1 << 20);
/// let wbwi = WriteBatchWithIndex::new(options);
/// ```
#[derive(Clone)]
#[allow(clippy::disallowed_methods)] // cloning shares the Arc'd comparator
pub struct WriteBatchWithIndexOptions {
    /// Order for column families that were never registered with a handle.
    pub default_comparator: Arc<dyn Comparator>,
    pub reserved_bytes: usize,
    pub max_bytes: usize,
    /// Update the existing index entry for a key instead of adding a new one.
    pub overwrite_key: bool,
    /// Seed for skip list node heights.
    pub seed: u64,
}

impl Default for WriteBatchWithIndexOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBatchWithIndexOptions {
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_comparator: bytewise(),
            reserved_bytes: DEFAULT_RESERVED_BYTES,
            max_bytes: DEFAULT_MAX_BYTES,
            overwrite_key: false,
            seed: DEFAULT_SEED,
        }
    }

    #[must_use]
    pub fn with_default_comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.default_comparator = comparator;
        self
    }

    #[must_use]
    pub const fn with_reserved_bytes(mut self, reserved_bytes: usize) -> Self {
        self.reserved_bytes = reserved_bytes;
        self
    }

    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    #[must_use]
    pub const fn with_overwrite_key(mut self, overwrite_key: bool) -> Self {
        self.overwrite_key = overwrite_key;
        self
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl std::fmt::Debug for WriteBatchWithIndexOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBatchWithIndexOptions")
            .field("default_comparator", &self.default_comparator.name())
            .field("reserved_bytes", &self.reserved_bytes)
            .field("max_bytes", &self.max_bytes)
            .field("overwrite_key", &self.overwrite_key)
            .field("seed", &self.seed)
            .finish()
    }
}
