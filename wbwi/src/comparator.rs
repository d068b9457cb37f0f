//! Key comparators.
//!
//! Every column family orders its keys with a [`Comparator`]. The batch keeps a
//! [`ComparatorSet`]: a default comparator plus per-column-family overrides that
//! are registered as column family handles are used.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use crate::column_family::ColumnFamilyId;
use crate::error::WriteBatchError;

/// A total order over byte strings.
pub trait Comparator: Send + Sync {
    /// Name identifying the order. Batches built under different orders must
    /// not be mixed.
    fn name(&self) -> &str;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    fn equal(&self, a: &[u8], b: &[u8]) -> bool {
        self.compare(a, b) == Ordering::Equal
    }
}

/// Lexicographic byte order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn name(&self) -> &str {
        "leveldb.BytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn equal(&self, a: &[u8], b: &[u8]) -> bool {
        a == b
    }
}

/// Reverse lexicographic byte order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverseBytewiseComparator;

impl Comparator for ReverseBytewiseComparator {
    fn name(&self) -> &str {
        "rocksdb.ReverseBytewiseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        b.cmp(a)
    }

    fn equal(&self, a: &[u8], b: &[u8]) -> bool {
        a == b
    }
}

/// Shared handle to the bytewise comparator.
#[must_use]
pub fn bytewise() -> Arc<dyn Comparator> {
    Arc::new(BytewiseComparator)
}

/// Default comparator plus per-column-family overrides.
#[derive(Clone)]
#[allow(clippy::disallowed_methods)] // cloning shares the Arc'd comparators
pub struct ComparatorSet {
    default: Arc<dyn Comparator>,
    overrides: HashMap<ColumnFamilyId, Arc<dyn Comparator>>,
}

impl ComparatorSet {
    #[must_use]
    pub fn new(default: Arc<dyn Comparator>) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Comparator used for column families without an override.
    #[must_use]
    pub const fn default_comparator(&self) -> &Arc<dyn Comparator> {
        &self.default
    }

    /// Register the comparator for `column_family`.
    ///
    /// The first registration sticks. Registering a comparator with another
    /// name for the same column family fails with `InvalidArgument`, since the
    /// entries already indexed are ordered by the first one.
    pub fn register(
        &mut self,
        column_family: ColumnFamilyId,
        comparator: Arc<dyn Comparator>,
    ) -> Result<(), WriteBatchError> {
        match self.overrides.entry(column_family) {
            Entry::Occupied(existing) => {
                if existing.get().name() == comparator.name() {
                    Ok(())
                } else {
                    Err(WriteBatchError::invalid_argument(format!(
                        "column family {column_family} is ordered by {}, not {}",
                        existing.get().name(),
                        comparator.name()
                    )))
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(comparator);
                Ok(())
            }
        }
    }

    /// Comparator for `column_family`.
    #[must_use]
    pub fn get(&self, column_family: ColumnFamilyId) -> &Arc<dyn Comparator> {
        self.overrides.get(&column_family).unwrap_or(&self.default)
    }

    /// Compare two keys of `column_family`.
    #[must_use]
    pub fn compare_key(&self, column_family: ColumnFamilyId, a: &[u8], b: &[u8]) -> Ordering {
        self.get(column_family).compare(a, b)
    }
}

impl fmt::Debug for ComparatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut overrides: Vec<_> = self
            .overrides
            .iter()
            .map(|(cf, c)| (*cf, c.name()))
            .collect();
        overrides.sort_unstable();
        f.debug_struct("ComparatorSet")
            .field("default", &self.default.name())
            .field("overrides", &overrides)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytewise_order() {
        let cmp = BytewiseComparator;
        assert_eq!(cmp.compare(b"a", b"b"), Ordering::Less);
        assert_eq!(cmp.compare(b"ab", b"a"), Ordering::Greater);
        assert!(cmp.equal(b"k", b"k"));
    }

    #[test]
    fn test_reverse_order() {
        let cmp = ReverseBytewiseComparator;
        assert_eq!(cmp.compare(b"a", b"b"), Ordering::Greater);
        assert_eq!(cmp.compare(b"", b"a"), Ordering::Greater);
    }

    #[test]
    fn test_set_falls_back_to_default() {
        let mut set = ComparatorSet::new(bytewise());
        set.register(3, Arc::new(ReverseBytewiseComparator)).unwrap();

        assert_eq!(set.compare_key(0, b"a", b"b"), Ordering::Less);
        assert_eq!(set.compare_key(3, b"a", b"b"), Ordering::Greater);
        assert_eq!(set.get(7).name(), "leveldb.BytewiseComparator");
        assert_eq!(
            format!("{set:?}"),
            "ComparatorSet { default: \"leveldb.BytewiseComparator\", overrides: [(3, \"rocksdb.ReverseBytewiseComparator\")] }"
        );
    }

    #[test]
    fn test_first_registration_sticks() {
        let mut set = ComparatorSet::new(bytewise());
        set.register(1, Arc::new(ReverseBytewiseComparator)).unwrap();
        set.register(1, Arc::new(ReverseBytewiseComparator)).unwrap();

        let err = set.register(1, bytewise()).unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(set.get(1).name(), "rocksdb.ReverseBytewiseComparator");
        assert_eq!(set.compare_key(1, b"a", b"b"), Ordering::Greater);
    }
}
