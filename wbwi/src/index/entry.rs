//! Index entries and the order they are kept in.
//!
//! An [`IndexEntry`] refers to a record of the batch by offset and to the
//! record's key by span, so the index never copies keys. Lookups use a
//! [`SearchProbe`] that borrows an external key instead of pointing into the
//! batch; probes are compared against entries but never stored.
//!
//! # Order
//!
//! Entries are ordered by column family, then key (under the column family's
//! comparator), then offset. Since offsets grow with every append, entries for
//! the same key are in insertion order.

use std::cmp::Ordering;

use crate::column_family::ColumnFamilyId;
use crate::comparator::ComparatorSet;

/// A record of the batch, as stored in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub column_family: ColumnFamilyId,
    /// Offset of the record in the batch.
    pub offset: usize,
    /// Span of the record's key in the batch.
    pub key_offset: usize,
    pub key_size: usize,
    /// A range deletion added after this record covers its key.
    pub is_in_deleted_range: bool,
}

impl IndexEntry {
    #[must_use]
    pub fn key<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.key_offset..self.key_offset + self.key_size]
    }
}

/// Seek target for the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchProbe<'k> {
    pub column_family: ColumnFamilyId,
    /// `None` sorts before every entry of the column family.
    pub key: Option<&'k [u8]>,
    pub offset: usize,
}

impl<'k> SearchProbe<'k> {
    /// Probe for `key`, positioned relative to entries of the key by `offset`.
    #[must_use]
    pub const fn key(column_family: ColumnFamilyId, key: &'k [u8], offset: usize) -> Self {
        Self {
            column_family,
            key: Some(key),
            offset,
        }
    }

    /// Probe that sorts before every entry of `column_family`.
    #[must_use]
    pub const fn min_in_cf(column_family: ColumnFamilyId) -> Self {
        Self {
            column_family,
            key: None,
            offset: 0,
        }
    }
}

/// Entry order over a particular batch.
#[derive(Debug, Clone, Copy)]
pub struct EntryOrder<'a> {
    data: &'a [u8],
    comparators: &'a ComparatorSet,
}

impl<'a> EntryOrder<'a> {
    #[must_use]
    pub const fn new(data: &'a [u8], comparators: &'a ComparatorSet) -> Self {
        Self { data, comparators }
    }

    /// Compare two stored entries.
    #[must_use]
    pub fn entries(&self, a: &IndexEntry, b: &IndexEntry) -> Ordering {
        a.column_family.cmp(&b.column_family).then_with(|| {
            self.comparators
                .compare_key(a.column_family, a.key(self.data), b.key(self.data))
                .then(a.offset.cmp(&b.offset))
        })
    }

    /// Compare a stored entry against a probe.
    #[must_use]
    pub fn probe(&self, entry: &IndexEntry, probe: &SearchProbe<'_>) -> Ordering {
        entry.column_family.cmp(&probe.column_family).then_with(|| match probe.key {
            None => Ordering::Greater,
            Some(key) => self
                .comparators
                .compare_key(entry.column_family, entry.key(self.data), key)
                .then(entry.offset.cmp(&probe.offset)),
        })
    }

    /// Whether `entry`'s key equals `key` under the column family's comparator.
    #[must_use]
    pub fn key_matches(&self, entry: &IndexEntry, key: &[u8]) -> bool {
        self.comparators
            .get(entry.column_family)
            .equal(entry.key(self.data), key)
    }

    /// Compare `entry`'s key against `key` under the column family's comparator.
    #[must_use]
    pub fn compare_key(&self, entry: &IndexEntry, key: &[u8]) -> Ordering {
        self.comparators
            .compare_key(entry.column_family, entry.key(self.data), key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::comparator::{ReverseBytewiseComparator, bytewise};

    fn entry(cf: ColumnFamilyId, offset: usize, key_offset: usize) -> IndexEntry {
        IndexEntry {
            column_family: cf,
            offset,
            key_offset,
            key_size: 1,
            is_in_deleted_range: false,
        }
    }

    #[test]
    fn test_entries_order_by_cf_key_offset() {
        let data = b"abc";
        let comparators = ComparatorSet::new(bytewise());
        let order = EntryOrder::new(data, &comparators);

        let a0 = entry(0, 10, 0);
        let b0 = entry(0, 5, 1);
        let a0_later = entry(0, 20, 0);
        let a1 = entry(1, 1, 0);

        assert_eq!(order.entries(&a0, &b0), Ordering::Less);
        assert_eq!(order.entries(&a0, &a0_later), Ordering::Less);
        assert_eq!(order.entries(&b0, &a1), Ordering::Less);
        assert_eq!(order.entries(&a0, &a0), Ordering::Equal);
    }

    #[test]
    fn test_probe_order() {
        let data = b"abc";
        let comparators = ComparatorSet::new(bytewise());
        let order = EntryOrder::new(data, &comparators);
        let b = entry(2, 40, 1);

        assert_eq!(order.probe(&b, &SearchProbe::min_in_cf(2)), Ordering::Greater);
        assert_eq!(order.probe(&b, &SearchProbe::min_in_cf(3)), Ordering::Less);
        assert_eq!(order.probe(&b, &SearchProbe::key(2, b"b", 0)), Ordering::Greater);
        assert_eq!(order.probe(&b, &SearchProbe::key(2, b"b", usize::MAX)), Ordering::Less);
        assert_eq!(order.probe(&b, &SearchProbe::key(2, b"c", 0)), Ordering::Less);
        assert!(order.key_matches(&b, b"b"));
        assert_eq!(order.compare_key(&b, b"a"), Ordering::Greater);
    }

    #[test]
    fn test_column_family_comparator_applies() {
        let data = b"ab";
        let mut comparators = ComparatorSet::new(bytewise());
        comparators.register(1, Arc::new(ReverseBytewiseComparator)).unwrap();
        let order = EntryOrder::new(data, &comparators);

        assert_eq!(order.entries(&entry(0, 1, 0), &entry(0, 2, 1)), Ordering::Less);
        assert_eq!(order.entries(&entry(1, 1, 0), &entry(1, 2, 1)), Ordering::Greater);
    }
}
