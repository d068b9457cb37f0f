//! Range deletions of a batch, across column families.
//!
//! Endpoints are `(column family, key)` points ordered by column family, then
//! by that family's comparator. A point does not own its key: it records the
//! span of the key inside the batch's record buffer (the begin and end keys of
//! the range deletion record), so every operation takes the buffer and the
//! comparators alongside.

use std::cmp::Ordering;

use crate::column_family::ColumnFamilyId;
use crate::comparator::ComparatorSet;
use crate::interval_map::IntervalMap;

/// A `(column family, key)` endpoint whose key lives in the record buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePoint {
    pub column_family: ColumnFamilyId,
    pub key_offset: usize,
    pub key_size: usize,
}

impl RangePoint {
    #[must_use]
    pub const fn new(column_family: ColumnFamilyId, key_offset: usize, key_size: usize) -> Self {
        Self {
            column_family,
            key_offset,
            key_size,
        }
    }

    /// The key bytes inside `data`.
    #[must_use]
    pub fn key<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.key_offset..self.key_offset + self.key_size]
    }
}

/// A deleted range, borrowed from the record buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedRange<'a> {
    pub column_family: ColumnFamilyId,
    pub begin: &'a [u8],
    pub end: &'a [u8],
}

/// Union of all range deletions added to a batch.
#[derive(Debug)]
pub struct DeletedRangeMap {
    map: IntervalMap<RangePoint>,
}

impl DeletedRangeMap {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            map: IntervalMap::new(seed),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Number of disjoint deleted ranges.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.map.len() / 2
    }

    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.map.memory_usage()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Add `[from, to)`.
    ///
    /// # Pre-conditions
    /// - Both points belong to the same column family and `from < to`
    /// - Both key spans lie inside `data`
    pub fn add_range(
        &mut self,
        data: &[u8],
        comparators: &ComparatorSet,
        from: RangePoint,
        to: RangePoint,
    ) {
        debug_assert_eq!(from.column_family, to.column_family);
        self.map.add_interval(from, to, |a, b| {
            compare_points(data, comparators, a, b.column_family, b.key(data))
        });
    }

    /// Whether `key` of `column_family` lies inside a deleted range.
    #[must_use]
    pub fn contains(
        &self,
        data: &[u8],
        comparators: &ComparatorSet,
        column_family: ColumnFamilyId,
        key: &[u8],
    ) -> bool {
        self.map.is_in_interval(&(column_family, key), |point, probe| {
            compare_points(data, comparators, point, probe.0, probe.1)
        })
    }

    /// Deleted ranges in order.
    #[must_use]
    pub fn ranges<'a>(&self, data: &'a [u8]) -> Vec<DeletedRange<'a>> {
        self.map
            .intervals()
            .into_iter()
            .map(|(from, to)| DeletedRange {
                column_family: from.column_family,
                begin: from.key(data),
                end: to.key(data),
            })
            .collect()
    }

    /// Verify the alternation invariant of the underlying interval map.
    #[must_use]
    pub fn check_alternation(&self, data: &[u8], comparators: &ComparatorSet) -> bool {
        self.map.check_alternation(|a, b| {
            compare_points(data, comparators, a, b.column_family, b.key(data))
        })
    }
}

fn compare_points(
    data: &[u8],
    comparators: &ComparatorSet,
    point: &RangePoint,
    column_family: ColumnFamilyId,
    key: &[u8],
) -> Ordering {
    point.column_family.cmp(&column_family).then_with(|| {
        comparators.compare_key(column_family, point.key(data), key)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::comparator::{ReverseBytewiseComparator, bytewise};
    use crate::skiplist::DEFAULT_SEED;

    /// Lays keys out back to back and returns a point for each.
    fn layout(keys: &[(ColumnFamilyId, &str)]) -> (Vec<u8>, Vec<RangePoint>) {
        let mut data = Vec::new();
        let mut points = Vec::new();
        for (cf, key) in keys {
            points.push(RangePoint::new(*cf, data.len(), key.len()));
            data.extend_from_slice(key.as_bytes());
        }
        (data, points)
    }

    #[test]
    fn test_ranges_are_per_column_family() {
        let (data, p) = layout(&[(0, "b"), (0, "d"), (1, "a"), (1, "c")]);
        let comparators = ComparatorSet::new(bytewise());
        let mut map = DeletedRangeMap::new(DEFAULT_SEED);
        map.add_range(&data, &comparators, p[0], p[1]);
        map.add_range(&data, &comparators, p[2], p[3]);

        assert_eq!(map.len(), 2);
        assert!(map.contains(&data, &comparators, 0, b"c"));
        assert!(!map.contains(&data, &comparators, 0, b"a"));
        assert!(map.contains(&data, &comparators, 1, b"a"));
        assert!(!map.contains(&data, &comparators, 1, b"c"));
        assert!(!map.contains(&data, &comparators, 2, b"b"));
        assert!(map.check_alternation(&data, &comparators));

        let ranges = map.ranges(&data);
        assert_eq!(
            ranges,
            vec![
                DeletedRange {
                    column_family: 0,
                    begin: b"b",
                    end: b"d"
                },
                DeletedRange {
                    column_family: 1,
                    begin: b"a",
                    end: b"c"
                },
            ]
        );
    }

    #[test]
    fn test_uses_column_family_comparator() {
        // Under reverse order "z" sorts before "a".
        let (data, p) = layout(&[(5, "z"), (5, "m")]);
        let mut comparators = ComparatorSet::new(bytewise());
        comparators.register(5, Arc::new(ReverseBytewiseComparator)).unwrap();

        let mut map = DeletedRangeMap::new(DEFAULT_SEED);
        map.add_range(&data, &comparators, p[0], p[1]);
        assert!(map.contains(&data, &comparators, 5, b"z"));
        assert!(map.contains(&data, &comparators, 5, b"n"));
        assert!(!map.contains(&data, &comparators, 5, b"m"));
        assert!(!map.contains(&data, &comparators, 5, b"a"));
    }

    #[test]
    fn test_merging_across_records() {
        let (data, p) = layout(&[(0, "a"), (0, "c"), (0, "b"), (0, "d")]);
        let comparators = ComparatorSet::new(bytewise());
        let mut map = DeletedRangeMap::new(DEFAULT_SEED);
        map.add_range(&data, &comparators, p[0], p[1]);
        map.add_range(&data, &comparators, p[2], p[3]);

        let ranges = map.ranges(&data);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].begin, b"a");
        assert_eq!(ranges[0].end, b"d");

        map.clear();
        assert!(map.is_empty());
    }
}
