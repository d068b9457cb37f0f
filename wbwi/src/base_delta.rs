//! Ordered view of a batch layered on top of an engine iterator.
//!
//! [`BaseDeltaIterator`] walks two cursors in lock step: the *base* (any
//! [`DbIterator`] over committed engine state) and the *delta* (a
//! [`WbwiIterator`] over the batch). At every position it surfaces the smaller
//! key in the direction of travel; on a tie the delta wins and the base entry is
//! skipped. Delete and single-delete entries in the delta hide the base entry
//! with the same key and are never surfaced.
//!
//! The delta moves key by key and only ever sits on the newest write of a key,
//! so keys come out strictly ordered whether or not the batch overwrites keys.
//! Merge entries are surfaced as they are, not folded, and range deletions do
//! not hide base keys.
//!
//! # Invariants
//!
//! While valid and both sides are valid, moving forward:
//! - `current_at_base` implies base key < delta key
//! - otherwise delta key <= base key, with `equal_keys` iff they are equal
//!
//! Moving backward the comparisons flip.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::Comparator;
use crate::error::WriteBatchError;
use crate::index::WbwiIterator;

/// Cursor over an ordered key space.
///
/// `key` and `value` may only be called while `valid()`; implementations
/// return empty slices otherwise.
pub trait DbIterator {
    fn valid(&self) -> bool;
    fn seek_to_first(&mut self);
    fn seek_to_last(&mut self);
    /// Position at the first key `>= key`.
    fn seek(&mut self, key: &[u8]);
    /// Position at the last key `<= key`.
    fn seek_for_prev(&mut self, key: &[u8]);
    fn next(&mut self);
    fn prev(&mut self);
    fn key(&self) -> &[u8];
    fn value(&self) -> &[u8];
    fn status(&self) -> Result<(), WriteBatchError>;
}

/// Read options for iterators built over a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Exclusive upper bound. Only applied to batch entries once the base is
    /// exhausted; the base iterator is expected to honour it itself.
    pub iterate_upper_bound: Option<Vec<u8>>,
}

impl ReadOptions {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            iterate_upper_bound: None,
        }
    }

    #[must_use]
    pub fn with_iterate_upper_bound(mut self, bound: impl Into<Vec<u8>>) -> Self {
        self.iterate_upper_bound = Some(bound.into());
        self
    }
}

/// In-memory [`DbIterator`] over sorted key/value pairs.
pub struct VecIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    comparator: Arc<dyn Comparator>,
    position: Option<usize>,
}

impl VecIterator {
    /// Sort `entries` under `comparator`; duplicate keys are kept.
    #[must_use]
    pub fn new(mut entries: Vec<(Vec<u8>, Vec<u8>)>, comparator: Arc<dyn Comparator>) -> Self {
        entries.sort_by(|a, b| comparator.compare(&a.0, &b.0));
        Self {
            entries,
            comparator,
            position: None,
        }
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn current(&self) -> Option<&(Vec<u8>, Vec<u8>)> {
        self.position.and_then(|i| self.entries.get(i))
    }
}

impl std::fmt::Debug for VecIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VecIterator")
            .field("len", &self.entries.len())
            .field("comparator", &self.comparator.name())
            .field("position", &self.position)
            .finish()
    }
}

impl DbIterator for VecIterator {
    fn valid(&self) -> bool {
        self.current().is_some()
    }

    fn seek_to_first(&mut self) {
        self.position = if self.entries.is_empty() { None } else { Some(0) };
    }

    fn seek_to_last(&mut self) {
        self.position = self.entries.len().checked_sub(1);
    }

    fn seek(&mut self, key: &[u8]) {
        let i = self
            .entries
            .partition_point(|(k, _)| self.comparator.compare(k, key) == Ordering::Less);
        self.position = (i < self.entries.len()).then_some(i);
    }

    fn seek_for_prev(&mut self, key: &[u8]) {
        let i = self
            .entries
            .partition_point(|(k, _)| self.comparator.compare(k, key) != Ordering::Greater);
        self.position = i.checked_sub(1);
    }

    fn next(&mut self) {
        self.position = self
            .position
            .map(|i| i + 1)
            .filter(|&i| i < self.entries.len());
    }

    fn prev(&mut self) {
        self.position = self.position.and_then(|i| i.checked_sub(1));
    }

    fn key(&self) -> &[u8] {
        self.current().map_or(&[], |(k, _)| k.as_slice())
    }

    fn value(&self) -> &[u8] {
        self.current().map_or(&[], |(_, v)| v.as_slice())
    }

    fn status(&self) -> Result<(), WriteBatchError> {
        Ok(())
    }
}

/// Merged view of a base iterator and a batch iterator.
pub struct BaseDeltaIterator<'a, B> {
    forward: bool,
    current_at_base: bool,
    equal_keys: bool,
    status: Option<WriteBatchError>,
    base: B,
    delta: WbwiIterator<'a>,
    comparator: Arc<dyn Comparator>,
    iterate_upper_bound: Option<Vec<u8>>,
}

impl<'a, B: DbIterator> BaseDeltaIterator<'a, B> {
    /// `comparator` must be the order of both iterators.
    #[must_use]
    pub fn new(
        base: B,
        delta: WbwiIterator<'a>,
        comparator: Arc<dyn Comparator>,
        read_options: ReadOptions,
    ) -> Self {
        Self {
            forward: true,
            current_at_base: true,
            equal_keys: false,
            status: None,
            base,
            delta,
            comparator,
            iterate_upper_bound: read_options.iterate_upper_bound,
        }
    }

    /// Whether the current entry comes from the batch.
    #[must_use]
    pub fn is_from_batch(&self) -> bool {
        self.valid() && !self.current_at_base
    }

    /// Whether the current entry is a batch write covered by a later range
    /// deletion.
    #[must_use]
    pub fn is_in_deleted_range(&self) -> bool {
        self.is_from_batch() && self.delta.entry().is_some_and(|e| e.is_in_deleted_range)
    }

    #[must_use]
    pub const fn base(&self) -> &B {
        &self.base
    }

    #[must_use]
    pub fn into_base(self) -> B {
        self.base
    }

    fn advance(&mut self) {
        if self.equal_keys {
            self.advance_base();
            self.advance_delta();
        } else if self.current_at_base {
            self.advance_base();
        } else {
            self.advance_delta();
        }
        self.update_current();
    }

    fn advance_delta(&mut self) {
        if self.forward {
            self.delta.next_key();
        } else {
            self.delta.prev_key();
        }
    }

    fn advance_base(&mut self) {
        if self.forward {
            self.base.next();
        } else {
            self.base.prev();
        }
    }

    /// Turn around so the next advance moves in `forward`'s direction.
    fn reverse(&mut self, forward: bool) {
        self.forward = forward;
        self.equal_keys = false;
        if !self.base.valid() {
            if forward {
                self.base.seek_to_first();
            } else {
                self.base.seek_to_last();
            }
        } else if !self.delta.valid() {
            if forward {
                self.delta.seek_to_first();
                self.delta.skip_to_newest();
            } else {
                self.delta.seek_to_last();
            }
        } else if self.current_at_base {
            self.advance_delta();
        } else {
            self.advance_base();
        }
        if self.base.valid() {
            self.equal_keys = self
                .delta
                .entry()
                .is_some_and(|entry| self.comparator.equal(entry.key, self.base.key()));
        }
    }

    /// Pick the side to surface, skipping tombstones.
    fn update_current(&mut self) {
        self.status = None;
        loop {
            let delta_entry = self.delta.entry();
            if delta_entry.is_none() && self.delta.status().is_err() {
                self.current_at_base = false;
                return;
            }
            self.equal_keys = false;

            if !self.base.valid() {
                if self.base.status().is_err() {
                    self.current_at_base = true;
                    return;
                }
                let Some(entry) = delta_entry else {
                    return;
                };
                let beyond_bound = self
                    .iterate_upper_bound
                    .as_ref()
                    .is_some_and(|bound| self.comparator.compare(entry.key, bound) != Ordering::Less);
                if beyond_bound {
                    // Both sides are done.
                    self.current_at_base = true;
                    return;
                }
                if entry.write_type.is_tombstone() {
                    self.advance_delta();
                } else {
                    self.current_at_base = false;
                    return;
                }
            } else if let Some(entry) = delta_entry {
                let order = self.comparator.compare(entry.key, self.base.key());
                let order = if self.forward { order } else { order.reverse() };
                if order == Ordering::Greater {
                    self.current_at_base = true;
                    return;
                }
                self.equal_keys = order == Ordering::Equal;
                if !entry.write_type.is_tombstone() {
                    self.current_at_base = false;
                    return;
                }
                self.advance_delta();
                if self.equal_keys {
                    self.advance_base();
                }
            } else {
                self.current_at_base = true;
                return;
            }
        }
    }
}

impl<B: DbIterator> DbIterator for BaseDeltaIterator<'_, B> {
    fn valid(&self) -> bool {
        self.status.is_none()
            && if self.current_at_base {
                self.base.valid()
            } else {
                self.delta.valid()
            }
    }

    fn seek_to_first(&mut self) {
        self.forward = true;
        self.base.seek_to_first();
        self.delta.seek_to_first();
        self.delta.skip_to_newest();
        self.update_current();
    }

    fn seek_to_last(&mut self) {
        self.forward = false;
        self.base.seek_to_last();
        self.delta.seek_to_last();
        self.update_current();
    }

    fn seek(&mut self, key: &[u8]) {
        self.forward = true;
        self.base.seek(key);
        self.delta.seek(key);
        self.delta.skip_to_newest();
        self.update_current();
    }

    fn seek_for_prev(&mut self, key: &[u8]) {
        self.forward = false;
        self.base.seek_for_prev(key);
        self.delta.seek_for_prev(key);
        self.update_current();
    }

    fn next(&mut self) {
        if !self.valid() {
            self.status = Some(WriteBatchError::not_supported("Next() on invalid iterator"));
            return;
        }
        if !self.forward {
            self.reverse(true);
        }
        self.advance();
    }

    fn prev(&mut self) {
        if !self.valid() {
            self.status = Some(WriteBatchError::not_supported("Prev() on invalid iterator"));
            return;
        }
        if self.forward {
            self.reverse(false);
        }
        self.advance();
    }

    fn key(&self) -> &[u8] {
        if self.current_at_base {
            self.base.key()
        } else {
            self.delta.entry().map_or(&[], |e| e.key)
        }
    }

    fn value(&self) -> &[u8] {
        if self.current_at_base {
            self.base.value()
        } else {
            self.delta.entry().map_or(&[], |e| e.value)
        }
    }

    fn status(&self) -> Result<(), WriteBatchError> {
        if let Some(e) = &self.status {
            return Err(e.clone());
        }
        self.base.status()?;
        self.delta.status()
    }
}

impl<B: std::fmt::Debug> std::fmt::Debug for BaseDeltaIterator<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseDeltaIterator")
            .field("forward", &self.forward)
            .field("current_at_base", &self.current_at_base)
            .field("equal_keys", &self.equal_keys)
            .field("status", &self.status)
            .field("base", &self.base)
            .field("delta", &self.delta)
            .field("comparator", &self.comparator.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_family::ColumnFamilyHandle;
    use crate::comparator::{ReverseBytewiseComparator, bytewise};
    use crate::index::WriteBatchWithIndex;
    use crate::options::WriteBatchWithIndexOptions;

    fn base(pairs: &[(&str, &str)]) -> VecIterator {
        VecIterator::new(
            pairs
                .iter()
                .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
                .collect(),
            bytewise(),
        )
    }

    fn pair<I: DbIterator>(iter: &I) -> (String, String) {
        (
            String::from_utf8_lossy(iter.key()).into_owned(),
            String::from_utf8_lossy(iter.value()).into_owned(),
        )
    }

    fn forward<I: DbIterator>(iter: &mut I) -> Vec<(String, String)> {
        let mut out = Vec::new();
        iter.seek_to_first();
        while iter.valid() {
            out.push(pair(iter));
            iter.next();
        }
        out
    }

    fn backward<I: DbIterator>(iter: &mut I) -> Vec<(String, String)> {
        let mut out = Vec::new();
        iter.seek_to_last();
        while iter.valid() {
            out.push(pair(iter));
            iter.prev();
        }
        out
    }

    fn owned(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_vec_iterator() {
        let mut iter = base(&[("c", "3"), ("a", "1"), ("b", "2")]);
        assert_eq!(iter.len(), 3);
        assert_eq!(forward(&mut iter), owned(&[("a", "1"), ("b", "2"), ("c", "3")]));

        iter.seek(b"bb");
        assert_eq!(iter.key(), b"c");
        iter.seek_for_prev(b"bb");
        assert_eq!(iter.key(), b"b");
        iter.seek_for_prev(b"0");
        assert!(!iter.valid());
        assert_eq!(iter.key(), b"");
    }

    #[test]
    fn test_delta_overrides_base() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"b", b"B").unwrap();
        let mut iter =
            wbwi.new_iterator_with_base(None, base(&[("a", "1"), ("c", "3")]), ReadOptions::new());

        assert_eq!(
            forward(&mut iter),
            owned(&[("a", "1"), ("b", "B"), ("c", "3")])
        );
        assert!(iter.status().is_ok());

        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"a", b"A").unwrap();
        let mut iter =
            wbwi.new_iterator_with_base(None, base(&[("a", "1"), ("b", "2")]), ReadOptions::new());
        iter.seek_to_first();
        assert!(iter.is_from_batch());
        assert_eq!(forward(&mut iter), owned(&[("a", "A"), ("b", "2")]));
    }

    #[test]
    fn test_tombstones_hide_base() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.delete(b"b").unwrap();
        wbwi.single_delete(b"c").unwrap();
        wbwi.delete(b"z").unwrap();
        let mut iter = wbwi.new_iterator_with_base(
            None,
            base(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]),
            ReadOptions::new(),
        );

        assert_eq!(forward(&mut iter), owned(&[("a", "1"), ("d", "4")]));
        assert_eq!(backward(&mut iter), owned(&[("d", "4"), ("a", "1")]));
    }

    #[test]
    fn test_empty_base() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"x", b"1").unwrap();
        wbwi.delete(b"y").unwrap();
        wbwi.merge(b"z", b"+").unwrap();
        let mut iter = wbwi.new_iterator_with_base(None, base(&[]), ReadOptions::new());

        assert_eq!(forward(&mut iter), owned(&[("x", "1"), ("z", "+")]));
        assert_eq!(backward(&mut iter), owned(&[("z", "+"), ("x", "1")]));
    }

    #[test]
    fn test_empty_delta() {
        let wbwi = WriteBatchWithIndex::default();
        let mut iter =
            wbwi.new_iterator_with_base(None, base(&[("a", "1"), ("b", "2")]), ReadOptions::new());
        assert_eq!(forward(&mut iter), owned(&[("a", "1"), ("b", "2")]));
        assert_eq!(backward(&mut iter), owned(&[("b", "2"), ("a", "1")]));
    }

    #[test]
    fn test_direction_reversal() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"b", b"B").unwrap();
        let mut iter = wbwi.new_iterator_with_base(
            None,
            base(&[("a", "1"), ("c", "3")]),
            ReadOptions::new(),
        );

        iter.seek_to_first();
        iter.next();
        iter.next();
        assert_eq!(pair(&iter), ("c".to_string(), "3".to_string()));
        iter.prev();
        assert_eq!(pair(&iter), ("b".to_string(), "B".to_string()));
        iter.next();
        assert_eq!(pair(&iter), ("c".to_string(), "3".to_string()));
        iter.prev();
        iter.prev();
        assert_eq!(pair(&iter), ("a".to_string(), "1".to_string()));
        iter.next();
        assert_eq!(pair(&iter), ("b".to_string(), "B".to_string()));
    }

    #[test]
    fn test_reversal_over_equal_keys() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"b", b"B").unwrap();
        let mut iter = wbwi.new_iterator_with_base(
            None,
            base(&[("a", "1"), ("b", "2"), ("c", "3")]),
            ReadOptions::new(),
        );

        iter.seek(b"b");
        assert_eq!(pair(&iter), ("b".to_string(), "B".to_string()));
        iter.prev();
        assert_eq!(pair(&iter), ("a".to_string(), "1".to_string()));
        iter.next();
        assert_eq!(pair(&iter), ("b".to_string(), "B".to_string()));
        iter.next();
        assert_eq!(pair(&iter), ("c".to_string(), "3".to_string()));
        iter.prev();
        assert_eq!(pair(&iter), ("b".to_string(), "B".to_string()));
    }

    #[test]
    fn test_reversal_after_exhausting_one_side() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"d", b"D").unwrap();
        let mut iter = wbwi.new_iterator_with_base(
            None,
            base(&[("a", "1"), ("b", "2")]),
            ReadOptions::new(),
        );

        // The base runs out first.
        iter.seek(b"c");
        assert_eq!(pair(&iter), ("d".to_string(), "D".to_string()));
        iter.prev();
        assert_eq!(pair(&iter), ("b".to_string(), "2".to_string()));

        // The delta runs out first.
        iter.seek_for_prev(b"c");
        assert_eq!(pair(&iter), ("b".to_string(), "2".to_string()));
        iter.next();
        assert_eq!(pair(&iter), ("d".to_string(), "D".to_string()));
    }

    #[test]
    fn test_seek_variants() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"c", b"C").unwrap();
        let mut iter = wbwi.new_iterator_with_base(
            None,
            base(&[("a", "1"), ("e", "5")]),
            ReadOptions::new(),
        );

        iter.seek(b"b");
        assert_eq!(iter.key(), b"c");
        iter.seek(b"d");
        assert_eq!(iter.key(), b"e");
        iter.seek_for_prev(b"d");
        assert_eq!(iter.key(), b"c");
        iter.seek_for_prev(b"b");
        assert_eq!(iter.key(), b"a");
        iter.seek(b"f");
        assert!(!iter.valid());
    }

    #[test]
    fn test_newest_write_wins_without_overwrite() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"b", b"y").unwrap();
        wbwi.delete(b"b").unwrap();
        let base_pairs = [("a", "1"), ("b", "2"), ("c", "3")];
        let mut iter = wbwi.new_iterator_with_base(None, base(&base_pairs), ReadOptions::new());
        assert_eq!(forward(&mut iter), owned(&[("a", "1"), ("c", "3")]));
        assert_eq!(backward(&mut iter), owned(&[("c", "3"), ("a", "1")]));
        assert_eq!(wbwi.get_from_batch(b"b").unwrap(), None);

        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"b", b"y").unwrap();
        wbwi.put(b"d", b"z").unwrap();
        wbwi.put(b"b", b"w").unwrap();
        wbwi.put(b"d", b"x").unwrap();
        let mut iter = wbwi.new_iterator_with_base(None, base(&base_pairs), ReadOptions::new());
        assert_eq!(
            forward(&mut iter),
            owned(&[("a", "1"), ("b", "w"), ("c", "3"), ("d", "x")])
        );
        assert_eq!(
            backward(&mut iter),
            owned(&[("d", "x"), ("c", "3"), ("b", "w"), ("a", "1")])
        );

        iter.seek(b"b");
        assert_eq!(pair(&iter), ("b".to_string(), "w".to_string()));
        iter.prev();
        assert_eq!(pair(&iter), ("a".to_string(), "1".to_string()));
        iter.seek_for_prev(b"b");
        assert_eq!(pair(&iter), ("b".to_string(), "w".to_string()));
        iter.next();
        assert_eq!(pair(&iter), ("c".to_string(), "3".to_string()));
    }

    #[test]
    fn test_newest_merge_is_surfaced() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"b", b"y").unwrap();
        wbwi.merge(b"b", b"+").unwrap();
        wbwi.delete(b"c").unwrap();
        wbwi.merge(b"c", b"*").unwrap();
        let mut iter =
            wbwi.new_iterator_with_base(None, base(&[("b", "2"), ("c", "3")]), ReadOptions::new());

        assert_eq!(forward(&mut iter), owned(&[("b", "+"), ("c", "*")]));
        assert_eq!(backward(&mut iter), owned(&[("c", "*"), ("b", "+")]));
    }

    #[test]
    fn test_duplicate_writes_with_overwrite() {
        let mut wbwi =
            WriteBatchWithIndex::new(WriteBatchWithIndexOptions::new().with_overwrite_key(true));
        wbwi.put(b"a", b"x").unwrap();
        wbwi.put(b"b", b"y").unwrap();
        wbwi.put(b"c", b"z").unwrap();
        wbwi.put(b"b", b"w").unwrap();
        let mut iter = wbwi.new_iterator_with_base(None, base(&[]), ReadOptions::new());

        assert_eq!(
            forward(&mut iter),
            owned(&[("a", "x"), ("b", "w"), ("c", "z")])
        );
    }

    #[test]
    fn test_upper_bound_stops_delta_only_tail() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"b", b"B").unwrap();
        wbwi.put(b"m", b"M").unwrap();
        wbwi.put(b"y", b"Y").unwrap();
        let mut iter = wbwi.new_iterator_with_base(
            None,
            base(&[("a", "1")]),
            ReadOptions::new().with_iterate_upper_bound(b"m".to_vec()),
        );

        assert_eq!(forward(&mut iter), owned(&[("a", "1"), ("b", "B")]));
    }

    #[test]
    fn test_next_on_invalid_iterator() {
        let wbwi = WriteBatchWithIndex::default();
        let mut iter = wbwi.new_iterator_with_base(None, base(&[]), ReadOptions::new());
        iter.seek_to_first();
        assert!(!iter.valid());
        assert!(iter.status().is_ok());

        iter.next();
        assert!(iter.status().unwrap_err().is_not_supported());
        iter.prev();
        assert_eq!(
            iter.status(),
            Err(WriteBatchError::not_supported("Prev() on invalid iterator"))
        );

        // A seek clears the error.
        iter.seek_to_last();
        assert!(iter.status().is_ok());
    }

    #[test]
    fn test_range_deleted_entries_are_flagged() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"b", b"B").unwrap();
        wbwi.delete_range(b"a", b"c").unwrap();
        let mut iter = wbwi.new_iterator_with_base(None, base(&[]), ReadOptions::new());
        iter.seek_to_first();
        assert_eq!(iter.key(), b"b");
        assert!(iter.is_in_deleted_range());
    }

    #[test]
    fn test_column_family_order() {
        let reversed = ColumnFamilyHandle::new(1, "reversed")
            .with_comparator(Arc::new(ReverseBytewiseComparator));
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put_cf(&reversed, b"b", b"B").unwrap();
        wbwi.put(b"z", b"default").unwrap();

        let base = VecIterator::new(
            vec![(b"a".to_vec(), b"1".to_vec()), (b"c".to_vec(), b"3".to_vec())],
            Arc::new(ReverseBytewiseComparator),
        );
        let mut iter = wbwi.new_iterator_with_base(Some(&reversed), base, ReadOptions::new());
        assert_eq!(
            forward(&mut iter),
            owned(&[("c", "3"), ("b", "B"), ("a", "1")])
        );
    }

    #[test]
    fn test_monotonic_against_model() {
        use std::collections::BTreeMap;

        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        for overwrite_key in [false, true] {
            for round in 0..40 {
                let mut model: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
                let mut base_pairs = Vec::new();
                for k in 0..16u8 {
                    if rng.random_bool(0.5) {
                        let key = vec![b'a' + k];
                        base_pairs.push((key.clone(), b"base".to_vec()));
                        model.insert(key, b"base".to_vec());
                    }
                }

                let mut wbwi = WriteBatchWithIndex::new(
                    WriteBatchWithIndexOptions::new()
                        .with_overwrite_key(overwrite_key)
                        .with_seed(round),
                );
                for i in 0..24 {
                    let key = vec![b'a' + rng.random_range(0..16u8)];
                    let value = format!("delta{i}").into_bytes();
                    match rng.random_range(0..10) {
                        0..=2 => {
                            wbwi.delete(&key).unwrap();
                            model.remove(&key);
                        }
                        3 | 4 => {
                            wbwi.merge(&key, &value).unwrap();
                            model.insert(key, value);
                        }
                        _ => {
                            wbwi.put(&key, &value).unwrap();
                            model.insert(key, value);
                        }
                    }
                }

                let expected: Vec<(Vec<u8>, Vec<u8>)> = model.into_iter().collect();
                let mut iter = wbwi.new_iterator_with_base(
                    None,
                    VecIterator::new(base_pairs, bytewise()),
                    ReadOptions::new(),
                );

                let mut seen = Vec::new();
                iter.seek_to_first();
                while iter.valid() {
                    seen.push((iter.key().to_vec(), iter.value().to_vec()));
                    iter.next();
                }
                assert_eq!(seen, expected, "overwrite_key {overwrite_key} round {round}");
                assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));

                let mut reversed = Vec::new();
                iter.seek_to_last();
                while iter.valid() {
                    reversed.push((iter.key().to_vec(), iter.value().to_vec()));
                    iter.prev();
                }
                reversed.reverse();
                assert_eq!(reversed, expected, "overwrite_key {overwrite_key} round {round}");
            }
        }
    }
}
