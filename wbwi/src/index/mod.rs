//! Write batch with a searchable index.
//!
//! [`WriteBatchWithIndex`] pairs a [`WriteBatch`] with a skip list of
//! [`IndexEntry`] values ordered by `(column family, key, offset)`, so a
//! transaction can read its own pending writes. Range deletions are not indexed
//! per key: they go into a [`DeletedRangeMap`] and mark the index entries they
//! cover.
//!
//! # Invariants
//!
//! - Every index entry points at a put, merge, delete or single delete record
//!   whose key is the entry's key span
//! - Without `overwrite_key`, there is one index entry per such record
//! - An entry is marked `is_in_deleted_range` iff a range deletion appended
//!   after its record covers its key
//! - The deleted range map is the union of every range deletion in the batch
//!
//! # Concurrency
//!
//! Mutators take `&mut self`; readers and iterators borrow `&self`. An
//! iterator therefore always sees the batch as it was when it was created.

mod entry;
mod iterator;
mod lookup;

use std::cmp::Ordering;
use std::sync::Arc;

pub use entry::{EntryOrder, IndexEntry, SearchProbe};
pub use iterator::{WbwiIterator, WriteEntry};
pub use lookup::{BaseReader, BatchLookup};

use crate::base_delta::{BaseDeltaIterator, DbIterator, ReadOptions};
use crate::column_family::{ColumnFamilyHandle, ColumnFamilyId, DEFAULT_COLUMN_FAMILY};
use crate::comparator::ComparatorSet;
use crate::deleted_range_map::{DeletedRange, DeletedRangeMap, RangePoint};
use crate::error::WriteBatchError;
use crate::options::WriteBatchWithIndexOptions;
use crate::record::WriteType;
use crate::skiplist::SkipList;
use crate::write_batch::{SavePoint, WriteBatch, WriteBatchHandler};

/// A write batch that can be searched by key.
#[derive(Debug)]
pub struct WriteBatchWithIndex {
    batch: WriteBatch,
    index: SkipList<IndexEntry>,
    deleted_ranges: DeletedRangeMap,
    comparators: ComparatorSet,
    overwrite_key: bool,
    seed: u64,
    /// Offset of the record appended last.
    last_entry_offset: usize,
    sub_batch_count: usize,
    /// Offset of the first record of the current sub-batch.
    last_sub_batch_offset: usize,
}

impl Default for WriteBatchWithIndex {
    fn default() -> Self {
        Self::new(WriteBatchWithIndexOptions::default())
    }
}

impl WriteBatchWithIndex {
    #[must_use]
    #[allow(clippy::disallowed_methods)] // Arc::clone shares the default comparator
    pub fn new(options: WriteBatchWithIndexOptions) -> Self {
        let mut batch = WriteBatch::with_reserved_bytes(options.reserved_bytes);
        batch.set_max_bytes(options.max_bytes);
        Self {
            batch,
            index: SkipList::new(options.seed),
            deleted_ranges: DeletedRangeMap::new(options.seed),
            comparators: ComparatorSet::new(Arc::clone(&options.default_comparator)),
            overwrite_key: options.overwrite_key,
            seed: options.seed,
            last_entry_offset: 0,
            sub_batch_count: 1,
            last_sub_batch_offset: 0,
        }
    }

    /// Index an existing batch.
    ///
    /// Records of column families other than the default are ordered by the
    /// default comparator unless `handles` registers another one.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if a record fails to decode or the header count
    /// does not match the records, and `InvalidArgument` if two handles give
    /// one column family different comparators.
    pub fn from_write_batch(
        batch: WriteBatch,
        handles: &[ColumnFamilyHandle],
        options: WriteBatchWithIndexOptions,
    ) -> Result<Self, WriteBatchError> {
        let mut wbwi = Self::new(options);
        for handle in handles {
            wbwi.register(handle)?;
        }
        let max_bytes = wbwi.batch.max_bytes();
        wbwi.batch = batch;
        wbwi.batch.set_max_bytes(max_bytes);
        wbwi.rebuild_index()?;
        Ok(wbwi)
    }

    /// The underlying batch.
    #[must_use]
    pub const fn write_batch(&self) -> &WriteBatch {
        &self.batch
    }

    #[must_use]
    pub fn into_write_batch(self) -> WriteBatch {
        self.batch
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.batch.data()
    }

    #[must_use]
    pub fn data_size(&self) -> usize {
        self.batch.data_size()
    }

    /// Number of counted records in the batch.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.batch.count()
    }

    /// Number of index entries.
    #[must_use]
    pub const fn index_len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub const fn overwrite_key(&self) -> bool {
        self.overwrite_key
    }

    /// Number of sub-batches: a new one starts whenever a key already written
    /// in the current sub-batch is written again. Only tracked with
    /// `overwrite_key`.
    #[must_use]
    pub const fn sub_batch_count(&self) -> usize {
        self.sub_batch_count
    }

    #[must_use]
    pub const fn has_put(&self) -> bool {
        self.batch.has_put()
    }

    #[must_use]
    pub const fn has_delete(&self) -> bool {
        self.batch.has_delete()
    }

    #[must_use]
    pub const fn has_single_delete(&self) -> bool {
        self.batch.has_single_delete()
    }

    #[must_use]
    pub const fn has_delete_range(&self) -> bool {
        self.batch.has_delete_range()
    }

    #[must_use]
    pub const fn has_merge(&self) -> bool {
        self.batch.has_merge()
    }

    #[must_use]
    pub const fn has_begin_prepare(&self) -> bool {
        self.batch.has_begin_prepare()
    }

    #[must_use]
    pub const fn has_end_prepare(&self) -> bool {
        self.batch.has_end_prepare()
    }

    #[must_use]
    pub const fn has_commit(&self) -> bool {
        self.batch.has_commit()
    }

    #[must_use]
    pub const fn has_rollback(&self) -> bool {
        self.batch.has_rollback()
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), WriteBatchError> {
        let offset = self.batch.put(DEFAULT_COLUMN_FAMILY, key, value)?;
        self.add_or_update_index(DEFAULT_COLUMN_FAMILY, offset, WriteType::Put)
    }

    pub fn put_cf(
        &mut self,
        column_family: &ColumnFamilyHandle,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), WriteBatchError> {
        self.register(column_family)?;
        let offset = self.batch.put(column_family.id(), key, value)?;
        self.add_or_update_index(column_family.id(), offset, WriteType::Put)
    }

    pub fn merge(&mut self, key: &[u8], value: &[u8]) -> Result<(), WriteBatchError> {
        let offset = self.batch.merge(DEFAULT_COLUMN_FAMILY, key, value)?;
        self.add_or_update_index(DEFAULT_COLUMN_FAMILY, offset, WriteType::Merge)
    }

    pub fn merge_cf(
        &mut self,
        column_family: &ColumnFamilyHandle,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), WriteBatchError> {
        self.register(column_family)?;
        let offset = self.batch.merge(column_family.id(), key, value)?;
        self.add_or_update_index(column_family.id(), offset, WriteType::Merge)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<(), WriteBatchError> {
        let offset = self.batch.delete(DEFAULT_COLUMN_FAMILY, key)?;
        self.add_or_update_index(DEFAULT_COLUMN_FAMILY, offset, WriteType::Delete)
    }

    pub fn delete_cf(
        &mut self,
        column_family: &ColumnFamilyHandle,
        key: &[u8],
    ) -> Result<(), WriteBatchError> {
        self.register(column_family)?;
        let offset = self.batch.delete(column_family.id(), key)?;
        self.add_or_update_index(column_family.id(), offset, WriteType::Delete)
    }

    pub fn single_delete(&mut self, key: &[u8]) -> Result<(), WriteBatchError> {
        let offset = self.batch.single_delete(DEFAULT_COLUMN_FAMILY, key)?;
        self.add_or_update_index(DEFAULT_COLUMN_FAMILY, offset, WriteType::SingleDelete)
    }

    pub fn single_delete_cf(
        &mut self,
        column_family: &ColumnFamilyHandle,
        key: &[u8],
    ) -> Result<(), WriteBatchError> {
        self.register(column_family)?;
        let offset = self.batch.single_delete(column_family.id(), key)?;
        self.add_or_update_index(column_family.id(), offset, WriteType::SingleDelete)
    }

    /// Delete every key in `[begin_key, end_key)` of the default column family.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless `begin_key < end_key`; the batch is left
    /// untouched.
    pub fn delete_range(&mut self, begin_key: &[u8], end_key: &[u8]) -> Result<(), WriteBatchError> {
        self.delete_range_in(DEFAULT_COLUMN_FAMILY, begin_key, end_key)
    }

    pub fn delete_range_cf(
        &mut self,
        column_family: &ColumnFamilyHandle,
        begin_key: &[u8],
        end_key: &[u8],
    ) -> Result<(), WriteBatchError> {
        self.register(column_family)?;
        self.delete_range_in(column_family.id(), begin_key, end_key)
    }

    /// Append a blob that is replayed to handlers but never indexed.
    pub fn put_log_data(&mut self, blob: &[u8]) -> Result<(), WriteBatchError> {
        let offset = self.batch.put_log_data(blob)?;
        self.last_entry_offset = offset;
        Ok(())
    }

    /// Remove every record, index entry, deleted range and save point.
    pub fn clear(&mut self) {
        self.batch.clear();
        self.clear_index();
    }

    pub fn set_save_point(&mut self) {
        self.batch.set_save_point();
    }

    /// Undo every mutation since the newest save point.
    ///
    /// The index and the deleted ranges are rebuilt from the surviving records,
    /// so range deletions issued after the save point are undone as well.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no save point.
    pub fn rollback_to_save_point(&mut self) -> Result<(), WriteBatchError> {
        let save_point = self.batch.rollback_to_save_point()?;
        tracing::debug!(
            "rebuilding index after rollback to save point at {} bytes",
            save_point.size
        );
        self.rebuild_index()
    }

    pub fn pop_save_point(&mut self) -> Result<(), WriteBatchError> {
        self.batch.pop_save_point()
    }

    /// Limit the batch size; 0 disables the limit.
    pub const fn set_max_bytes(&mut self, max_bytes: usize) {
        self.batch.set_max_bytes(max_bytes);
    }

    pub fn mark_wal_termination_point(&mut self) {
        self.batch.mark_wal_termination_point();
    }

    #[must_use]
    pub const fn wal_termination_point(&self) -> Option<SavePoint> {
        self.batch.wal_termination_point()
    }

    /// Replay the batch into `handler`.
    pub fn iterate(&self, handler: &mut dyn WriteBatchHandler) -> Result<(), WriteBatchError> {
        self.batch.iterate(handler)
    }

    /// Iterator over the default column family.
    #[must_use]
    pub fn new_iterator(&self) -> WbwiIterator<'_> {
        self.iterator_for(DEFAULT_COLUMN_FAMILY)
    }

    /// Iterator over `column_family`.
    #[must_use]
    pub fn new_iterator_cf(&self, column_family: &ColumnFamilyHandle) -> WbwiIterator<'_> {
        self.iterator_for(column_family.id())
    }

    /// Iterator over the batch layered on top of `base`.
    ///
    /// Each key shows up once, with its newest write in the batch.
    #[must_use]
    #[allow(clippy::disallowed_methods)] // Arc::clone shares the comparator with the iterator
    pub fn new_iterator_with_base<B: DbIterator>(
        &self,
        column_family: Option<&ColumnFamilyHandle>,
        base: B,
        read_options: ReadOptions,
    ) -> BaseDeltaIterator<'_, B> {
        let (id, comparator) = column_family.map_or_else(
            || {
                (
                    DEFAULT_COLUMN_FAMILY,
                    Arc::clone(self.comparators.get(DEFAULT_COLUMN_FAMILY)),
                )
            },
            |cf| (cf.id(), Arc::clone(cf.comparator())),
        );
        BaseDeltaIterator::new(base, self.iterator_for(id), comparator, read_options)
    }

    /// Deleted ranges in order.
    #[must_use]
    pub fn deleted_ranges(&self) -> Vec<DeletedRange<'_>> {
        self.deleted_ranges.ranges(self.batch.data())
    }

    /// Whether a range deletion in the batch covers `key`.
    #[must_use]
    pub fn is_in_deleted_range(&self, column_family: ColumnFamilyId, key: &[u8]) -> bool {
        self.deleted_ranges
            .contains(self.batch.data(), &self.comparators, column_family, key)
    }

    /// Bytes held by the record buffer, the index and the deleted ranges.
    #[must_use]
    pub fn approximate_memory_usage(&self) -> usize {
        self.batch.memory_usage() + self.index.memory_usage() + self.deleted_ranges.memory_usage()
    }

    /// Index entries in order.
    pub fn index_entries(&self) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.index.entries()
    }

    /// Order of the index entries.
    #[must_use]
    pub fn entry_order(&self) -> EntryOrder<'_> {
        EntryOrder::new(self.batch.data(), &self.comparators)
    }

    /// Verify that every deleted range alternates correctly.
    #[must_use]
    pub fn check_deleted_ranges(&self) -> bool {
        self.deleted_ranges
            .check_alternation(self.batch.data(), &self.comparators)
    }

    fn iterator_for(&self, column_family: ColumnFamilyId) -> WbwiIterator<'_> {
        WbwiIterator::new(
            column_family,
            self.index.iter(),
            self.entry_order(),
            &self.batch,
        )
    }

    #[allow(clippy::disallowed_methods)] // Arc::clone shares the handle's comparator
    fn register(&mut self, column_family: &ColumnFamilyHandle) -> Result<(), WriteBatchError> {
        self.comparators
            .register(column_family.id(), Arc::clone(column_family.comparator()))
    }

    fn delete_range_in(
        &mut self,
        column_family: ColumnFamilyId,
        begin_key: &[u8],
        end_key: &[u8],
    ) -> Result<(), WriteBatchError> {
        if self.comparators.compare_key(column_family, begin_key, end_key) != Ordering::Less {
            return Err(WriteBatchError::invalid_argument(
                "range deletion requires begin key < end key",
            ));
        }
        let offset = self.batch.delete_range(column_family, begin_key, end_key)?;
        self.last_entry_offset = offset;
        self.apply_range_deletion(column_family, offset)
    }

    /// Mark the entries covered by the range deletion at `offset` and add the
    /// range to the deleted range map.
    fn apply_range_deletion(
        &mut self,
        column_family: ColumnFamilyId,
        offset: usize,
    ) -> Result<(), WriteBatchError> {
        let spans = self.batch.spans_at(offset)?;
        let data = self.batch.data();
        let order = EntryOrder::new(data, &self.comparators);
        let begin = &data[spans.key.clone()];
        let end = &data[spans.value.clone()];

        let mut marked = 0usize;
        let probe = SearchProbe::key(column_family, begin, 0);
        let mut node = self.index.seek(&probe, |e, p| order.probe(e, p));
        while let Some(n) = node {
            let entry = self.index.entry(n);
            if entry.column_family != column_family
                || order.compare_key(entry, end) != Ordering::Less
            {
                break;
            }
            self.index.entry_mut(n).is_in_deleted_range = true;
            marked += 1;
            node = self.index.next(n);
        }
        tracing::trace!("range deletion at offset {offset} covers {marked} index entries");

        self.deleted_ranges.add_range(
            data,
            &self.comparators,
            RangePoint::new(column_family, spans.key.start, spans.key.len()),
            RangePoint::new(column_family, spans.value.start, spans.value.len()),
        );
        Ok(())
    }

    /// Index the record at `offset`, or with `overwrite_key` repoint the newest
    /// entry of the same key at it.
    fn add_or_update_index(
        &mut self,
        column_family: ColumnFamilyId,
        offset: usize,
        write_type: WriteType,
    ) -> Result<(), WriteBatchError> {
        self.last_entry_offset = offset;
        let spans = self.batch.spans_at(offset)?;
        let data = self.batch.data();
        let order = EntryOrder::new(data, &self.comparators);
        let key = &data[spans.key.clone()];

        if self.overwrite_key {
            let probe = SearchProbe::key(column_family, key, usize::MAX);
            let existing = self
                .index
                .seek_for_prev(&probe, |e, p| order.probe(e, p))
                .filter(|&n| {
                    let e = self.index.entry(n);
                    e.column_family == column_family && order.key_matches(e, key)
                });
            if let Some(node) = existing {
                if self.last_sub_batch_offset <= self.index.entry(node).offset {
                    self.last_sub_batch_offset = self.last_entry_offset;
                    self.sub_batch_count += 1;
                }
                if write_type != WriteType::Merge {
                    let entry = self.index.entry_mut(node);
                    entry.offset = offset;
                    entry.key_offset = spans.key.start;
                    entry.key_size = spans.key.len();
                    entry.is_in_deleted_range = false;
                    return Ok(());
                }
            }
        }

        let entry = IndexEntry {
            column_family,
            offset,
            key_offset: spans.key.start,
            key_size: spans.key.len(),
            is_in_deleted_range: false,
        };
        self.index.insert(entry, |a, b| order.entries(a, b));
        Ok(())
    }

    fn clear_index(&mut self) {
        self.index.clear();
        self.deleted_ranges.clear();
        self.last_entry_offset = 0;
        self.sub_batch_count = 1;
        self.last_sub_batch_offset = 0;
    }

    /// Re-create the index and the deleted ranges from the batch records.
    fn rebuild_index(&mut self) -> Result<(), WriteBatchError> {
        self.clear_index();
        let records = self
            .batch
            .records()
            .map(|item| {
                item.map(|(offset, spans)| (offset, spans.column_family, spans.tag.write_type()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut found = 0u32;
        for (offset, column_family, write_type) in records {
            match write_type {
                WriteType::Put | WriteType::Merge | WriteType::Delete | WriteType::SingleDelete => {
                    self.add_or_update_index(column_family, offset, write_type)?;
                }
                WriteType::DeleteRange => {
                    self.last_entry_offset = offset;
                    self.apply_range_deletion(column_family, offset)?;
                }
                WriteType::LogData | WriteType::Xid => self.last_entry_offset = offset,
            }
            if write_type.is_counted() {
                found += 1;
            }
        }

        if found != self.batch.count() {
            return Err(WriteBatchError::corruption(format!(
                "WriteBatch has wrong count: header says {}, found {found}",
                self.batch.count()
            )));
        }
        tracing::debug!(
            "rebuilt write batch index: {} entries, {} deleted ranges (seed {})",
            self.index.len(),
            self.deleted_ranges.len(),
            self.seed
        );
        Ok(())
    }
}
