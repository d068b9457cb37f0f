//! Cursor over the index entries of one column family.

use crate::column_family::ColumnFamilyId;
use crate::error::WriteBatchError;
use crate::index::entry::{EntryOrder, IndexEntry, SearchProbe};
use crate::record::WriteType;
use crate::skiplist::SkipListIter;
use crate::write_batch::WriteBatch;

/// A decoded index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteEntry<'a> {
    pub write_type: WriteType,
    pub key: &'a [u8],
    /// Value or merge operand; empty for deletes.
    pub value: &'a [u8],
    pub is_in_deleted_range: bool,
}

/// Ordered cursor over the entries of one column family.
///
/// The cursor is valid only while it sits on an entry of its column family.
/// A record that fails to decode latches the error into `status()` and leaves
/// the cursor invalid until the next seek.
#[derive(Debug)]
pub struct WbwiIterator<'a> {
    column_family: ColumnFamilyId,
    cursor: SkipListIter<'a, IndexEntry>,
    order: EntryOrder<'a>,
    batch: &'a WriteBatch,
    current: Option<WriteEntry<'a>>,
    status: Option<WriteBatchError>,
}

impl<'a> WbwiIterator<'a> {
    pub(crate) const fn new(
        column_family: ColumnFamilyId,
        cursor: SkipListIter<'a, IndexEntry>,
        order: EntryOrder<'a>,
        batch: &'a WriteBatch,
    ) -> Self {
        Self {
            column_family,
            cursor,
            order,
            batch,
            current: None,
            status: None,
        }
    }

    #[must_use]
    pub const fn column_family(&self) -> ColumnFamilyId {
        self.column_family
    }

    #[must_use]
    pub const fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// Position at the first entry with key `>= key`.
    pub fn seek(&mut self, key: &[u8]) {
        let probe = SearchProbe::key(self.column_family, key, 0);
        let order = self.order;
        self.cursor.seek(&probe, |e, p| order.probe(e, p));
        self.refresh();
    }

    /// Position at the last entry with key `<= key`.
    pub fn seek_for_prev(&mut self, key: &[u8]) {
        let probe = SearchProbe::key(self.column_family, key, usize::MAX);
        let order = self.order;
        self.cursor.seek_for_prev(&probe, |e, p| order.probe(e, p));
        self.refresh();
    }

    pub fn seek_to_first(&mut self) {
        let probe = SearchProbe::min_in_cf(self.column_family);
        let order = self.order;
        self.cursor.seek(&probe, |e, p| order.probe(e, p));
        self.refresh();
    }

    pub fn seek_to_last(&mut self) {
        match self.column_family.checked_add(1) {
            Some(next_cf) => {
                let probe = SearchProbe::min_in_cf(next_cf);
                let order = self.order;
                self.cursor.seek(&probe, |e, p| order.probe(e, p));
                if self.cursor.valid() {
                    self.cursor.prev();
                } else {
                    self.cursor.seek_to_last();
                }
            }
            None => self.cursor.seek_to_last(),
        }
        self.refresh();
    }

    pub fn next(&mut self) {
        if self.status.is_none() {
            self.cursor.next();
            self.refresh();
        }
    }

    pub fn prev(&mut self) {
        if self.status.is_none() {
            self.cursor.prev();
            self.refresh();
        }
    }

    /// Entry under the cursor.
    #[must_use]
    pub const fn entry(&self) -> Option<WriteEntry<'a>> {
        self.current
    }

    /// Whether the cursor is valid and its key equals `key` under the
    /// comparator of `column_family`.
    #[must_use]
    pub fn matches_key(&self, column_family: ColumnFamilyId, key: &[u8]) -> bool {
        self.cursor.entry().is_some_and(|e| {
            self.current.is_some()
                && e.column_family == column_family
                && self.order.key_matches(e, key)
        })
    }

    /// First error hit while decoding, if any.
    ///
    /// # Errors
    ///
    /// Returns the latched decode error.
    pub fn status(&self) -> Result<(), WriteBatchError> {
        self.status.clone().map_or(Ok(()), Err)
    }

    /// Move forward to the newest entry of the current key.
    pub fn skip_to_newest(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        let mut ahead = self.cursor;
        ahead.next();
        if !self.in_run(ahead, current.key) {
            return;
        }
        while self.in_run(ahead, current.key) {
            self.cursor = ahead;
            ahead.next();
        }
        self.refresh();
    }

    /// Move to the newest entry of the next key.
    pub fn next_key(&mut self) {
        if self.status.is_none() {
            self.cursor.next();
            self.refresh();
            self.skip_to_newest();
        }
    }

    /// Move to the newest entry of the previous key.
    pub fn prev_key(&mut self) {
        if self.status.is_some() {
            return;
        }
        let key = self.current.map(|e| e.key);
        self.cursor.prev();
        if let Some(key) = key {
            while self.in_run(self.cursor, key) {
                self.cursor.prev();
            }
        }
        self.refresh();
    }

    fn in_run(&self, cursor: SkipListIter<'a, IndexEntry>, key: &[u8]) -> bool {
        cursor.entry().is_some_and(|e| {
            e.column_family == self.column_family && self.order.key_matches(e, key)
        })
    }

    fn refresh(&mut self) {
        self.status = None;
        self.current = None;
        let Some(entry) = self.cursor.entry() else {
            return;
        };
        if entry.column_family != self.column_family {
            return;
        }
        match self.batch.entry_at(entry.offset) {
            Ok(record) => {
                self.current = Some(WriteEntry {
                    write_type: record.write_type,
                    key: record.key,
                    value: record.value,
                    is_in_deleted_range: entry.is_in_deleted_range,
                });
            }
            Err(e) => {
                tracing::debug!("index entry at offset {} failed to decode: {e}", entry.offset);
                self.status = Some(e);
            }
        }
    }
}
