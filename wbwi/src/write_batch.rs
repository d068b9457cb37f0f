//! Append-only record buffer.
//!
//! A [`WriteBatch`] is the serialized form of a group of mutations: a 12-byte
//! header followed by tagged records (see [`crate::record`]). Every append returns
//! the record's offset, which is how the index refers back to it.
//!
//! # Invariants
//!
//! - `rep.len() >= HEADER_SIZE`
//! - The header count equals the number of counted records (puts, merges,
//!   deletes, single deletes and range deletes)
//! - Save points are ordered by size; rolling back truncates to the newest one
//! - With `max_bytes > 0`, `rep.len() <= max_bytes` after every successful call

use crate::column_family::ColumnFamilyId;
use crate::error::WriteBatchError;
use crate::record::{
    HEADER_SIZE, Record, RecordIter, RecordSpans, RecordTag, WriteType, decode_record,
    put_length_prefixed, put_varint32,
};

/// Which kinds of records a batch contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentFlags(u16);

impl ContentFlags {
    pub const PUT: Self = Self(1 << 0);
    pub const DELETE: Self = Self(1 << 1);
    pub const SINGLE_DELETE: Self = Self(1 << 2);
    pub const MERGE: Self = Self(1 << 3);
    pub const BEGIN_PREPARE: Self = Self(1 << 4);
    pub const END_PREPARE: Self = Self(1 << 5);
    pub const COMMIT: Self = Self(1 << 6);
    pub const ROLLBACK: Self = Self(1 << 7);
    pub const DELETE_RANGE: Self = Self(1 << 8);

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Flag set by a record with `tag`.
    #[must_use]
    pub const fn for_tag(tag: RecordTag) -> Self {
        match tag {
            RecordTag::Value | RecordTag::ColumnFamilyValue => Self::PUT,
            RecordTag::Deletion | RecordTag::ColumnFamilyDeletion => Self::DELETE,
            RecordTag::SingleDeletion | RecordTag::ColumnFamilySingleDeletion => {
                Self::SINGLE_DELETE
            }
            RecordTag::Merge | RecordTag::ColumnFamilyMerge => Self::MERGE,
            RecordTag::RangeDeletion | RecordTag::ColumnFamilyRangeDeletion => Self::DELETE_RANGE,
            RecordTag::BeginPrepareXid
            | RecordTag::BeginPersistedPrepareXid
            | RecordTag::BeginUnprepareXid => Self::BEGIN_PREPARE,
            RecordTag::EndPrepareXid => Self::END_PREPARE,
            RecordTag::CommitXid => Self::COMMIT,
            RecordTag::RollbackXid => Self::ROLLBACK,
            RecordTag::LogData | RecordTag::Noop => Self::empty(),
        }
    }
}

/// Size, count and content of a batch at some point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavePoint {
    pub size: usize,
    pub count: u32,
    pub content_flags: ContentFlags,
}

/// Flavour of a begin-prepare marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareKind {
    /// Data is written to the engine after commit.
    Prepare,
    /// Data is persisted at prepare time.
    PersistedPrepare,
    /// Data was written to the engine before prepare.
    Unprepare,
}

impl PrepareKind {
    const fn tag(self) -> RecordTag {
        match self {
            Self::Prepare => RecordTag::BeginPrepareXid,
            Self::PersistedPrepare => RecordTag::BeginPersistedPrepareXid,
            Self::Unprepare => RecordTag::BeginUnprepareXid,
        }
    }
}

/// Receives the records of a batch in order, see [`WriteBatch::iterate`].
///
/// Every method defaults to accepting the record and doing nothing.
pub trait WriteBatchHandler {
    fn put_cf(
        &mut self,
        _column_family: ColumnFamilyId,
        _key: &[u8],
        _value: &[u8],
    ) -> Result<(), WriteBatchError> {
        Ok(())
    }

    fn delete_cf(&mut self, _column_family: ColumnFamilyId, _key: &[u8]) -> Result<(), WriteBatchError> {
        Ok(())
    }

    fn single_delete_cf(
        &mut self,
        _column_family: ColumnFamilyId,
        _key: &[u8],
    ) -> Result<(), WriteBatchError> {
        Ok(())
    }

    fn delete_range_cf(
        &mut self,
        _column_family: ColumnFamilyId,
        _begin_key: &[u8],
        _end_key: &[u8],
    ) -> Result<(), WriteBatchError> {
        Ok(())
    }

    fn merge_cf(
        &mut self,
        _column_family: ColumnFamilyId,
        _key: &[u8],
        _value: &[u8],
    ) -> Result<(), WriteBatchError> {
        Ok(())
    }

    fn log_data(&mut self, _blob: &[u8]) {}

    fn mark_begin_prepare(&mut self, _kind: PrepareKind) -> Result<(), WriteBatchError> {
        Ok(())
    }

    fn mark_end_prepare(&mut self, _xid: &[u8]) -> Result<(), WriteBatchError> {
        Ok(())
    }

    fn mark_commit(&mut self, _xid: &[u8]) -> Result<(), WriteBatchError> {
        Ok(())
    }

    fn mark_rollback(&mut self, _xid: &[u8]) -> Result<(), WriteBatchError> {
        Ok(())
    }

    fn mark_noop(&mut self) -> Result<(), WriteBatchError> {
        Ok(())
    }

    /// Checked before each record; returning false stops the replay early.
    fn should_continue(&mut self) -> bool {
        true
    }
}

/// Serialized group of mutations.
#[derive(Debug, Clone)]
pub struct WriteBatch {
    rep: Vec<u8>,
    content_flags: ContentFlags,
    save_points: Vec<SavePoint>,
    /// 0 means unlimited.
    max_bytes: usize,
    wal_termination_point: Option<SavePoint>,
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::with_reserved_bytes(0)
    }

    /// Create an empty batch with room for `reserved_bytes` before it reallocates.
    #[must_use]
    pub fn with_reserved_bytes(reserved_bytes: usize) -> Self {
        let mut rep = Vec::with_capacity(reserved_bytes.max(HEADER_SIZE));
        rep.resize(HEADER_SIZE, 0);
        Self {
            rep,
            content_flags: ContentFlags::empty(),
            save_points: Vec::new(),
            max_bytes: 0,
            wal_termination_point: None,
        }
    }

    /// Adopt serialized batch contents.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` if `data` is shorter than the header or any record
    /// fails to decode.
    pub fn from_data(data: Vec<u8>) -> Result<Self, WriteBatchError> {
        if data.len() < HEADER_SIZE {
            return Err(WriteBatchError::corruption("malformed WriteBatch (too small)"));
        }
        let mut content_flags = ContentFlags::empty();
        for item in RecordIter::new(&data) {
            let (_, spans) = item?;
            content_flags.insert(ContentFlags::for_tag(spans.tag));
        }
        Ok(Self {
            rep: data,
            content_flags,
            save_points: Vec::new(),
            max_bytes: 0,
            wal_termination_point: None,
        })
    }

    /// Serialized contents, header included.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.rep
    }

    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.rep
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn data_size(&self) -> usize {
        self.rep.len()
    }

    /// Number of counted records.
    #[must_use]
    pub fn count(&self) -> u32 {
        read_u32_le(&self.rep[8..HEADER_SIZE])
    }

    #[must_use]
    pub fn sequence(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.rep[..8]);
        u64::from_le_bytes(buf)
    }

    pub fn set_sequence(&mut self, sequence: u64) {
        self.rep[..8].copy_from_slice(&sequence.to_le_bytes());
    }

    #[must_use]
    pub const fn content_flags(&self) -> ContentFlags {
        self.content_flags
    }

    #[must_use]
    pub const fn has_put(&self) -> bool {
        self.content_flags.contains(ContentFlags::PUT)
    }

    #[must_use]
    pub const fn has_delete(&self) -> bool {
        self.content_flags.contains(ContentFlags::DELETE)
    }

    #[must_use]
    pub const fn has_single_delete(&self) -> bool {
        self.content_flags.contains(ContentFlags::SINGLE_DELETE)
    }

    #[must_use]
    pub const fn has_delete_range(&self) -> bool {
        self.content_flags.contains(ContentFlags::DELETE_RANGE)
    }

    #[must_use]
    pub const fn has_merge(&self) -> bool {
        self.content_flags.contains(ContentFlags::MERGE)
    }

    #[must_use]
    pub const fn has_begin_prepare(&self) -> bool {
        self.content_flags.contains(ContentFlags::BEGIN_PREPARE)
    }

    #[must_use]
    pub const fn has_end_prepare(&self) -> bool {
        self.content_flags.contains(ContentFlags::END_PREPARE)
    }

    #[must_use]
    pub const fn has_commit(&self) -> bool {
        self.content_flags.contains(ContentFlags::COMMIT)
    }

    #[must_use]
    pub const fn has_rollback(&self) -> bool {
        self.content_flags.contains(ContentFlags::ROLLBACK)
    }

    /// Limit on `data_size()`; 0 disables the check.
    pub const fn set_max_bytes(&mut self, max_bytes: usize) {
        self.max_bytes = max_bytes;
    }

    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Append a put and return its offset.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for keys or values longer than `u32::MAX`, `Capacity`
    /// if the batch would exceed `max_bytes` (the batch is left unchanged).
    pub fn put(
        &mut self,
        column_family: ColumnFamilyId,
        key: &[u8],
        value: &[u8],
    ) -> Result<usize, WriteBatchError> {
        self.append_operation(WriteType::Put, column_family, key, Some(value))
    }

    /// Append a merge operand and return its offset.
    ///
    /// # Errors
    ///
    /// Same as [`WriteBatch::put`].
    pub fn merge(
        &mut self,
        column_family: ColumnFamilyId,
        key: &[u8],
        value: &[u8],
    ) -> Result<usize, WriteBatchError> {
        self.append_operation(WriteType::Merge, column_family, key, Some(value))
    }

    /// Append a delete and return its offset.
    ///
    /// # Errors
    ///
    /// Same as [`WriteBatch::put`].
    pub fn delete(
        &mut self,
        column_family: ColumnFamilyId,
        key: &[u8],
    ) -> Result<usize, WriteBatchError> {
        self.append_operation(WriteType::Delete, column_family, key, None)
    }

    /// Append a single delete and return its offset.
    ///
    /// # Errors
    ///
    /// Same as [`WriteBatch::put`].
    pub fn single_delete(
        &mut self,
        column_family: ColumnFamilyId,
        key: &[u8],
    ) -> Result<usize, WriteBatchError> {
        self.append_operation(WriteType::SingleDelete, column_family, key, None)
    }

    /// Append a deletion of `[begin_key, end_key)` and return its offset.
    ///
    /// The record stores the begin key as its key and the end key as its value.
    ///
    /// # Errors
    ///
    /// Same as [`WriteBatch::put`].
    pub fn delete_range(
        &mut self,
        column_family: ColumnFamilyId,
        begin_key: &[u8],
        end_key: &[u8],
    ) -> Result<usize, WriteBatchError> {
        self.append_operation(WriteType::DeleteRange, column_family, begin_key, Some(end_key))
    }

    /// Append an opaque blob that is replayed to handlers but not applied.
    ///
    /// # Errors
    ///
    /// Same as [`WriteBatch::put`].
    pub fn put_log_data(&mut self, blob: &[u8]) -> Result<usize, WriteBatchError> {
        check_length(blob, "blob")?;
        self.append_with(
            |rep| {
                rep.push(RecordTag::LogData as u8);
                put_length_prefixed(rep, blob);
            },
            false,
            RecordTag::LogData,
        )
    }

    /// Append a begin-prepare marker.
    ///
    /// # Errors
    ///
    /// `Capacity` if the batch would exceed `max_bytes`.
    pub fn mark_begin_prepare(&mut self, kind: PrepareKind) -> Result<usize, WriteBatchError> {
        let tag = kind.tag();
        self.append_with(|rep| rep.push(tag as u8), false, tag)
    }

    /// Append an end-prepare marker for `xid`.
    ///
    /// # Errors
    ///
    /// Same as [`WriteBatch::put`].
    pub fn mark_end_prepare(&mut self, xid: &[u8]) -> Result<usize, WriteBatchError> {
        self.append_xid(RecordTag::EndPrepareXid, xid)
    }

    /// Append a commit marker for `xid`.
    ///
    /// # Errors
    ///
    /// Same as [`WriteBatch::put`].
    pub fn mark_commit(&mut self, xid: &[u8]) -> Result<usize, WriteBatchError> {
        self.append_xid(RecordTag::CommitXid, xid)
    }

    /// Append a rollback marker for `xid`.
    ///
    /// # Errors
    ///
    /// Same as [`WriteBatch::put`].
    pub fn mark_rollback(&mut self, xid: &[u8]) -> Result<usize, WriteBatchError> {
        self.append_xid(RecordTag::RollbackXid, xid)
    }

    /// Append a noop marker.
    ///
    /// # Errors
    ///
    /// `Capacity` if the batch would exceed `max_bytes`.
    pub fn insert_noop(&mut self) -> Result<usize, WriteBatchError> {
        self.append_with(|rep| rep.push(RecordTag::Noop as u8), false, RecordTag::Noop)
    }

    /// Decode the record at `offset`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `offset` is exactly the end of the batch
    /// - `InvalidArgument` if it is past the end or inside the header
    /// - `Corruption` for an unknown tag or truncated record
    pub fn entry_at(&self, offset: usize) -> Result<Record<'_>, WriteBatchError> {
        Ok(self.spans_at(offset)?.view(&self.rep))
    }

    /// Like [`WriteBatch::entry_at`], but returns byte ranges into `data()`.
    ///
    /// # Errors
    ///
    /// Same as [`WriteBatch::entry_at`].
    pub fn spans_at(&self, offset: usize) -> Result<RecordSpans, WriteBatchError> {
        if offset == self.rep.len() {
            return Err(WriteBatchError::NotFound);
        }
        if offset > self.rep.len() || offset < HEADER_SIZE {
            return Err(WriteBatchError::invalid_argument(format!(
                "offset {offset} is outside the batch records (size {})",
                self.rep.len()
            )));
        }
        decode_record(&self.rep, offset)
    }

    /// Records in order with their offsets.
    #[must_use]
    pub fn records(&self) -> RecordIter<'_> {
        RecordIter::new(&self.rep)
    }

    /// Replay every record into `handler`.
    ///
    /// # Errors
    ///
    /// Propagates decode and handler errors. Returns `Corruption` if a full
    /// replay finds a different number of counted records than the header says.
    pub fn iterate(&self, handler: &mut dyn WriteBatchHandler) -> Result<(), WriteBatchError> {
        let mut found = 0u32;
        let mut completed = true;
        for item in self.records() {
            if !handler.should_continue() {
                completed = false;
                break;
            }
            let (_, spans) = item?;
            let record = spans.view(&self.rep);
            let cf = record.column_family;
            match record.tag.write_type() {
                WriteType::Put => handler.put_cf(cf, record.key, record.value)?,
                WriteType::Merge => handler.merge_cf(cf, record.key, record.value)?,
                WriteType::Delete => handler.delete_cf(cf, record.key)?,
                WriteType::SingleDelete => handler.single_delete_cf(cf, record.key)?,
                WriteType::DeleteRange => handler.delete_range_cf(cf, record.key, record.value)?,
                WriteType::LogData => handler.log_data(record.blob),
                WriteType::Xid => match record.tag {
                    RecordTag::BeginPrepareXid => handler.mark_begin_prepare(PrepareKind::Prepare)?,
                    RecordTag::BeginPersistedPrepareXid => {
                        handler.mark_begin_prepare(PrepareKind::PersistedPrepare)?;
                    }
                    RecordTag::BeginUnprepareXid => {
                        handler.mark_begin_prepare(PrepareKind::Unprepare)?;
                    }
                    RecordTag::EndPrepareXid => handler.mark_end_prepare(record.xid)?,
                    RecordTag::CommitXid => handler.mark_commit(record.xid)?,
                    RecordTag::RollbackXid => handler.mark_rollback(record.xid)?,
                    _ => handler.mark_noop()?,
                },
            }
            if record.write_type.is_counted() {
                found += 1;
            }
        }
        if completed && found != self.count() {
            return Err(WriteBatchError::corruption(format!(
                "WriteBatch has wrong count: header says {}, found {found}",
                self.count()
            )));
        }
        Ok(())
    }

    /// Remove every record, save point and the WAL termination point.
    ///
    /// The sequence number is reset; `max_bytes` is kept.
    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(HEADER_SIZE, 0);
        self.content_flags = ContentFlags::empty();
        self.save_points.clear();
        self.wal_termination_point = None;
    }

    /// Remember the current state so it can be restored with
    /// [`WriteBatch::rollback_to_save_point`].
    pub fn set_save_point(&mut self) {
        self.save_points.push(self.snapshot());
    }

    /// Truncate back to the newest save point and discard it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no save point.
    pub fn rollback_to_save_point(&mut self) -> Result<SavePoint, WriteBatchError> {
        let save_point = self.save_points.pop().ok_or(WriteBatchError::NotFound)?;
        tracing::debug!(
            "rolling back write batch from {} to {} bytes",
            self.rep.len(),
            save_point.size
        );
        self.restore(save_point);
        Ok(save_point)
    }

    /// Discard the newest save point without rolling back.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no save point.
    pub fn pop_save_point(&mut self) -> Result<(), WriteBatchError> {
        self.save_points.pop().map(|_| ()).ok_or(WriteBatchError::NotFound)
    }

    /// Number of outstanding save points.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn save_point_count(&self) -> usize {
        self.save_points.len()
    }

    /// Records up to this point go to the WAL; later ones are only applied to
    /// the engine.
    pub fn mark_wal_termination_point(&mut self) {
        self.wal_termination_point = Some(self.snapshot());
    }

    #[must_use]
    pub const fn wal_termination_point(&self) -> Option<SavePoint> {
        self.wal_termination_point
    }

    /// CRC32 of the serialized contents.
    #[must_use]
    pub fn checksum(&self) -> u32 {
        crc32fast::hash(&self.rep)
    }

    /// Compare the contents against a checksum recorded when they were persisted.
    ///
    /// # Errors
    ///
    /// Returns `Corruption` on mismatch.
    pub fn verify_checksum(&self, expected: u32) -> Result<(), WriteBatchError> {
        let actual = self.checksum();
        if actual == expected {
            Ok(())
        } else {
            Err(WriteBatchError::corruption(format!(
                "checksum mismatch: expected {expected:#010x}, computed {actual:#010x}"
            )))
        }
    }

    /// Bytes reserved by the record buffer.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn memory_usage(&self) -> usize {
        self.rep.capacity()
    }

    fn snapshot(&self) -> SavePoint {
        SavePoint {
            size: self.rep.len(),
            count: self.count(),
            content_flags: self.content_flags,
        }
    }

    fn restore(&mut self, save_point: SavePoint) {
        self.rep.truncate(save_point.size);
        self.set_count(save_point.count);
        self.content_flags = save_point.content_flags;
    }

    fn set_count(&mut self, count: u32) {
        self.rep[8..HEADER_SIZE].copy_from_slice(&count.to_le_bytes());
    }

    fn append_operation(
        &mut self,
        write_type: WriteType,
        column_family: ColumnFamilyId,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> Result<usize, WriteBatchError> {
        check_length(key, "key")?;
        if let Some(value) = value {
            check_length(value, "value")?;
        }
        let Some(tag) = RecordTag::for_operation(write_type, column_family) else {
            return Err(WriteBatchError::invalid_argument(format!(
                "{write_type:?} does not carry a key"
            )));
        };
        self.append_with(
            |rep| {
                rep.push(tag as u8);
                if tag.has_column_family() {
                    put_varint32(rep, column_family);
                }
                put_length_prefixed(rep, key);
                if let Some(value) = value {
                    put_length_prefixed(rep, value);
                }
            },
            true,
            tag,
        )
    }

    fn append_xid(&mut self, tag: RecordTag, xid: &[u8]) -> Result<usize, WriteBatchError> {
        check_length(xid, "xid")?;
        self.append_with(
            |rep| {
                rep.push(tag as u8);
                put_length_prefixed(rep, xid);
            },
            false,
            tag,
        )
    }

    /// Run `encode` against the buffer, then account for the new record.
    ///
    /// # Post-conditions
    /// - On `Capacity`, size, count and content flags are as before the call
    fn append_with(
        &mut self,
        encode: impl FnOnce(&mut Vec<u8>),
        counted: bool,
        tag: RecordTag,
    ) -> Result<usize, WriteBatchError> {
        let before = self.snapshot();
        encode(&mut self.rep);
        if counted {
            self.set_count(before.count.saturating_add(1));
        }
        self.content_flags.insert(ContentFlags::for_tag(tag));

        if self.max_bytes > 0 && self.rep.len() > self.max_bytes {
            let attempted = self.rep.len();
            self.restore(before);
            tracing::debug!(
                "write batch mutation rejected: {attempted} bytes exceeds limit of {}",
                self.max_bytes
            );
            return Err(WriteBatchError::Capacity {
                limit: self.max_bytes,
                attempted,
            });
        }
        Ok(before.size)
    }
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn check_length(bytes: &[u8], what: &str) -> Result<(), WriteBatchError> {
    if u32::try_from(bytes.len()).is_err() {
        return Err(WriteBatchError::invalid_argument(format!("{what} is too large")));
    }
    Ok(())
}
