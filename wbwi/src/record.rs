//! Wire format of write batch records.
//!
//! # Layout
//!
//! ```text
//! +----------+-----------------------------------------------+
//! | 0-7      | sequence number (u64, little endian)          |
//! | 8-11     | record count (u32, little endian)             |
//! | 12-N     | records                                       |
//! +----------+-----------------------------------------------+
//! ```
//!
//! Each record is `tag [cf varint32] key-varstring [value-varstring]`, where a
//! varstring is a varint32 length followed by that many bytes. Range deletions
//! store the begin key as the key and the end key as the value. Log data carries
//! a single blob varstring; end-prepare, commit and rollback markers carry an xid
//! varstring; the remaining markers carry nothing.
//!
//! The tag values are fixed by the on-disk format and must not change.

// Lengths are checked against u32::MAX before they are encoded.
#![allow(clippy::cast_possible_truncation)]

use std::ops::Range;

use crate::column_family::ColumnFamilyId;
use crate::error::WriteBatchError;

/// Size of the batch header (sequence + count).
pub const HEADER_SIZE: usize = 12;

/// Record tags as stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecordTag {
    Deletion = 0x00,
    Value = 0x01,
    Merge = 0x02,
    LogData = 0x03,
    ColumnFamilyDeletion = 0x04,
    ColumnFamilyValue = 0x05,
    ColumnFamilyMerge = 0x06,
    SingleDeletion = 0x07,
    ColumnFamilySingleDeletion = 0x08,
    BeginPrepareXid = 0x0A,
    EndPrepareXid = 0x0B,
    CommitXid = 0x0C,
    RollbackXid = 0x0D,
    Noop = 0x0E,
    RangeDeletion = 0x0F,
    ColumnFamilyRangeDeletion = 0x10,
    BeginPersistedPrepareXid = 0x11,
    BeginUnprepareXid = 0x12,
}

impl TryFrom<u8> for RecordTag {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Deletion),
            0x01 => Ok(Self::Value),
            0x02 => Ok(Self::Merge),
            0x03 => Ok(Self::LogData),
            0x04 => Ok(Self::ColumnFamilyDeletion),
            0x05 => Ok(Self::ColumnFamilyValue),
            0x06 => Ok(Self::ColumnFamilyMerge),
            0x07 => Ok(Self::SingleDeletion),
            0x08 => Ok(Self::ColumnFamilySingleDeletion),
            0x0A => Ok(Self::BeginPrepareXid),
            0x0B => Ok(Self::EndPrepareXid),
            0x0C => Ok(Self::CommitXid),
            0x0D => Ok(Self::RollbackXid),
            0x0E => Ok(Self::Noop),
            0x0F => Ok(Self::RangeDeletion),
            0x10 => Ok(Self::ColumnFamilyRangeDeletion),
            0x11 => Ok(Self::BeginPersistedPrepareXid),
            0x12 => Ok(Self::BeginUnprepareXid),
            _ => Err(value),
        }
    }
}

impl RecordTag {
    /// Tag for a key-carrying operation in `column_family`.
    ///
    /// The default column family uses the short form without a cf varint.
    #[must_use]
    pub const fn for_operation(write_type: WriteType, column_family: ColumnFamilyId) -> Option<Self> {
        let default_cf = column_family == 0;
        let tag = match (write_type, default_cf) {
            (WriteType::Put, true) => Self::Value,
            (WriteType::Put, false) => Self::ColumnFamilyValue,
            (WriteType::Merge, true) => Self::Merge,
            (WriteType::Merge, false) => Self::ColumnFamilyMerge,
            (WriteType::Delete, true) => Self::Deletion,
            (WriteType::Delete, false) => Self::ColumnFamilyDeletion,
            (WriteType::SingleDelete, true) => Self::SingleDeletion,
            (WriteType::SingleDelete, false) => Self::ColumnFamilySingleDeletion,
            (WriteType::DeleteRange, true) => Self::RangeDeletion,
            (WriteType::DeleteRange, false) => Self::ColumnFamilyRangeDeletion,
            (WriteType::LogData | WriteType::Xid, _) => return None,
        };
        Some(tag)
    }

    /// Whether the tag is followed by a column family varint.
    #[must_use]
    pub const fn has_column_family(self) -> bool {
        matches!(
            self,
            Self::ColumnFamilyDeletion
                | Self::ColumnFamilyValue
                | Self::ColumnFamilyMerge
                | Self::ColumnFamilySingleDeletion
                | Self::ColumnFamilyRangeDeletion
        )
    }

    /// Operation kind the tag encodes.
    #[must_use]
    pub const fn write_type(self) -> WriteType {
        match self {
            Self::Value | Self::ColumnFamilyValue => WriteType::Put,
            Self::Merge | Self::ColumnFamilyMerge => WriteType::Merge,
            Self::Deletion | Self::ColumnFamilyDeletion => WriteType::Delete,
            Self::SingleDeletion | Self::ColumnFamilySingleDeletion => WriteType::SingleDelete,
            Self::RangeDeletion | Self::ColumnFamilyRangeDeletion => WriteType::DeleteRange,
            Self::LogData => WriteType::LogData,
            Self::BeginPrepareXid
            | Self::EndPrepareXid
            | Self::CommitXid
            | Self::RollbackXid
            | Self::Noop
            | Self::BeginPersistedPrepareXid
            | Self::BeginUnprepareXid => WriteType::Xid,
        }
    }
}

/// Operation kind of a record, as seen by readers of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteType {
    Put,
    Merge,
    Delete,
    SingleDelete,
    DeleteRange,
    LogData,
    /// Any transaction marker (prepare, commit, rollback, noop).
    Xid,
}

impl WriteType {
    /// Whether the record removes its key (delete or single delete).
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        matches!(self, Self::Delete | Self::SingleDelete)
    }

    /// Whether records of this kind count towards the header's record count.
    #[must_use]
    pub const fn is_counted(self) -> bool {
        matches!(
            self,
            Self::Put | Self::Merge | Self::Delete | Self::SingleDelete | Self::DeleteRange
        )
    }
}

/// A decoded record expressed as byte ranges into the batch data.
///
/// Unused fields are empty ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSpans {
    pub tag: RecordTag,
    pub column_family: ColumnFamilyId,
    pub key: Range<usize>,
    pub value: Range<usize>,
    pub blob: Range<usize>,
    pub xid: Range<usize>,
    /// Offset one past the record's last byte.
    pub end: usize,
}

impl RecordSpans {
    /// Borrow the record's fields from the data it was decoded from.
    #[must_use]
    pub fn view<'a>(&self, data: &'a [u8]) -> Record<'a> {
        Record {
            tag: self.tag,
            write_type: self.tag.write_type(),
            column_family: self.column_family,
            key: &data[self.key.clone()],
            value: &data[self.value.clone()],
            blob: &data[self.blob.clone()],
            xid: &data[self.xid.clone()],
        }
    }
}

/// A decoded record borrowing the batch data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub tag: RecordTag,
    pub write_type: WriteType,
    pub column_family: ColumnFamilyId,
    /// Key, or begin key of a range deletion.
    pub key: &'a [u8],
    /// Value, merge operand, or end key of a range deletion.
    pub value: &'a [u8],
    pub blob: &'a [u8],
    pub xid: &'a [u8],
}

/// Append `value` as a varint32.
pub fn put_varint32(dst: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        dst.push((value as u8) | 0x80);
        value >>= 7;
    }
    dst.push(value as u8);
}

/// Decode a varint32 at `*pos`, advancing `pos` past it.
///
/// Returns `None` if the data ends inside the varint or it spans more than five
/// bytes.
pub fn get_varint32(data: &[u8], pos: &mut usize) -> Option<u32> {
    let mut result = 0u32;
    for shift in (0..=28).step_by(7) {
        let byte = *data.get(*pos)?;
        *pos += 1;
        result |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(result);
        }
    }
    None
}

/// Append `bytes` as a varstring.
///
/// # Pre-conditions
/// - `bytes.len() <= u32::MAX` (checked by the batch before encoding)
pub fn put_length_prefixed(dst: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(u32::try_from(bytes.len()).is_ok());
    put_varint32(dst, bytes.len() as u32);
    dst.extend_from_slice(bytes);
}

/// Decode a varstring at `*pos` and return the range of its bytes.
pub fn get_length_prefixed(data: &[u8], pos: &mut usize) -> Option<Range<usize>> {
    let len = get_varint32(data, pos)? as usize;
    let start = *pos;
    let end = start.checked_add(len)?;
    if end > data.len() {
        return None;
    }
    *pos = end;
    Some(start..end)
}

/// Decode the record starting at `offset`.
///
/// # Errors
///
/// Returns `Corruption` for an unknown tag or a record that runs past the end
/// of `data`.
pub fn decode_record(data: &[u8], offset: usize) -> Result<RecordSpans, WriteBatchError> {
    let Some(&raw_tag) = data.get(offset) else {
        return Err(WriteBatchError::corruption("truncated WriteBatch record"));
    };
    let tag = RecordTag::try_from(raw_tag)
        .map_err(|t| WriteBatchError::corruption(format!("unknown WriteBatch tag {t}")))?;

    let mut pos = offset + 1;
    let empty = pos..pos;
    let mut spans = RecordSpans {
        tag,
        column_family: 0,
        key: empty.clone(),
        value: empty.clone(),
        blob: empty.clone(),
        xid: empty,
        end: pos,
    };

    if tag.has_column_family() {
        spans.column_family = get_varint32(data, &mut pos)
            .ok_or_else(|| WriteBatchError::corruption("bad WriteBatch column family"))?;
    }

    let bad = |what: &str| WriteBatchError::corruption(format!("bad WriteBatch {what}"));
    match tag.write_type() {
        WriteType::Put | WriteType::Merge | WriteType::DeleteRange => {
            let what = match tag.write_type() {
                WriteType::Put => "Put",
                WriteType::Merge => "Merge",
                _ => "DeleteRange",
            };
            spans.key = get_length_prefixed(data, &mut pos).ok_or_else(|| bad(what))?;
            spans.value = get_length_prefixed(data, &mut pos).ok_or_else(|| bad(what))?;
        }
        WriteType::Delete | WriteType::SingleDelete => {
            spans.key = get_length_prefixed(data, &mut pos).ok_or_else(|| bad("Delete"))?;
        }
        WriteType::LogData => {
            spans.blob = get_length_prefixed(data, &mut pos).ok_or_else(|| bad("Blob"))?;
        }
        WriteType::Xid => {
            if matches!(
                tag,
                RecordTag::EndPrepareXid | RecordTag::CommitXid | RecordTag::RollbackXid
            ) {
                spans.xid = get_length_prefixed(data, &mut pos).ok_or_else(|| bad("XID"))?;
            }
        }
    }

    spans.end = pos;
    Ok(spans)
}

/// Iterator over `(offset, record)` pairs of a serialized batch.
///
/// Stops after the first decode error, which it yields.
#[derive(Debug)]
pub struct RecordIter<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> RecordIter<'a> {
    /// Iterate the records of `data`, which must include the header.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: HEADER_SIZE.min(data.len()),
            failed: false,
        }
    }
}

impl Iterator for RecordIter<'_> {
    type Item = Result<(usize, RecordSpans), WriteBatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        let offset = self.pos;
        match decode_record(self.data, offset) {
            Ok(spans) => {
                self.pos = spans.end;
                Some(Ok((offset, spans)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
