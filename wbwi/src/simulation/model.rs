//! Reference model of a batch for simulation testing.
//!
//! The model keeps the applied operations as a plain log and answers every
//! question by scanning it, so it is obviously correct rather than fast.

// Simulation code legitimately needs cloning for test data
#![allow(clippy::disallowed_methods)]

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::column_family::{ColumnFamilyHandle, ColumnFamilyId};
use crate::error::WriteBatchError;

/// A write the model remembers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelWrite {
    Put(ColumnFamilyId, Vec<u8>, Vec<u8>),
    Merge(ColumnFamilyId, Vec<u8>, Vec<u8>),
    Delete(ColumnFamilyId, Vec<u8>),
    DeleteRange(ColumnFamilyId, Vec<u8>, Vec<u8>),
    LogData,
}

impl ModelWrite {
    fn keyed(&self) -> Option<(ColumnFamilyId, &[u8])> {
        match self {
            Self::Put(cf, key, _) | Self::Merge(cf, key, _) | Self::Delete(cf, key) => {
                Some((*cf, key))
            }
            Self::DeleteRange(..) | Self::LogData => None,
        }
    }
}

/// Expected contents of the batch under test.
#[derive(Debug)]
pub struct ReferenceModel {
    handles: HashMap<ColumnFamilyId, ColumnFamilyHandle>,
    overwrite_key: bool,
    log: Vec<ModelWrite>,
    save_points: Vec<usize>,
}

impl ReferenceModel {
    #[must_use]
    pub fn new(handles: &[ColumnFamilyHandle], overwrite_key: bool) -> Self {
        Self {
            handles: handles.iter().map(|h| (h.id(), h.clone())).collect(),
            overwrite_key,
            log: Vec::new(),
            save_points: Vec::new(),
        }
    }

    pub fn apply(&mut self, write: ModelWrite) {
        self.log.push(write);
    }

    pub fn set_save_point(&mut self) {
        self.save_points.push(self.log.len());
    }

    /// Returns false if there was no save point.
    pub fn rollback_to_save_point(&mut self) -> bool {
        match self.save_points.pop() {
            Some(len) => {
                self.log.truncate(len);
                true
            }
            None => false,
        }
    }

    pub fn pop_save_point(&mut self) -> bool {
        self.save_points.pop().is_some()
    }

    pub fn clear(&mut self) {
        self.log.clear();
        self.save_points.clear();
    }

    /// Counted records (everything but log data).
    #[must_use]
    pub fn count(&self) -> usize {
        self.log
            .iter()
            .filter(|w| !matches!(w, ModelWrite::LogData))
            .count()
    }

    /// Number of index entries the batch should hold.
    #[must_use]
    pub fn index_len(&self) -> usize {
        let mut seen: HashSet<(ColumnFamilyId, &[u8])> = HashSet::new();
        let mut len = 0;
        for write in &self.log {
            let Some(key) = write.keyed() else {
                continue;
            };
            let first = seen.insert(key);
            if first || !self.overwrite_key || matches!(write, ModelWrite::Merge(..)) {
                len += 1;
            }
        }
        len
    }

    /// Index entries of `column_family` in iteration order, as `(key, value)`.
    #[must_use]
    pub fn entries(&self, column_family: ColumnFamilyId) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut per_key: Vec<(Vec<u8>, Vec<Vec<u8>>)> = Vec::new();
        for write in &self.log {
            let (cf, key, value) = match write {
                ModelWrite::Put(cf, key, value) | ModelWrite::Merge(cf, key, value) => {
                    (*cf, key, value.clone())
                }
                ModelWrite::Delete(cf, key) => (*cf, key, Vec::new()),
                ModelWrite::DeleteRange(..) | ModelWrite::LogData => continue,
            };
            if cf != column_family {
                continue;
            }
            let slot = per_key.iter_mut().find(|(k, _)| k == key);
            match slot {
                Some((_, values)) => {
                    if self.overwrite_key && !matches!(write, ModelWrite::Merge(..)) {
                        values.pop();
                    }
                    values.push(value);
                }
                None => per_key.push((key.clone(), vec![value])),
            }
        }
        per_key.sort_by(|a, b| self.compare(column_family, &a.0, &b.0));
        per_key
            .into_iter()
            .flat_map(|(key, values)| values.into_iter().map(move |v| (key.clone(), v)))
            .collect()
    }

    /// Newest write of every key of `column_family`, in log order of first
    /// appearance: `Some(value)` for a put or merge operand, `None` for a
    /// delete.
    #[must_use]
    pub fn newest_writes(
        &self,
        column_family: ColumnFamilyId,
    ) -> Vec<(Vec<u8>, Option<Vec<u8>>)> {
        let mut newest: Vec<(Vec<u8>, Option<Vec<u8>>)> = Vec::new();
        for write in &self.log {
            let (cf, key, value) = match write {
                ModelWrite::Put(cf, key, value) | ModelWrite::Merge(cf, key, value) => {
                    (*cf, key, Some(value.clone()))
                }
                ModelWrite::Delete(cf, key) => (*cf, key, None),
                ModelWrite::DeleteRange(..) | ModelWrite::LogData => continue,
            };
            if cf != column_family {
                continue;
            }
            match newest.iter_mut().find(|(k, _)| k == key) {
                Some((_, slot)) => *slot = value,
                None => newest.push((key.clone(), value)),
            }
        }
        newest
    }

    /// Whether a range deletion in the log covers `key`.
    #[must_use]
    pub fn is_in_deleted_range(&self, column_family: ColumnFamilyId, key: &[u8]) -> bool {
        self.log.iter().any(|w| self.covers(w, column_family, key))
    }

    /// What `get_from_batch_cf` should return for `key`.
    pub fn get(
        &self,
        column_family: ColumnFamilyId,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, WriteBatchError> {
        if self.overwrite_key {
            return self.get_overwriting(column_family, key);
        }

        // Newest first.
        let mut operands: Vec<&[u8]> = Vec::new();
        let mut base: Option<Option<&[u8]>> = None;
        for write in self.log.iter().rev() {
            if self.covers(write, column_family, key) {
                base = Some(None);
                break;
            }
            match write {
                ModelWrite::Put(cf, k, value) if *cf == column_family && k == key => {
                    base = Some(Some(value));
                    break;
                }
                ModelWrite::Delete(cf, k) if *cf == column_family && k == key => {
                    base = Some(None);
                    break;
                }
                ModelWrite::Merge(cf, k, operand) if *cf == column_family && k == key => {
                    operands.push(operand);
                }
                _ => {}
            }
        }

        match (base, operands.is_empty()) {
            (None, true) => Ok(None),
            (None, false) => Err(WriteBatchError::MergeInProgress),
            (Some(existing), true) => Ok(existing.map(<[u8]>::to_vec)),
            (Some(existing), false) => {
                operands.reverse();
                self.merge(column_family, key, existing, &operands).map(Some)
            }
        }
    }

    /// With `overwrite_key`, the lookup stops at the newest write of the key.
    fn get_overwriting(
        &self,
        column_family: ColumnFamilyId,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, WriteBatchError> {
        let newest = self
            .log
            .iter()
            .rposition(|w| w.keyed() == Some((column_family, key)));
        let Some(position) = newest else {
            return Ok(None);
        };
        let covered_later = self.log[position + 1..]
            .iter()
            .any(|w| self.covers(w, column_family, key));
        if covered_later {
            return Ok(None);
        }
        match &self.log[position] {
            ModelWrite::Put(_, _, value) => Ok(Some(value.clone())),
            ModelWrite::Merge(..) => Err(WriteBatchError::MergeInProgress),
            _ => Ok(None),
        }
    }

    fn covers(&self, write: &ModelWrite, column_family: ColumnFamilyId, key: &[u8]) -> bool {
        match write {
            ModelWrite::DeleteRange(cf, begin, end) if *cf == column_family => {
                self.compare(column_family, begin, key) != Ordering::Greater
                    && self.compare(column_family, key, end) == Ordering::Less
            }
            _ => false,
        }
    }

    fn compare(&self, column_family: ColumnFamilyId, a: &[u8], b: &[u8]) -> Ordering {
        self.handles
            .get(&column_family)
            .map_or_else(|| a.cmp(b), |h| h.comparator().compare(a, b))
    }

    fn merge(
        &self,
        column_family: ColumnFamilyId,
        key: &[u8],
        existing: Option<&[u8]>,
        operands: &[&[u8]],
    ) -> Result<Vec<u8>, WriteBatchError> {
        let operator = self
            .handles
            .get(&column_family)
            .and_then(ColumnFamilyHandle::merge_operator)
            .ok_or_else(|| {
                WriteBatchError::invalid_argument("Merge_operator must be set for column_family")
            })?;
        Ok(operator.full_merge(key, existing, operands)?)
    }
}
