//! Invariant checking for deterministic simulation testing.
//!
//! After every operation the batch under test is compared against the
//! [`ReferenceModel`]: index shape, entry order, deleted ranges, point reads,
//! iteration in both directions, and iteration over a base layered under the
//! batch.

// Simulation code legitimately needs cloning for test data
#![allow(clippy::disallowed_methods)]

use std::cmp::Ordering;
use std::sync::Arc;

use crate::base_delta::{DbIterator, ReadOptions, VecIterator};
use crate::column_family::ColumnFamilyHandle;
use crate::error::WriteBatchError;
use crate::index::WriteBatchWithIndex;

use super::model::ReferenceModel;

/// An invariant violation detected during simulation.
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    /// Description of the violation.
    pub description: String,
    /// Operation index where it was detected.
    pub operation_index: usize,
    /// Additional context.
    pub context: String,
}

/// Checker for batch invariants.
pub struct InvariantChecker {
    violations: Vec<InvariantViolation>,
}

impl Default for InvariantChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantChecker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            violations: Vec::new(),
        }
    }

    #[must_use]
    pub fn violations(&self) -> &[InvariantViolation] {
        &self.violations
    }

    #[must_use]
    pub const fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    pub fn clear(&mut self) {
        self.violations.clear();
    }

    pub fn add_violation(&mut self, violation: InvariantViolation) {
        self.violations.push(violation);
    }

    fn violation(&mut self, description: &str, operation_index: usize, context: String) {
        self.violations.push(InvariantViolation {
            description: description.to_string(),
            operation_index,
            context,
        });
    }

    /// Record count and index size match the model.
    pub fn check_counts(
        &mut self,
        wbwi: &WriteBatchWithIndex,
        model: &ReferenceModel,
        operation_index: usize,
    ) {
        let count = usize::try_from(wbwi.count()).unwrap_or(usize::MAX);
        if count != model.count() {
            self.violation(
                "Record count differs from model",
                operation_index,
                format!("batch {count}, model {}", model.count()),
            );
        }
        if wbwi.index_len() != model.index_len() {
            self.violation(
                "Index size differs from model",
                operation_index,
                format!("index {}, model {}", wbwi.index_len(), model.index_len()),
            );
        }
    }

    /// Index entries are strictly increasing and point at well-formed keys.
    pub fn check_ordering(&mut self, wbwi: &WriteBatchWithIndex, operation_index: usize) {
        let order = wbwi.entry_order();
        let data = wbwi.data();
        let mut previous = None;
        for (position, entry) in wbwi.index_entries().enumerate() {
            if entry.key_offset + entry.key_size > data.len() || entry.offset >= data.len() {
                self.violation(
                    "Index entry points outside the batch",
                    operation_index,
                    format!("entry {position}: {entry:?}, batch {} bytes", data.len()),
                );
                return;
            }
            if previous.is_some_and(|p| order.entries(p, entry) != Ordering::Less) {
                self.violation(
                    "Index entries out of order",
                    operation_index,
                    format!("entry {position}: {previous:?} then {entry:?}"),
                );
            }
            previous = Some(entry);
        }
    }

    /// The deleted range map alternates and covers exactly the model's keys.
    pub fn check_deleted_ranges(
        &mut self,
        wbwi: &WriteBatchWithIndex,
        model: &ReferenceModel,
        handles: &[ColumnFamilyHandle],
        keys: &[Vec<u8>],
        operation_index: usize,
    ) {
        if !wbwi.check_deleted_ranges() {
            self.violation(
                "Deleted range map does not alternate",
                operation_index,
                format!("{:?}", wbwi.deleted_ranges()),
            );
        }
        for handle in handles {
            for key in keys {
                let actual = wbwi.is_in_deleted_range(handle.id(), key);
                let expected = model.is_in_deleted_range(handle.id(), key);
                if actual != expected {
                    self.violation(
                        "Deleted range membership differs from model",
                        operation_index,
                        format!(
                            "cf {} key {}: batch {actual}, model {expected}",
                            handle.id(),
                            String::from_utf8_lossy(key)
                        ),
                    );
                }
            }
        }
    }

    /// Point reads agree with the model.
    pub fn check_lookups(
        &mut self,
        wbwi: &WriteBatchWithIndex,
        model: &ReferenceModel,
        handles: &[ColumnFamilyHandle],
        keys: &[Vec<u8>],
        operation_index: usize,
    ) {
        for handle in handles {
            for key in keys {
                let actual = wbwi.get_from_batch_cf(handle, key);
                let expected = model.get(handle.id(), key);
                let agree = match (&actual, &expected) {
                    (Ok(a), Ok(e)) => a == e,
                    (
                        Err(WriteBatchError::MergeInProgress),
                        Err(WriteBatchError::MergeInProgress),
                    ) => true,
                    _ => false,
                };
                if !agree {
                    self.violation(
                        "Point read differs from model",
                        operation_index,
                        format!(
                            "cf {} key {}: batch {actual:?}, model {expected:?}",
                            handle.id(),
                            String::from_utf8_lossy(key)
                        ),
                    );
                }
            }
        }
    }

    /// Forward iteration yields the model's entries; backward yields them
    /// reversed.
    pub fn check_iteration(
        &mut self,
        wbwi: &WriteBatchWithIndex,
        model: &ReferenceModel,
        handles: &[ColumnFamilyHandle],
        operation_index: usize,
    ) {
        for handle in handles {
            let expected = model.entries(handle.id());

            let mut forward = Vec::new();
            let mut iter = wbwi.new_iterator_cf(handle);
            iter.seek_to_first();
            while let Some(entry) = iter.entry() {
                forward.push((entry.key.to_vec(), entry.value.to_vec()));
                iter.next();
            }
            if let Err(e) = iter.status() {
                self.violation(
                    "Iterator reported an error",
                    operation_index,
                    format!("cf {}: {e}", handle.id()),
                );
            }
            if forward != expected {
                self.violation(
                    "Forward iteration differs from model",
                    operation_index,
                    format!(
                        "cf {}: batch {} entries, model {}",
                        handle.id(),
                        forward.len(),
                        expected.len()
                    ),
                );
            }

            let mut backward = Vec::new();
            iter.seek_to_last();
            while let Some(entry) = iter.entry() {
                backward.push((entry.key.to_vec(), entry.value.to_vec()));
                iter.prev();
            }
            backward.reverse();
            if backward != expected {
                self.violation(
                    "Backward iteration differs from model",
                    operation_index,
                    format!(
                        "cf {}: batch {} entries, model {}",
                        handle.id(),
                        backward.len(),
                        expected.len()
                    ),
                );
            }
        }
    }

    /// A base holding every other key, overlaid by the batch, yields the
    /// model's newest write of each batch key and the untouched base keys, in
    /// strictly increasing order both ways.
    pub fn check_base_delta(
        &mut self,
        wbwi: &WriteBatchWithIndex,
        model: &ReferenceModel,
        handles: &[ColumnFamilyHandle],
        keys: &[Vec<u8>],
        operation_index: usize,
    ) {
        for handle in handles {
            let comparator = Arc::clone(handle.comparator());
            let base: Vec<(Vec<u8>, Vec<u8>)> = keys
                .iter()
                .step_by(2)
                .map(|k| (k.clone(), b"base".to_vec()))
                .collect();

            let newest = model.newest_writes(handle.id());
            let mut expected: Vec<(Vec<u8>, Vec<u8>)> = base
                .iter()
                .filter(|(k, _)| !newest.iter().any(|(n, _)| comparator.equal(n, k)))
                .cloned()
                .collect();
            expected.extend(newest.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))));
            expected.sort_by(|a, b| comparator.compare(&a.0, &b.0));

            let mut iter = wbwi.new_iterator_with_base(
                Some(handle),
                VecIterator::new(base, Arc::clone(&comparator)),
                ReadOptions::new(),
            );
            let mut forward = Vec::new();
            iter.seek_to_first();
            while iter.valid() {
                forward.push((iter.key().to_vec(), iter.value().to_vec()));
                iter.next();
            }
            let mut backward = Vec::new();
            iter.seek_to_last();
            while iter.valid() {
                backward.push((iter.key().to_vec(), iter.value().to_vec()));
                iter.prev();
            }
            backward.reverse();

            if let Err(e) = iter.status() {
                self.violation(
                    "Base+delta iterator reported an error",
                    operation_index,
                    format!("cf {}: {e}", handle.id()),
                );
            }
            let monotone = forward
                .windows(2)
                .all(|w| comparator.compare(&w[0].0, &w[1].0) == Ordering::Less);
            if !monotone {
                self.violation(
                    "Base+delta keys are not strictly increasing",
                    operation_index,
                    format!("cf {}: {forward:?}", handle.id()),
                );
            }
            if forward != expected || backward != expected {
                self.violation(
                    "Base+delta iteration differs from model",
                    operation_index,
                    format!(
                        "cf {}: forward {} entries, backward {}, model {}",
                        handle.id(),
                        forward.len(),
                        backward.len(),
                        expected.len()
                    ),
                );
            }
        }
    }

    /// Run every check.
    pub fn check_all(
        &mut self,
        wbwi: &WriteBatchWithIndex,
        model: &ReferenceModel,
        handles: &[ColumnFamilyHandle],
        keys: &[Vec<u8>],
        operation_index: usize,
    ) {
        self.check_counts(wbwi, model, operation_index);
        self.check_ordering(wbwi, operation_index);
        self.check_deleted_ranges(wbwi, model, handles, keys, operation_index);
        self.check_lookups(wbwi, model, handles, keys, operation_index);
        self.check_iteration(wbwi, model, handles, operation_index);
        self.check_base_delta(wbwi, model, handles, keys, operation_index);
    }
}
