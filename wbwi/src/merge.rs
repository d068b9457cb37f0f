//! Merge operators and the operand collector used by point reads.
//!
//! A merge record contributes an operand to a fold defined by its column
//! family's [`MergeOperator`]. The batch never folds on write; readers collect the
//! operands for a key in a [`MergeContext`] and fold them on demand.

use crate::error::MergeError;

/// Folds an optional existing value and a list of operands into a new value.
pub trait MergeOperator: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the merged value.
    ///
    /// `operands` are ordered oldest first. `existing` is `None` when the key
    /// has no base value (absent or deleted).
    ///
    /// # Errors
    ///
    /// Returns a [`MergeError`] when the operands cannot be combined.
    fn full_merge(
        &self,
        key: &[u8],
        existing: Option<&[u8]>,
        operands: &[&[u8]],
    ) -> Result<Vec<u8>, MergeError>;
}

/// Concatenates the existing value and operands, separated by a delimiter.
#[derive(Debug, Clone, Copy)]
pub struct StringAppendOperator {
    delimiter: u8,
}

impl StringAppendOperator {
    #[must_use]
    pub const fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

impl Default for StringAppendOperator {
    fn default() -> Self {
        Self::new(b',')
    }
}

impl MergeOperator for StringAppendOperator {
    fn name(&self) -> &str {
        "StringAppendOperator"
    }

    fn full_merge(
        &self,
        _key: &[u8],
        existing: Option<&[u8]>,
        operands: &[&[u8]],
    ) -> Result<Vec<u8>, MergeError> {
        let mut parts = existing.into_iter().chain(operands.iter().copied());
        let mut merged = parts.next().map(<[u8]>::to_vec).unwrap_or_default();
        for part in parts {
            merged.push(self.delimiter);
            merged.extend_from_slice(part);
        }
        Ok(merged)
    }
}

/// Operands collected for one key while walking the batch newest to oldest.
#[derive(Debug, Default)]
pub struct MergeContext<'a> {
    /// Newest first, in the order they were found.
    operands: Vec<&'a [u8]>,
}

impl<'a> MergeContext<'a> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            operands: Vec::new(),
        }
    }

    /// Record an operand older than every operand pushed so far.
    pub fn push_older(&mut self, operand: &'a [u8]) {
        self.operands.push(operand);
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn len(&self) -> usize {
        self.operands.len()
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }

    /// Operands oldest first, as merge operators expect them.
    #[must_use]
    pub fn operands(&self) -> Vec<&'a [u8]> {
        self.operands.iter().rev().copied().collect()
    }

    pub fn clear(&mut self) {
        self.operands.clear();
    }
}
