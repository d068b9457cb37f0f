//! Point reads against the batch, optionally falling back to the engine.

use std::collections::BTreeMap;

use crate::column_family::{ColumnFamilyHandle, ColumnFamilyId, DEFAULT_COLUMN_FAMILY};
use crate::error::WriteBatchError;
use crate::index::WriteBatchWithIndex;
use crate::merge::MergeContext;
use crate::record::WriteType;

/// What the batch alone says about a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchLookup {
    /// The batch determines the value.
    Found(Vec<u8>),
    /// The batch deletes the key.
    Deleted,
    /// The batch does not touch the key.
    NotFound,
    /// The batch holds merge operands but no base value; the operands are in the
    /// merge context.
    MergeInProgress,
}

/// Point reads from the engine underneath a batch.
pub trait BaseReader {
    fn get(
        &self,
        column_family: ColumnFamilyId,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, WriteBatchError>;
}

impl BaseReader for BTreeMap<(ColumnFamilyId, Vec<u8>), Vec<u8>> {
    fn get(
        &self,
        column_family: ColumnFamilyId,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, WriteBatchError> {
        Ok(Self::get(self, &(column_family, key.to_vec())).cloned())
    }
}

/// State of the backward walk over the entries of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Walk {
    NotFound,
    Found,
    Deleted,
    MergeInProgress,
}

impl WriteBatchWithIndex {
    /// Resolve `key` from the batch alone.
    ///
    /// Walks the entries of `key` from newest to oldest. Merge operands found on
    /// the way are pushed into `context`; when the walk ends on a put or a
    /// deletion they are folded with the column family's merge operator.
    ///
    /// # Errors
    ///
    /// - `Corruption` if an index entry does not point at a key record
    /// - `InvalidArgument` if operands must be merged but `column_family` is
    ///   `None` or has no merge operator
    /// - `Merge` if the merge operator fails
    pub fn lookup<'a>(
        &'a self,
        column_family: Option<&ColumnFamilyHandle>,
        key: &[u8],
        context: &mut MergeContext<'a>,
    ) -> Result<BatchLookup, WriteBatchError> {
        let cf = column_family.map_or(DEFAULT_COLUMN_FAMILY, ColumnFamilyHandle::id);
        let mut iter = self.iterator_for(cf);

        iter.seek(key);
        iter.skip_to_newest();
        iter.status()?;

        let mut walk = Walk::NotFound;
        let mut value: &[u8] = &[];
        while iter.matches_key(cf, key) {
            let Some(entry) = iter.entry() else {
                break;
            };
            if entry.is_in_deleted_range {
                walk = Walk::Deleted;
            } else {
                match entry.write_type {
                    WriteType::Put => {
                        walk = Walk::Found;
                        value = entry.value;
                    }
                    WriteType::Merge => {
                        walk = Walk::MergeInProgress;
                        context.push_older(entry.value);
                    }
                    WriteType::Delete | WriteType::SingleDelete => walk = Walk::Deleted,
                    WriteType::LogData | WriteType::Xid => {}
                    WriteType::DeleteRange => {
                        return Err(WriteBatchError::corruption(
                            "unexpected range deletion in write batch index",
                        ));
                    }
                }
            }
            if matches!(walk, Walk::Found | Walk::Deleted)
                || (walk == Walk::MergeInProgress && self.overwrite_key)
            {
                break;
            }
            iter.prev();
        }
        iter.status()?;

        let result = match walk {
            Walk::Found if context.is_empty() => BatchLookup::Found(value.to_vec()),
            Walk::Found => {
                BatchLookup::Found(merge_key(column_family, key, Some(value), context)?)
            }
            Walk::Deleted if context.is_empty() => BatchLookup::Deleted,
            Walk::Deleted => BatchLookup::Found(merge_key(column_family, key, None, context)?),
            Walk::MergeInProgress if !self.overwrite_key && self.is_in_deleted_range(cf, key) => {
                BatchLookup::Found(merge_key(column_family, key, None, context)?)
            }
            Walk::MergeInProgress => BatchLookup::MergeInProgress,
            Walk::NotFound if self.is_in_deleted_range(cf, key) => BatchLookup::Deleted,
            Walk::NotFound => BatchLookup::NotFound,
        };
        Ok(result)
    }

    /// Value of `key` in the default column family according to the batch.
    ///
    /// Returns `None` for deleted and untouched keys.
    ///
    /// # Errors
    ///
    /// `MergeInProgress` if the batch holds merge operands that need a base
    /// value; otherwise as [`WriteBatchWithIndex::lookup`].
    pub fn get_from_batch(&self, key: &[u8]) -> Result<Option<Vec<u8>>, WriteBatchError> {
        self.get_from_batch_in(None, key)
    }

    pub fn get_from_batch_cf(
        &self,
        column_family: &ColumnFamilyHandle,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, WriteBatchError> {
        self.get_from_batch_in(Some(column_family), key)
    }

    /// Value of `key` with the batch applied on top of `base`.
    ///
    /// Pending merge operands are folded into the base value.
    pub fn get_from_batch_and_base(
        &self,
        base: &dyn BaseReader,
        column_family: Option<&ColumnFamilyHandle>,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, WriteBatchError> {
        let cf = column_family.map_or(DEFAULT_COLUMN_FAMILY, ColumnFamilyHandle::id);
        let mut context = MergeContext::new();
        match self.lookup(column_family, key, &mut context)? {
            BatchLookup::Found(value) => Ok(Some(value)),
            BatchLookup::Deleted => Ok(None),
            BatchLookup::NotFound => base.get(cf, key),
            BatchLookup::MergeInProgress => {
                let existing = base.get(cf, key)?;
                merge_key(column_family, key, existing.as_deref(), &context).map(Some)
            }
        }
    }

    fn get_from_batch_in(
        &self,
        column_family: Option<&ColumnFamilyHandle>,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, WriteBatchError> {
        let mut context = MergeContext::new();
        match self.lookup(column_family, key, &mut context)? {
            BatchLookup::Found(value) => Ok(Some(value)),
            BatchLookup::Deleted | BatchLookup::NotFound => Ok(None),
            BatchLookup::MergeInProgress => Err(WriteBatchError::MergeInProgress),
        }
    }
}

fn merge_key(
    column_family: Option<&ColumnFamilyHandle>,
    key: &[u8],
    existing: Option<&[u8]>,
    context: &MergeContext<'_>,
) -> Result<Vec<u8>, WriteBatchError> {
    let cf = column_family
        .ok_or_else(|| WriteBatchError::invalid_argument("Must provide a column_family"))?;
    let operator = cf.merge_operator().ok_or_else(|| {
        WriteBatchError::invalid_argument("Merge_operator must be set for column_family")
    })?;
    Ok(operator.full_merge(key, existing, &context.operands())?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::merge::StringAppendOperator;
    use crate::merge::tests::AddOperator;
    use crate::options::WriteBatchWithIndexOptions;

    type Base = BTreeMap<(ColumnFamilyId, Vec<u8>), Vec<u8>>;

    fn counters() -> ColumnFamilyHandle {
        ColumnFamilyHandle::new(1, "counters").with_merge_operator(Arc::new(AddOperator))
    }

    fn lookup(
        wbwi: &WriteBatchWithIndex,
        cf: Option<&ColumnFamilyHandle>,
        key: &[u8],
    ) -> BatchLookup {
        let mut context = MergeContext::new();
        wbwi.lookup(cf, key, &mut context).unwrap()
    }

    #[test]
    fn test_put_then_lookup() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"a", b"1").unwrap();

        assert_eq!(lookup(&wbwi, None, b"a"), BatchLookup::Found(b"1".to_vec()));
        assert_eq!(lookup(&wbwi, None, b"b"), BatchLookup::NotFound);
        assert_eq!(wbwi.get_from_batch(b"a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_newest_write_wins() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"k", b"v1").unwrap();
        wbwi.delete(b"k").unwrap();
        assert_eq!(lookup(&wbwi, None, b"k"), BatchLookup::Deleted);

        wbwi.put(b"k", b"v2").unwrap();
        assert_eq!(lookup(&wbwi, None, b"k"), BatchLookup::Found(b"v2".to_vec()));

        wbwi.single_delete(b"k").unwrap();
        assert_eq!(wbwi.get_from_batch(b"k").unwrap(), None);
    }

    #[test]
    fn test_put_after_range_deletion_is_found() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.delete_range(b"a", b"m").unwrap();
        wbwi.put(b"c", b"x").unwrap();

        assert_eq!(lookup(&wbwi, None, b"c"), BatchLookup::Found(b"x".to_vec()));
        assert_eq!(lookup(&wbwi, None, b"d"), BatchLookup::Deleted);
        assert_eq!(lookup(&wbwi, None, b"m"), BatchLookup::NotFound);
    }

    #[test]
    fn test_range_deletion_hides_older_put() {
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"c", b"x").unwrap();
        wbwi.delete_range(b"a", b"m").unwrap();

        assert_eq!(lookup(&wbwi, None, b"c"), BatchLookup::Deleted);

        wbwi.put(b"c", b"y").unwrap();
        assert_eq!(lookup(&wbwi, None, b"c"), BatchLookup::Found(b"y".to_vec()));
    }

    #[test]
    fn test_range_deletion_hides_older_merge() {
        let cf = counters();
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.merge_cf(&cf, b"n", b"7").unwrap();
        wbwi.delete_range_cf(&cf, b"a", b"z").unwrap();

        let mut context = MergeContext::new();
        assert_eq!(
            wbwi.lookup(Some(&cf), b"n", &mut context).unwrap(),
            BatchLookup::Deleted
        );
        assert!(context.is_empty());
        assert_eq!(wbwi.get_from_batch_cf(&cf, b"n").unwrap(), None);

        let mut base = Base::new();
        base.insert((1, b"n".to_vec()), b"100".to_vec());
        assert_eq!(
            wbwi.get_from_batch_and_base(&base, Some(&cf), b"n").unwrap(),
            None
        );
    }

    #[test]
    fn test_range_deletion_of_existing_keys() {
        let mut wbwi = WriteBatchWithIndex::default();
        for key in [&b"A"[..], b"B", b"C", b"D", b"E"] {
            wbwi.put(key, key).unwrap();
        }
        wbwi.delete_range(b"B", b"D").unwrap();

        assert_eq!(wbwi.get_from_batch(b"A").unwrap(), Some(b"A".to_vec()));
        assert_eq!(wbwi.get_from_batch(b"B").unwrap(), None);
        assert_eq!(wbwi.get_from_batch(b"C").unwrap(), None);
        assert_eq!(wbwi.get_from_batch(b"D").unwrap(), Some(b"D".to_vec()));

        wbwi.put(b"EE", b"EE").unwrap();
        wbwi.delete_range(b"E", b"EEEE").unwrap();
        assert_eq!(wbwi.get_from_batch(b"E").unwrap(), None);
        assert_eq!(wbwi.get_from_batch(b"EE").unwrap(), None);
    }

    #[test]
    fn test_merge_folds_into_put() {
        let cf = counters();
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put_cf(&cf, b"n", b"10").unwrap();
        wbwi.merge_cf(&cf, b"n", b"5").unwrap();
        wbwi.merge_cf(&cf, b"n", b"-2").unwrap();

        assert_eq!(wbwi.get_from_batch_cf(&cf, b"n").unwrap(), Some(b"13".to_vec()));
    }

    #[test]
    fn test_merge_after_delete_starts_from_nothing() {
        let cf = counters();
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put_cf(&cf, b"n", b"10").unwrap();
        wbwi.delete_cf(&cf, b"n").unwrap();
        wbwi.merge_cf(&cf, b"n", b"4").unwrap();

        assert_eq!(wbwi.get_from_batch_cf(&cf, b"n").unwrap(), Some(b"4".to_vec()));
    }

    #[test]
    fn test_merge_after_range_deletion_starts_from_nothing() {
        let cf = counters();
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.merge_cf(&cf, b"n", b"7").unwrap();
        wbwi.delete_range_cf(&cf, b"a", b"z").unwrap();
        wbwi.merge_cf(&cf, b"n", b"3").unwrap();
        assert_eq!(wbwi.get_from_batch_cf(&cf, b"n").unwrap(), Some(b"3".to_vec()));

        wbwi.merge_cf(&cf, b"o", b"1").unwrap();
        assert_eq!(wbwi.get_from_batch_cf(&cf, b"o").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_merge_only_needs_base() {
        let cf = counters();
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.merge_cf(&cf, b"n", b"1").unwrap();
        wbwi.merge_cf(&cf, b"n", b"2").unwrap();

        let mut context = MergeContext::new();
        assert_eq!(
            wbwi.lookup(Some(&cf), b"n", &mut context).unwrap(),
            BatchLookup::MergeInProgress
        );
        assert_eq!(context.operands(), vec![&b"1"[..], b"2"]);
        assert_eq!(
            wbwi.get_from_batch_cf(&cf, b"n"),
            Err(WriteBatchError::MergeInProgress)
        );

        let mut base = Base::new();
        base.insert((1, b"n".to_vec()), b"100".to_vec());
        assert_eq!(
            wbwi.get_from_batch_and_base(&base, Some(&cf), b"n").unwrap(),
            Some(b"103".to_vec())
        );
        // Nothing in the base either.
        assert_eq!(
            wbwi.get_from_batch_and_base(&Base::new(), Some(&cf), b"n").unwrap(),
            Some(b"3".to_vec())
        );
    }

    #[test]
    fn test_overwrite_key_stops_at_newest_merge() {
        let cf = counters();
        let mut wbwi =
            WriteBatchWithIndex::new(WriteBatchWithIndexOptions::new().with_overwrite_key(true));
        wbwi.put_cf(&cf, b"n", b"10").unwrap();
        wbwi.merge_cf(&cf, b"n", b"1").unwrap();

        let mut context = MergeContext::new();
        assert_eq!(
            wbwi.lookup(Some(&cf), b"n", &mut context).unwrap(),
            BatchLookup::MergeInProgress
        );
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_merge_without_operator() {
        let plain = ColumnFamilyHandle::new(2, "plain");
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put_cf(&plain, b"k", b"v").unwrap();
        wbwi.merge_cf(&plain, b"k", b"w").unwrap();

        let err = wbwi.get_from_batch_cf(&plain, b"k").unwrap_err();
        assert_eq!(
            err,
            WriteBatchError::invalid_argument("Merge_operator must be set for column_family")
        );

        wbwi.put(b"d", b"v").unwrap();
        wbwi.merge(b"d", b"w").unwrap();
        let err = wbwi.get_from_batch(b"d").unwrap_err();
        assert_eq!(
            err,
            WriteBatchError::invalid_argument("Must provide a column_family")
        );
    }

    #[test]
    fn test_merge_operator_failure() {
        let cf = counters();
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put_cf(&cf, b"n", b"ten").unwrap();
        wbwi.merge_cf(&cf, b"n", b"1").unwrap();

        let err = wbwi.get_from_batch_cf(&cf, b"n").unwrap_err();
        assert!(matches!(err, WriteBatchError::Merge(ref e) if e.operator == "add"));
    }

    #[test]
    fn test_string_append_merge() {
        let cf = ColumnFamilyHandle::new(3, "lists")
            .with_merge_operator(Arc::new(StringAppendOperator::default()));
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put_cf(&cf, b"l", b"a").unwrap();
        wbwi.merge_cf(&cf, b"l", b"b").unwrap();
        wbwi.merge_cf(&cf, b"l", b"c").unwrap();

        assert_eq!(wbwi.get_from_batch_cf(&cf, b"l").unwrap(), Some(b"a,b,c".to_vec()));
    }

    #[test]
    fn test_column_families_are_isolated() {
        let cf = ColumnFamilyHandle::new(4, "other");
        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"k", b"default").unwrap();
        wbwi.put_cf(&cf, b"k", b"other").unwrap();
        wbwi.delete_range_cf(&cf, b"a", b"z").unwrap();

        assert_eq!(wbwi.get_from_batch(b"k").unwrap(), Some(b"default".to_vec()));
        assert_eq!(wbwi.get_from_batch_cf(&cf, b"k").unwrap(), None);
    }

    #[test]
    fn test_batch_and_base() {
        let mut base = Base::new();
        base.insert((0, b"a".to_vec()), b"base-a".to_vec());
        base.insert((0, b"b".to_vec()), b"base-b".to_vec());
        base.insert((0, b"c".to_vec()), b"base-c".to_vec());

        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.put(b"a", b"batch-a").unwrap();
        wbwi.delete(b"b").unwrap();

        let get = |key: &[u8]| wbwi.get_from_batch_and_base(&base, None, key).unwrap();
        assert_eq!(get(b"a"), Some(b"batch-a".to_vec()));
        assert_eq!(get(b"b"), None);
        assert_eq!(get(b"c"), Some(b"base-c".to_vec()));
        assert_eq!(get(b"d"), None);
    }

    #[test]
    fn test_range_deletion_hides_base() {
        let mut base = Base::new();
        base.insert((0, b"c".to_vec()), b"base-c".to_vec());

        let mut wbwi = WriteBatchWithIndex::default();
        wbwi.delete_range(b"a", b"m").unwrap();
        assert_eq!(wbwi.get_from_batch_and_base(&base, None, b"c").unwrap(), None);
    }
}
