//! Column family handles.

use std::fmt;
use std::sync::Arc;

use crate::comparator::{Comparator, bytewise};
use crate::merge::MergeOperator;

/// Numeric id of a column family. `0` is the default column family.
pub type ColumnFamilyId = u32;

/// Id of the default column family.
pub const DEFAULT_COLUMN_FAMILY: ColumnFamilyId = 0;

/// A column family as seen by the batch: its id, key order and merge operator.
///
/// Handles are cheap to clone; the comparator and operator are shared.
#[derive(Clone)]
#[allow(clippy::disallowed_methods)] // Arc::clone shares the comparator and operator
pub struct ColumnFamilyHandle {
    id: ColumnFamilyId,
    name: String,
    comparator: Arc<dyn Comparator>,
    merge_operator: Option<Arc<dyn MergeOperator>>,
}

impl ColumnFamilyHandle {
    /// Create a handle ordered bytewise with no merge operator.
    #[must_use]
    pub fn new(id: ColumnFamilyId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            comparator: bytewise(),
            merge_operator: None,
        }
    }

    /// Handle for the default column family.
    #[must_use]
    pub fn default_family() -> Self {
        Self::new(DEFAULT_COLUMN_FAMILY, "default")
    }

    #[must_use]
    pub fn with_comparator(mut self, comparator: Arc<dyn Comparator>) -> Self {
        self.comparator = comparator;
        self
    }

    #[must_use]
    pub fn with_merge_operator(mut self, merge_operator: Arc<dyn MergeOperator>) -> Self {
        self.merge_operator = Some(merge_operator);
        self
    }

    #[must_use]
    pub const fn id(&self) -> ColumnFamilyId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn comparator(&self) -> &Arc<dyn Comparator> {
        &self.comparator
    }

    #[must_use]
    pub const fn merge_operator(&self) -> Option<&Arc<dyn MergeOperator>> {
        self.merge_operator.as_ref()
    }
}

impl fmt::Debug for ColumnFamilyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnFamilyHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("comparator", &self.comparator.name())
            .field(
                "merge_operator",
                &self.merge_operator.as_ref().map(|m| m.name().to_string()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::ReverseBytewiseComparator;
    use crate::merge::StringAppendOperator;

    #[test]
    fn test_handle_builders() {
        let handle = ColumnFamilyHandle::new(4, "users")
            .with_comparator(Arc::new(ReverseBytewiseComparator))
            .with_merge_operator(Arc::new(StringAppendOperator::new(b',')));

        assert_eq!(handle.id(), 4);
        assert_eq!(handle.name(), "users");
        assert_eq!(handle.comparator().name(), "rocksdb.ReverseBytewiseComparator");
        assert!(handle.merge_operator().is_some());

        let default = ColumnFamilyHandle::default_family();
        assert_eq!(default.id(), DEFAULT_COLUMN_FAMILY);
        assert!(default.merge_operator().is_none());
    }
}
