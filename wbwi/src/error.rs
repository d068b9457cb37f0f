//! Error type shared by the batch, its index and its iterators.
//!
//! Every fallible operation in the crate reports a [`WriteBatchError`]. Iterators
//! latch the first error they hit and report it through `status()`, which is why
//! the type is `Clone`.

use std::fmt;

/// Error reported by a merge operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeError {
    /// Name of the operator that failed.
    pub operator: String,
    /// Operator supplied reason.
    pub message: String,
}

impl MergeError {
    /// Create a merge error for the named operator.
    #[must_use]
    pub fn new(operator: &str, message: impl Into<String>) -> Self {
        Self {
            operator: operator.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "merge operator '{}' failed: {}", self.operator, self.message)
    }
}

impl std::error::Error for MergeError {}

/// Errors that can occur while building or reading a write batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteBatchError {
    /// Malformed record tag, truncated varint or inconsistent header.
    Corruption(String),
    /// Caller supplied an unusable argument (bad offset, bad range, missing
    /// column family or merge operator, invalid iterator).
    InvalidArgument(String),
    /// Legitimate end of buffer, or no save point to pop/roll back to.
    NotFound,
    /// Operation is not supported in the iterator's current state.
    NotSupported(String),
    /// A mutation would grow the batch beyond its configured maximum.
    Capacity {
        /// Configured limit in bytes.
        limit: usize,
        /// Size the batch would have reached.
        attempted: usize,
    },
    /// The column family's merge operator failed.
    Merge(MergeError),
    /// The batch holds merge operands for the key but no base value to fold
    /// them into.
    MergeInProgress,
}

impl WriteBatchError {
    /// Shorthand for a corruption error.
    #[must_use]
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption(message.into())
    }

    /// Shorthand for an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Shorthand for a not supported error.
    #[must_use]
    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::NotSupported(message.into())
    }

    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_))
    }

    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    #[must_use]
    pub const fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported(_))
    }

    #[must_use]
    pub const fn is_capacity(&self) -> bool {
        matches!(self, Self::Capacity { .. })
    }
}

impl fmt::Display for WriteBatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corruption(msg) => write!(f, "corruption: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::NotFound => write!(f, "not found"),
            Self::NotSupported(msg) => write!(f, "not supported: {msg}"),
            Self::Capacity { limit, attempted } => write!(
                f,
                "write batch would grow to {attempted} bytes (limit {limit})"
            ),
            Self::Merge(e) => write!(f, "merge error: {e}"),
            Self::MergeInProgress => write!(f, "merge in progress"),
        }
    }
}

impl std::error::Error for WriteBatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Merge(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MergeError> for WriteBatchError {
    fn from(e: MergeError) -> Self {
        Self::Merge(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            WriteBatchError::corruption("unknown tag 9").to_string(),
            "corruption: unknown tag 9"
        );
        assert_eq!(
            WriteBatchError::Capacity {
                limit: 10,
                attempted: 24
            }
            .to_string(),
            "write batch would grow to 24 bytes (limit 10)"
        );
        assert_eq!(WriteBatchError::NotFound.to_string(), "not found");
    }

    #[test]
    fn test_merge_error_source() {
        use std::error::Error;

        let err = WriteBatchError::from(MergeError::new("add", "not a number"));
        assert_eq!(
            err.to_string(),
            "merge error: merge operator 'add' failed: not a number"
        );
        assert!(err.source().is_some());
        assert!(WriteBatchError::NotFound.source().is_none());
    }

    #[test]
    fn test_predicates() {
        assert!(WriteBatchError::corruption("x").is_corruption());
        assert!(WriteBatchError::invalid_argument("x").is_invalid_argument());
        assert!(WriteBatchError::not_supported("x").is_not_supported());
        assert!(WriteBatchError::NotFound.is_not_found());
        assert!(
            WriteBatchError::Capacity {
                limit: 1,
                attempted: 2
            }
            .is_capacity()
        );
    }
}
