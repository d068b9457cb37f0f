// Life of a write:
// 1. The record is appended to the batch buffer
// 2. Puts, merges and deletes get an index entry keyed by (cf, key, offset)
//    Range deletions mark the entries they cover and join the deleted range map
// 3. Reads either resolve one key newest-first (GetFromBatch) or merge the
//    batch with a base iterator (BaseDeltaIterator)
//
// System components:
//  - Arena-backed skip list for the index and the interval map
//  - Record buffer in the on-disk batch format
//  - Point-read resolver and merging iterator

pub mod arena;
pub mod base_delta;
pub mod column_family;
pub mod comparator;
pub mod deleted_range_map;
pub mod dump;
pub mod error;
pub mod index;
pub mod interval_map;
pub mod merge;
pub mod options;
pub mod record;
pub mod simulation;
pub mod skiplist;
pub mod write_batch;

pub use base_delta::{BaseDeltaIterator, DbIterator, ReadOptions, VecIterator};
pub use column_family::{ColumnFamilyHandle, ColumnFamilyId, DEFAULT_COLUMN_FAMILY};
pub use comparator::{BytewiseComparator, Comparator, ReverseBytewiseComparator};
pub use error::{MergeError, WriteBatchError};
pub use index::{BaseReader, BatchLookup, WbwiIterator, WriteBatchWithIndex, WriteEntry};
pub use merge::{MergeOperator, StringAppendOperator};
pub use options::WriteBatchWithIndexOptions;
pub use record::WriteType;
pub use write_batch::{WriteBatch, WriteBatchHandler};
