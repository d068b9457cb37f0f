//! Main simulator harness for deterministic simulation testing.
//!
//! Drives a [`WriteBatchWithIndex`] and a [`ReferenceModel`] with the same
//! generated operations and checks invariants after each one.

// Simulation code legitimately needs cloning for test data
#![allow(clippy::disallowed_methods)]

use std::cmp::Ordering;
use std::sync::Arc;

use crate::column_family::{ColumnFamilyHandle, ColumnFamilyId};
use crate::comparator::ReverseBytewiseComparator;
use crate::error::WriteBatchError;
use crate::index::WriteBatchWithIndex;
use crate::merge::StringAppendOperator;
use crate::options::WriteBatchWithIndexOptions;

use super::invariants::{InvariantChecker, InvariantViolation};
use super::model::{ModelWrite, ReferenceModel};
use super::operation_gen::{Operation, OperationGenConfig, OperationGenerator};

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Operation generation configuration.
    pub operation_config: OperationGenConfig,
    /// Whether the batch overwrites repeated keys in place.
    pub overwrite_key: bool,
    /// Batch size limit; 0 disables it.
    pub max_bytes: usize,
    /// Run the full invariant check every this many operations.
    pub check_interval: usize,
}

impl SimulatorConfig {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            operation_config: OperationGenConfig::default(),
            overwrite_key: false,
            max_bytes: 0,
            check_interval: 1,
        }
    }

    #[must_use]
    pub const fn with_operation_config(mut self, config: OperationGenConfig) -> Self {
        self.operation_config = config;
        self
    }

    #[must_use]
    pub const fn with_overwrite_key(mut self, overwrite_key: bool) -> Self {
        self.overwrite_key = overwrite_key;
        self
    }

    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Check invariants every `interval` operations (for faster testing).
    #[must_use]
    pub const fn with_check_interval(mut self, interval: usize) -> Self {
        self.check_interval = if interval == 0 { 1 } else { interval };
        self
    }
}

/// Results from a simulation run.
#[derive(Debug)]
pub struct SimulationResult {
    /// The seed used for this simulation.
    pub seed: u64,
    /// Number of operations applied.
    pub operations_processed: u64,
    /// Number of successful operations.
    pub successful_operations: u64,
    /// Number of failed operations (expected failures like empty ranges).
    pub failed_operations: u64,
    /// Invariant violations detected.
    pub invariant_violations: Vec<InvariantViolation>,
    /// Whether the simulation completed without an unexpected error.
    pub completed_successfully: bool,
    /// Error message if the simulation failed.
    pub error: Option<String>,
}

impl SimulationResult {
    /// Check if the simulation passed (no invariant violations).
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.completed_successfully && self.invariant_violations.is_empty()
    }
}

/// How the batch answered an operation.
enum Outcome {
    Applied,
    /// Rejected in a way the model agrees with.
    Rejected,
}

/// The main simulator harness.
pub struct Simulator {
    config: SimulatorConfig,
    generator: OperationGenerator,
    handles: Vec<ColumnFamilyHandle>,
    keys: Vec<Vec<u8>>,
    checker: InvariantChecker,
    operations_processed: u64,
    successful_operations: u64,
    failed_operations: u64,
}

impl Simulator {
    #[must_use]
    pub fn new(config: SimulatorConfig) -> Self {
        let generator =
            OperationGenerator::with_config(config.seed, config.operation_config.clone());
        let keys = generator.keys();
        let handles = column_families(config.operation_config.column_families);
        Self {
            config,
            generator,
            handles,
            keys,
            checker: InvariantChecker::new(),
            operations_processed: 0,
            successful_operations: 0,
            failed_operations: 0,
        }
    }

    /// Apply `operation_count` generated operations to a fresh batch.
    pub fn run(&mut self, operation_count: usize) -> SimulationResult {
        let options = WriteBatchWithIndexOptions::new()
            .with_overwrite_key(self.config.overwrite_key)
            .with_max_bytes(self.config.max_bytes)
            .with_seed(self.config.seed);
        let mut wbwi = WriteBatchWithIndex::new(options);
        let mut model = ReferenceModel::new(&self.handles, self.config.overwrite_key);

        tracing::debug!(
            "simulating {operation_count} operations with seed {}",
            self.config.seed
        );

        for index in 0..operation_count {
            let operation = self.generator.next_operation();
            self.operations_processed += 1;

            match self.apply(&mut wbwi, &mut model, &operation) {
                Ok(Outcome::Applied) => self.successful_operations += 1,
                Ok(Outcome::Rejected) => self.failed_operations += 1,
                Err(e) => {
                    return self.result(
                        false,
                        Some(format!("operation {index} ({}) failed: {e}", operation.name())),
                    );
                }
            }

            if (index + 1) % self.config.check_interval == 0 || index + 1 == operation_count {
                self.checker
                    .check_all(&wbwi, &model, &self.handles, &self.keys, index);
            }
        }

        self.result(true, None)
    }

    fn apply(
        &self,
        wbwi: &mut WriteBatchWithIndex,
        model: &mut ReferenceModel,
        operation: &Operation,
    ) -> Result<Outcome, WriteBatchError> {
        let written = match operation {
            Operation::Put {
                column_family,
                key,
                value,
            } => {
                let handle = self.handle(*column_family);
                wbwi.put_cf(handle, key, value)
                    .map(|()| ModelWrite::Put(handle.id(), key.clone(), value.clone()))
            }
            Operation::Merge {
                column_family,
                key,
                operand,
            } => {
                let handle = self.handle(*column_family);
                wbwi.merge_cf(handle, key, operand)
                    .map(|()| ModelWrite::Merge(handle.id(), key.clone(), operand.clone()))
            }
            Operation::Delete { column_family, key } => {
                let handle = self.handle(*column_family);
                wbwi.delete_cf(handle, key)
                    .map(|()| ModelWrite::Delete(handle.id(), key.clone()))
            }
            Operation::SingleDelete { column_family, key } => {
                let handle = self.handle(*column_family);
                wbwi.single_delete_cf(handle, key)
                    .map(|()| ModelWrite::Delete(handle.id(), key.clone()))
            }
            Operation::DeleteRange {
                column_family,
                begin,
                end,
            } => {
                let handle = self.handle(*column_family);
                let (begin, end) = match handle.comparator().compare(begin, end) {
                    Ordering::Greater => (end, begin),
                    _ => (begin, end),
                };
                match wbwi.delete_range_cf(handle, begin, end) {
                    Err(e) if e.is_invalid_argument() && begin == end => {
                        return Ok(Outcome::Rejected);
                    }
                    result => result
                        .map(|()| ModelWrite::DeleteRange(handle.id(), begin.clone(), end.clone())),
                }
            }
            Operation::PutLogData { blob } => wbwi.put_log_data(blob).map(|()| ModelWrite::LogData),
            Operation::SetSavePoint => {
                wbwi.set_save_point();
                model.set_save_point();
                return Ok(Outcome::Applied);
            }
            Operation::RollbackToSavePoint => {
                return expect_agreement(
                    wbwi.rollback_to_save_point(),
                    model.rollback_to_save_point(),
                );
            }
            Operation::PopSavePoint => {
                return expect_agreement(wbwi.pop_save_point(), model.pop_save_point());
            }
            Operation::Clear => {
                wbwi.clear();
                model.clear();
                return Ok(Outcome::Applied);
            }
        };

        match written {
            Ok(write) => {
                model.apply(write);
                Ok(Outcome::Applied)
            }
            Err(e) if e.is_capacity() => Ok(Outcome::Rejected),
            Err(e) => Err(e),
        }
    }

    fn handle(&self, column_family: ColumnFamilyId) -> &ColumnFamilyHandle {
        let index = usize::try_from(column_family).unwrap_or(0);
        &self.handles[index.min(self.handles.len() - 1)]
    }

    fn result(&self, completed_successfully: bool, error: Option<String>) -> SimulationResult {
        SimulationResult {
            seed: self.config.seed,
            operations_processed: self.operations_processed,
            successful_operations: self.successful_operations,
            failed_operations: self.failed_operations,
            invariant_violations: self.checker.violations().to_vec(),
            completed_successfully,
            error,
        }
    }

    #[must_use]
    pub const fn checker(&self) -> &InvariantChecker {
        &self.checker
    }
}

/// A save point operation succeeds on the batch exactly when the model had
/// one to use.
fn expect_agreement(
    result: Result<(), WriteBatchError>,
    model_had_save_point: bool,
) -> Result<Outcome, WriteBatchError> {
    match (result, model_had_save_point) {
        (Ok(()), true) => Ok(Outcome::Applied),
        (Err(e), false) if e.is_not_found() => Ok(Outcome::Rejected),
        (Ok(()), false) => Err(WriteBatchError::corruption(
            "save point operation succeeded without a save point",
        )),
        (Err(e), _) => Err(e),
    }
}

/// Column family 0 is the default; family 2 orders keys in reverse. Every
/// family appends merge operands with `,`.
fn column_families(count: u32) -> Vec<ColumnFamilyHandle> {
    (0..count.max(1))
        .map(|id| {
            let handle = if id == 0 {
                ColumnFamilyHandle::default_family()
            } else {
                ColumnFamilyHandle::new(id, format!("cf{id}"))
            };
            let handle = if id == 2 {
                handle.with_comparator(Arc::new(ReverseBytewiseComparator))
            } else {
                handle
            };
            handle.with_merge_operator(Arc::new(StringAppendOperator::default()))
        })
        .collect()
}
