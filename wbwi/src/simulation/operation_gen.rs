//! Operation generator for deterministic simulation testing.
//!
//! Produces random but reproducible sequences of batch mutations over a small
//! key space, so keys are written, overwritten, merged and range-deleted many
//! times within one run.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::column_family::ColumnFamilyId;

/// A mutation applied to the batch under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Put {
        column_family: ColumnFamilyId,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Merge {
        column_family: ColumnFamilyId,
        key: Vec<u8>,
        operand: Vec<u8>,
    },
    Delete {
        column_family: ColumnFamilyId,
        key: Vec<u8>,
    },
    SingleDelete {
        column_family: ColumnFamilyId,
        key: Vec<u8>,
    },
    /// Endpoints are not ordered; the simulator orders them under the column
    /// family's comparator unless the range is meant to be rejected.
    DeleteRange {
        column_family: ColumnFamilyId,
        begin: Vec<u8>,
        end: Vec<u8>,
    },
    PutLogData {
        blob: Vec<u8>,
    },
    SetSavePoint,
    RollbackToSavePoint,
    PopSavePoint,
    Clear,
}

impl Operation {
    /// Short name used in violation reports.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Put { .. } => "put",
            Self::Merge { .. } => "merge",
            Self::Delete { .. } => "delete",
            Self::SingleDelete { .. } => "single_delete",
            Self::DeleteRange { .. } => "delete_range",
            Self::PutLogData { .. } => "put_log_data",
            Self::SetSavePoint => "set_save_point",
            Self::RollbackToSavePoint => "rollback_to_save_point",
            Self::PopSavePoint => "pop_save_point",
            Self::Clear => "clear",
        }
    }
}

/// Configuration for operation generation.
#[derive(Debug, Clone)]
pub struct OperationGenConfig {
    /// Number of distinct keys per column family.
    pub key_space: usize,
    /// Column families written to, `0..column_families`.
    pub column_families: u32,
    /// Probability of a range deletion.
    pub delete_range_rate: f64,
    /// Probability of a merge.
    pub merge_rate: f64,
    /// Probability of a save point operation (set, rollback or pop).
    pub save_point_rate: f64,
    /// Probability of clearing the batch.
    pub clear_rate: f64,
    /// Probability that a range deletion is empty (begin == end).
    pub empty_range_rate: f64,
}

impl Default for OperationGenConfig {
    fn default() -> Self {
        Self {
            key_space: 24,
            column_families: 3,
            delete_range_rate: 0.08,
            merge_rate: 0.2,
            save_point_rate: 0.06,
            clear_rate: 0.005,
            empty_range_rate: 0.1,
        }
    }
}

/// Generator for random [`Operation`] sequences.
pub struct OperationGenerator {
    rng: StdRng,
    config: OperationGenConfig,
    next_value: u64,
}

impl OperationGenerator {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, OperationGenConfig::default())
    }

    #[must_use]
    pub fn with_config(seed: u64, config: OperationGenConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
            next_value: 0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &OperationGenConfig {
        &self.config
    }

    /// Every key the generator can produce, in bytewise order.
    #[must_use]
    pub fn keys(&self) -> Vec<Vec<u8>> {
        (0..self.config.key_space).map(key_for).collect()
    }

    pub fn next_operation(&mut self) -> Operation {
        let roll: f64 = self.rng.random();
        let mut threshold = self.config.clear_rate;
        if roll < threshold {
            return Operation::Clear;
        }
        threshold += self.config.save_point_rate;
        if roll < threshold {
            return match self.rng.random_range(0..3) {
                0 => Operation::SetSavePoint,
                1 => Operation::RollbackToSavePoint,
                _ => Operation::PopSavePoint,
            };
        }
        threshold += self.config.delete_range_rate;
        if roll < threshold {
            return self.delete_range();
        }
        threshold += self.config.merge_rate;
        if roll < threshold {
            return Operation::Merge {
                column_family: self.column_family(),
                key: self.key(),
                operand: self.value(),
            };
        }

        let column_family = self.column_family();
        let key = self.key();
        match self.rng.random_range(0..10) {
            0..=5 => Operation::Put {
                column_family,
                key,
                value: self.value(),
            },
            6 | 7 => Operation::Delete { column_family, key },
            8 => Operation::SingleDelete { column_family, key },
            _ => Operation::PutLogData { blob: self.value() },
        }
    }

    fn delete_range(&mut self) -> Operation {
        let column_family = self.column_family();
        let begin = self.key();
        let end = if self.rng.random_bool(self.config.empty_range_rate) {
            begin.clone()
        } else {
            loop {
                let end = self.key();
                if end != begin || self.config.key_space < 2 {
                    break end;
                }
            }
        };
        Operation::DeleteRange {
            column_family,
            begin,
            end,
        }
    }

    fn column_family(&mut self) -> ColumnFamilyId {
        self.rng.random_range(0..self.config.column_families.max(1))
    }

    fn key(&mut self) -> Vec<u8> {
        key_for(self.rng.random_range(0..self.config.key_space.max(1)))
    }

    fn value(&mut self) -> Vec<u8> {
        self.next_value += 1;
        format!("v{}", self.next_value).into_bytes()
    }
}

fn key_for(i: usize) -> Vec<u8> {
    format!("k{i:03}").into_bytes()
}
