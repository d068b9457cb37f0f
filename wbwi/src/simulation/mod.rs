//! Deterministic Simulation Testing (DST) infrastructure.
//!
//! This module provides tools for testing the batch with:
//! - Reproducible random operation generation
//! - A reference model that answers every read by scanning a plain log
//! - Invariant checking after each operation
//!
//! # Design Principles
//!
//! 1. All randomness is seeded for reproducibility
//! 2. Given the same seed, execution is identical
//! 3. The model is simple enough to be correct by inspection
//!
//! # Usage
//!
//! ```
//! use wbwi::simulation::{Simulator, SimulatorConfig};
//!
//! let config = SimulatorConfig::new(12345) // seed
//!     .with_overwrite_key(true);
//!
//! let mut sim = Simulator::new(config);
//! let result = sim.run(200); // Run 200 operations
//!
//! assert!(result.invariant_violations.is_empty());
//! ```

mod invariants;
mod model;
mod operation_gen;
mod simulator;

pub use invariants::{InvariantChecker, InvariantViolation};
pub use model::{ModelWrite, ReferenceModel};
pub use operation_gen::{Operation, OperationGenConfig, OperationGenerator};
pub use simulator::{SimulationResult, Simulator, SimulatorConfig};
