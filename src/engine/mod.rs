//! Detection engine
//!
//! The calculator turns valid prices into opportunity records; the
//! orchestrator supervises connector workers, the calculator pool, and
//! the maintenance loops.

pub mod calculator;
pub mod orchestrator;

pub use calculator::{ArbitrageCalculator, PairMap, PairRule};
pub use orchestrator::Orchestrator;
