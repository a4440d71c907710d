//! Per-step solver phases over the shared simulation context.
//!
//! Each phase is one logical parallel-for over particles or active grid
//! cells; correctness relies on the driver running them in a fixed order,
//! with every phase's output buffer becoming the next phase's input.

pub use advect::{Advector, ForceMode, ENRIGHT_PERIOD};
pub use compaction::CompactionPass;
pub use contract::Contractor;
pub use expand::Expander;
pub use fill_gaps::GapFiller;
pub use relax::Relaxer;

pub mod advect;
pub mod compaction;
pub mod contract;
pub mod expand;
pub mod fill_gaps;
pub mod relax;
pub mod tables;
