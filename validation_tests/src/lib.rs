//! Validation infrastructure for the springls engine.
//!
//! Provides a headless harness that runs a scenario to completion while
//! recording surface snapshots, quantitative metrics between recorded
//! surfaces, and the classic level-set regression scenarios (static
//! sphere, rigid rotation, catastrophic contraction).

pub mod harness;
pub mod metrics;
pub mod scenarios;

pub use harness::*;
pub use metrics::*;
