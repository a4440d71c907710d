//! Error taxonomy for the springls engine.
//!
//! Capacity pressure on the particle array or the active list is *not* an
//! error: those trigger an internal rebuild. Only conditions that must stop
//! the solve (or reject a bad setup before it starts) surface here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpringlsError {
    /// A single contraction pass would destroy almost the entire particle
    /// set. This indicates the surface topology has collapsed and the
    /// simulation state is unrecoverable.
    #[error("catastrophic contraction: {removed} of {total} springls failed the survival predicate")]
    CatastrophicContraction { removed: usize, total: usize },

    /// The narrow band emptied out: the evolving contour no longer exists.
    #[error("the contour has vanished (empty active list)")]
    ContourVanished,

    /// A configuration that cannot be honored, rejected at setup time.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// An operation was invoked in a driver state that does not allow it.
    #[error("invalid driver state: {0}")]
    InvalidState(&'static str),
}
