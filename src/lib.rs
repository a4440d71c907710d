#![allow(clippy::too_many_arguments)]

#[cfg(all(feature = "dim2", feature = "dim3"))]
compile_error!("the dim2 and dim3 features are mutually exclusive");
#[cfg(not(any(feature = "dim2", feature = "dim3")))]
compile_error!("exactly one of the dim2/dim3 features must be enabled");

pub mod context;
pub mod error;
pub mod hash;
pub mod levelset;
pub mod math;
pub mod params;
pub mod pipeline;
pub mod sampling;
pub mod scan;
pub mod solver;
pub mod springl;
pub mod surface;

pub use context::{ActiveList, SimulationContext};
pub use error::SpringlsError;
pub use params::{SimulationParams, CAPACITY_MARGIN, MAX_LAYERS};
pub use pipeline::{PipelineState, SolveStats, SpringlsPipeline};
pub use springl::{Springl, CAPSULE_SIZE};
pub use surface::SpringlsSurface;
