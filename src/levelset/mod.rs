pub mod field;
pub mod narrow_band;

pub use field::{DenseVectorField, LevelSet, PingPong, ScalarField, VectorField};
pub use narrow_band::NarrowBandEvolver;
