//! Scenario definitions for the classic level-set regression tests.

pub mod deformation;
pub mod rotation;
pub mod static_sphere;

pub use deformation::deformation_scenario;
pub use rotation::rotation_scenario;
pub use static_sphere::static_sphere_scenario;
