//! Parameter tables for the skeletal model fitting pipeline.
//!
//! Two YAML-backed configuration blocks are defined here:
//!
//! - [`FitParameters`]: scalar tuning constants for the fitting optimizer
//!   (convergence tolerances, regularization coefficients, arena
//!   dimensions, unit conversion, paths and flags).
//! - [`KeypointTable`]: the tracked motion-capture keypoints, each with a
//!   display color, an initial offset from its source body, and the model
//!   body it attaches to.
//!
//! Both provide sensible rat-pipeline defaults, so a partial YAML file
//! overrides only the keys it names.

mod fit;
mod keypoints;

pub mod errors;

pub use fit::FitParameters;
pub use keypoints::{KeypointDescriptor, KeypointTable};
