//! Command-line surface for the osteoscale workspace.
//!
//! The library crates do the work; this crate wires them to a CLI:
//!
//! - `scale`: rescale a model's bone segments to literature lengths
//! - `measure`: report rest-pose segment lengths without modifying anything
//! - `preprocess`: turn a reference qpos trajectory into training clips
//! - `export-params`: write the default parameter tables as YAML

pub mod cli;

// Re-export the member crates for convenience
pub use osteoscale_core;
pub use osteoscale_params;
