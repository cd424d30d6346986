//! Fitting optimizer parameters.
//!
//! Scalar tuning constants consumed by the pose-fitting pipeline. The
//! fitting itself lives outside this workspace; this struct only fixes the
//! recognized keys, their defaults, and the YAML surface.

use crate::errors::ParamsResult;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Tuning constants for the model-fitting pipeline.
///
/// # Phases
///
/// The fitter alternates a coarse whole-body solve, a root-only solve and
/// per-limb refinement solves; each phase has its own objective tolerance
/// (`ftol`, `root_ftol`, `limb_ftol`), tightening in that order.
///
/// # Default Values
///
/// Defaults match the rat pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FitParameters {
    // Optimizer tolerances
    /// Objective tolerance for the whole-body phase.
    /// Default: 5.0e-3
    pub ftol: f64,

    /// Objective tolerance for the root-only phase.
    /// Default: 1.0e-5
    pub root_ftol: f64,

    /// Objective tolerance for per-limb refinement.
    /// Default: 1.0e-6
    pub limb_ftol: f64,

    /// Finite-difference step for objective gradients.
    /// Default: 3.0e-8
    pub diff_step: f64,

    /// Alternating pose/offset refinement iterations.
    /// Default: 6
    pub n_iters: usize,

    // Regularization
    /// Marker offset regularization coefficient.
    /// Penalizes offsets drifting from their initial values.
    /// Default: 0.9
    pub m_reg_coef: f64,

    /// Joint angle regularization coefficient.
    /// Default: 0.0 (disabled)
    pub q_reg_coef: f64,

    /// Temporal smoothness coefficient, used only when
    /// `temporal_regularization` is set.
    /// Default: 0.2
    pub temporal_reg_coef: f64,

    // Units and scale
    /// Uniform scale ratio applied to the model before bone-length
    /// correction.
    /// Default: 0.9
    pub scale_factor: f64,

    /// Conversion from literature millimeters to model units.
    /// Default: 1.0e-3
    pub mm_to_meters: f64,

    /// Vertical offset added to fitted root positions (model units).
    /// Default: 0.0
    pub adjust_z_offset: f64,

    // Arena
    /// Arena diameter (model units).
    /// Default: 0.5842
    pub arena_diameter: f64,

    /// Arena height (model units).
    /// Default: 0.6096
    pub arena_height: f64,

    // Paths
    /// Path to the rescaled model file.
    /// Default: "models/rodent_scaled.xml"
    pub model_path: String,

    /// Path to the motion-capture data consumed by the fitter.
    /// Default: "" (provided per run)
    pub data_path: String,

    /// Path where fitted marker offsets are stored.
    /// Default: "offsets.p"
    pub offset_path: String,

    // Flags
    /// Report every meaningful clamp and adjustment while fitting.
    /// Default: false
    pub verbatim: bool,

    /// Enable temporal smoothness regularization.
    /// Default: false
    pub temporal_regularization: bool,
}

impl Default for FitParameters {
    fn default() -> Self {
        Self {
            // Tolerances
            ftol: 5.0e-3,
            root_ftol: 1.0e-5,
            limb_ftol: 1.0e-6,
            diff_step: 3.0e-8,
            n_iters: 6,

            // Regularization
            m_reg_coef: 0.9,
            q_reg_coef: 0.0,
            temporal_reg_coef: 0.2,

            // Units and scale
            scale_factor: 0.9,
            mm_to_meters: 1.0e-3,
            adjust_z_offset: 0.0,

            // Arena
            arena_diameter: 0.5842,
            arena_height: 0.6096,

            // Paths
            model_path: "models/rodent_scaled.xml".to_string(),
            data_path: String::new(),
            offset_path: "offsets.p".to_string(),

            // Flags
            verbatim: false,
            temporal_regularization: false,
        }
    }
}

impl FitParameters {
    /// Loads parameters from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ParamsResult<Self> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(BufReader::new(file))?)
    }

    /// Parses parameters from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> ParamsResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serializes the parameters to a YAML string.
    pub fn to_yaml_string(&self) -> ParamsResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Writes the parameters to a YAML file.
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> ParamsResult<()> {
        let yaml = self.to_yaml_string()?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Arena radius (model units).
    pub fn arena_radius(&self) -> f64 {
        self.arena_diameter / 2.0
    }

    /// Convert a literature length in millimeters to model units.
    pub fn to_model_units(&self, millimeters: f64) -> f64 {
        millimeters * self.mm_to_meters
    }

    /// Effective temporal regularization coefficient (0 when disabled).
    pub fn effective_temporal_reg(&self) -> f64 {
        if self.temporal_regularization {
            self.temporal_reg_coef
        } else {
            0.0
        }
    }
}
