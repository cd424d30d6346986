//! The skeletal rescaling procedure.
//!
//! Rescaling runs in two passes over one in-memory document:
//!
//! 1. A uniform global ratio is applied to every position field under the
//!    worldbody (`pos` and `fromto`), skipping parts whose names match the
//!    global exclusion set (eye parts, which would detach from their
//!    sockets under position scaling).
//! 2. For every configured bone segment the rest-pose distance between its
//!    landmark sites is measured and a correction ratio
//!    `target length / measured length` is derived. All ratios are
//!    computed from this single measurement pass and only then applied,
//!    each to the positions and sizes of the parts matching the segment's
//!    substring set.
//!
//! Afterwards the model is re-measured; for a part set that covers each
//! segment's landmark-to-landmark chain the achieved lengths equal the
//! literature targets to floating-point precision, and the returned
//! [`RescaleReport`] records the residuals.

use crate::errors::{OsteoscaleError, OsteoscaleResult};
use crate::kinematics::BodyTree;
use crate::mjcf::{Element, MjcfDocument};
use crate::morphometry::{BoneSegment, SegmentTable};
use is_close::is_close;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cosmetic substring substitution applied to mesh asset filenames when the
/// adjusted model is serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshRename {
    pub from: String,
    pub to: String,
}

/// Configuration for one rescaling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RescalePlan {
    /// Uniform ratio applied to all position fields before the per-segment
    /// correction. 1.0 disables the global pass.
    pub global_scale: f64,

    /// Name substrings exempt from the global position pass.
    pub global_exclude: Vec<String>,

    /// Conversion from literature millimeters to model units.
    pub mm_to_model: f64,

    /// The bone segments to correct.
    pub segments: SegmentTable,

    /// Optional mesh-filename substitution applied after scaling.
    pub mesh_rename: Option<MeshRename>,
}

impl Default for RescalePlan {
    fn default() -> Self {
        Self {
            global_scale: 1.0,
            global_exclude: vec!["eye".to_string()],
            mm_to_model: 1e-3,
            segments: SegmentTable::default(),
            mesh_rename: None,
        }
    }
}

/// Measured rest-pose length of one segment.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentLength {
    pub segment: String,
    pub length: f64,
}

/// Outcome of one segment's correction.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentReport {
    pub segment: String,
    /// Target length in model units.
    pub target: f64,
    /// Rest-pose length before the correction pass (after global scaling).
    pub initial: f64,
    /// Correction ratio applied to the segment's parts.
    pub ratio: f64,
    /// Rest-pose length after all corrections.
    pub achieved: f64,
}

impl SegmentReport {
    pub fn residual(&self) -> f64 {
        self.achieved - self.target
    }
}

/// Report for a whole rescaling run.
#[derive(Debug, Clone, Serialize)]
pub struct RescaleReport {
    pub segments: Vec<SegmentReport>,
    pub meshes_renamed: usize,
}

impl RescaleReport {
    /// Largest absolute residual across all segments.
    pub fn max_residual(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.residual().abs())
            .fold(0.0, f64::max)
    }

    /// Whether every achieved length matches its target to floating-point
    /// precision.
    pub fn is_converged(&self) -> bool {
        self.segments
            .iter()
            .all(|s| is_close!(s.achieved, s.target))
    }
}

impl fmt::Display for RescaleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.segments {
            writeln!(
                f,
                "{}: {:.6} -> {:.6} (target {:.6}, ratio {:.4}, residual {:.2e})",
                s.segment,
                s.initial,
                s.achieved,
                s.target,
                s.ratio,
                s.residual()
            )?;
        }
        if self.meshes_renamed > 0 {
            writeln!(f, "mesh filenames rewritten: {}", self.meshes_renamed)?;
        }
        Ok(())
    }
}

/// Measures the rest-pose length of every configured segment.
pub fn measure(doc: &MjcfDocument, table: &SegmentTable) -> OsteoscaleResult<Vec<SegmentLength>> {
    let tree = BodyTree::from_document(doc)?;
    table
        .iter()
        .map(|segment| {
            Ok(SegmentLength {
                segment: segment.name.clone(),
                length: segment_length(&tree, segment)?,
            })
        })
        .collect()
}

/// Runs the full rescaling procedure on a document in place.
pub fn rescale(doc: &mut MjcfDocument, plan: &RescalePlan) -> OsteoscaleResult<RescaleReport> {
    if plan.global_scale != 1.0 {
        apply_global_scale(doc, plan.global_scale, &plan.global_exclude)?;
        info!(
            "applied global scale {} (excluding {:?})",
            plan.global_scale, plan.global_exclude
        );
    }

    // Measure everything before touching anything: adjacent segments may
    // share landmark sites, and the ratios must all come from the same
    // rest pose.
    let tree = BodyTree::from_document(doc)?;
    let mut corrections = Vec::with_capacity(plan.segments.len());
    for segment in plan.segments.iter() {
        let initial = segment_length(&tree, segment)?;
        if initial == 0.0 {
            return Err(OsteoscaleError::DegenerateSegment {
                segment: segment.name.clone(),
            });
        }
        let target = segment.target_length(plan.mm_to_model);
        let ratio = target / initial;
        debug!(
            "segment {}: measured {:.6}, target {:.6}, ratio {:.6}",
            segment.name, initial, target, ratio
        );
        corrections.push((segment, target, initial, ratio));
    }

    for (segment, _, _, ratio) in &corrections {
        scale_segment(doc, segment, *ratio)?;
    }

    let tree = BodyTree::from_document(doc)?;
    let mut segments = Vec::with_capacity(corrections.len());
    for (segment, target, initial, ratio) in corrections {
        let achieved = segment_length(&tree, segment)?;
        info!(
            "segment {}: {:.6} -> {:.6} (target {:.6})",
            segment.name, initial, achieved, target
        );
        segments.push(SegmentReport {
            segment: segment.name.clone(),
            target,
            initial,
            ratio,
            achieved,
        });
    }

    let meshes_renamed = match &plan.mesh_rename {
        Some(rename) => doc.rename_mesh_files(&rename.from, &rename.to),
        None => 0,
    };

    Ok(RescaleReport {
        segments,
        meshes_renamed,
    })
}

/// Applies a uniform ratio to every position field under the worldbody,
/// skipping parts whose names match the exclusion set.
///
/// Only positions move in this pass; sizes are left to the per-segment
/// correction.
pub fn apply_global_scale(
    doc: &mut MjcfDocument,
    ratio: f64,
    exclude: &[String],
) -> OsteoscaleResult<()> {
    let mut first_error = None;
    doc.for_each_part_mut(|part| {
        let name = part.element_name().unwrap_or("");
        if exclude.iter().any(|e| name.contains(e.as_str())) {
            return;
        }
        if let Err(e) = scale_positions(part, ratio) {
            first_error.get_or_insert(e);
        }
    });
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Applies a segment's correction ratio to the positions and sizes of all
/// matching parts.
fn scale_segment(
    doc: &mut MjcfDocument,
    segment: &BoneSegment,
    ratio: f64,
) -> OsteoscaleResult<()> {
    let mut first_error = None;
    doc.for_each_part_mut(|part| {
        let name = match part.element_name() {
            Some(name) => name,
            None => return,
        };
        if !segment.matches(name) {
            return;
        }
        let scaled = scale_positions(part, ratio).and_then(|_| scale_sizes(part, ratio));
        if let Err(e) = scaled {
            first_error.get_or_insert(e);
        }
    });
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn scale_positions(part: &mut Element, ratio: f64) -> OsteoscaleResult<()> {
    if let Some(pos) = part.vec3_attr("pos")? {
        part.set_vec3_attr("pos", &(pos * ratio));
    }
    // fromto encodes two endpoints, all six components are positional
    if let Some(mut fromto) = part.floats_attr("fromto")? {
        for value in &mut fromto {
            *value *= ratio;
        }
        part.set_floats_attr("fromto", &fromto);
    }
    Ok(())
}

fn scale_sizes(part: &mut Element, ratio: f64) -> OsteoscaleResult<()> {
    if let Some(mut size) = part.floats_attr("size")? {
        for value in &mut size {
            *value *= ratio;
        }
        part.set_floats_attr("size", &size);
    }
    Ok(())
}

fn segment_length(tree: &BodyTree, segment: &BoneSegment) -> OsteoscaleResult<f64> {
    for site in [&segment.proximal, &segment.distal] {
        if tree.site_position(site).is_none() {
            return Err(OsteoscaleError::MissingLandmark {
                site: site.clone(),
                segment: segment.name.clone(),
            });
        }
    }
    Ok(tree
        .site_distance(&segment.proximal, &segment.distal)
        .expect("both landmark sites were just checked"))
}
