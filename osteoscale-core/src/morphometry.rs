//! Bone segment morphometry.
//!
//! A [`BoneSegment`] ties a literature-measured bone length to the pair of
//! anatomical landmark sites whose rest-pose distance realizes it in the
//! model, plus the set of name substrings selecting the bodies, geoms and
//! sites that belong to that bone for scaling purposes.
//!
//! The default table targets the laboratory rat model and uses its naming
//! conventions: joint landmark sites sit at the origin of the body distal
//! to the joint (`shoulder_L` at the `upper_arm_L` origin, `elbow_L` at the
//! `lower_arm_L` origin, and so on), and geoms are named after the bones
//! they render rather than the bodies that carry them.

use serde::{Deserialize, Serialize};

/// A named skeletal element with its literature length and scaling scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoneSegment {
    /// Segment name, used in reports and error messages.
    pub name: String,

    /// Literature-measured bone length in millimeters.
    pub length_mm: f64,

    /// Proximal landmark site name.
    pub proximal: String,

    /// Distal landmark site name.
    pub distal: String,

    /// Name substrings selecting the parts scaled with this segment.
    ///
    /// A part belongs to the segment when its name contains any of these,
    /// unless an entry of `exclude` also matches. The set must cover every
    /// body offset on the chain between the two landmark sites for the
    /// length invariant to hold exactly.
    pub parts: Vec<String>,

    /// Name substrings excluded from this segment's pass.
    ///
    /// Used where a substring needed for a chain offset also catches parts
    /// owned by a neighboring segment (the hand collision geoms matched by
    /// the radius segment's `hand` pattern are scaled by the hand segment
    /// instead).
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl BoneSegment {
    /// Whether a named part is scaled with this segment.
    pub fn matches(&self, part_name: &str) -> bool {
        self.parts.iter().any(|p| part_name.contains(p.as_str()))
            && !self.exclude.iter().any(|p| part_name.contains(p.as_str()))
    }

    /// Target length in model units given a millimeter conversion factor.
    pub fn target_length(&self, mm_to_model: f64) -> f64 {
        self.length_mm * mm_to_model
    }
}

/// The set of bone segments rescaled together.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentTable {
    pub segments: Vec<BoneSegment>,
}

impl Default for SegmentTable {
    fn default() -> Self {
        Self::rat()
    }
}

impl SegmentTable {
    /// Literature morphometry for the laboratory rat.
    ///
    /// Lengths: humerus 30.0 mm, radius 29.6 mm, hand 10.0 mm,
    /// femur 36.5 mm, tibia 42.8 mm, metatarsal 23.4 mm.
    pub fn rat() -> Self {
        let segment = |name: &str,
                       length_mm: f64,
                       proximal: &str,
                       distal: &str,
                       parts: &[&str],
                       exclude: &[&str]| BoneSegment {
            name: name.to_string(),
            length_mm,
            proximal: proximal.to_string(),
            distal: distal.to_string(),
            parts: parts.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        };

        Self {
            segments: vec![
                segment(
                    "humerus",
                    30.0,
                    "shoulder_L",
                    "elbow_L",
                    // lower_arm covers the shoulder-to-elbow chain offset
                    &["humerus", "shoulder", "elbow", "lower_arm"],
                    &[],
                ),
                segment(
                    "radius",
                    29.6,
                    "elbow_L",
                    "wrist_L",
                    // hand covers the elbow-to-wrist chain offset; the hand
                    // collision geoms it also matches belong to the hand
                    // segment and are excluded here
                    &["radius", "ulna", "wrist", "hand"],
                    &["hand_collision"],
                ),
                segment(
                    "hand",
                    10.0,
                    "wrist_L",
                    "finger_L",
                    &["hand_collision", "palm", "finger"],
                    &[],
                ),
                segment(
                    "femur",
                    36.5,
                    "hip_L",
                    "knee_L",
                    &["femur", "hip", "knee", "lower_leg"],
                    &[],
                ),
                segment(
                    "tibia",
                    42.8,
                    "knee_L",
                    "ankle_L",
                    &["tibia", "fibula", "ankle", "foot"],
                    &[],
                ),
                segment(
                    "metatarsal",
                    23.4,
                    "ankle_L",
                    "toe_L",
                    &["metatarsal", "sole", "toe"],
                    &[],
                ),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoneSegment> {
        self.segments.iter()
    }

    pub fn get(&self, name: &str) -> Option<&BoneSegment> {
        self.segments.iter().find(|s| s.name == name)
    }
}
