//! Keypoint configuration table.
//!
//! Maps each tracked motion-capture keypoint to a display color, an
//! initial offset from its source body (model units, in the body frame),
//! and the model body the fitter attaches it to. Entry order is preserved
//! so the YAML file reads in anatomical order.

use crate::errors::ParamsResult;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Per-keypoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeypointDescriptor {
    /// Display color as RGBA in `[0, 1]`.
    pub color: [f64; 4],
    /// Initial offset from the source body origin, body frame.
    pub offset: [f64; 3],
    /// Source body name in the model.
    pub body: String,
}

/// The full keypoint table, in anatomical order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeypointTable {
    pub keypoints: IndexMap<String, KeypointDescriptor>,
}

impl Default for KeypointTable {
    fn default() -> Self {
        Self::rat()
    }
}

// Shared display colors, one hue per body region.
const HEAD_COLOR: [f64; 4] = [0.9, 0.8, 0.1, 1.0];
const TRUNK_COLOR: [f64; 4] = [0.2, 0.8, 0.3, 1.0];
const LEFT_COLOR: [f64; 4] = [0.1, 0.4, 1.0, 1.0];
const RIGHT_COLOR: [f64; 4] = [1.0, 0.2, 0.2, 1.0];

impl KeypointTable {
    /// The rat marker set.
    ///
    /// Offsets are starting guesses for the fitter, not calibrated values;
    /// left/right entries mirror in y.
    pub fn rat() -> Self {
        let mut keypoints = IndexMap::new();
        let mut insert = |name: &str, color: [f64; 4], offset: [f64; 3], body: &str| {
            keypoints.insert(
                name.to_string(),
                KeypointDescriptor {
                    color,
                    offset,
                    body: body.to_string(),
                },
            );
        };

        // Head
        insert("Snout", HEAD_COLOR, [0.03, 0.0, 0.0], "skull");
        insert("EarL", HEAD_COLOR, [0.0, 0.012, 0.005], "skull");
        insert("EarR", HEAD_COLOR, [0.0, -0.012, 0.005], "skull");

        // Trunk
        insert("SpineF", TRUNK_COLOR, [0.02, 0.0, 0.02], "torso");
        insert("SpineM", TRUNK_COLOR, [0.0, 0.0, 0.022], "torso");
        insert("SpineL", TRUNK_COLOR, [-0.02, 0.0, 0.02], "pelvis");
        insert("TailBase", TRUNK_COLOR, [-0.035, 0.0, 0.008], "pelvis");

        // Left forelimb
        insert("ShoulderL", LEFT_COLOR, [0.0, 0.008, 0.0], "upper_arm_L");
        insert("ElbowL", LEFT_COLOR, [0.0, 0.006, 0.0], "lower_arm_L");
        insert("WristL", LEFT_COLOR, [0.0, 0.004, 0.0], "hand_L");
        insert("HandL", LEFT_COLOR, [0.008, 0.004, -0.002], "hand_L");

        // Right forelimb
        insert("ShoulderR", RIGHT_COLOR, [0.0, -0.008, 0.0], "upper_arm_R");
        insert("ElbowR", RIGHT_COLOR, [0.0, -0.006, 0.0], "lower_arm_R");
        insert("WristR", RIGHT_COLOR, [0.0, -0.004, 0.0], "hand_R");
        insert("HandR", RIGHT_COLOR, [0.008, -0.004, -0.002], "hand_R");

        // Left hindlimb
        insert("HipL", LEFT_COLOR, [0.0, 0.01, 0.0], "upper_leg_L");
        insert("KneeL", LEFT_COLOR, [0.0, 0.007, 0.0], "lower_leg_L");
        insert("AnkleL", LEFT_COLOR, [0.0, 0.005, 0.0], "foot_L");
        insert("FootL", LEFT_COLOR, [0.015, 0.005, -0.003], "foot_L");

        // Right hindlimb
        insert("HipR", RIGHT_COLOR, [0.0, -0.01, 0.0], "upper_leg_R");
        insert("KneeR", RIGHT_COLOR, [0.0, -0.007, 0.0], "lower_leg_R");
        insert("AnkleR", RIGHT_COLOR, [0.0, -0.005, 0.0], "foot_R");
        insert("FootR", RIGHT_COLOR, [0.015, -0.005, -0.003], "foot_R");

        Self { keypoints }
    }

    /// Loads a table from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ParamsResult<Self> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(BufReader::new(file))?)
    }

    /// Parses a table from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> ParamsResult<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Serializes the table to a YAML string.
    pub fn to_yaml_string(&self) -> ParamsResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Writes the table to a YAML file.
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> ParamsResult<()> {
        let yaml = self.to_yaml_string()?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&KeypointDescriptor> {
        self.keypoints.get(name)
    }

    /// Source body for a keypoint.
    pub fn body_for(&self, name: &str) -> Option<&str> {
        self.get(name).map(|k| k.body.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KeypointDescriptor)> {
        self.keypoints.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keypoint names in table order.
    pub fn names(&self) -> Vec<&str> {
        self.keypoints.keys().map(|k| k.as_str()).collect()
    }
}
