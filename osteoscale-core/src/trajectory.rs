//! Reference-trajectory preprocessing.
//!
//! Downstream imitation training consumes fixed-length clips of a reference
//! qpos trajectory together with finite-difference velocities. The qpos
//! layout is the standard free-root convention: 3 root translation entries,
//! 4 root quaternion entries (scalar first), then one entry per joint in
//! kinematic-tree order.
//!
//! Preprocessing steps, in order:
//!
//! 1. clip joint angles to the ranges declared in the model,
//! 2. align the clip with the floor via the foot-height heuristic,
//! 3. finite-difference velocities (with quaternion handling for the root),
//!    clipping joint velocities to a maximum,
//! 4. split into clips with lookahead padding and persist them.

use crate::errors::{OsteoscaleError, OsteoscaleResult};
use crate::kinematics::{JointInfo, JointKind};
use log::{debug, warn};
use nalgebra::{DVector, Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// qpos entries taken by the free root joint.
pub const FREE_JOINT_QPOS: usize = 7;
/// qvel entries taken by the free root joint.
pub const FREE_JOINT_QVEL: usize = 6;
/// Thickness compensation for foot geoms in the floor-alignment heuristic,
/// in model units.
pub const FOOT_GEOM_THICKNESS: f64 = 0.006;
/// Angle clips smaller than this are not worth reporting.
const CLIP_REPORT_THRESHOLD: f64 = 0.1;

/// A qpos trajectory with a fixed timestep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QposTrajectory {
    /// Timestep between frames, in seconds.
    pub dt: f64,
    frames: Vec<DVector<f64>>,
}

impl QposTrajectory {
    /// Builds a trajectory, validating that every frame has the same width
    /// and at least the free-root entries.
    pub fn new(dt: f64, frames: Vec<DVector<f64>>) -> OsteoscaleResult<Self> {
        let width = frames.first().map(|f| f.len()).unwrap_or(FREE_JOINT_QPOS);
        if width < FREE_JOINT_QPOS {
            return Err(OsteoscaleError::QposLayout {
                frame: 0,
                expected: FREE_JOINT_QPOS,
                got: width,
            });
        }
        for (index, frame) in frames.iter().enumerate() {
            if frame.len() != width {
                return Err(OsteoscaleError::QposLayout {
                    frame: index,
                    expected: width,
                    got: frame.len(),
                });
            }
        }
        Ok(Self { dt, frames })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Width of one qpos frame.
    pub fn width(&self) -> usize {
        self.frames.first().map(|f| f.len()).unwrap_or(0)
    }

    pub fn frames(&self) -> &[DVector<f64>] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut [DVector<f64>] {
        &mut self.frames
    }

    /// Saves the trajectory with bincode.
    pub fn save(&self, path: impl AsRef<Path>) -> OsteoscaleResult<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)
            .map_err(|e| OsteoscaleError::Serialization(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }

    /// Loads a trajectory previously written by [`QposTrajectory::save`].
    pub fn load(path: impl AsRef<Path>) -> OsteoscaleResult<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        bincode::deserialize_from(reader)
            .map_err(|e| OsteoscaleError::Serialization(e.to_string()))
    }
}

/// Tuning knobs for clip extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Frames per clip.
    /// Default: 2500
    pub clip_length: usize,

    /// Maximum allowed joint velocity, in rad/s.
    /// Default: 20.0
    pub max_qvel: f64,

    /// Lookahead reference steps appended to each clip.
    /// Default: 1..=10
    pub ref_steps: Vec<usize>,

    /// Report every meaningful clamp at debug level.
    /// Default: false
    pub verbatim: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            clip_length: 2500,
            max_qvel: 20.0,
            ref_steps: (1..=10).collect(),
            verbatim: false,
        }
    }
}

impl PreprocessConfig {
    /// Frames of lookahead each clip carries past its nominal length.
    pub fn max_reference_index(&self) -> usize {
        self.ref_steps.iter().copied().max().unwrap_or(0) + 1
    }
}

/// One preprocessed clip, the unit consumed downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceClip {
    /// First trajectory frame included in this clip.
    pub start_step: usize,
    /// Timestep between frames, in seconds.
    pub dt: f64,
    /// Root position per frame.
    pub position: Vec<Vector3<f64>>,
    /// Root quaternion per frame, scalar first.
    pub quaternion: Vec<[f64; 4]>,
    /// Joint angles per frame.
    pub joints: Vec<DVector<f64>>,
    /// Root translational velocity per frame.
    pub velocity: Vec<Vector3<f64>>,
    /// Root angular velocity per frame.
    pub angular_velocity: Vec<Vector3<f64>>,
    /// Joint velocities per frame.
    pub joints_velocity: Vec<DVector<f64>>,
}

impl ReferenceClip {
    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }
}

/// Clips joint angles to the ranges declared in the model.
///
/// `joints` must be the model's joints in qpos order (as returned by
/// [`crate::kinematics::BodyTree::joints`]); the first must be the free
/// root. Returns the number of entries clamped.
pub fn clip_joint_angles(
    trajectory: &mut QposTrajectory,
    joints: &[JointInfo],
    verbatim: bool,
) -> OsteoscaleResult<usize> {
    let expected: usize = joints.iter().map(|j| j.kind.qpos_dof()).sum();
    if expected != trajectory.width() {
        return Err(OsteoscaleError::QposLayout {
            frame: 0,
            expected,
            got: trajectory.width(),
        });
    }
    if joints.first().map(|j| j.kind) != Some(JointKind::Free) {
        return Err(OsteoscaleError::Error(
            "trajectory preprocessing requires a free root joint".to_string(),
        ));
    }

    let mut clamped = 0;
    for (frame_index, frame) in trajectory.frames_mut().iter_mut().enumerate() {
        let mut offset = 0;
        for joint in joints {
            let dof = joint.kind.qpos_dof();
            match joint.kind {
                JointKind::Hinge | JointKind::Slide => {
                    if let Some((lo, hi)) = joint.range {
                        let value = frame[offset];
                        let clipped = value.clamp(lo, hi);
                        if clipped != value {
                            clamped += 1;
                            if verbatim && (value - clipped).abs() >= CLIP_REPORT_THRESHOLD {
                                debug!(
                                    "frame {} angle of {} clipped from {} to {}",
                                    frame_index, joint.name, value, clipped
                                );
                            }
                            frame[offset] = clipped;
                        }
                    }
                }
                JointKind::Ball => {
                    // Ball joints have no scalar range to clamp against.
                    if frame_index == 0 {
                        warn!("ball joint {} is not range-clipped", joint.name);
                    }
                }
                JointKind::Free => {}
            }
            offset += dof;
        }
    }
    Ok(clamped)
}

/// Computes a velocity trajectory from a position trajectory.
///
/// Returns one velocity row per frame pair (`len - 1` rows), laid out as
/// 3 translational entries, 3 angular entries from the normalized
/// quaternion difference, then one entry per joint.
pub fn compute_velocity_from_kinematics(
    trajectory: &QposTrajectory,
) -> OsteoscaleResult<Vec<DVector<f64>>> {
    let frames = trajectory.frames();
    if frames.len() < 2 {
        return Ok(Vec::new());
    }
    let dt = trajectory.dt;
    let width = trajectory.width();
    let qvel_width = width - FREE_JOINT_QPOS + FREE_JOINT_QVEL;

    let mut velocities = Vec::with_capacity(frames.len() - 1);
    for pair in frames.windows(2) {
        let (current, next) = (&pair[0], &pair[1]);
        let mut qvel = DVector::zeros(qvel_width);

        for axis in 0..3 {
            qvel[axis] = (next[axis] - current[axis]) / dt;
        }

        let q_current = root_quaternion(current);
        let q_next = root_quaternion(next);
        let difference = q_current.inverse() * q_next;
        let gyro = difference.scaled_axis() / dt;
        for axis in 0..3 {
            qvel[3 + axis] = gyro[axis];
        }

        for joint in FREE_JOINT_QPOS..width {
            qvel[joint - 1] = (next[joint] - current[joint]) / dt;
        }
        velocities.push(qvel);
    }
    Ok(velocities)
}

/// Clamps the joint entries of a velocity trajectory to `±max_qvel`.
///
/// Returns the number of entries clamped.
pub fn clip_joint_velocities(
    velocities: &mut [DVector<f64>],
    max_qvel: f64,
    verbatim: bool,
) -> usize {
    let mut clamped = 0;
    for (frame_index, qvel) in velocities.iter_mut().enumerate() {
        for index in FREE_JOINT_QVEL..qvel.len() {
            let value = qvel[index];
            let clipped = value.clamp(-max_qvel, max_qvel);
            if clipped != value {
                clamped += 1;
                if verbatim && (value - clipped).abs() >= CLIP_REPORT_THRESHOLD {
                    debug!(
                        "frame {} velocity entry {} clipped from {} to {}",
                        frame_index, index, value, clipped
                    );
                }
                qvel[index] = clipped;
            }
        }
    }
    clamped
}

/// Floor offset from recorded foot heights: the mean of the 10 lowest
/// samples, compensated for foot geom thickness.
pub fn floor_z_offset(feet_heights: &[f64]) -> f64 {
    if feet_heights.is_empty() {
        return 0.0;
    }
    let mut sorted = feet_heights.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("foot heights must be finite"));
    let lowest = &sorted[..sorted.len().min(10)];
    lowest.iter().sum::<f64>() / lowest.len() as f64 - FOOT_GEOM_THICKNESS
}

/// Subtracts a vertical offset from the root position of every frame.
pub fn apply_z_offset(trajectory: &mut QposTrajectory, offset: f64) {
    for frame in trajectory.frames_mut() {
        frame[2] -= offset;
    }
}

/// Splits a trajectory into clips of `clip_length` frames plus lookahead,
/// computing and clamping velocities per clip.
pub fn extract_clips(
    trajectory: &QposTrajectory,
    config: &PreprocessConfig,
) -> OsteoscaleResult<Vec<ReferenceClip>> {
    if trajectory.is_empty() {
        return Ok(Vec::new());
    }
    let n_steps = trajectory.len();
    let lookahead = config.max_reference_index();

    let mut clips = Vec::new();
    for start_step in (0..n_steps).step_by(config.clip_length.max(1)) {
        let end_step = (start_step + config.clip_length + lookahead).min(n_steps);
        let mut frames: Vec<DVector<f64>> = trajectory.frames()[start_step..end_step].to_vec();
        // Duplicate the final frame so the last pair differences to zero.
        if let Some(last) = frames.last().cloned() {
            frames.push(last);
        }
        let padded = QposTrajectory::new(trajectory.dt, frames)?;
        let mut velocities = compute_velocity_from_kinematics(&padded)?;
        let clamped = clip_joint_velocities(&mut velocities, config.max_qvel, config.verbatim);
        if clamped > 0 {
            debug!(
                "clip at {}: {} joint velocity entries clamped to ±{}",
                start_step, clamped, config.max_qvel
            );
        }

        let width = padded.width();
        let mut clip = ReferenceClip {
            start_step,
            dt: trajectory.dt,
            position: Vec::new(),
            quaternion: Vec::new(),
            joints: Vec::new(),
            velocity: Vec::new(),
            angular_velocity: Vec::new(),
            joints_velocity: Vec::new(),
        };
        for (frame, qvel) in padded.frames()[..padded.len() - 1].iter().zip(&velocities) {
            clip.position
                .push(Vector3::new(frame[0], frame[1], frame[2]));
            clip.quaternion
                .push([frame[3], frame[4], frame[5], frame[6]]);
            clip.joints
                .push(DVector::from_iterator(
                    width - FREE_JOINT_QPOS,
                    (FREE_JOINT_QPOS..width).map(|i| frame[i]),
                ));
            clip.velocity.push(Vector3::new(qvel[0], qvel[1], qvel[2]));
            clip.angular_velocity
                .push(Vector3::new(qvel[3], qvel[4], qvel[5]));
            clip.joints_velocity.push(DVector::from_iterator(
                qvel.len() - FREE_JOINT_QVEL,
                (FREE_JOINT_QVEL..qvel.len()).map(|i| qvel[i]),
            ));
        }
        clips.push(clip);
    }
    Ok(clips)
}

/// Saves clips with bincode.
pub fn save_clips(clips: &[ReferenceClip], path: impl AsRef<Path>) -> OsteoscaleResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, clips)
        .map_err(|e| OsteoscaleError::Serialization(e.to_string()))?;
    writer.flush()?;
    Ok(())
}

/// Loads clips previously written by [`save_clips`].
pub fn load_clips(path: impl AsRef<Path>) -> OsteoscaleResult<Vec<ReferenceClip>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    bincode::deserialize_from(reader).map_err(|e| OsteoscaleError::Serialization(e.to_string()))
}

fn root_quaternion(frame: &DVector<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(Quaternion::new(frame[3], frame[4], frame[5], frame[6]))
}
