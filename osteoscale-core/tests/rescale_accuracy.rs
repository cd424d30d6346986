//! End-to-end rescaling tests on a synthetic rodent model.
//!
//! These tests verify the one property that matters: after the scaling
//! procedure, every configured bone segment's landmark distance equals its
//! literature length to floating-point precision.

use approx::assert_relative_eq;
use osteoscale_core::kinematics::BodyTree;
use osteoscale_core::mjcf::MjcfDocument;
use osteoscale_core::scaling::{rescale, MeshRename, RescalePlan};

/// A reduced rodent model following the rat naming conventions: joint
/// landmark sites at the origins of their distal bodies, geoms named after
/// bones, collision geoms suffixed `_collision`.
const RODENT: &str = r#"<mujoco model="rodent">
  <compiler angle="radian" meshdir="meshes"/>
  <asset>
    <mesh name="skull" file="skull.stl"/>
  </asset>
  <worldbody>
    <body name="torso" pos="0 0 0.065">
      <freejoint name="root"/>
      <geom name="torso" type="capsule" size="0.02 0.05"/>
      <site name="spine_m" pos="0 0 0.021"/>
      <body name="upper_arm_L" pos="0.045 0.025 -0.012">
        <joint name="shoulder_flex_L" range="-1.2 2.6"/>
        <geom name="humerus_L" type="capsule" fromto="0 0 0 0.018 0.004 -0.02" size="0.004"/>
        <site name="shoulder_L" pos="0 0 0"/>
        <body name="lower_arm_L" pos="0.018 0.004 -0.02">
          <joint name="elbow_flex_L" range="0 2.4"/>
          <geom name="radius_L" type="capsule" size="0.003 0.011"/>
          <geom name="ulna_L" type="capsule" size="0.0025 0.011" pos="0.001 0.001 -0.001"/>
          <site name="elbow_L" pos="0 0 0"/>
          <body name="hand_L" pos="0.02 0.002 -0.018">
            <geom name="hand_collision_L" type="sphere" size="0.005" pos="0.004 0 -0.002"/>
            <site name="wrist_L" pos="0 0 0"/>
            <site name="finger_L" pos="0.008 0.001 -0.004"/>
          </body>
        </body>
      </body>
      <body name="upper_arm_R" pos="0.045 -0.025 -0.012">
        <geom name="humerus_R" type="capsule" fromto="0 0 0 0.018 -0.004 -0.02" size="0.004"/>
        <site name="shoulder_R" pos="0 0 0"/>
        <body name="lower_arm_R" pos="0.018 -0.004 -0.02">
          <geom name="radius_R" type="capsule" size="0.003 0.011"/>
          <site name="elbow_R" pos="0 0 0"/>
          <body name="hand_R" pos="0.02 -0.002 -0.018">
            <geom name="hand_collision_R" type="sphere" size="0.005" pos="0.004 0 -0.002"/>
            <site name="wrist_R" pos="0 0 0"/>
            <site name="finger_R" pos="0.008 -0.001 -0.004"/>
          </body>
        </body>
      </body>
      <body name="pelvis" pos="-0.052 0 -0.003">
        <geom name="pelvis" type="capsule" size="0.015 0.02"/>
        <body name="upper_leg_L" pos="-0.004 0.022 -0.008">
          <joint name="hip_flex_L" range="-1.0 1.8"/>
          <site name="hip_L" pos="0 0 0"/>
          <geom name="femur_L" type="capsule" size="0.005 0.015"/>
          <body name="lower_leg_L" pos="0.02 0.005 -0.03">
            <joint name="knee_flex_L" range="-2.4 0"/>
            <site name="knee_L" pos="0 0 0"/>
            <geom name="tibia_L" type="capsule" size="0.0035 0.018"/>
            <body name="foot_L" pos="-0.012 0.003 -0.042">
              <site name="ankle_L" pos="0 0 0"/>
              <geom name="sole_L" type="box" size="0.011 0.005 0.002" pos="0.009 0 -0.002"/>
              <site name="toe_L" pos="0.021 0.001 -0.004"/>
            </body>
          </body>
        </body>
        <body name="upper_leg_R" pos="-0.004 -0.022 -0.008">
          <site name="hip_R" pos="0 0 0"/>
          <geom name="femur_R" type="capsule" size="0.005 0.015"/>
          <body name="lower_leg_R" pos="0.02 -0.005 -0.03">
            <site name="knee_R" pos="0 0 0"/>
            <geom name="tibia_R" type="capsule" size="0.0035 0.018"/>
            <body name="foot_R" pos="-0.012 -0.003 -0.042">
              <site name="ankle_R" pos="0 0 0"/>
              <geom name="sole_R" type="box" size="0.011 0.005 0.002" pos="0.009 0 -0.002"/>
              <site name="toe_R" pos="0.021 -0.001 -0.004"/>
            </body>
          </body>
        </body>
      </body>
      <body name="skull" pos="0.068 0 0.015">
        <geom name="skull" type="mesh" mesh="skull"/>
        <body name="eye_L" pos="0.022 0.01 0.006">
          <geom name="eye_L" type="sphere" size="0.003"/>
        </body>
        <body name="eye_R" pos="0.022 -0.01 0.006">
          <geom name="eye_R" type="sphere" size="0.003"/>
        </body>
      </body>
    </body>
  </worldbody>
</mujoco>
"#;

const LITERATURE_MM: [(&str, &str, &str, f64); 6] = [
    ("humerus", "shoulder_L", "elbow_L", 30.0),
    ("radius", "elbow_L", "wrist_L", 29.6),
    ("hand", "wrist_L", "finger_L", 10.0),
    ("femur", "hip_L", "knee_L", 36.5),
    ("tibia", "knee_L", "ankle_L", 42.8),
    ("metatarsal", "ankle_L", "toe_L", 23.4),
];

fn rat_plan() -> RescalePlan {
    RescalePlan {
        global_scale: 0.9,
        ..RescalePlan::default()
    }
}

mod length_invariants {
    use super::*;

    /// After rescaling, every landmark pair measures its literature length.
    #[test]
    fn test_all_segments_hit_literature_lengths() {
        let mut doc = MjcfDocument::from_str(RODENT).unwrap();
        let report = rescale(&mut doc, &rat_plan()).unwrap();

        assert!(report.is_converged(), "residuals: {report}");
        assert!(report.max_residual() < 1e-12);

        let tree = BodyTree::from_document(&doc).unwrap();
        for (segment, proximal, distal, length_mm) in LITERATURE_MM {
            let measured = tree.site_distance(proximal, distal).unwrap();
            assert_relative_eq!(measured, length_mm * 1e-3, epsilon = 1e-12);
            let reported = report
                .segments
                .iter()
                .find(|s| s.segment == segment)
                .unwrap();
            assert_relative_eq!(reported.achieved, measured, epsilon = 1e-12);
        }
    }

    /// The right side shares the left side's part patterns and mirrored
    /// offsets, so it lands on the same lengths.
    #[test]
    fn test_right_side_mirrors_left() {
        let mut doc = MjcfDocument::from_str(RODENT).unwrap();
        rescale(&mut doc, &rat_plan()).unwrap();

        let tree = BodyTree::from_document(&doc).unwrap();
        assert_relative_eq!(
            tree.site_distance("shoulder_R", "elbow_R").unwrap(),
            0.030,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            tree.site_distance("ankle_R", "toe_R").unwrap(),
            0.0234,
            epsilon = 1e-12
        );
    }

    /// The invariant survives serialization: lengths re-measured from the
    /// written XML are still exact.
    #[test]
    fn test_invariant_survives_round_trip() {
        let mut doc = MjcfDocument::from_str(RODENT).unwrap();
        rescale(&mut doc, &rat_plan()).unwrap();

        let xml = doc.to_xml_string().unwrap();
        let reparsed = MjcfDocument::from_str(&xml).unwrap();
        let tree = BodyTree::from_document(&reparsed).unwrap();

        for (_, proximal, distal, length_mm) in LITERATURE_MM {
            assert_relative_eq!(
                tree.site_distance(proximal, distal).unwrap(),
                length_mm * 1e-3,
                epsilon = 1e-12
            );
        }
    }

    /// Rescaling an already-correct model is the identity up to floating
    /// point: every ratio is 1.
    #[test]
    fn test_rescaling_is_idempotent() {
        let mut doc = MjcfDocument::from_str(RODENT).unwrap();
        rescale(&mut doc, &rat_plan()).unwrap();

        // second pass without the global factor
        let report = rescale(&mut doc, &RescalePlan::default()).unwrap();
        for segment in &report.segments {
            assert_relative_eq!(segment.ratio, 1.0, epsilon = 1e-9);
        }
    }
}

mod scaling_scope {
    use super::*;

    /// Eye parts are exempt from the global position pass.
    #[test]
    fn test_eyes_keep_their_sockets() {
        let mut doc = MjcfDocument::from_str(RODENT).unwrap();
        rescale(&mut doc, &rat_plan()).unwrap();
        let xml = doc.to_xml_string().unwrap();
        assert!(xml.contains(r#"<body name="eye_L" pos="0.022 0.01 0.006">"#));
        assert!(xml.contains(r#"<body name="eye_R" pos="0.022 -0.01 0.006">"#));
    }

    /// The hand body offset belongs to the radius pass, the hand collision
    /// geom to the hand pass; the collision geom must therefore carry the
    /// hand ratio, not the radius ratio.
    #[test]
    fn test_hand_collision_geom_scales_with_hand_segment() {
        let mut doc = MjcfDocument::from_str(RODENT).unwrap();
        let report = rescale(&mut doc, &rat_plan()).unwrap();

        let hand_ratio = report
            .segments
            .iter()
            .find(|s| s.segment == "hand")
            .unwrap()
            .ratio;

        let mut size = None;
        doc.for_each_part_mut(|part| {
            if part.element_name() == Some("hand_collision_L") {
                size = part.floats_attr("size").unwrap();
            }
        });
        // original radius 0.005, scaled once by the hand ratio
        assert_relative_eq!(size.unwrap()[0], 0.005 * hand_ratio, epsilon = 1e-12);
    }

    /// Mesh filenames get the cosmetic substitution when configured.
    #[test]
    fn test_mesh_rename() {
        let mut doc = MjcfDocument::from_str(RODENT).unwrap();
        let plan = RescalePlan {
            mesh_rename: Some(MeshRename {
                from: ".stl".to_string(),
                to: "_scaled.stl".to_string(),
            }),
            ..rat_plan()
        };
        let report = rescale(&mut doc, &plan).unwrap();
        assert_eq!(report.meshes_renamed, 1);
        assert!(doc
            .to_xml_string()
            .unwrap()
            .contains(r#"file="skull_scaled.stl""#));
    }
}
