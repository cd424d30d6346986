//! Rest-pose kinematics over the MJCF body tree.
//!
//! The scaler never runs physics; it only needs world-frame positions of
//! landmark sites with every joint at its reference value. [`BodyTree`]
//! indexes the document's bodies into a directed graph, accumulates world
//! transforms from the root outwards, and answers site-position and
//! site-distance queries against that rest pose.

use crate::errors::{OsteoscaleError, OsteoscaleResult};
use crate::mjcf::{AngleUnit, Element, MjcfDocument};
use nalgebra::{Isometry3, Point3, Translation3, Vector3};
use petgraph::graph::{Graph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use std::collections::HashMap;

/// Kind of a joint, as declared by its element tag and `type` attribute.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum JointKind {
    Free,
    Ball,
    Hinge,
    Slide,
}

impl JointKind {
    /// Number of qpos entries this joint occupies.
    pub fn qpos_dof(self) -> usize {
        match self {
            JointKind::Free => 7,
            JointKind::Ball => 4,
            JointKind::Hinge | JointKind::Slide => 1,
        }
    }
}

/// A joint in kinematic-tree order.
#[derive(Clone, Debug)]
pub struct JointInfo {
    pub name: String,
    pub kind: JointKind,
    /// Admissible range, in radians for hinges and model units for slides.
    pub range: Option<(f64, f64)>,
}

/// One body of the kinematic tree.
#[derive(Clone, Debug)]
struct BodyNode {
    name: String,
    local: Isometry3<f64>,
    sites: Vec<(String, Vector3<f64>)>,
}

/// Rest-pose index of an MJCF model's kinematic tree.
pub struct BodyTree {
    graph: Graph<BodyNode, ()>,
    roots: Vec<NodeIndex>,
    bodies_by_name: HashMap<String, NodeIndex>,
    world_transforms: HashMap<NodeIndex, Isometry3<f64>>,
    site_world: HashMap<String, Point3<f64>>,
    joints: Vec<JointInfo>,
}

impl BodyTree {
    /// Builds the tree from a parsed document.
    ///
    /// Joints are collected in depth-first document order, which is the
    /// order their values appear in a qpos vector.
    pub fn from_document(doc: &MjcfDocument) -> OsteoscaleResult<Self> {
        let unit = doc.angle_unit();
        let worldbody = doc
            .worldbody()
            .ok_or_else(|| OsteoscaleError::Error("model has no worldbody".to_string()))?;

        let mut tree = Self {
            graph: Graph::new(),
            roots: Vec::new(),
            bodies_by_name: HashMap::new(),
            world_transforms: HashMap::new(),
            site_world: HashMap::new(),
            joints: Vec::new(),
        };

        // Sites attached directly to the worldbody live in the world frame.
        for site in worldbody.child_elements().filter(|e| e.tag() == "site") {
            if let Some(name) = site.element_name() {
                let pos = site.vec3_attr("pos")?.unwrap_or_else(Vector3::zeros);
                tree.site_world.insert(name.to_string(), Point3::from(pos));
            }
        }

        for body in worldbody.child_elements().filter(|e| e.tag() == "body") {
            let index = tree.add_body(body, None, unit)?;
            tree.roots.push(index);
        }

        tree.accumulate_world_transforms();
        Ok(tree)
    }

    fn add_body(
        &mut self,
        element: &Element,
        parent: Option<NodeIndex>,
        unit: AngleUnit,
    ) -> OsteoscaleResult<NodeIndex> {
        let name = element.element_name().unwrap_or("").to_string();
        let pos = element.vec3_attr("pos")?.unwrap_or_else(Vector3::zeros);
        let rotation = element.orientation(unit)?;
        let local = Isometry3::from_parts(Translation3::from(pos), rotation);

        let mut sites = Vec::new();
        for child in element.child_elements() {
            match child.tag() {
                "site" => {
                    if let Some(site_name) = child.element_name() {
                        let site_pos = child.vec3_attr("pos")?.unwrap_or_else(Vector3::zeros);
                        sites.push((site_name.to_string(), site_pos));
                    }
                }
                "joint" | "freejoint" => self.record_joint(child, unit)?,
                _ => {}
            }
        }

        let index = self.graph.add_node(BodyNode {
            name: name.clone(),
            local,
            sites,
        });
        if let Some(parent) = parent {
            self.graph.add_edge(parent, index, ());
        }
        if !name.is_empty() {
            self.bodies_by_name.insert(name, index);
        }

        for child in element.child_elements().filter(|e| e.tag() == "body") {
            self.add_body(child, Some(index), unit)?;
        }
        Ok(index)
    }

    fn record_joint(&mut self, element: &Element, unit: AngleUnit) -> OsteoscaleResult<()> {
        let kind = if element.tag() == "freejoint" {
            JointKind::Free
        } else {
            match element.attr("type").unwrap_or("hinge") {
                "free" => JointKind::Free,
                "ball" => JointKind::Ball,
                "slide" => JointKind::Slide,
                "hinge" => JointKind::Hinge,
                other => {
                    return Err(OsteoscaleError::MalformedAttribute {
                        attribute: "type".to_string(),
                        value: other.to_string(),
                    })
                }
            }
        };
        let range = match element.floats_attr("range")? {
            Some(values) if values.len() == 2 => {
                // Hinge ranges follow the compiler angle unit; qpos is
                // always radians.
                if kind == JointKind::Hinge {
                    Some((unit.to_radians(values[0]), unit.to_radians(values[1])))
                } else {
                    Some((values[0], values[1]))
                }
            }
            Some(values) => {
                return Err(OsteoscaleError::MalformedAttribute {
                    attribute: "range".to_string(),
                    value: crate::mjcf::attr::format_floats(&values),
                })
            }
            None => None,
        };
        self.joints.push(JointInfo {
            name: element.element_name().unwrap_or("").to_string(),
            kind,
            range,
        });
        Ok(())
    }

    fn accumulate_world_transforms(&mut self) {
        for &root in &self.roots {
            let mut bfs = Bfs::new(&self.graph, root);
            while let Some(index) = bfs.next(&self.graph) {
                let parent_world = self
                    .graph
                    .neighbors_directed(index, Direction::Incoming)
                    .next()
                    .and_then(|parent| self.world_transforms.get(&parent).copied())
                    .unwrap_or_else(Isometry3::identity);
                let world = parent_world * self.graph[index].local;
                for (site_name, site_pos) in &self.graph[index].sites {
                    self.site_world
                        .insert(site_name.clone(), world * Point3::from(*site_pos));
                }
                self.world_transforms.insert(index, world);
            }
        }
    }

    /// Number of bodies in the tree.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Body names in tree order.
    pub fn body_names(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .map(|index| self.graph[index].name.as_str())
            .collect()
    }

    /// World transform of a named body at the rest pose.
    pub fn body_world(&self, name: &str) -> Option<Isometry3<f64>> {
        self.bodies_by_name
            .get(name)
            .and_then(|index| self.world_transforms.get(index))
            .copied()
    }

    /// World position of a named site at the rest pose.
    pub fn site_position(&self, name: &str) -> Option<Point3<f64>> {
        self.site_world.get(name).copied()
    }

    /// Euclidean distance between two named sites at the rest pose.
    pub fn site_distance(&self, a: &str, b: &str) -> Option<f64> {
        let a = self.site_position(a)?;
        let b = self.site_position(b)?;
        Some((a - b).norm())
    }

    /// Joints in qpos order.
    pub fn joints(&self) -> &[JointInfo] {
        &self.joints
    }

    /// Total qpos width implied by the model's joints.
    pub fn qpos_width(&self) -> usize {
        self.joints.iter().map(|j| j.kind.qpos_dof()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ARM: &str = r#"<mujoco model="arm">
  <compiler angle="radian"/>
  <worldbody>
    <site name="origin_marker" pos="0 0 0"/>
    <body name="torso" pos="0 0 0.1">
      <freejoint name="root"/>
      <site name="spine" pos="0 0 0.02"/>
      <body name="upper_arm" pos="0.05 0 0" quat="0.70710678118654757 0 0 0.70710678118654746">
        <joint name="shoulder_flex" range="-1.5 1.5"/>
        <site name="shoulder" pos="0 0 0"/>
        <body name="lower_arm" pos="0.03 0 0">
          <joint name="elbow_flex" type="hinge" range="0 2.4"/>
          <site name="elbow" pos="0 0 0"/>
          <site name="wrist" pos="0.02 0 0"/>
        </body>
      </body>
    </body>
  </worldbody>
</mujoco>
"#;

    fn arm_tree() -> BodyTree {
        let doc = MjcfDocument::from_str(ARM).unwrap();
        BodyTree::from_document(&doc).unwrap()
    }

    #[test]
    fn body_count_and_lookup() {
        let tree = arm_tree();
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.body_names(), vec!["torso", "upper_arm", "lower_arm"]);
        assert!(tree.body_world("upper_arm").is_some());
        assert!(tree.body_world("tail").is_none());
    }

    #[test]
    fn world_positions_accumulate_rotation() {
        let tree = arm_tree();

        // torso at (0, 0, 0.1); upper_arm offset (0.05, 0, 0); the
        // upper_arm frame is rotated 90 degrees about z, so lower_arm's
        // (0.03, 0, 0) offset points along world +y.
        let elbow = tree.site_position("elbow").unwrap();
        assert_relative_eq!(elbow.x, 0.05, epsilon = 1e-12);
        assert_relative_eq!(elbow.y, 0.03, epsilon = 1e-12);
        assert_relative_eq!(elbow.z, 0.1, epsilon = 1e-12);

        let wrist = tree.site_position("wrist").unwrap();
        assert_relative_eq!(wrist.y, 0.05, epsilon = 1e-12);
    }

    #[test]
    fn worldbody_sites_are_world_frame() {
        let tree = arm_tree();
        let marker = tree.site_position("origin_marker").unwrap();
        assert_relative_eq!(marker.coords.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn site_distance_is_rotation_invariant() {
        let tree = arm_tree();
        // shoulder and elbow sit at their bodies' origins, so the distance
        // is the lower_arm offset length regardless of frame rotations.
        assert_relative_eq!(
            tree.site_distance("shoulder", "elbow").unwrap(),
            0.03,
            epsilon = 1e-12
        );
        assert!(tree.site_distance("shoulder", "nonexistent").is_none());
    }

    #[test]
    fn joints_in_document_order() {
        let tree = arm_tree();
        let names: Vec<_> = tree.joints().iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["root", "shoulder_flex", "elbow_flex"]);
        assert_eq!(tree.joints()[0].kind, JointKind::Free);
        assert_eq!(tree.qpos_width(), 9);
    }

    #[test]
    fn hinge_ranges_convert_degrees() {
        let xml = r#"<mujoco>
  <worldbody>
    <body name="b" pos="0 0 0">
      <joint name="j" range="-90 90"/>
    </body>
  </worldbody>
</mujoco>"#;
        let doc = MjcfDocument::from_str(xml).unwrap();
        let tree = BodyTree::from_document(&doc).unwrap();
        let (lo, hi) = tree.joints()[0].range.unwrap();
        assert_relative_eq!(lo, -std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(hi, std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn missing_worldbody_is_an_error() {
        let doc = MjcfDocument::from_str("<mujoco><asset/></mujoco>").unwrap();
        assert!(BodyTree::from_document(&doc).is_err());
    }
}
