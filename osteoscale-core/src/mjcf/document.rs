//! In-memory MJCF document tree.

use crate::errors::{OsteoscaleError, OsteoscaleResult};
use crate::mjcf::attr::{self, AngleUnit};
use nalgebra::{UnitQuaternion, Vector3};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::path::Path;

/// A child of an [`Element`].
///
/// Comments and text are carried through verbatim so that serializing an
/// untouched document reproduces its content.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Comment(String),
    Text(String),
}

/// A single XML element with its attributes in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Value of the element's `name` attribute, if any.
    pub fn element_name(&self) -> Option<&str> {
        self.attr("name")
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Sets an attribute, replacing an existing value or appending a new
    /// attribute at the end (existing attribute order is preserved).
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.into(),
            None => self.attrs.push((key.to_string(), value.into())),
        }
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Child elements, skipping comments and text.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            _ => None,
        })
    }

    pub fn find_child(&self, tag: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.tag == tag)
    }

    pub fn find_child_mut(&mut self, tag: &str) -> Option<&mut Element> {
        self.child_elements_mut().find(|e| e.tag == tag)
    }

    /// Parses a float-list attribute, `Ok(None)` if absent.
    pub fn floats_attr(&self, key: &str) -> OsteoscaleResult<Option<Vec<f64>>> {
        self.attr(key)
            .map(|value| attr::parse_floats(key, value))
            .transpose()
    }

    /// Parses a 3-vector attribute such as `pos`, `Ok(None)` if absent.
    pub fn vec3_attr(&self, key: &str) -> OsteoscaleResult<Option<Vector3<f64>>> {
        self.attr(key)
            .map(|value| attr::parse_vec3(key, value))
            .transpose()
    }

    pub fn set_floats_attr(&mut self, key: &str, values: &[f64]) {
        self.set_attr(key, attr::format_floats(values));
    }

    pub fn set_vec3_attr(&mut self, key: &str, v: &Vector3<f64>) {
        self.set_floats_attr(key, &[v.x, v.y, v.z]);
    }

    /// Resolves the element's orientation from whichever of the MJCF
    /// orientation attributes is present (identity when none are).
    ///
    /// `quat` takes precedence, matching the compiler's behavior when a
    /// model redundantly specifies several.
    pub fn orientation(&self, unit: AngleUnit) -> OsteoscaleResult<UnitQuaternion<f64>> {
        if let Some(value) = self.attr("quat") {
            return attr::parse_quat(value);
        }
        if let Some(value) = self.attr("euler") {
            return attr::parse_euler(value, unit);
        }
        if let Some(value) = self.attr("axisangle") {
            return attr::parse_axisangle(value, unit);
        }
        if let Some(value) = self.attr("xyaxes") {
            return attr::parse_xyaxes(value);
        }
        if let Some(value) = self.attr("zaxis") {
            return attr::parse_zaxis(value);
        }
        Ok(UnitQuaternion::identity())
    }
}

/// A parsed MJCF document.
///
/// The tree below [`MjcfDocument::root`] is a faithful copy of the source
/// file; mutation happens through [`Element`] accessors and the document
/// serializes back with two-space indentation.
#[derive(Debug, Clone)]
pub struct MjcfDocument {
    has_decl: bool,
    root: Element,
}

impl MjcfDocument {
    /// Parses a document from an XML string.
    pub fn from_str(xml: &str) -> OsteoscaleResult<Self> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        let mut has_decl = false;

        loop {
            let event = reader.read_event().map_err(|e| OsteoscaleError::MalformedXml {
                position: reader.buffer_position(),
                message: e.to_string(),
            })?;
            match event {
                Event::Decl(_) => has_decl = true,
                Event::Start(start) => {
                    let element = element_from_start(&start, &reader)?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = element_from_start(&start, &reader)?;
                    place(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack.pop().ok_or_else(|| OsteoscaleError::MalformedXml {
                        position: reader.buffer_position(),
                        message: "unmatched closing tag".to_string(),
                    })?;
                    place(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let text = text.unescape().map_err(|e| OsteoscaleError::MalformedXml {
                        position: reader.buffer_position(),
                        message: e.to_string(),
                    })?;
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(Node::Text(trimmed.to_string()));
                        }
                    }
                }
                Event::Comment(comment) => {
                    // Comment bodies are stored raw; XML does not escape them.
                    let comment = String::from_utf8_lossy(&comment).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Comment(comment));
                    }
                }
                Event::CData(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(OsteoscaleError::MalformedXml {
                position: reader.buffer_position(),
                message: "unclosed element at end of input".to_string(),
            });
        }
        let root = root.ok_or_else(|| OsteoscaleError::MalformedXml {
            position: 0,
            message: "document has no root element".to_string(),
        })?;
        Ok(Self { has_decl, root })
    }

    /// Loads a document from a file.
    pub fn from_file(path: impl AsRef<Path>) -> OsteoscaleResult<Self> {
        let xml = fs::read_to_string(path)?;
        Self::from_str(&xml)
    }

    /// Serializes the document to an XML string.
    pub fn to_xml_string(&self) -> OsteoscaleResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        if self.has_decl {
            writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
                .map_err(|e| OsteoscaleError::Serialization(e.to_string()))?;
        }
        write_element(&mut writer, &self.root)
            .map_err(|e| OsteoscaleError::Serialization(e.to_string()))?;
        let mut xml = String::from_utf8(writer.into_inner())
            .map_err(|e| OsteoscaleError::Serialization(e.to_string()))?;
        xml.push('\n');
        Ok(xml)
    }

    /// Writes the document to a file.
    pub fn write_file(&self, path: impl AsRef<Path>) -> OsteoscaleResult<()> {
        let xml = self.to_xml_string()?;
        fs::write(path, xml)?;
        Ok(())
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// The model name declared on the root element.
    pub fn model_name(&self) -> Option<&str> {
        self.root.attr("model")
    }

    /// The angle unit declared by `<compiler angle="...">`.
    ///
    /// The format default is degrees.
    pub fn angle_unit(&self) -> AngleUnit {
        match self
            .root
            .find_child("compiler")
            .and_then(|compiler| compiler.attr("angle"))
        {
            Some("radian") => AngleUnit::Radian,
            _ => AngleUnit::Degree,
        }
    }

    pub fn worldbody(&self) -> Option<&Element> {
        self.root.find_child("worldbody")
    }

    pub fn worldbody_mut(&mut self) -> Option<&mut Element> {
        self.root.find_child_mut("worldbody")
    }

    /// Visits every `body`, `geom` and `site` element under the worldbody,
    /// in document order.
    pub fn for_each_part_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Element),
    {
        if let Some(worldbody) = self.worldbody_mut() {
            visit_parts_mut(worldbody, &mut f);
        }
    }

    /// Substitutes `from` with `to` in the `file` attribute of every mesh
    /// asset. Returns the number of filenames rewritten.
    pub fn rename_mesh_files(&mut self, from: &str, to: &str) -> usize {
        let mut renamed = 0;
        if let Some(asset) = self.root.find_child_mut("asset") {
            for mesh in asset.child_elements_mut().filter(|e| e.tag() == "mesh") {
                if let Some(file) = mesh.attr("file") {
                    if file.contains(from) {
                        let replaced = file.replace(from, to);
                        mesh.set_attr("file", replaced);
                        renamed += 1;
                    }
                }
            }
        }
        renamed
    }
}

fn visit_parts_mut<F>(element: &mut Element, f: &mut F)
where
    F: FnMut(&mut Element),
{
    for child in element.child_elements_mut() {
        match child.tag() {
            "body" => {
                f(child);
                visit_parts_mut(child, f);
            }
            "geom" | "site" => f(child),
            _ => {}
        }
    }
}

fn element_from_start<R>(
    start: &BytesStart<'_>,
    reader: &Reader<R>,
) -> OsteoscaleResult<Element> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(tag);
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| OsteoscaleError::MalformedXml {
            position: reader.buffer_position(),
            message: e.to_string(),
        })?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| OsteoscaleError::MalformedXml {
                position: reader.buffer_position(),
                message: e.to_string(),
            })?
            .into_owned();
        element.attrs.push((key, value));
    }
    Ok(element)
}

fn place(
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
    element: Element,
) -> OsteoscaleResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(Node::Element(element));
            Ok(())
        }
        None => {
            if root.is_some() {
                return Err(OsteoscaleError::MalformedXml {
                    position: 0,
                    message: "multiple root elements".to_string(),
                });
            }
            *root = Some(element);
            Ok(())
        }
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> quick_xml::Result<()> {
    let mut start = BytesStart::new(element.tag());
    for (key, value) in element.attrs() {
        start.push_attribute((key, value));
    }
    if element.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Comment(c) => {
                writer.write_event(Event::Comment(BytesText::from_escaped(c.as_str())))?
            }
            Node::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(element.tag())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    const MINIMAL: &str = r#"<mujoco model="rodent">
  <compiler angle="radian" meshdir="meshes"/>
  <asset>
    <mesh name="skull" file="skull.stl"/>
    <mesh name="pelvis" file="pelvis_simple.stl"/>
    <texture name="grid" type="2d" builtin="checker" width="64" height="64"/>
  </asset>
  <worldbody>
    <!-- floor -->
    <geom name="floor" type="plane" size="1 1 0.1"/>
    <body name="torso" pos="0 0 0.06">
      <site name="spine_m" pos="0 0 0.01"/>
      <geom name="torso" type="capsule" size="0.02 0.05"/>
      <body name="skull" pos="0.07 0 0.01" quat="1 0 0 0">
        <geom name="skull" type="mesh" mesh="skull"/>
      </body>
    </body>
  </worldbody>
</mujoco>
"#;

    #[test]
    fn parse_basic_structure() {
        let doc = MjcfDocument::from_str(MINIMAL).unwrap();
        assert_eq!(doc.model_name(), Some("rodent"));
        assert_eq!(doc.angle_unit(), AngleUnit::Radian);

        let worldbody = doc.worldbody().unwrap();
        let torso = worldbody.find_child("body").unwrap();
        assert_eq!(torso.element_name(), Some("torso"));
        assert_eq!(
            torso.vec3_attr("pos").unwrap(),
            Some(Vector3::new(0.0, 0.0, 0.06))
        );
    }

    #[test]
    fn round_trip_preserves_content() {
        let doc = MjcfDocument::from_str(MINIMAL).unwrap();
        let xml = doc.to_xml_string().unwrap();
        let again = MjcfDocument::from_str(&xml).unwrap();
        assert_eq!(doc.root(), again.root());
        // Comments survive
        assert!(xml.contains("<!-- floor -->"));
        // Attributes the scaler never touches survive verbatim
        assert!(xml.contains(r#"builtin="checker""#));
    }

    #[test]
    fn for_each_part_visits_bodies_geoms_sites() {
        let mut doc = MjcfDocument::from_str(MINIMAL).unwrap();
        let mut names = Vec::new();
        doc.for_each_part_mut(|part| {
            names.push(format!(
                "{}:{}",
                part.tag(),
                part.element_name().unwrap_or("")
            ));
        });
        assert_eq!(
            names,
            vec![
                "geom:floor",
                "body:torso",
                "site:spine_m",
                "geom:torso",
                "body:skull",
                "geom:skull",
            ]
        );
    }

    #[test]
    fn set_vec3_changes_serialization() {
        let mut doc = MjcfDocument::from_str(MINIMAL).unwrap();
        doc.for_each_part_mut(|part| {
            if part.element_name() == Some("torso") && part.tag() == "body" {
                part.set_vec3_attr("pos", &Vector3::new(0.0, 0.0, 0.12));
            }
        });
        let xml = doc.to_xml_string().unwrap();
        assert!(xml.contains(r#"<body name="torso" pos="0 0 0.12">"#));
    }

    #[test]
    fn rename_mesh_files_rewrites_only_matches() {
        let mut doc = MjcfDocument::from_str(MINIMAL).unwrap();
        let renamed = doc.rename_mesh_files(".stl", "_scaled.stl");
        assert_eq!(renamed, 2);
        let xml = doc.to_xml_string().unwrap();
        assert!(xml.contains(r#"file="skull_scaled.stl""#));
        assert!(xml.contains(r#"file="pelvis_simple_scaled.stl""#));
        // texture asset untouched
        assert!(xml.contains(r#"<texture name="grid""#));
    }

    #[test]
    fn malformed_xml_reports_position() {
        let err = MjcfDocument::from_str("<mujoco><worldbody></mujoco>").unwrap_err();
        assert!(err.to_string().contains("malformed XML"));
    }

    #[test]
    fn default_angle_unit_is_degrees() {
        let doc = MjcfDocument::from_str("<mujoco><worldbody/></mujoco>").unwrap();
        assert_eq!(doc.angle_unit(), AngleUnit::Degree);
    }
}
