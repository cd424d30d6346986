//! Numeric attribute codecs.
//!
//! MJCF encodes vectors as whitespace-separated decimal literals:
//!
//! ```text
//! vector   = number (ws number)*
//! number   = float literal accepted by Rust's f64 parser
//! ```
//!
//! Orientations can be specified in several equivalent forms (`quat`,
//! `euler`, `axisangle`, `xyaxes`, `zaxis`), each with its own parser
//! producing a unit quaternion; [`crate::mjcf::Element::orientation`]
//! picks whichever is present.

use crate::errors::{OsteoscaleError, OsteoscaleResult};
use nalgebra::{Matrix3, Quaternion, Rotation3, Unit, UnitQuaternion, Vector3};

/// Whether angle-valued attributes are given in degrees or radians.
///
/// Controlled by the `<compiler angle="...">` setting; the format default
/// is degrees.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AngleUnit {
    Degree,
    Radian,
}

impl AngleUnit {
    /// Convert an angle in this unit to radians.
    pub fn to_radians(self, angle: f64) -> f64 {
        match self {
            AngleUnit::Degree => angle.to_radians(),
            AngleUnit::Radian => angle,
        }
    }
}

/// Parses a whitespace-separated list of floats.
pub fn parse_floats(attribute: &str, value: &str) -> OsteoscaleResult<Vec<f64>> {
    value
        .split_whitespace()
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| OsteoscaleError::MalformedAttribute {
                    attribute: attribute.to_string(),
                    value: value.to_string(),
                })
        })
        .collect()
}

/// Parses a 3-vector attribute such as `pos`.
pub fn parse_vec3(attribute: &str, value: &str) -> OsteoscaleResult<Vector3<f64>> {
    let values = parse_floats(attribute, value)?;
    if values.len() != 3 {
        return Err(OsteoscaleError::MalformedAttribute {
            attribute: attribute.to_string(),
            value: value.to_string(),
        });
    }
    Ok(Vector3::new(values[0], values[1], values[2]))
}

/// Parses a `quat` attribute (scalar-first `w x y z` order).
pub fn parse_quat(value: &str) -> OsteoscaleResult<UnitQuaternion<f64>> {
    let values = parse_floats("quat", value)?;
    if values.len() != 4 {
        return Err(OsteoscaleError::MalformedAttribute {
            attribute: "quat".to_string(),
            value: value.to_string(),
        });
    }
    Ok(UnitQuaternion::from_quaternion(Quaternion::new(
        values[0], values[1], values[2], values[3],
    )))
}

/// Parses an `euler` attribute: extrinsic rotations about the fixed x, y
/// and z axes, applied in that order.
pub fn parse_euler(value: &str, unit: AngleUnit) -> OsteoscaleResult<UnitQuaternion<f64>> {
    let values = parse_floats("euler", value)?;
    if values.len() != 3 {
        return Err(OsteoscaleError::MalformedAttribute {
            attribute: "euler".to_string(),
            value: value.to_string(),
        });
    }
    Ok(UnitQuaternion::from_euler_angles(
        unit.to_radians(values[0]),
        unit.to_radians(values[1]),
        unit.to_radians(values[2]),
    ))
}

/// Parses an `axisangle` attribute (`x y z angle`).
pub fn parse_axisangle(value: &str, unit: AngleUnit) -> OsteoscaleResult<UnitQuaternion<f64>> {
    let values = parse_floats("axisangle", value)?;
    if values.len() != 4 {
        return Err(OsteoscaleError::MalformedAttribute {
            attribute: "axisangle".to_string(),
            value: value.to_string(),
        });
    }
    let axis = Vector3::new(values[0], values[1], values[2]);
    if axis.norm() == 0.0 {
        return Err(OsteoscaleError::MalformedAttribute {
            attribute: "axisangle".to_string(),
            value: value.to_string(),
        });
    }
    Ok(UnitQuaternion::from_axis_angle(
        &Unit::new_normalize(axis),
        unit.to_radians(values[3]),
    ))
}

/// Parses an `xyaxes` attribute (`x1 x2 x3 y1 y2 y3`): the frame's x and y
/// axes, re-orthonormalized, with z completing the right-handed triad.
pub fn parse_xyaxes(value: &str) -> OsteoscaleResult<UnitQuaternion<f64>> {
    let values = parse_floats("xyaxes", value)?;
    if values.len() != 6 {
        return Err(OsteoscaleError::MalformedAttribute {
            attribute: "xyaxes".to_string(),
            value: value.to_string(),
        });
    }
    let x = Vector3::new(values[0], values[1], values[2]);
    let mut y = Vector3::new(values[3], values[4], values[5]);
    if x.norm() == 0.0 || y.norm() == 0.0 {
        return Err(OsteoscaleError::MalformedAttribute {
            attribute: "xyaxes".to_string(),
            value: value.to_string(),
        });
    }
    let x = x.normalize();
    y -= x * x.dot(&y);
    let y = y.normalize();
    let z = x.cross(&y);
    let rotation = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[x, y, z]));
    Ok(UnitQuaternion::from_rotation_matrix(&rotation))
}

/// Parses a `zaxis` attribute: the rotation with minimal angle mapping
/// `(0, 0, 1)` onto the given direction.
pub fn parse_zaxis(value: &str) -> OsteoscaleResult<UnitQuaternion<f64>> {
    let target = parse_vec3("zaxis", value)?;
    if target.norm() == 0.0 {
        return Err(OsteoscaleError::MalformedAttribute {
            attribute: "zaxis".to_string(),
            value: value.to_string(),
        });
    }
    Ok(
        UnitQuaternion::rotation_between(&Vector3::z(), &target)
            .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector3::x_axis(), std::f64::consts::PI)),
    )
}

/// Formats a float list back into MJCF attribute syntax.
///
/// Uses the shortest decimal representation that round-trips, so values the
/// scaler never touched serialize back unchanged.
pub fn format_floats(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
