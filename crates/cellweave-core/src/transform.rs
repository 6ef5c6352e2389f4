//! Placement transforms.
//!
//! A [Transform] applies, in order: the mirror scale, an exact quarter-turn
//! rotation, and a translation. Rotations are implemented by swapping and
//! negating coordinates so that grid-aligned geometry stays grid-aligned.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};
use crate::geometry::{BBox, Label, Point, Rect};

/// Mirror applied to a placed module before rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mirror {
    /// Identity.
    #[default]
    R0,
    /// Mirror about the X axis, `(x, y) -> (x, -y)`.
    MX,
    /// Mirror about the Y axis, `(x, y) -> (-x, y)`.
    MY,
    /// Mirror about both axes.
    XY,
}

impl Mirror {
    pub const ALL: [Mirror; 4] = [Mirror::R0, Mirror::MX, Mirror::MY, Mirror::XY];

    /// The per-axis scale realizing this mirror.
    pub fn scale(&self) -> Point {
        match self {
            Mirror::R0 => Point::new(1.0, 1.0),
            Mirror::MX => Point::new(1.0, -1.0),
            Mirror::MY => Point::new(-1.0, 1.0),
            Mirror::XY => Point::new(-1.0, -1.0),
        }
    }

    fn matrix(&self) -> Matrix {
        match self {
            Mirror::R0 => [[1, 0], [0, 1]],
            Mirror::MX => [[1, 0], [0, -1]],
            Mirror::MY => [[-1, 0], [0, 1]],
            Mirror::XY => [[-1, 0], [0, -1]],
        }
    }
}

impl FromStr for Mirror {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "R0" => Ok(Mirror::R0),
            "MX" => Ok(Mirror::MX),
            "MY" => Ok(Mirror::MY),
            "XY" => Ok(Mirror::XY),
            "R90" | "R180" | "R270" => Err(LayoutError::MirrorEncodesRotation(s.to_string())),
            _ => Err(LayoutError::UnknownMirror(s.to_string())),
        }
    }
}

impl fmt::Display for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mirror::R0 => "R0",
            Mirror::MX => "MX",
            Mirror::MY => "MY",
            Mirror::XY => "XY",
        };
        write!(f, "{s}")
    }
}

/// Counter-clockwise quarter-turn rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270];

    pub fn from_degrees(degrees: f64) -> LayoutResult<Self> {
        if !degrees.is_finite() {
            return Err(LayoutError::InvalidRotation(degrees));
        }
        let normalized = degrees.rem_euclid(360.0);
        let quarter = normalized / 90.0;
        if (quarter - quarter.round()).abs() > 1e-9 {
            return Err(LayoutError::InvalidRotation(degrees));
        }
        Ok(match quarter.round() as i64 % 4 {
            0 => Rotation::R0,
            1 => Rotation::R90,
            2 => Rotation::R180,
            _ => Rotation::R270,
        })
    }

    pub fn degrees(&self) -> f64 {
        match self {
            Rotation::R0 => 0.0,
            Rotation::R90 => 90.0,
            Rotation::R180 => 180.0,
            Rotation::R270 => 270.0,
        }
    }

    /// Rotate `p` about the origin by swapping and negating coordinates.
    pub fn rotate(&self, p: Point) -> Point {
        match self {
            Rotation::R0 => p,
            Rotation::R90 => Point::new(-p.y, p.x),
            Rotation::R180 => Point::new(-p.x, -p.y),
            Rotation::R270 => Point::new(p.y, -p.x),
        }
    }

    fn matrix(&self) -> Matrix {
        match self {
            Rotation::R0 => [[1, 0], [0, 1]],
            Rotation::R90 => [[0, -1], [1, 0]],
            Rotation::R180 => [[-1, 0], [0, -1]],
            Rotation::R270 => [[0, 1], [-1, 0]],
        }
    }

    /// The rotation whose first matrix column is `(c0, c1)`.
    fn from_first_column(c0: i8, c1: i8) -> Self {
        match (c0, c1) {
            (0, 1) => Rotation::R90,
            (-1, 0) => Rotation::R180,
            (0, -1) => Rotation::R270,
            _ => Rotation::R0,
        }
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.degrees() as i64)
    }
}

/// Signed-permutation matrix, row-major.
pub type Matrix = [[i8; 2]; 2];

fn matmul(a: &Matrix, b: &Matrix) -> Matrix {
    [
        [
            a[0][0] * b[0][0] + a[0][1] * b[1][0],
            a[0][0] * b[0][1] + a[0][1] * b[1][1],
        ],
        [
            a[1][0] * b[0][0] + a[1][1] * b[1][0],
            a[1][0] * b[0][1] + a[1][1] * b[1][1],
        ],
    ]
}

fn matvec(a: &Matrix, p: Point) -> Point {
    Point::new(
        a[0][0] as f64 * p.x + a[0][1] as f64 * p.y,
        a[1][0] as f64 * p.x + a[1][1] as f64 * p.y,
    )
}

fn transpose(a: &Matrix) -> Matrix {
    [[a[0][0], a[1][0]], [a[0][1], a[1][1]]]
}

/// Placement of a module: mirror, then rotate, then translate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub offset: Point,
    pub mirror: Mirror,
    pub rotation: Rotation,
}

impl Transform {
    pub fn new(offset: Point, mirror: Mirror, rotation: Rotation) -> Self {
        Self {
            offset,
            mirror,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn translate(x: f64, y: f64) -> Self {
        Self {
            offset: Point::new(x, y),
            ..Default::default()
        }
    }

    pub fn apply(&self, point: &Point) -> Point {
        let scaled = point.scale(self.mirror.scale());
        self.rotation.rotate(scaled) + self.offset
    }

    /// Transform a box and renormalize its corners.
    pub fn apply_box(&self, bbox: &BBox) -> BBox {
        BBox::new(self.apply(&bbox.min), self.apply(&bbox.max))
    }

    /// The combined linear part, `rotation * mirror`.
    pub fn matrix(&self) -> Matrix {
        matmul(&self.rotation.matrix(), &self.mirror.matrix())
    }

    /// Canonical (mirror, rotation) pair realizing `matrix`.
    ///
    /// Proper rotations map to `R0` + rotation; reflections to `MX` + rotation.
    pub fn from_matrix(matrix: &Matrix, offset: Point) -> Self {
        let det = matrix[0][0] * matrix[1][1] - matrix[0][1] * matrix[1][0];
        let mirror = if det < 0 { Mirror::MX } else { Mirror::R0 };
        let rotation = Rotation::from_first_column(matrix[0][0], matrix[1][0]);
        Self {
            offset,
            mirror,
            rotation,
        }
    }

    pub fn inverse(&self) -> Self {
        let inv = transpose(&self.matrix());
        let offset = -matvec(&inv, self.offset);
        Self::from_matrix(&inv, offset)
    }

    /// The transform equivalent to applying `child`, then `parent`.
    pub fn cascade(parent: &Transform, child: &Transform) -> Transform {
        let a = matmul(&parent.matrix(), &child.matrix());
        let offset = matvec(&parent.matrix(), child.offset) + parent.offset;
        Self::from_matrix(&a, offset)
    }
}

/// Geometry that can be moved into a parent coordinate frame.
pub trait Transformable {
    fn transformed(&self, trans: &Transform) -> Self;

    fn translated(&self, delta: Point) -> Self
    where
        Self: Sized,
    {
        self.transformed(&Transform::translate(delta.x, delta.y))
    }
}

impl Transformable for Point {
    fn transformed(&self, trans: &Transform) -> Self {
        trans.apply(self)
    }
}

impl Transformable for BBox {
    fn transformed(&self, trans: &Transform) -> Self {
        trans.apply_box(self)
    }
}

impl Transformable for Rect {
    fn transformed(&self, trans: &Transform) -> Self {
        self.with_bbox(trans.apply_box(&self.bbox()))
    }
}

impl Transformable for Label {
    fn transformed(&self, trans: &Transform) -> Self {
        Self {
            position: trans.apply(&self.position),
            ..self.clone()
        }
    }
}
