use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::layer::{Layer, LayerId, PurposeId};

/// Tolerance used when comparing coordinates that should sit on the manufacturing grid.
pub const GRID_TOLERANCE: f64 = 1e-6;

/// Round `value` to the nearest multiple of `grid`.
pub fn snap_to_grid(value: f64, grid: f64) -> f64 {
    if grid <= 0.0 {
        return value;
    }
    (value / grid).round() * grid
}

/// Round `value` up to the next multiple of `grid`.
///
/// Values already within [GRID_TOLERANCE] of a grid line stay on that line.
pub fn ceil_to_grid(value: f64, grid: f64) -> f64 {
    if grid <= 0.0 {
        return value;
    }
    let steps = value / grid;
    let nearest = steps.round();
    if (steps - nearest).abs() * grid < GRID_TOLERANCE {
        nearest * grid
    } else {
        steps.ceil() * grid
    }
}

/// A 2D point in layout coordinates (microns).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Per-axis scale. A `(1, -1)` factor mirrors about the X axis.
    pub fn scale(&self, factor: Point) -> Self {
        Self {
            x: self.x * factor.x,
            y: self.y * factor.y,
        }
    }

    pub fn snap_to_grid(&self, grid: f64) -> Self {
        Self {
            x: snap_to_grid(self.x, grid),
            y: snap_to_grid(self.y, grid),
        }
    }

    pub fn min(&self, other: &Point) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    pub fn max(&self, other: &Point) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }

    pub fn approx_eq(&self, other: &Point, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

/// An axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl BBox {
    /// Build a box from two corners given in any order.
    pub fn new(a: Point, b: Point) -> Self {
        Self {
            min: a.min(&b),
            max: a.max(&b),
        }
    }

    pub fn from_size(offset: Point, width: f64, height: f64) -> Self {
        Self::new(offset, offset.translate(width, height))
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn union(&self, other: &BBox) -> Self {
        Self {
            min: self.min.min(&other.min),
            max: self.max.max(&other.max),
        }
    }

    pub fn translate(&self, delta: Point) -> Self {
        Self {
            min: self.min + delta,
            max: self.max + delta,
        }
    }

    /// Grow (or with a negative distance, shrink) every side by `dist`.
    pub fn expand(&self, dist: f64) -> Self {
        BBox::new(
            self.min.translate(-dist, -dist),
            self.max.translate(dist, dist),
        )
    }

    pub fn approx_eq(&self, other: &BBox, tolerance: f64) -> bool {
        self.min.approx_eq(&other.min, tolerance) && self.max.approx_eq(&other.max, tolerance)
    }
}

/// A rectangle on a drawn layer, stored by its lower-left and upper-right corners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub layer: LayerId,
    pub purpose: PurposeId,
    pub lower_left: Point,
    pub upper_right: Point,
}

impl Rect {
    pub fn new(layer: LayerId, purpose: PurposeId, x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::from_bbox(layer, purpose, BBox::new(Point::new(x1, y1), Point::new(x2, y2)))
    }

    pub fn from_bbox(layer: LayerId, purpose: PurposeId, bbox: BBox) -> Self {
        Self {
            layer,
            purpose,
            lower_left: bbox.min,
            upper_right: bbox.max,
        }
    }

    /// Rectangle on `layer` with lower-left corner `offset`.
    ///
    /// Returns `None` when the layer is absent from the technology.
    pub fn on_layer(layer: &Layer, offset: Point, width: f64, height: f64) -> Option<Self> {
        let (number, purpose) = layer.id()?;
        Some(Self::from_bbox(
            number,
            purpose,
            BBox::from_size(offset, width, height),
        ))
    }

    pub fn bbox(&self) -> BBox {
        BBox::new(self.lower_left, self.upper_right)
    }

    pub fn offset(&self) -> Point {
        self.lower_left
    }

    pub fn width(&self) -> f64 {
        self.upper_right.x - self.lower_left.x
    }

    pub fn height(&self) -> f64 {
        self.upper_right.y - self.lower_left.y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center(&self) -> Point {
        self.bbox().center()
    }

    /// Whether this rectangle sits on `layer` (always false for absent layers).
    pub fn is_on(&self, layer: &Layer) -> bool {
        layer.id() == Some((self.layer, self.purpose))
    }

    pub fn with_bbox(&self, bbox: BBox) -> Self {
        Self::from_bbox(self.layer, self.purpose, bbox)
    }
}

/// A text annotation. Labels never contribute to extents or blockages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub text: String,
    pub layer: LayerId,
    pub purpose: PurposeId,
    pub position: Point,
}

impl Label {
    pub fn on_layer(text: &str, layer: &Layer, position: Point) -> Option<Self> {
        let (number, purpose) = layer.id()?;
        Some(Self {
            text: text.to_string(),
            layer: number,
            purpose,
            position,
        })
    }
}

/// Geometry owned directly by a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Rect(Rect),
    Label(Label),
}

impl Shape {
    pub fn bbox(&self) -> BBox {
        match self {
            Shape::Rect(r) => r.bbox(),
            Shape::Label(l) => BBox::new(l.position, l.position),
        }
    }

    pub fn as_rect(&self) -> Option<&Rect> {
        match self {
            Shape::Rect(r) => Some(r),
            Shape::Label(_) => None,
        }
    }
}
