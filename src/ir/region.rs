//! Pixel-space regions and annotation shapes.

use serde::{Deserialize, Serialize};

use super::coord::Coord;
use super::space::Pixel;
use crate::error::FramelabelError;

/// An axis-aligned rectangle in pixel space, stored as top-left corner plus
/// size (XYWH).
///
/// Equality is exact: two regions that differ by a fraction of a pixel are
/// different regions.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    #[inline]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a region from two opposite corners in any order.
    pub fn from_corners(a: Coord<Pixel>, b: Coord<Pixel>) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self::new(x, y, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    #[inline]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn center(&self) -> Coord<Pixel> {
        Coord::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// A region that can never be committed: zero or negative extent, or
    /// non-finite components.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        !self.is_finite() || self.width <= 0.0 || self.height <= 0.0
    }

    /// Checks the region is committable: finite, positive extent and a
    /// non-negative origin.
    pub fn validate(&self) -> Result<(), FramelabelError> {
        if self.is_degenerate() {
            return Err(FramelabelError::InvalidGeometry(format!(
                "region {}x{} at ({}, {}) has no area",
                self.width, self.height, self.x, self.y
            )));
        }
        if self.x < 0.0 || self.y < 0.0 {
            return Err(FramelabelError::InvalidGeometry(format!(
                "region origin ({}, {}) is negative",
                self.x, self.y
            )));
        }
        Ok(())
    }

    /// Intersects the region with the frame `[0, width) x [0, height)`.
    ///
    /// The result may be degenerate when the region lies fully outside.
    pub fn clamp_to(&self, frame_width: f64, frame_height: f64) -> Self {
        let x0 = self.x.clamp(0.0, frame_width);
        let y0 = self.y.clamp(0.0, frame_height);
        let x1 = self.right().clamp(0.0, frame_width);
        let y1 = self.bottom().clamp(0.0, frame_height);
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }
}

/// Geometry of one annotation.
///
/// Polygons are kept vertex-for-vertex for the editor, but the dataset is a
/// detection dataset, so everything persisted uses [`Shape::bounds`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Rect(Region),
    Polygon { vertices: Vec<Coord<Pixel>> },
}

impl Shape {
    /// Builds a polygon shape; needs at least three finite vertices and a
    /// bounding region with area.
    pub fn polygon(vertices: Vec<Coord<Pixel>>) -> Result<Self, FramelabelError> {
        if vertices.len() < 3 {
            return Err(FramelabelError::InvalidGeometry(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        polygon_bounds(&vertices)?.validate()?;
        Ok(Shape::Polygon { vertices })
    }

    /// The axis-aligned region enclosing the shape.
    pub fn bounds(&self) -> Region {
        match self {
            Shape::Rect(region) => *region,
            // Constructed through `Shape::polygon`, so the vertices are valid.
            Shape::Polygon { vertices } => polygon_bounds(vertices).unwrap_or_default(),
        }
    }

    pub fn is_polygon(&self) -> bool {
        matches!(self, Shape::Polygon { .. })
    }
}

impl From<Region> for Shape {
    fn from(region: Region) -> Self {
        Shape::Rect(region)
    }
}

/// Bounding region of a vertex list.
pub fn polygon_bounds(vertices: &[Coord<Pixel>]) -> Result<Region, FramelabelError> {
    if vertices.is_empty() {
        return Err(FramelabelError::InvalidGeometry(
            "polygon has no vertices".to_string(),
        ));
    }
    if let Some(bad) = vertices.iter().find(|v| !v.is_finite()) {
        return Err(FramelabelError::InvalidGeometry(format!(
            "polygon vertex ({}, {}) is not finite",
            bad.x, bad.y
        )));
    }

    let mut min = Coord::<Pixel>::new(f64::INFINITY, f64::INFINITY);
    let mut max = Coord::<Pixel>::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    for v in vertices {
        min.x = min.x.min(v.x);
        min.y = min.y.min(v.y);
        max.x = max.x.max(v.x);
        max.y = max.y.max(v.y);
    }

    Ok(Region::from_corners(min, max))
}
