//! Points tagged with the space they are measured in.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use super::space::{Normalized, Pixel};

/// A point in `TSpace`, which is [`Pixel`] or [`Normalized`].
///
/// Polygon vertices are `Coord<Pixel>`; box centers read back from a label
/// file are `Coord<Normalized>`. Moving between the two needs the frame size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Coord<TSpace> {
    pub x: f64,
    pub y: f64,
    #[serde(skip)]
    _space: PhantomData<TSpace>,
}

impl<TSpace> Coord<TSpace> {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            _space: PhantomData,
        }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Coord<Pixel> {
    /// Position as a fraction of a `frame_w` x `frame_h` frame.
    #[inline]
    pub fn normalize(self, frame_w: f64, frame_h: f64) -> Coord<Normalized> {
        Coord::new(self.x / frame_w, self.y / frame_h)
    }
}

impl Coord<Normalized> {
    #[inline]
    pub fn to_pixel(self, frame_w: f64, frame_h: f64) -> Coord<Pixel> {
        Coord::new(self.x * frame_w, self.y * frame_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_and_back_scales_by_frame() {
        let center = Coord::<Pixel>::new(200.0, 150.0);
        let n = center.normalize(1000.0, 500.0);
        assert_eq!((n.x, n.y), (0.2, 0.3));
        assert_eq!(n.to_pixel(1000.0, 500.0), center);
    }

    #[test]
    fn non_finite_components_are_detected() {
        assert!(Coord::<Pixel>::new(1.0, 2.0).is_finite());
        assert!(!Coord::<Pixel>::new(f64::NAN, 2.0).is_finite());
        assert!(!Coord::<Normalized>::new(0.5, f64::INFINITY).is_finite());
    }

    #[test]
    fn serializes_as_plain_xy() {
        let json = serde_json::to_string(&Coord::<Pixel>::new(3.0, 4.5)).unwrap();
        assert_eq!(json, r#"{"x":3.0,"y":4.5}"#);
        let back: Coord<Pixel> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Coord::new(3.0, 4.5));
    }
}
