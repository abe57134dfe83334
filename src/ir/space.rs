//! Coordinate space markers.
//!
//! Zero-sized types used as type parameters on [`Coord`](super::Coord) so
//! that a polygon vertex in pixels cannot be mixed with a normalized center.

use std::fmt;

/// Marker for absolute pixel positions, origin at the top-left corner.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pixel {}

/// Marker for positions expressed as fractions of the frame size.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Normalized {}

impl fmt::Debug for Pixel {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl fmt::Debug for Normalized {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}
