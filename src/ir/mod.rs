//! Geometry and identity types shared by every part of framelabel.
//!
//! # Design Principles
//!
//! 1. **Type Safety**: newtype ids and space markers keep class ids, track ids
//!    and pixel/normalized values from being mixed up.
//!
//! 2. **One pixel form**: regions in memory are always pixel-space XYWH; the
//!    normalized center-size form only exists on the way to or from disk.
//!
//! # Example
//!
//! ```
//! use framelabel::ir::{codec, Region};
//!
//! let region = Region::new(100.0, 100.0, 200.0, 100.0);
//! let bbox = codec::to_normalized(&region, 1000.0, 500.0).unwrap();
//! assert!((bbox.cx - 0.2).abs() < 1e-9);
//! ```

pub mod codec;
mod coord;
mod ids;
pub mod label_line;
mod region;
mod space;

pub use codec::{NormalizedBox, NormalizedRecord};
pub use coord::Coord;
pub use ids::{AnnotationId, ClassId, TrackId};
pub use region::{polygon_bounds, Region, Shape};
pub use space::{Normalized, Pixel};
