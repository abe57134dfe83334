//! Conversion between pixel regions and normalized center-size boxes.
//!
//! Normalized boxes are what label files store: center and size as fractions
//! of the frame, so they survive resizing of the image.

use serde::{Deserialize, Serialize};

use super::coord::Coord;
use super::ids::ClassId;
use super::region::Region;
use super::space::Normalized;
use crate::error::FramelabelError;

/// A box in normalized center-size form (cx, cy, w, h), without a class.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl NormalizedBox {
    #[inline]
    pub fn new(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self { cx, cy, w, h }
    }

    #[inline]
    pub fn center(&self) -> Coord<Normalized> {
        Coord::new(self.cx, self.cy)
    }

    /// Returns true if every field lies in `[0, 1]`.
    pub fn is_in_unit_range(&self) -> bool {
        [self.cx, self.cy, self.w, self.h]
            .iter()
            .all(|v| (0.0..=1.0).contains(v))
    }

    /// Attaches a class id, producing the durable record.
    #[inline]
    pub fn with_class(self, class_id: ClassId) -> NormalizedRecord {
        NormalizedRecord {
            class_id,
            bbox: self,
        }
    }
}

/// One line of a label file: class id plus normalized box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub class_id: ClassId,
    #[serde(flatten)]
    pub bbox: NormalizedBox,
}

fn check_frame_size(image_w: f64, image_h: f64) -> Result<(), FramelabelError> {
    if !(image_w.is_finite() && image_h.is_finite()) || image_w <= 0.0 || image_h <= 0.0 {
        return Err(FramelabelError::InvalidGeometry(format!(
            "image size {}x{} must be positive",
            image_w, image_h
        )));
    }
    Ok(())
}

/// Converts a pixel region to a normalized box for a frame of the given size.
pub fn to_normalized(
    region: &Region,
    image_w: f64,
    image_h: f64,
) -> Result<NormalizedBox, FramelabelError> {
    check_frame_size(image_w, image_h)?;
    if !region.is_finite() {
        return Err(FramelabelError::InvalidGeometry(format!(
            "region {:?} is not finite",
            region
        )));
    }

    let center = region.center().normalize(image_w, image_h);
    Ok(NormalizedBox::new(
        center.x,
        center.y,
        region.width / image_w,
        region.height / image_h,
    ))
}

/// Converts a normalized box back to a pixel region (center to corner).
pub fn from_normalized(
    bbox: &NormalizedBox,
    image_w: f64,
    image_h: f64,
) -> Result<Region, FramelabelError> {
    check_frame_size(image_w, image_h)?;
    let center = bbox.center().to_pixel(image_w, image_h);
    let (width, height) = (bbox.w * image_w, bbox.h * image_h);
    Ok(Region::new(
        center.x - width / 2.0,
        center.y - height / 2.0,
        width,
        height,
    ))
}
