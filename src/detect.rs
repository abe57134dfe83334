//! Detector seam.
//!
//! The model itself lives outside this crate. A [`DetectionSource`] takes a
//! frame and hands back labelled boxes in normalized coordinates, with a
//! track id when the detector follows objects across frames.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::FramelabelError;
use crate::ir::codec::from_normalized;
use crate::ir::{NormalizedBox, Shape, TrackId};
use crate::source::Frame;

/// One detected object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    #[serde(flatten)]
    pub bbox: NormalizedBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<TrackId>,
}

impl Prediction {
    pub fn new(label: impl Into<String>, bbox: NormalizedBox) -> Self {
        Self {
            label: label.into(),
            bbox,
            confidence: None,
            track_id: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_track(mut self, track_id: impl Into<TrackId>) -> Self {
        self.track_id = Some(track_id.into());
        self
    }
}

/// An external object detector.
///
/// An empty result is a valid answer, not a failure.
pub trait DetectionSource: Send {
    /// Detects objects scoring at least `confidence`.
    fn predict(&mut self, frame: &Frame, confidence: f32)
        -> Result<Vec<Prediction>, FramelabelError>;

    /// Detects and tracks objects. Detectors without tracking fall back to
    /// [`predict`](Self::predict) and leave `track_id` empty.
    fn predict_with_tracking(
        &mut self,
        frame: &Frame,
        confidence: f32,
    ) -> Result<Vec<Prediction>, FramelabelError> {
        self.predict(frame, confidence)
    }

    fn supports_tracking(&self) -> bool {
        false
    }
}

/// Never detects anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDetector;

impl DetectionSource for NullDetector {
    fn predict(&mut self, _frame: &Frame, _confidence: f32) -> Result<Vec<Prediction>, FramelabelError> {
        Ok(Vec::new())
    }
}

/// Replays predictions stored next to the frames as JSON.
///
/// For a frame with stem `street_01` the detector reads
/// `<dir>/street_01.json`:
///
/// ```json
/// [{"label": "car", "cx": 0.5, "cy": 0.5, "w": 0.2, "h": 0.1, "confidence": 0.9, "track_id": 7}]
/// ```
///
/// A frame without a sidecar has no detections.
#[derive(Clone, Debug)]
pub struct SidecarDetector {
    dir: PathBuf,
}

impl SidecarDetector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn sidecar_path(&self, frame: &Frame) -> PathBuf {
        self.dir.join(format!("{}.json", frame.stem()))
    }

    fn load(&self, path: &Path) -> Result<Vec<Prediction>, FramelabelError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(FramelabelError::persistence(path, source)),
        };
        serde_json::from_str(&data).map_err(|source| FramelabelError::PredictionParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl DetectionSource for SidecarDetector {
    fn predict(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Prediction>, FramelabelError> {
        let mut predictions = self.predict_with_tracking(frame, confidence)?;
        for prediction in &mut predictions {
            prediction.track_id = None;
        }
        Ok(predictions)
    }

    fn predict_with_tracking(
        &mut self,
        frame: &Frame,
        confidence: f32,
    ) -> Result<Vec<Prediction>, FramelabelError> {
        let path = self.sidecar_path(frame);
        let mut predictions = self.load(&path)?;
        predictions.retain(|p| !matches!(p.confidence, Some(c) if c < confidence));
        tracing::trace!(sidecar = %path.display(), count = predictions.len(), "loaded predictions");
        Ok(predictions)
    }

    fn supports_tracking(&self) -> bool {
        true
    }
}

/// Converts predictions into pixel shapes on a `width` x `height` frame.
///
/// Boxes are clamped to the frame; ones that fall entirely outside it, or
/// cannot be denormalized, are skipped.
pub fn predictions_to_shapes(
    predictions: Vec<Prediction>,
    width: u32,
    height: u32,
) -> Vec<(String, Shape, Option<TrackId>)> {
    let (w, h) = (width as f64, height as f64);
    predictions
        .into_iter()
        .filter_map(|p| {
            let region = from_normalized(&p.bbox, w, h).ok()?.clamp_to(w, h);
            if region.is_degenerate() {
                return None;
            }
            Some((p.label, Shape::Rect(region), p.track_id))
        })
        .collect()
}

/// Fuzz-only entrypoint for sidecar parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_predictions(input: &str) -> Result<(), FramelabelError> {
    let predictions: Vec<Prediction> =
        serde_json::from_str(input).map_err(|source| FramelabelError::PredictionParse {
            path: PathBuf::from("<fuzz>"),
            source,
        })?;
    let _ = predictions_to_shapes(predictions, 640, 480);
    Ok(())
}
