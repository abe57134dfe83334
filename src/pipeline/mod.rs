//! Frame ingestion: getting frames in front of the annotator and results
//! into the dataset.
//!
//! The pipeline is in exactly one [`Mode`] at a time:
//!
//! - **Single**: one image file, annotated by hand with optional detector help.
//! - **Batch**: an ordered list of images, walked one by one or auto-annotated
//!   in a single sequential run.
//! - **Stream**: frames pulled from a [`VideoSource`] on every [`tick`], with
//!   detector output replacing the annotations each time.
//!
//! [`tick`]: IngestionPipeline::tick

mod report;
mod scheduler;

pub use report::{BatchReport, FrameFailure};
pub use scheduler::{CancelToken, SharedPipeline, StreamStats};

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::atomic::write_atomic;
use crate::dataset::{DatasetLayout, FrameWrite, Split};
use crate::detect::{predictions_to_shapes, DetectionSource};
use crate::error::FramelabelError;
use crate::registry::LabelRegistry;
use crate::source::{collect_image_files, Frame, VideoSource};
use crate::store::{Annotation, AnnotationStore, DEFAULT_HISTORY_LIMIT};

/// What the pipeline is currently working on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Single,
    Batch,
    Stream,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Idle => "idle",
            Mode::Single => "single",
            Mode::Batch => "batch",
            Mode::Stream => "stream",
        }
    }
}

/// Result of one stream tick.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// The stream is paused; no frame was pulled.
    Paused,
    /// The source is exhausted or was stopped.
    Ended,
    /// A frame was pulled and its detections now fill the store.
    Frame {
        position: u64,
        detections: Vec<Annotation>,
    },
    /// Another tick was still running; this one was skipped.
    Dropped,
}

/// Knobs for detection and stream side effects.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// Minimum detector confidence.
    pub confidence: f32,
    /// Run the detector whenever a frame is selected.
    pub auto_detect: bool,
    /// Per-class frame snapshots during streaming.
    pub snapshot_dir: Option<PathBuf>,
    /// Persist every stream frame into the dataset.
    pub record_stream: bool,
    /// Split recorded stream frames are written to.
    pub stream_split: Split,
    pub history_limit: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            confidence: 0.25,
            auto_detect: false,
            snapshot_dir: None,
            record_stream: false,
            stream_split: Split::Val,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// One annotation session over a dataset.
pub struct IngestionPipeline {
    layout: DatasetLayout,
    registry: LabelRegistry,
    store: AnnotationStore,
    detector: Box<dyn DetectionSource>,
    options: PipelineOptions,
    mode: Mode,
    frames: Vec<PathBuf>,
    index: Option<usize>,
    current: Option<Frame>,
    stream: Option<Box<dyn VideoSource>>,
    paused: bool,
}

impl IngestionPipeline {
    /// Opens a session on `layout`, loading its existing class list.
    pub fn new(
        layout: DatasetLayout,
        detector: Box<dyn DetectionSource>,
        options: PipelineOptions,
    ) -> Result<Self, FramelabelError> {
        let registry = layout.load_registry()?;
        tracing::debug!(
            root = %layout.root().display(),
            classes = registry.len(),
            "pipeline opened"
        );
        Ok(Self {
            store: AnnotationStore::with_history_limit(options.history_limit),
            layout,
            registry,
            detector,
            options,
            mode: Mode::Idle,
            frames: Vec::new(),
            index: None,
            current: None,
            stream: None,
            paused: false,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn layout(&self) -> &DatasetLayout {
        &self.layout
    }

    pub fn registry(&self) -> &LabelRegistry {
        &self.registry
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    /// The store for manual edits: add, remove, relabel, undo.
    pub fn store_mut(&mut self) -> &mut AnnotationStore {
        &mut self.store
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.index
    }

    /// Number of frames in the single or batch list.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    fn leave_current_mode(&mut self, mode: Mode) {
        self.stream = None;
        self.paused = false;
        self.frames.clear();
        self.index = None;
        self.current = None;
        self.store.reset();
        self.mode = mode;
    }

    fn require_mode(&self, operation: &'static str, allowed: &[Mode]) -> Result<(), FramelabelError> {
        if allowed.contains(&self.mode) {
            Ok(())
        } else {
            Err(FramelabelError::WrongMode {
                operation,
                mode: self.mode.as_str(),
            })
        }
    }

    /// Opens one image for annotation.
    pub fn open_single(&mut self, path: impl Into<PathBuf>) -> Result<&Frame, FramelabelError> {
        self.leave_current_mode(Mode::Single);
        self.frames.push(path.into());
        self.select_frame(0)
    }

    /// Opens an ordered list of images and selects the first one.
    ///
    /// An unreadable first image leaves the batch open with no current
    /// frame; batch runs report it like any other failed frame.
    pub fn open_batch(&mut self, paths: Vec<PathBuf>) {
        self.leave_current_mode(Mode::Batch);
        self.frames = paths;
        tracing::info!(frames = self.frames.len(), "batch opened");
        if !self.frames.is_empty() {
            if let Err(err) = self.select_frame(0) {
                tracing::warn!(error = %err, "first batch frame could not be loaded");
            }
        }
    }

    /// Opens every image directly inside `dir`, in file-name order.
    pub fn open_folder(&mut self, dir: &Path) -> Result<(), FramelabelError> {
        let paths = collect_image_files(dir)?;
        if paths.is_empty() {
            return Err(FramelabelError::EmptyFolder {
                path: dir.to_path_buf(),
            });
        }
        self.open_batch(paths);
        Ok(())
    }

    /// Makes frame `index` current with an empty store and fresh history.
    ///
    /// With `auto_detect` set, the detector's boxes are loaded as the
    /// starting annotations.
    pub fn select_frame(&mut self, index: usize) -> Result<&Frame, FramelabelError> {
        self.require_mode("select_frame", &[Mode::Single, Mode::Batch])?;
        self.load_frame(index)?;
        if self.options.auto_detect {
            self.detect_into_store()?;
        }
        self.current.as_ref().ok_or(FramelabelError::NoFrameLoaded)
    }

    /// Moves to the next batch frame; stays on the last one at the end.
    pub fn next_frame(&mut self) -> Result<usize, FramelabelError> {
        self.require_mode("next_frame", &[Mode::Batch])?;
        let target = match self.index {
            Some(i) => (i + 1).min(self.frames.len().saturating_sub(1)),
            None => 0,
        };
        self.select_frame(target)?;
        Ok(target)
    }

    /// Moves to the previous batch frame; stays on the first one.
    pub fn previous_frame(&mut self) -> Result<usize, FramelabelError> {
        self.require_mode("previous_frame", &[Mode::Batch])?;
        let target = self.index.map_or(0, |i| i.saturating_sub(1));
        self.select_frame(target)?;
        Ok(target)
    }

    fn load_frame(&mut self, index: usize) -> Result<(), FramelabelError> {
        let len = self.frames.len();
        let path = self
            .frames
            .get(index)
            .cloned()
            .ok_or(FramelabelError::FrameIndexOutOfRange { index, len })?;

        self.store.reset();
        self.current = None;
        self.index = Some(index);
        let frame = Frame::from_path(path, index as u64)?;
        tracing::debug!(
            index,
            path = ?frame.path,
            width = frame.width,
            height = frame.height,
            "frame loaded"
        );
        self.current = Some(frame);
        Ok(())
    }

    /// Runs the detector and replaces the store without history.
    fn detect_into_store(&mut self) -> Result<usize, FramelabelError> {
        let frame = self.current.as_ref().ok_or(FramelabelError::NoFrameLoaded)?;
        let predictions = self.detector.predict(frame, self.options.confidence)?;
        let shapes = predictions_to_shapes(predictions, frame.width, frame.height);
        let dropped = self.store.replace_with(shapes);
        if dropped > 0 {
            tracing::debug!(dropped, "detections dropped for invalid label or geometry");
        }
        Ok(self.store.len())
    }

    /// Adds the detector's boxes for the current frame to the store.
    ///
    /// Each box is its own undoable step. Returns how many were added.
    pub fn auto_annotate_current(&mut self) -> Result<usize, FramelabelError> {
        self.require_mode("auto_annotate_current", &[Mode::Single, Mode::Batch, Mode::Stream])?;
        let frame = self.current.as_ref().ok_or(FramelabelError::NoFrameLoaded)?;
        let predictions = self.detector.predict(frame, self.options.confidence)?;
        let shapes = predictions_to_shapes(predictions, frame.width, frame.height);

        let mut added = 0;
        for (label, shape, track_id) in shapes {
            match self.store.add_tracked(&label, shape.bounds(), track_id) {
                Ok(_) => added += 1,
                Err(err) => tracing::debug!(label = %label, error = %err, "detection skipped"),
            }
        }
        tracing::info!(added, "auto-annotated current frame");
        Ok(added)
    }

    /// Writes the current frame and its annotations into `split`, then
    /// refreshes the manifest.
    pub fn save_current(&mut self, split: Split) -> Result<FrameWrite, FramelabelError> {
        let frame = self.current.as_ref().ok_or(FramelabelError::NoFrameLoaded)?;
        let written = write_frame_to(
            &self.layout,
            split,
            frame,
            self.store.annotations(),
            &mut self.registry,
        )?;
        self.layout.write_manifest(&self.registry)?;
        tracing::info!(
            label = %written.label_path.display(),
            annotations = written.records.len(),
            "frame saved"
        );
        Ok(written)
    }

    /// Detects and saves every batch frame into `split`, in order.
    ///
    /// A frame that fails is recorded in the report and the run moves on.
    /// `cancel` is checked before each frame; frames already written stay
    /// on disk.
    pub fn annotate_all(
        &mut self,
        split: Split,
        cancel: &CancelToken,
    ) -> Result<BatchReport, FramelabelError> {
        self.annotate_from(0, split, cancel)
    }

    /// Like [`annotate_all`](Self::annotate_all), starting at frame `start`.
    ///
    /// A cancelled run reports [`BatchReport::resume_at`]; calling this again
    /// with that index touches only the frames the first run never reached.
    pub fn annotate_from(
        &mut self,
        start: usize,
        split: Split,
        cancel: &CancelToken,
    ) -> Result<BatchReport, FramelabelError> {
        self.require_mode("annotate_all", &[Mode::Batch])?;
        let total = self.frames.len();
        if start > total {
            return Err(FramelabelError::FrameIndexOutOfRange { index: start, len: total });
        }
        let mut report = BatchReport::new(total, start);
        tracing::info!(frames = total, start, split = %split, "batch annotation started");

        for index in start..total {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.resume_at = Some(index);
                tracing::info!(completed = report.completed.len(), "batch annotation cancelled");
                break;
            }

            match self.annotate_one(index, split) {
                Ok(count) => {
                    report.completed.push(index);
                    report.annotations += count;
                }
                Err(err) => {
                    let path = self.frames[index].clone();
                    tracing::warn!(index, path = %path.display(), error = %err, "frame failed");
                    report.failed.push(FrameFailure {
                        index,
                        path,
                        message: err.to_string(),
                    });
                }
            }
        }

        if !self.registry.is_empty() {
            self.layout.write_manifest(&self.registry)?;
        }
        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            cancelled = report.cancelled,
            "batch annotation finished"
        );
        Ok(report)
    }

    fn annotate_one(&mut self, index: usize, split: Split) -> Result<usize, FramelabelError> {
        self.load_frame(index)?;
        self.detect_into_store()?;
        let frame = self.current.as_ref().ok_or(FramelabelError::NoFrameLoaded)?;
        let written = write_frame_to(
            &self.layout,
            split,
            frame,
            self.store.annotations(),
            &mut self.registry,
        )?;
        Ok(written.records.len())
    }

    /// Switches to stream mode on `source`.
    pub fn open_stream(&mut self, source: Box<dyn VideoSource>) {
        self.leave_current_mode(Mode::Stream);
        self.stream = Some(source);
        tracing::info!("stream opened");
    }

    /// Pulls one frame, detects with tracking and replaces the store.
    ///
    /// Snapshot and recording failures are logged and do not fail the tick.
    pub fn tick(&mut self) -> Result<TickOutcome, FramelabelError> {
        self.require_mode("tick", &[Mode::Stream])?;
        if self.paused {
            return Ok(TickOutcome::Paused);
        }
        let Some(source) = self.stream.as_mut() else {
            return Ok(TickOutcome::Ended);
        };
        let Some(frame) = source.next_frame()? else {
            tracing::info!(position = source.position(), "stream ended");
            self.stream = None;
            return Ok(TickOutcome::Ended);
        };

        let predictions = self
            .detector
            .predict_with_tracking(&frame, self.options.confidence)?;
        let shapes = predictions_to_shapes(predictions, frame.width, frame.height);
        self.store.replace_with(shapes);
        let position = frame.position;
        self.current = Some(frame);

        if let Err(err) = self.write_snapshots() {
            tracing::warn!(position, error = %err, "snapshot failed");
        }
        if self.options.record_stream {
            if let Err(err) = self.record_current() {
                tracing::warn!(position, error = %err, "recording stream frame failed");
            }
        }

        Ok(TickOutcome::Frame {
            position,
            detections: self.store.annotations().to_vec(),
        })
    }

    /// Writes the current frame once per detected class under
    /// `<snapshot_dir>/<label>/frame_<position>.<ext>`, with the label made
    /// safe as a single directory name.
    fn write_snapshots(&self) -> Result<(), FramelabelError> {
        let (Some(dir), Some(frame)) = (self.options.snapshot_dir.as_ref(), self.current.as_ref())
        else {
            return Ok(());
        };
        let labels: BTreeSet<String> = self
            .store
            .annotations()
            .iter()
            .map(|a| snapshot_dir_name(&a.label))
            .collect();
        if labels.is_empty() {
            return Ok(());
        }

        let bytes = frame.read_bytes()?;
        for label in labels {
            let class_dir = dir.join(&label);
            fs::create_dir_all(&class_dir)
                .map_err(|source| FramelabelError::persistence(&class_dir, source))?;
            let path = class_dir.join(format!(
                "frame_{:06}.{}",
                frame.position,
                frame.extension()
            ));
            write_atomic(&path, &bytes)?;
        }
        Ok(())
    }

    fn record_current(&mut self) -> Result<(), FramelabelError> {
        let frame = self.current.as_ref().ok_or(FramelabelError::NoFrameLoaded)?;
        write_frame_to(
            &self.layout,
            self.options.stream_split,
            frame,
            self.store.annotations(),
            &mut self.registry,
        )?;
        self.layout.write_manifest(&self.registry)?;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), FramelabelError> {
        self.require_mode("pause", &[Mode::Stream])?;
        self.paused = true;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), FramelabelError> {
        self.require_mode("resume", &[Mode::Stream])?;
        self.paused = false;
        Ok(())
    }

    /// Releases the source; later ticks report [`TickOutcome::Ended`].
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            tracing::info!("stream stopped");
        }
        self.paused = false;
    }
}

/// A label as one path component: separators become `_` and a name made only
/// of dots cannot climb out of the snapshot root.
fn snapshot_dir_name(label: &str) -> String {
    let name: String = label
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if name.is_empty() || name.chars().all(|c| c == '.') {
        "_".repeat(name.len().max(1))
    } else {
        name
    }
}

fn write_frame_to(
    layout: &DatasetLayout,
    split: Split,
    frame: &Frame,
    annotations: &[Annotation],
    registry: &mut LabelRegistry,
) -> Result<FrameWrite, FramelabelError> {
    let size = (frame.width, frame.height);
    match (&frame.path, &frame.bytes) {
        (Some(path), _) => layout.write_frame(split, path, annotations, size, registry),
        (None, Some(bytes)) => {
            layout.write_frame_bytes(split, &frame.file_name(), bytes, annotations, size, registry)
        }
        (None, None) => Err(FramelabelError::NoFrameLoaded),
    }
}
