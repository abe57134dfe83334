//! Batch run reporting.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::FramelabelError;

/// A frame the batch could not process.
#[derive(Clone, Debug, Serialize)]
pub struct FrameFailure {
    pub index: usize,
    pub path: PathBuf,
    pub message: String,
}

/// Outcome of [`IngestionPipeline::annotate_all`](super::IngestionPipeline::annotate_all).
#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchReport {
    pub total: usize,
    /// First frame index this run processed.
    pub start: usize,
    /// Where a cancelled run stopped; pass it to
    /// [`annotate_from`](super::IngestionPipeline::annotate_from) to resume.
    pub resume_at: Option<usize>,
    /// Indices of frames written to the dataset, in processing order.
    pub completed: Vec<usize>,
    pub failed: Vec<FrameFailure>,
    pub cancelled: bool,
    /// Annotations written across all completed frames.
    pub annotations: usize,
}

impl BatchReport {
    pub(crate) fn new(total: usize, start: usize) -> Self {
        Self {
            total,
            start,
            ..Self::default()
        }
    }

    /// Frames from `start` on that were neither completed nor failed, i.e.
    /// skipped by cancellation.
    pub fn skipped(&self) -> usize {
        self.total
            .saturating_sub(self.start + self.completed.len() + self.failed.len())
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    /// Turns a report with failed frames into [`FramelabelError::BatchFailed`].
    ///
    /// A cancelled run without failures is still `Ok`.
    pub fn into_result(self) -> Result<Self, FramelabelError> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(FramelabelError::BatchFailed {
                failed: self.failed.len(),
                total: self.total,
                report: self,
            })
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Batch annotation report")?;
        writeln!(f, "  frames:      {}", self.total)?;
        if self.start > 0 {
            writeln!(f, "  resumed at:  {}", self.start)?;
        }
        writeln!(f, "  completed:   {}", self.completed.len())?;
        writeln!(f, "  failed:      {}", self.failed.len())?;
        writeln!(f, "  annotations: {}", self.annotations)?;
        if self.cancelled {
            writeln!(f, "  cancelled:   {} frame(s) skipped", self.skipped())?;
            if let Some(index) = self.resume_at {
                writeln!(f, "  resume at:   {index}")?;
            }
        }
        for failure in &self.failed {
            writeln!(
                f,
                "  [{}] {}: {}",
                failure.index,
                failure.path.display(),
                failure.message
            )?;
        }
        Ok(())
    }
}
