//! Cooperative stream scheduling.
//!
//! A stream is driven by repeated [`IngestionPipeline::tick`] calls. When the
//! pipeline is shared between a timer and an interactive caller, ticks that
//! arrive while another is running are dropped rather than queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::{IngestionPipeline, TickOutcome};
use crate::error::FramelabelError;

/// Shared cancellation flag, checked between frames.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters from [`SharedPipeline::run_stream`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub frames: u64,
    pub detections: u64,
    pub dropped: u64,
    pub errors: u64,
    pub cancelled: bool,
}

/// A pipeline that several threads may tick.
#[derive(Clone)]
pub struct SharedPipeline {
    inner: Arc<Mutex<IngestionPipeline>>,
}

impl SharedPipeline {
    pub fn new(pipeline: IngestionPipeline) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pipeline)),
        }
    }

    /// Blocks until the pipeline is free.
    pub fn lock(&self) -> MutexGuard<'_, IngestionPipeline> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs one tick, or returns [`TickOutcome::Dropped`] if another tick
    /// (or any other holder) has the pipeline.
    pub fn try_tick(&self) -> Result<TickOutcome, FramelabelError> {
        match self.inner.try_lock() {
            Ok(mut pipeline) => pipeline.tick(),
            Err(TryLockError::WouldBlock) => {
                tracing::trace!("tick dropped: previous tick still in flight");
                Ok(TickOutcome::Dropped)
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().tick(),
        }
    }

    /// Ticks every `interval` until the stream ends or `cancel` is set.
    ///
    /// Per-frame errors are logged and counted; the loop keeps going.
    pub fn run_stream(&self, interval: Duration, cancel: &CancelToken) -> StreamStats {
        let mut stats = StreamStats::default();
        tracing::info!(interval_ms = interval.as_millis() as u64, "stream loop started");

        loop {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                tracing::info!("stream loop cancelled");
                break;
            }

            let started = Instant::now();
            match self.try_tick() {
                Ok(TickOutcome::Ended) => break,
                Ok(TickOutcome::Paused) => {}
                Ok(TickOutcome::Dropped) => stats.dropped += 1,
                Ok(TickOutcome::Frame {
                    position,
                    detections,
                }) => {
                    stats.frames += 1;
                    stats.detections += detections.len() as u64;
                    tracing::debug!(position, detections = detections.len(), "stream frame");
                }
                Err(err) => {
                    stats.errors += 1;
                    tracing::warn!(error = %err, "stream frame failed");
                }
            }

            let elapsed = started.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }

        tracing::info!(
            frames = stats.frames,
            dropped = stats.dropped,
            errors = stats.errors,
            "stream loop finished"
        );
        stats
    }
}
