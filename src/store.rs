//! Annotations for the frame currently open, with linear undo/redo.
//!
//! History holds whole snapshots of the annotation list rather than deltas.
//! Every mutating call pushes the pre-mutation list onto the undo stack and
//! clears the redo stack.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::FramelabelError;
use crate::ir::{AnnotationId, Coord, Pixel, Region, Shape, TrackId};
use crate::registry::checked_label;

/// Default number of undo snapshots kept before the oldest is dropped.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// One labelled shape on the current frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    /// Normalized label (trimmed, lowercased).
    pub label: String,
    pub shape: Shape,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<TrackId>,
}

impl Annotation {
    /// Bounding region used for matching and persistence.
    pub fn region(&self) -> Region {
        self.shape.bounds()
    }

    /// Label as shown next to the box: `"car #7"` for tracked objects.
    pub fn display_label(&self) -> String {
        match self.track_id {
            Some(track) => format!("{} #{}", self.label, track),
            None => self.label.clone(),
        }
    }
}

/// The editable annotation list for one frame.
#[derive(Clone, Debug)]
pub struct AnnotationStore {
    current: Vec<Annotation>,
    undo_stack: VecDeque<Vec<Annotation>>,
    redo_stack: Vec<Vec<Annotation>>,
    next_id: u64,
    history_limit: usize,
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// A store keeping at most `limit` undo snapshots (at least one).
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            current: Vec::new(),
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            next_id: 1,
            history_limit: limit.max(1),
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.current
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.current.iter().find(|a| a.id == id)
    }

    /// Adds a rectangle. Degenerate regions and empty labels are rejected
    /// without touching history.
    pub fn add(&mut self, label: &str, region: Region) -> Result<AnnotationId, FramelabelError> {
        self.insert(label, Shape::Rect(region), None)
    }

    /// Adds a polygon; its bounding region is what gets persisted.
    pub fn add_polygon(
        &mut self,
        label: &str,
        vertices: Vec<Coord<Pixel>>,
    ) -> Result<AnnotationId, FramelabelError> {
        let shape = Shape::polygon(vertices)?;
        self.insert(label, shape, None)
    }

    /// Adds a rectangle carrying a detector track id.
    pub fn add_tracked(
        &mut self,
        label: &str,
        region: Region,
        track_id: Option<TrackId>,
    ) -> Result<AnnotationId, FramelabelError> {
        self.insert(label, Shape::Rect(region), track_id)
    }

    fn insert(
        &mut self,
        label: &str,
        shape: Shape,
        track_id: Option<TrackId>,
    ) -> Result<AnnotationId, FramelabelError> {
        let label = checked_label(label)?;
        shape.bounds().validate()?;

        self.checkpoint();
        let id = self.allocate_id();
        self.current.push(Annotation {
            id,
            label,
            shape,
            track_id,
        });
        Ok(id)
    }

    /// Removes the first annotation whose bounding region equals `region`
    /// exactly. Returns false (and records nothing) when none matches.
    pub fn remove(&mut self, region: &Region) -> bool {
        match self.position_of_region(region) {
            Some(pos) => {
                self.checkpoint();
                self.current.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn remove_by_id(&mut self, id: AnnotationId) -> bool {
        match self.position_of_id(id) {
            Some(pos) => {
                self.checkpoint();
                self.current.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Relabels the first annotation at `region`. Returns `Ok(false)` when no
    /// annotation matches.
    pub fn update_label(&mut self, region: &Region, new_label: &str) -> Result<bool, FramelabelError> {
        let pos = self.position_of_region(region);
        self.relabel_at(pos, new_label)
    }

    pub fn update_label_by_id(
        &mut self,
        id: AnnotationId,
        new_label: &str,
    ) -> Result<bool, FramelabelError> {
        let pos = self.position_of_id(id);
        self.relabel_at(pos, new_label)
    }

    fn relabel_at(&mut self, pos: Option<usize>, new_label: &str) -> Result<bool, FramelabelError> {
        let label = checked_label(new_label)?;
        let Some(pos) = pos else {
            return Ok(false);
        };
        self.checkpoint();
        self.current[pos].label = label;
        Ok(true)
    }

    /// Empties the list as an undoable action. Clearing an empty list is a
    /// no-op and leaves history alone.
    pub fn clear(&mut self) {
        if self.current.is_empty() {
            return;
        }
        self.checkpoint();
        self.current.clear();
    }

    /// Restores the snapshot before the last action. Returns false when there
    /// is nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.undo_stack.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.current, previous);
        self.redo_stack.push(current);
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some(next) = self.redo_stack.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut self.current, next);
        self.undo_stack.push_back(current);
        true
    }

    /// Starts a fresh frame: no annotations, no history.
    pub fn reset(&mut self) {
        self.current.clear();
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Replaces the whole list without history, as a stream tick does.
    ///
    /// Entries with unusable labels or degenerate geometry are dropped and
    /// counted in the return value.
    pub fn replace_with<I>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, Shape, Option<TrackId>)>,
    {
        self.reset();
        let mut dropped = 0;
        for (label, shape, track_id) in entries {
            let Ok(label) = checked_label(&label) else {
                dropped += 1;
                continue;
            };
            if shape.bounds().validate().is_err() {
                dropped += 1;
                continue;
            }
            let id = self.allocate_id();
            self.current.push(Annotation {
                id,
                label,
                shape,
                track_id,
            });
        }
        dropped
    }

    /// Per-label counts of the current annotations.
    pub fn class_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for annotation in &self.current {
            *counts.entry(annotation.label.clone()).or_insert(0) += 1;
        }
        counts
    }

    fn checkpoint(&mut self) {
        self.undo_stack.push_back(self.current.clone());
        if self.undo_stack.len() > self.history_limit {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
    }

    fn allocate_id(&mut self) -> AnnotationId {
        let id = AnnotationId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn position_of_region(&self, region: &Region) -> Option<usize> {
        self.current.iter().position(|a| a.region() == *region)
    }

    fn position_of_id(&self, id: AnnotationId) -> Option<usize> {
        self.current.iter().position(|a| a.id == id)
    }
}
