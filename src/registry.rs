//! The dataset's class list: label name to stable integer id.
//!
//! Ids are positions in an append-only list. Reordering the list would
//! silently relabel every label file already on disk, so nothing here ever
//! sorts, removes or reinserts an entry.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::atomic::write_atomic;
use crate::error::FramelabelError;
use crate::ir::ClassId;

/// Canonical form of a label: surrounding whitespace trimmed, lowercased.
pub fn normalize_label(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalizes `raw` and checks it can be stored as one `classes.txt` line.
///
/// Control characters are rejected: an embedded newline would split the label
/// into two lines on reload and shift every later class id.
pub fn checked_label(raw: &str) -> Result<String, FramelabelError> {
    let normalized = normalize_label(raw);
    if normalized.is_empty() {
        return Err(FramelabelError::EmptyLabel);
    }
    if normalized.chars().any(char::is_control) {
        return Err(FramelabelError::InvalidLabel(normalized.escape_debug().to_string()));
    }
    Ok(normalized)
}

/// Registry state to return to when a save is abandoned.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Checkpoint {
    len: usize,
    dirty: bool,
}

/// Ordered, deduplicated class names for one dataset.
#[derive(Clone, Debug, Default)]
pub struct LabelRegistry {
    names: Vec<String>,
    index: HashMap<String, ClassId>,
    dirty: bool,
}

impl LabelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from names in id order, normalizing each one.
    pub fn from_names<I, S>(names: I) -> Result<Self, FramelabelError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.id_for(name.as_ref())?;
        }
        registry.dirty = false;
        Ok(registry)
    }

    /// Returns the id for `label`, appending it if it is new.
    pub fn id_for(&mut self, label: &str) -> Result<ClassId, FramelabelError> {
        let normalized = checked_label(label)?;
        if let Some(id) = self.index.get(&normalized) {
            return Ok(*id);
        }

        let id = ClassId::new(self.names.len() as u32);
        tracing::debug!(label = %normalized, class_id = %id, "registering new class");
        self.index.insert(normalized.clone(), id);
        self.names.push(normalized);
        self.dirty = true;
        Ok(id)
    }

    /// Returns the id for `label` without ever growing the registry.
    pub fn id_for_strict(&self, label: &str) -> Result<ClassId, FramelabelError> {
        let normalized = normalize_label(label);
        self.index
            .get(&normalized)
            .copied()
            .ok_or(FramelabelError::UnknownLabelStrict(normalized))
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(&normalize_label(label))
    }

    pub fn name_of(&self, id: ClassId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    /// Names in id order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            len: self.names.len(),
            dirty: self.dirty,
        }
    }

    /// Forgets every label appended after `checkpoint` was taken.
    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        if self.names.len() <= checkpoint.len {
            return;
        }
        for name in self.names.drain(checkpoint.len..) {
            self.index.remove(&name);
        }
        self.dirty = checkpoint.dirty;
    }

    /// True when entries were appended since the last load or save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Reads a class list, one label per line.
    ///
    /// A missing file is an empty registry. Blank lines and duplicates are
    /// rejected rather than skipped, since either would shift later ids.
    pub fn load(path: &Path) -> Result<Self, FramelabelError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::new()),
            Err(source) => return Err(FramelabelError::persistence(path, source)),
        };

        let mut registry = Self::new();
        for (line_idx, line) in data.lines().enumerate() {
            let normalized = normalize_label(line);
            if normalized.is_empty() {
                return Err(FramelabelError::ClassesTxtInvalid {
                    path: path.to_path_buf(),
                    message: format!("line {} is empty", line_idx + 1),
                });
            }
            if registry.contains(&normalized) {
                return Err(FramelabelError::ClassesTxtInvalid {
                    path: path.to_path_buf(),
                    message: format!(
                        "line {} repeats class '{}'",
                        line_idx + 1,
                        normalized
                    ),
                });
            }
            registry.id_for(&normalized)?;
        }

        registry.dirty = false;
        Ok(registry)
    }

    /// Writes the class list atomically, one newline-terminated label per line.
    pub fn save(&mut self, path: &Path) -> Result<(), FramelabelError> {
        let mut contents = String::new();
        for name in &self.names {
            contents.push_str(name);
            contents.push('\n');
        }
        write_atomic(path, contents.as_bytes())?;
        self.dirty = false;
        Ok(())
    }
}
