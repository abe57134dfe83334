//! On-disk dataset layout.
//!
//! ```text
//! <root>/
//!   classes.txt          one label per line, line index = class id
//!   data.yaml            manifest for training tools
//!   images/{train,val}/  byte-for-byte copies of annotated frames
//!   labels/{train,val}/  one <stem>.txt per image
//! ```
//!
//! Saving a frame is last-write-wins for its label file and skip-if-exists
//! for its image. Every text file is replaced atomically, so an interrupted
//! save never leaves a truncated label file behind.

mod export;
mod manifest;

pub use export::ExportReport;
pub use manifest::Manifest;

use std::fmt;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::atomic::write_atomic;
use crate::error::FramelabelError;
use crate::ir::codec::{from_normalized, to_normalized};
use crate::ir::label_line::{parse_label_file, render_label_file};
use crate::ir::{NormalizedBox, NormalizedRecord, Region};
use crate::registry::LabelRegistry;
use crate::source::{has_extension, IMAGE_EXTENSIONS};
use crate::store::Annotation;

const LABEL_EXTENSION: &str = "txt";
const CLASSES_FILE: &str = "classes.txt";
const MANIFEST_FILE: &str = "data.yaml";

/// Dataset partition a frame is written to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
}

impl Split {
    pub const ALL: [Split; 2] = [Split::Train, Split::Val];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "train" => Ok(Split::Train),
            "val" | "valid" | "validation" => Ok(Split::Val),
            other => Err(format!("unknown split '{other}' (expected 'train' or 'val')")),
        }
    }
}

/// What a frame save produced.
#[derive(Clone, Debug)]
pub struct FrameWrite {
    pub label_path: PathBuf,
    pub image_path: PathBuf,
    /// False when the image was already present and left untouched.
    pub image_copied: bool,
    pub records: Vec<NormalizedRecord>,
}

/// Per-split file counts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SplitCounts {
    pub images: usize,
    pub labels: usize,
}

/// File counts and classes of a dataset on disk.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DatasetSummary {
    pub root: PathBuf,
    pub classes: Vec<String>,
    pub train: SplitCounts,
    pub val: SplitCounts,
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dataset: {}", self.root.display())?;
        writeln!(
            f,
            "  train: {} images, {} label files",
            self.train.images, self.train.labels
        )?;
        writeln!(
            f,
            "  val:   {} images, {} label files",
            self.val.images, self.val.labels
        )?;
        writeln!(f, "  classes ({}):", self.classes.len())?;
        for (id, name) in self.classes.iter().enumerate() {
            writeln!(f, "    {id}: {name}")?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum ImageOrigin<'a> {
    File(&'a Path),
    Bytes(&'a [u8]),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lookup {
    Grow,
    Strict,
}

/// Owner of one dataset directory.
#[derive(Clone, Debug)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    /// A layout rooted at `root`. Nothing is created until the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// A layout rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, FramelabelError> {
        let layout = Self::new(root);
        fs::create_dir_all(&layout.root)
            .map_err(|source| FramelabelError::persistence(&layout.root, source))?;
        Ok(layout)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self, split: Split) -> PathBuf {
        self.root.join("images").join(split.as_str())
    }

    pub fn labels_dir(&self, split: Split) -> PathBuf {
        self.root.join("labels").join(split.as_str())
    }

    pub fn label_path(&self, split: Split, stem: &str) -> PathBuf {
        self.labels_dir(split).join(format!("{stem}.{LABEL_EXTENSION}"))
    }

    pub fn classes_path(&self) -> PathBuf {
        self.root.join(CLASSES_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    /// Loads the dataset's class list; empty if none was saved yet.
    pub fn load_registry(&self) -> Result<LabelRegistry, FramelabelError> {
        LabelRegistry::load(&self.classes_path())
    }

    /// Creates `images/<split>` and `labels/<split>` if absent.
    pub fn ensure_split(&self, split: Split) -> Result<(), FramelabelError> {
        for dir in [self.images_dir(split), self.labels_dir(split)] {
            fs::create_dir_all(&dir).map_err(|source| FramelabelError::persistence(&dir, source))?;
        }
        Ok(())
    }

    /// Saves one frame: label file, image copy and class list.
    ///
    /// Labels not yet in `registry` are appended to it.
    pub fn write_frame(
        &self,
        split: Split,
        image_path: &Path,
        annotations: &[Annotation],
        image_size: (u32, u32),
        registry: &mut LabelRegistry,
    ) -> Result<FrameWrite, FramelabelError> {
        let file_name = file_name_of(image_path)?;
        self.write_frame_inner(
            split,
            &file_name,
            ImageOrigin::File(image_path),
            annotations,
            image_size,
            registry,
            Lookup::Grow,
        )
    }

    /// Like [`write_frame`](Self::write_frame), but fails with
    /// `UnknownLabelStrict` instead of growing the registry. Nothing is
    /// written when any label is unknown.
    pub fn write_frame_strict(
        &self,
        split: Split,
        image_path: &Path,
        annotations: &[Annotation],
        image_size: (u32, u32),
        registry: &mut LabelRegistry,
    ) -> Result<FrameWrite, FramelabelError> {
        let file_name = file_name_of(image_path)?;
        self.write_frame_inner(
            split,
            &file_name,
            ImageOrigin::File(image_path),
            annotations,
            image_size,
            registry,
            Lookup::Strict,
        )
    }

    /// Saves a frame whose image only exists in memory, e.g. a stream frame.
    pub fn write_frame_bytes(
        &self,
        split: Split,
        file_name: &str,
        image_bytes: &[u8],
        annotations: &[Annotation],
        image_size: (u32, u32),
        registry: &mut LabelRegistry,
    ) -> Result<FrameWrite, FramelabelError> {
        self.write_frame_inner(
            split,
            file_name,
            ImageOrigin::Bytes(image_bytes),
            annotations,
            image_size,
            registry,
            Lookup::Grow,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn write_frame_inner(
        &self,
        split: Split,
        file_name: &str,
        origin: ImageOrigin<'_>,
        annotations: &[Annotation],
        image_size: (u32, u32),
        registry: &mut LabelRegistry,
        lookup: Lookup,
    ) -> Result<FrameWrite, FramelabelError> {
        let (image_w, image_h) = (image_size.0 as f64, image_size.1 as f64);

        // Geometry and strict lookups are checked before the registry can grow
        // or any file is touched. Regions reaching past the frame edge are
        // clamped so every stored value stays in [0, 1].
        let mut boxes: Vec<NormalizedBox> = Vec::with_capacity(annotations.len());
        for annotation in annotations {
            let region = annotation.region();
            region.validate()?;
            let clamped = region.clamp_to(image_w, image_h);
            if clamped.is_degenerate() {
                return Err(FramelabelError::InvalidGeometry(format!(
                    "region {}x{} at ({}, {}) lies outside the {}x{} frame",
                    region.width, region.height, region.x, region.y, image_size.0, image_size.1
                )));
            }
            boxes.push(to_normalized(&clamped, image_w, image_h)?);
            if lookup == Lookup::Strict {
                registry.id_for_strict(&annotation.label)?;
            }
        }

        let checkpoint = registry.checkpoint();
        let mut records = Vec::with_capacity(boxes.len());
        for (annotation, bbox) in annotations.iter().zip(boxes) {
            let class_id = match lookup {
                Lookup::Grow => registry.id_for(&annotation.label),
                Lookup::Strict => registry.id_for_strict(&annotation.label),
            };
            match class_id {
                Ok(class_id) => records.push(bbox.with_class(class_id)),
                Err(err) => {
                    registry.rollback(checkpoint);
                    return Err(err);
                }
            }
        }

        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name)
            .to_string();
        let image_dest = self.images_dir(split).join(file_name);
        let label_path = self.label_path(split, &stem);

        let mut image_copied = false;
        let committed = self
            .ensure_split(split)
            .and_then(|()| copy_image_if_absent(origin, &image_dest))
            .and_then(|copied| {
                image_copied = copied;
                self.commit_labels(&label_path, &records, registry)
            });
        if let Err(err) = committed {
            registry.rollback(checkpoint);
            if image_copied {
                // Best effort: an orphan image would read as a background frame.
                let _ = fs::remove_file(&image_dest);
            }
            tracing::warn!(label = %label_path.display(), error = %err, "frame save failed");
            return Err(err);
        }

        tracing::debug!(
            split = %split,
            label = %label_path.display(),
            records = records.len(),
            image_copied,
            "frame saved"
        );

        Ok(FrameWrite {
            label_path,
            image_path: image_dest,
            image_copied,
            records,
        })
    }

    /// Writes the label file, then the class list it refers to.
    ///
    /// If the class list cannot be written, the previous label file is put
    /// back so no label file ever points past the end of `classes.txt`.
    fn commit_labels(
        &self,
        label_path: &Path,
        records: &[NormalizedRecord],
        registry: &mut LabelRegistry,
    ) -> Result<(), FramelabelError> {
        let previous = match fs::read(label_path) {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(source) => return Err(FramelabelError::persistence(label_path, source)),
        };
        write_atomic(label_path, render_label_file(records).as_bytes())?;

        if let Err(err) = self.persist_registry(registry) {
            let restored = match &previous {
                Some(bytes) => write_atomic(label_path, bytes),
                None => fs::remove_file(label_path)
                    .map_err(|source| FramelabelError::persistence(label_path, source)),
            };
            if let Err(restore_err) = restored {
                tracing::error!(label = %label_path.display(), error = %restore_err, "could not restore label file");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Writes `classes.txt` if the registry grew since it was last saved.
    pub fn persist_registry(&self, registry: &mut LabelRegistry) -> Result<(), FramelabelError> {
        if registry.is_dirty() || !self.classes_path().is_file() {
            fs::create_dir_all(&self.root)
                .map_err(|source| FramelabelError::persistence(&self.root, source))?;
            registry.save(&self.classes_path())?;
        }
        Ok(())
    }

    /// Reads a saved label file back as `(label, region)` pairs.
    ///
    /// A missing label file means the frame was never saved and yields an
    /// empty list.
    pub fn read_frame(
        &self,
        split: Split,
        stem: &str,
        image_size: (u32, u32),
        registry: &LabelRegistry,
    ) -> Result<Vec<(String, Region)>, FramelabelError> {
        let path = self.label_path(split, stem);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(FramelabelError::persistence(&path, source)),
        };

        let (image_w, image_h) = (image_size.0 as f64, image_size.1 as f64);
        let mut out = Vec::new();
        for (idx, record) in parse_label_file(&contents, &path)?.into_iter().enumerate() {
            let label = registry.name_of(record.class_id).ok_or_else(|| {
                FramelabelError::LabelParse {
                    path: path.clone(),
                    line: idx + 1,
                    message: format!(
                        "class_id {} is out of range for class list with {} class(es)",
                        record.class_id,
                        registry.len()
                    ),
                }
            })?;
            out.push((label.to_string(), from_normalized(&record.bbox, image_w, image_h)?));
        }
        Ok(out)
    }

    /// Regenerates `data.yaml` from `registry`.
    pub fn write_manifest(&self, registry: &LabelRegistry) -> Result<PathBuf, FramelabelError> {
        if registry.is_empty() {
            return Err(FramelabelError::MissingClasses {
                path: self.root.clone(),
            });
        }

        let root = fs::canonicalize(&self.root)
            .map_err(|source| FramelabelError::persistence(&self.root, source))?;
        let path = self.manifest_path();
        Manifest::new(&root, registry).write(&path)?;
        tracing::debug!(manifest = %path.display(), classes = registry.len(), "manifest written");
        Ok(path)
    }

    /// Counts images and label files per split.
    pub fn summary(&self) -> Result<DatasetSummary, FramelabelError> {
        let registry = self.load_registry()?;
        Ok(DatasetSummary {
            root: self.root.clone(),
            classes: registry.names().to_vec(),
            train: self.split_counts(Split::Train)?,
            val: self.split_counts(Split::Val)?,
        })
    }

    fn split_counts(&self, split: Split) -> Result<SplitCounts, FramelabelError> {
        Ok(SplitCounts {
            images: count_files(&self.images_dir(split), &IMAGE_EXTENSIONS)?,
            labels: count_files(&self.labels_dir(split), &[LABEL_EXTENSION])?,
        })
    }
}

fn file_name_of(path: &Path) -> Result<String, FramelabelError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            FramelabelError::persistence(
                path,
                io::Error::new(ErrorKind::InvalidInput, "image path has no file name"),
            )
        })
}

/// Copies the image into place unless a file already exists there.
///
/// Returns whether a copy happened.
fn copy_image_if_absent(origin: ImageOrigin<'_>, dest: &Path) -> Result<bool, FramelabelError> {
    if dest.exists() {
        return Ok(false);
    }
    let dir = dest.parent().unwrap_or(Path::new("."));

    let mut tmp =
        NamedTempFile::new_in(dir).map_err(|source| FramelabelError::persistence(dir, source))?;
    match origin {
        ImageOrigin::File(src) => {
            let mut reader =
                fs::File::open(src).map_err(|source| FramelabelError::persistence(src, source))?;
            io::copy(&mut reader, tmp.as_file_mut())
                .map_err(|source| FramelabelError::persistence(src, source))?;
        }
        ImageOrigin::Bytes(bytes) => {
            io::Write::write_all(tmp.as_file_mut(), bytes)
                .map_err(|source| FramelabelError::persistence(dest, source))?;
        }
    }
    tmp.persist(dest)
        .map_err(|err| FramelabelError::persistence(dest, err.error))?;
    Ok(true)
}

fn count_files(dir: &Path, extensions: &[&str]) -> Result<usize, FramelabelError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
        Err(source) => return Err(FramelabelError::persistence(dir, source)),
    };
    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|source| FramelabelError::persistence(dir, source))?;
        let path = entry.path();
        if path.is_file() && has_extension(&path, extensions) {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::test_support::write_bmp;
    use crate::store::AnnotationStore;

    fn store_with(entries: &[(&str, Region)]) -> AnnotationStore {
        let mut store = AnnotationStore::new();
        for (label, region) in entries {
            store.add(label, *region).expect("add annotation");
        }
        store
    }

    #[test]
    fn split_parses_aliases() {
        assert_eq!("TRAIN".parse::<Split>().unwrap(), Split::Train);
        assert_eq!("validation".parse::<Split>().unwrap(), Split::Val);
        assert!("test".parse::<Split>().is_err());
    }

    #[test]
    fn ensure_split_creates_both_trees() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let layout = DatasetLayout::new(temp.path());
        layout.ensure_split(Split::Val).expect("ensure split");
        assert!(temp.path().join("images/val").is_dir());
        assert!(temp.path().join("labels/val").is_dir());
        assert!(!temp.path().join("images/train").exists());
    }

    #[test]
    fn write_frame_assigns_ids_in_first_seen_order() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let src = temp.path().join("src/street.bmp");
        write_bmp(&src, 100, 100);
        let layout = DatasetLayout::open(temp.path().join("ds")).expect("open");

        let store = store_with(&[
            ("car", Region::new(0.0, 0.0, 10.0, 10.0)),
            ("car", Region::new(20.0, 20.0, 10.0, 10.0)),
            ("bus", Region::new(40.0, 40.0, 10.0, 10.0)),
        ]);
        let mut registry = LabelRegistry::new();
        let written = layout
            .write_frame(Split::Train, &src, store.annotations(), (100, 100), &mut registry)
            .expect("write frame");

        assert!(written.image_copied);
        assert_eq!(
            fs::read_to_string(layout.classes_path()).unwrap(),
            "car\nbus\n"
        );
        let ids: Vec<String> = fs::read_to_string(&written.label_path)
            .unwrap()
            .lines()
            .map(|l| l.split(' ').next().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["0", "0", "1"]);
    }

    #[test]
    fn image_copy_is_skipped_when_present() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let src = temp.path().join("a.bmp");
        write_bmp(&src, 10, 10);
        let layout = DatasetLayout::open(temp.path().join("ds")).expect("open");
        let mut registry = LabelRegistry::new();

        let first = layout
            .write_frame(Split::Train, &src, &[], (10, 10), &mut registry)
            .expect("first");
        let second = layout
            .write_frame(Split::Train, &src, &[], (10, 10), &mut registry)
            .expect("second");
        assert!(first.image_copied);
        assert!(!second.image_copied);
        assert_eq!(fs::read_to_string(&second.label_path).unwrap(), "");
    }

    #[test]
    fn strict_write_fails_without_touching_disk() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let src = temp.path().join("a.bmp");
        write_bmp(&src, 10, 10);
        let layout = DatasetLayout::open(temp.path().join("ds")).expect("open");
        let mut registry = LabelRegistry::from_names(["car"]).unwrap();

        let store = store_with(&[
            ("car", Region::new(0.0, 0.0, 2.0, 2.0)),
            ("bus", Region::new(0.0, 0.0, 3.0, 3.0)),
        ]);
        let err = layout
            .write_frame_strict(Split::Train, &src, store.annotations(), (10, 10), &mut registry)
            .unwrap_err();
        assert!(matches!(err, FramelabelError::UnknownLabelStrict(_)));
        assert_eq!(registry.len(), 1);
        assert!(!layout.label_path(Split::Train, "a").exists());
        assert!(!layout.images_dir(Split::Train).join("a.bmp").exists());
    }

    #[test]
    fn zero_sized_image_is_invalid_geometry() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let layout = DatasetLayout::open(temp.path()).expect("open");
        let store = store_with(&[("car", Region::new(0.0, 0.0, 2.0, 2.0))]);
        let mut registry = LabelRegistry::new();

        let err = layout
            .write_frame_bytes(Split::Val, "f.bmp", b"x", store.annotations(), (0, 10), &mut registry)
            .unwrap_err();
        assert!(matches!(err, FramelabelError::InvalidGeometry(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn read_frame_restores_regions() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let layout = DatasetLayout::open(temp.path()).expect("open");
        let store = store_with(&[
            ("car", Region::new(100.0, 100.0, 200.0, 100.0)),
            ("bus", Region::new(10.0, 20.0, 30.0, 40.0)),
        ]);
        let mut registry = LabelRegistry::new();
        layout
            .write_frame_bytes(Split::Val, "f.bmp", b"x", store.annotations(), (1000, 500), &mut registry)
            .expect("write");

        let restored = layout
            .read_frame(Split::Val, "f", (1000, 500), &registry)
            .expect("read");
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].0, "car");
        assert!((restored[0].1.x - 100.0).abs() < 1e-3);
        assert!((restored[1].1.height - 40.0).abs() < 1e-3);

        assert!(layout
            .read_frame(Split::Train, "f", (1000, 500), &registry)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn manifest_requires_classes() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let layout = DatasetLayout::open(temp.path()).expect("open");
        let err = layout.write_manifest(&LabelRegistry::new()).unwrap_err();
        assert!(matches!(err, FramelabelError::MissingClasses { .. }));
        assert!(!layout.manifest_path().exists());
    }

    #[test]
    fn manifest_is_idempotent() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let layout = DatasetLayout::open(temp.path()).expect("open");
        let registry = LabelRegistry::from_names(["car", "bus"]).unwrap();

        let path = layout.write_manifest(&registry).expect("first");
        let first = fs::read_to_string(&path).unwrap();
        layout.write_manifest(&registry).expect("second");
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
        assert!(first.contains("nc: 2"));
    }

    #[test]
    fn summary_counts_files() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let layout = DatasetLayout::open(temp.path()).expect("open");
        let mut registry = LabelRegistry::new();
        let store = store_with(&[("car", Region::new(0.0, 0.0, 2.0, 2.0))]);
        layout
            .write_frame_bytes(Split::Train, "a.bmp", b"x", store.annotations(), (10, 10), &mut registry)
            .expect("write a");
        layout
            .write_frame_bytes(Split::Val, "b.bmp", b"x", &[], (10, 10), &mut registry)
            .expect("write b");

        let summary = layout.summary().expect("summary");
        assert_eq!(summary.train, SplitCounts { images: 1, labels: 1 });
        assert_eq!(summary.val, SplitCounts { images: 1, labels: 1 });
        assert_eq!(summary.classes, vec!["car"]);
        assert!(summary.to_string().contains("0: car"));
    }
}
