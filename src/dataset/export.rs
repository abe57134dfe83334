//! Copying a dataset to another directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use super::{DatasetLayout, CLASSES_FILE, MANIFEST_FILE};
use crate::error::FramelabelError;

/// What [`DatasetLayout::export_to`] copied.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ExportReport {
    pub destination: PathBuf,
    pub files_copied: usize,
    pub bytes_copied: u64,
}

impl DatasetLayout {
    /// Copies `images/`, `labels/`, `classes.txt` and `data.yaml` into `dest`.
    ///
    /// The manifest is regenerated for the destination so its `path` points
    /// at the copy. Existing files under `dest` are overwritten.
    pub fn export_to(&self, dest: &Path) -> Result<ExportReport, FramelabelError> {
        let registry = self.load_registry()?;
        if registry.is_empty() {
            return Err(FramelabelError::MissingClasses {
                path: self.root().to_path_buf(),
            });
        }

        fs::create_dir_all(dest).map_err(|source| FramelabelError::persistence(dest, source))?;
        let mut report = ExportReport {
            destination: dest.to_path_buf(),
            ..ExportReport::default()
        };

        for tree in ["images", "labels"] {
            let src_root = self.root().join(tree);
            if !src_root.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&src_root).follow_links(true) {
                let entry = entry.map_err(|err| {
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory traversal failed"));
                    FramelabelError::persistence(&src_root, source)
                })?;
                let Ok(relative) = entry.path().strip_prefix(self.root()) else {
                    continue;
                };
                let target = dest.join(relative);
                if entry.file_type().is_dir() {
                    fs::create_dir_all(&target)
                        .map_err(|source| FramelabelError::persistence(&target, source))?;
                } else if entry.file_type().is_file() {
                    report.bytes_copied += copy_file(entry.path(), &target)?;
                    report.files_copied += 1;
                }
            }
        }

        report.bytes_copied += copy_file(&self.classes_path(), &dest.join(CLASSES_FILE))?;
        report.files_copied += 1;

        let exported = DatasetLayout::new(dest);
        exported.write_manifest(&registry)?;
        report.files_copied += 1;

        tracing::info!(
            destination = %dest.display(),
            files = report.files_copied,
            "dataset exported"
        );
        Ok(report)
    }
}

fn copy_file(src: &Path, dest: &Path) -> Result<u64, FramelabelError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|source| FramelabelError::persistence(parent, source))?;
    }
    fs::copy(src, dest).map_err(|source| FramelabelError::persistence(src, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Split;
    use crate::ir::Region;
    use crate::registry::LabelRegistry;
    use crate::store::AnnotationStore;

    #[test]
    fn export_copies_every_tree_and_rewrites_manifest() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let layout = DatasetLayout::open(temp.path().join("ds")).expect("open");
        let mut registry = LabelRegistry::new();
        let mut store = AnnotationStore::new();
        store
            .add("car", Region::new(1.0, 1.0, 4.0, 4.0))
            .expect("add");
        layout
            .write_frame_bytes(Split::Train, "a.bmp", b"xx", store.annotations(), (10, 10), &mut registry)
            .expect("write");
        layout.write_manifest(&registry).expect("manifest");

        let dest = temp.path().join("export");
        let report = layout.export_to(&dest).expect("export");

        assert_eq!(report.files_copied, 4);
        assert!(dest.join("images/train/a.bmp").is_file());
        assert!(dest.join("labels/train/a.txt").is_file());
        assert_eq!(fs::read_to_string(dest.join(CLASSES_FILE)).unwrap(), "car\n");

        let manifest = fs::read_to_string(dest.join(MANIFEST_FILE)).unwrap();
        let canonical = fs::canonicalize(&dest).unwrap();
        assert!(manifest.contains(&*canonical.to_string_lossy().replace('\\', "/")));
    }

    #[test]
    fn export_of_empty_dataset_fails() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let layout = DatasetLayout::open(temp.path().join("ds")).expect("open");
        let err = layout.export_to(&temp.path().join("out")).unwrap_err();
        assert!(matches!(err, FramelabelError::MissingClasses { .. }));
    }
}
