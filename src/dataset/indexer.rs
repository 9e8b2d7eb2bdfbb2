use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::dataset::schema::ClassSchema;
use crate::error::{Error, Result};

/// File extensions the decoder is built to handle.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

/// One labeled image on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
    pub path: PathBuf,
    pub label: usize,
}

/// The indexed contents of one split directory.
#[derive(Debug, Clone)]
pub struct DatasetIndex {
    pub root: PathBuf,
    /// Ordered by schema class, then by file name.
    pub entries: Vec<DatasetEntry>,
    /// Entries per class, indexed by label.
    pub class_counts: Vec<usize>,
    /// Schema classes that have no directory under `root`.
    pub missing_classes: Vec<String>,
}

impl DatasetIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}

/// Indexes `root/<class_name>/**` for every class in `schema`.
///
/// The expected layout is:
/// ```text
/// root/
/// ├── normal/
/// │   ├── exam_001.png
/// │   └── exam_002.png
/// └── lesao/
///     └── exam_003.png
/// ```
/// Labels come from `schema`, never from directory listing order, so they are
/// stable across splits and restarts. Subdirectories of `root` that are not in
/// the schema are ignored. An empty class directory is fine; an index with
/// zero entries overall is a configuration error.
pub fn index_split(root: &Path, schema: &ClassSchema) -> Result<DatasetIndex> {
    if !root.is_dir() {
        return Err(Error::config(format!(
            "data directory '{}' does not exist or is not a directory",
            root.display()
        )));
    }
    for entry in std::fs::read_dir(root).map_err(|e| {
        Error::config(format!("cannot read data directory '{}': {}", root.display(), e))
    })? {
        let entry = entry?;
        let name = entry.file_name();
        if entry.file_type()?.is_dir() && name.to_str().and_then(|n| schema.index_of(n)).is_none() {
            debug!("Ignoring directory {:?} not present in class schema", entry.path());
        }
    }

    let mut entries = Vec::new();
    let mut class_counts = vec![0usize; schema.len()];
    let mut missing_classes = Vec::new();

    for (label, class_name) in schema.iter() {
        let class_dir = root.join(class_name);
        if !class_dir.is_dir() {
            missing_classes.push(class_name.to_owned());
            continue;
        }

        let walker = WalkDir::new(&class_dir)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e.file_name()));

        for item in walker {
            let item = item.map_err(|e| {
                Error::config(format!("cannot read '{}': {}", class_dir.display(), e))
            })?;
            if item.file_type().is_file() && is_image_file(item.path()) {
                entries.push(DatasetEntry {
                    path: item.into_path(),
                    label,
                });
                class_counts[label] += 1;
            }
        }
    }

    if entries.is_empty() {
        return Err(Error::config(format!(
            "no images found under '{}' for classes {}",
            root.display(),
            schema
        )));
    }

    info!(
        "Indexed {} images under {:?} (per class: {:?})",
        entries.len(),
        root,
        class_counts
    );

    Ok(DatasetIndex {
        root: root.to_path_buf(),
        entries,
        class_counts,
        missing_classes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"not decoded by the indexer").unwrap();
    }

    #[test]
    fn indexes_classes_in_schema_order() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for i in 0..3 {
            touch(&root.join("normal").join(format!("n{}.png", i)));
        }
        touch(&root.join("lesao/b.jpg"));
        touch(&root.join("lesao/a.JPEG"));
        touch(&root.join("lesao/notes.txt"));
        touch(&root.join("unrelated/x.png"));

        let schema = ClassSchema::new(["normal", "lesao"]).unwrap();
        let index = index_split(root, &schema).unwrap();

        assert_eq!(index.len(), 5);
        assert_eq!(index.class_counts, vec![3, 2]);
        let labels: Vec<usize> = index.entries.iter().map(|e| e.label).collect();
        assert_eq!(labels, vec![0, 0, 0, 1, 1]);
        assert!(index.entries[3].path.ends_with("lesao/a.JPEG"));
        assert!(index.missing_classes.is_empty());
    }

    #[test]
    fn reversed_schema_reverses_labels() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("normal/a.png"));
        touch(&dir.path().join("lesao/b.png"));
        let schema = ClassSchema::new(["lesao", "normal"]).unwrap();
        let index = index_split(dir.path(), &schema).unwrap();
        assert_eq!(index.entries[0].label, 0);
        assert!(index.entries[0].path.ends_with("lesao/b.png"));
    }

    #[test]
    fn nested_and_hidden_files() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("normal/sub/a.png"));
        touch(&dir.path().join("normal/.cache/b.png"));
        touch(&dir.path().join("normal/.c.png"));
        let schema = ClassSchema::new(["normal", "lesao"]).unwrap();
        let index = index_split(dir.path(), &schema).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.missing_classes, vec!["lesao".to_string()]);
    }

    #[test]
    fn empty_class_dir_is_valid_but_empty_dataset_is_not() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("normal")).unwrap();
        fs::create_dir_all(dir.path().join("lesao")).unwrap();
        let schema = ClassSchema::new(["normal", "lesao"]).unwrap();
        assert!(matches!(
            index_split(dir.path(), &schema),
            Err(Error::Configuration(_))
        ));

        touch(&dir.path().join("lesao/a.png"));
        let index = index_split(dir.path(), &schema).unwrap();
        assert_eq!(index.class_counts, vec![0, 1]);
    }

    #[test]
    fn missing_root_is_configuration_error() {
        let schema = ClassSchema::new(["normal"]).unwrap();
        let err = index_split(Path::new("/definitely/not/here"), &schema).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
