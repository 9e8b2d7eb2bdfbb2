use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::classifier::Classifier;
use crate::train::config::Monitor;
use crate::transform::pipeline::PreprocessSpec;
use crate::util::write_json_atomic;

/// Bumped whenever the on-disk layout changes incompatibly.
pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Training context stored next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub monitor: Monitor,
    /// Value of `monitor` at `epoch`.
    pub metric: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    /// Best value of `monitor` seen up to and including `epoch`.
    pub best_metric: f64,
    /// Preprocessing the weights were trained with. Inference must use the same.
    pub preprocess: PreprocessSpec,
    pub saved_at: DateTime<Utc>,
}

impl CheckpointMeta {
    pub fn new(
        epoch: usize,
        monitor: Monitor,
        metric: f64,
        val_loss: f64,
        val_accuracy: f64,
        best_metric: f64,
        preprocess: PreprocessSpec,
    ) -> CheckpointMeta {
        CheckpointMeta {
            epoch,
            monitor,
            metric,
            val_loss,
            val_accuracy,
            best_metric,
            preprocess,
            saved_at: Utc::now(),
        }
    }
}

#[derive(Serialize)]
struct CheckpointRef<'a> {
    format_version: u32,
    meta: &'a CheckpointMeta,
    model: &'a Classifier,
}

#[derive(Deserialize)]
pub(crate) struct Checkpoint {
    pub format_version: u32,
    pub meta: CheckpointMeta,
    pub model: Classifier,
}

impl Checkpoint {
    pub(crate) fn write(path: &Path, meta: &CheckpointMeta, model: &Classifier) -> Result<()> {
        let record = CheckpointRef {
            format_version: CHECKPOINT_FORMAT_VERSION,
            meta,
            model,
        };
        write_json_atomic(path, &record, false).map_err(|e| Error::checkpoint_io(path, e))
    }

    pub(crate) fn read(path: &Path) -> Result<Checkpoint> {
        if !path.is_file() {
            return Err(Error::CheckpointNotFound(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| Error::checkpoint_io(path, e))?;
        let checkpoint: Checkpoint = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::checkpoint_io(path, format!("corrupt or partial checkpoint: {}", e)))?;
        if checkpoint.format_version > CHECKPOINT_FORMAT_VERSION {
            return Err(Error::checkpoint_io(
                path,
                format!(
                    "format version {} is newer than supported version {}",
                    checkpoint.format_version, CHECKPOINT_FORMAT_VERSION
                ),
            ));
        }
        checkpoint
            .model
            .check_consistency()
            .map_err(|reason| Error::checkpoint_io(path, reason))?;
        Ok(checkpoint)
    }
}

/// Reads only the metadata of a checkpoint, without checking its schema.
pub fn read_meta(path: &Path) -> Result<CheckpointMeta> {
    Checkpoint::read(path).map(|c| c.meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::schema::ClassSchema;
    use crate::network::spec::ArchitectureSpec;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::fs;
    use tempfile::TempDir;

    fn model() -> Classifier {
        let arch = ArchitectureSpec {
            conv_channels: vec![2],
            ..ArchitectureSpec::default()
        };
        let schema = ClassSchema::new(["a", "b"]).unwrap();
        Classifier::new(arch, schema, &mut ChaCha8Rng::seed_from_u64(5)).unwrap()
    }

    fn meta() -> CheckpointMeta {
        CheckpointMeta::new(
            1,
            Monitor::Accuracy,
            0.5,
            0.7,
            0.5,
            0.5,
            PreprocessSpec {
                height: 4,
                width: 4,
                mean: [0.0; 3],
                std: [1.0; 3],
            },
        )
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = read_meta(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::CheckpointNotFound(_)));
    }

    #[test]
    fn truncated_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latest.json");
        Checkpoint::write(&path, &meta(), &model()).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(read_meta(&path), Err(Error::CheckpointIo { .. })));
    }

    #[test]
    fn newer_format_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("best.json");
        Checkpoint::write(&path, &meta(), &model()).unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        value["format_version"] = serde_json::json!(CHECKPOINT_FORMAT_VERSION + 1);
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        assert!(matches!(read_meta(&path), Err(Error::CheckpointIo { .. })));
    }

    #[test]
    fn tampered_shapes_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("best.json");
        Checkpoint::write(&path, &meta(), &model()).unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        value["model"]["head"]["biases"] = serde_json::json!([0.0]);
        fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        assert!(matches!(read_meta(&path), Err(Error::CheckpointIo { .. })));
    }

    #[test]
    fn meta_survives_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("best.json");
        let written = meta();
        Checkpoint::write(&path, &written, &model()).unwrap();
        assert_eq!(read_meta(&path).unwrap(), written);
    }
}
