use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::schema::ClassSchema;
use crate::error::{Error, Result};
use crate::network::spec::ArchitectureSpec;
use crate::transform::augment::Augmentation;
use crate::transform::pipeline::{Pipeline, PreprocessSpec};

/// Validation metric that drives checkpoint selection, early stopping and the
/// learning-rate schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    /// Lower validation loss is better.
    #[serde(alias = "val_loss")]
    Loss,
    /// Higher validation accuracy is better.
    #[serde(alias = "val_accuracy", alias = "val_acc")]
    Accuracy,
}

impl Default for Monitor {
    fn default() -> Self {
        Monitor::Loss
    }
}

impl Monitor {
    /// Strict improvement of `candidate` over `best`. Anything finite improves
    /// on "no value yet"; non-finite values never improve.
    pub fn improved(&self, candidate: f64, best: Option<f64>) -> bool {
        if !candidate.is_finite() {
            return false;
        }
        match (self, best) {
            (_, None) => true,
            (Monitor::Loss, Some(b)) => candidate < b,
            (Monitor::Accuracy, Some(b)) => candidate > b,
        }
    }

    pub fn select(&self, val_loss: f64, val_accuracy: f64) -> f64 {
        match self {
            Monitor::Loss => val_loss,
            Monitor::Accuracy => val_accuracy,
        }
    }
}

impl fmt::Display for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Monitor::Loss => write!(f, "val_loss"),
            Monitor::Accuracy => write!(f, "val_accuracy"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    Sgd,
    #[serde(alias = "adam_w")]
    Adamw,
}

impl Default for OptimizerKind {
    fn default() -> Self {
        OptimizerKind::Adamw
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    pub train: PathBuf,
    pub val: PathBuf,
    #[serde(default)]
    pub test: Option<PathBuf>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainSettings {
    /// Seeds weight init, shuffling and augmentation. `None` draws from entropy.
    pub seed: Option<u64>,
    pub batch_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    pub optimizer: OptimizerKind,
    /// SGD only.
    pub momentum: f64,
    /// Epochs without improvement before stopping early. 0 disables.
    pub patience: usize,
    pub lr_patience: usize,
    pub lr_factor: f64,
    pub min_lr: f64,
    /// Batches decoded ahead on a background thread. 0 loads inline.
    pub prefetch_batches: usize,
    pub resume: bool,
}

impl Default for TrainSettings {
    fn default() -> Self {
        TrainSettings {
            seed: Some(42),
            batch_size: 16,
            epochs: 25,
            learning_rate: 3e-4,
            weight_decay: 1e-4,
            optimizer: OptimizerKind::Adamw,
            momentum: 0.9,
            patience: 5,
            lr_patience: 2,
            lr_factor: 0.5,
            min_lr: 1e-6,
            prefetch_batches: 2,
            resume: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub image_size: u32,
    pub mean: [f64; 3],
    pub std: [f64; 3],
    pub augment: bool,
    pub horizontal_flip: bool,
    pub rotation_degrees: f64,
    pub crop_scale: f64,
    pub color_jitter: f64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        TransformConfig {
            image_size: 224,
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            augment: true,
            horizontal_flip: true,
            rotation_degrees: 15.0,
            crop_scale: 1.0,
            color_jitter: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub monitor: Monitor,
    pub save_latest: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        CheckpointConfig {
            monitor: Monitor::Loss,
            save_latest: true,
        }
    }
}

/// Everything a run needs, loaded once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub paths: PathsConfig,
    pub classes: ClassSchema,
    #[serde(default)]
    pub train: TrainSettings,
    #[serde(default)]
    pub transforms: TransformConfig,
    #[serde(default)]
    pub model: ArchitectureSpec,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

impl ExperimentConfig {
    /// Reads and validates a JSON config file.
    pub fn load_json(path: &Path) -> Result<ExperimentConfig> {
        let file = File::open(path)
            .map_err(|e| Error::config(format!("cannot open config {}: {}", path.display(), e)))?;
        let config: ExperimentConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::config(format!("invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<ExperimentConfig> {
        let config: ExperimentConfig =
            serde_json::from_str(text).map_err(|e| Error::config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.train;
        if t.batch_size == 0 {
            return Err(Error::config("train.batch_size must be at least 1"));
        }
        if t.epochs == 0 {
            return Err(Error::config("train.epochs must be at least 1"));
        }
        if !(t.learning_rate.is_finite() && t.learning_rate > 0.0) {
            return Err(Error::config("train.learning_rate must be positive"));
        }
        if !(t.weight_decay.is_finite() && t.weight_decay >= 0.0) {
            return Err(Error::config("train.weight_decay must be non-negative"));
        }
        if !(0.0..1.0).contains(&t.momentum) {
            return Err(Error::config("train.momentum must be in [0, 1)"));
        }
        if !(t.lr_factor > 0.0 && t.lr_factor < 1.0) {
            return Err(Error::config("train.lr_factor must be in (0, 1)"));
        }
        if !(t.min_lr.is_finite() && t.min_lr >= 0.0) {
            return Err(Error::config("train.min_lr must be non-negative"));
        }

        let tr = &self.transforms;
        self.preprocess_spec().validate()?;
        if !(tr.rotation_degrees.is_finite() && (0.0..=180.0).contains(&tr.rotation_degrees)) {
            return Err(Error::config("transforms.rotation_degrees must be in [0, 180]"));
        }
        if !(tr.crop_scale > 0.0 && tr.crop_scale <= 1.0) {
            return Err(Error::config("transforms.crop_scale must be in (0, 1]"));
        }
        if !(0.0..1.0).contains(&tr.color_jitter) {
            return Err(Error::config("transforms.color_jitter must be in [0, 1)"));
        }

        self.model.validate()?;
        if self.model.input_channels != crate::transform::pipeline::INPUT_CHANNELS {
            return Err(Error::config(format!(
                "model.input_channels must be {} (RGB input)",
                crate::transform::pipeline::INPUT_CHANNELS
            )));
        }
        Ok(())
    }

    pub fn preprocess_spec(&self) -> PreprocessSpec {
        PreprocessSpec {
            height: self.transforms.image_size,
            width: self.transforms.image_size,
            mean: self.transforms.mean,
            std: self.transforms.std,
        }
    }

    pub fn pipeline(&self) -> Result<Pipeline> {
        Pipeline::new(self.preprocess_spec())
    }

    /// Training-time augmentation, or `None` when disabled or a no-op.
    pub fn augmentation(&self) -> Option<Augmentation> {
        let tr = &self.transforms;
        if !tr.augment {
            return None;
        }
        let aug = Augmentation {
            horizontal_flip: tr.horizontal_flip,
            rotation_degrees: tr.rotation_degrees,
            crop_scale: tr.crop_scale,
            color_jitter: tr.color_jitter,
        };
        (!aug.is_noop()).then_some(aug)
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.paths.output_dir.join("checkpoints")
    }

    pub fn best_checkpoint_path(&self) -> PathBuf {
        self.checkpoints_dir().join("best.json")
    }

    pub fn latest_checkpoint_path(&self) -> PathBuf {
        self.checkpoints_dir().join("latest.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.paths.output_dir.join("logs")
    }

    pub fn status_path(&self) -> PathBuf {
        self.logs_dir().join("status.json")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.logs_dir().join("metrics.jsonl")
    }

    pub fn test_metrics_path(&self) -> PathBuf {
        self.logs_dir().join("test_metrics.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "paths": {"train": "data/train", "val": "data/val"},
        "classes": ["normal", "lesao"]
    }"#;

    #[test]
    fn minimal_config_takes_defaults() {
        let config = ExperimentConfig::from_json_str(MINIMAL).unwrap();
        assert_eq!(config.train.seed, Some(42));
        assert_eq!(config.train.batch_size, 16);
        assert_eq!(config.train.epochs, 25);
        assert_eq!(config.transforms.image_size, 224);
        assert_eq!(config.checkpoint.monitor, Monitor::Loss);
        assert_eq!(config.paths.output_dir, PathBuf::from("artifacts"));
        assert_eq!(config.paths.test, None);
        assert_eq!(config.classes.index_of("lesao"), Some(1));
        assert!(config.augmentation().is_some());
        assert_eq!(
            config.best_checkpoint_path(),
            PathBuf::from("artifacts/checkpoints/best.json")
        );
    }

    #[test]
    fn monitor_accepts_original_names() {
        let m: Monitor = serde_json::from_str("\"val_loss\"").unwrap();
        assert_eq!(m, Monitor::Loss);
        let m: Monitor = serde_json::from_str("\"accuracy\"").unwrap();
        assert_eq!(m, Monitor::Accuracy);
        assert_eq!(m.to_string(), "val_accuracy");
    }

    #[test]
    fn monitor_improvement_is_strict() {
        assert!(Monitor::Loss.improved(0.5, None));
        assert!(Monitor::Loss.improved(0.4, Some(0.5)));
        assert!(!Monitor::Loss.improved(0.5, Some(0.5)));
        assert!(Monitor::Accuracy.improved(0.6, Some(0.5)));
        assert!(!Monitor::Accuracy.improved(0.5, Some(0.5)));
        assert!(!Monitor::Loss.improved(f64::NAN, None));
    }

    #[test]
    fn invalid_values_are_configuration_errors() {
        let cases = [
            r#"{"paths": {"train": "a", "val": "b"}, "classes": []}"#,
            r#"{"paths": {"train": "a", "val": "b"}, "classes": ["x", "x"]}"#,
            r#"{"paths": {"train": "a", "val": "b"}, "classes": ["x"], "train": {"batch_size": 0}}"#,
            r#"{"paths": {"train": "a", "val": "b"}, "classes": ["x"], "train": {"learning_rate": -1.0}}"#,
            r#"{"paths": {"train": "a", "val": "b"}, "classes": ["x"], "transforms": {"std": [0.2, 0.0, 0.2]}}"#,
            r#"{"paths": {"train": "a", "val": "b"}, "classes": ["x"], "model": {"conv_channels": []}}"#,
            r#"{"paths": {"train": "a"}, "classes": ["x"]}"#,
        ];
        for case in cases {
            let err = ExperimentConfig::from_json_str(case).unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{}: {:?}", case, err);
        }
    }

    #[test]
    fn disabled_augmentation_is_none() {
        let mut config = ExperimentConfig::from_json_str(MINIMAL).unwrap();
        config.transforms.augment = false;
        assert!(config.augmentation().is_none());
        config.transforms.augment = true;
        config.transforms.horizontal_flip = false;
        config.transforms.rotation_degrees = 0.0;
        assert!(config.augmentation().is_none());
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = ExperimentConfig::load_json(Path::new("/nonexistent/medimg.json")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
