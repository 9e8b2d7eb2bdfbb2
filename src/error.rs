use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the core can report.
///
/// The variants mirror how a caller is expected to react: configuration
/// problems are fatal at startup, decode errors are per-image, schema and
/// checkpoint errors are fatal to a load, inference errors are fatal to a
/// single call.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing/invalid paths, empty splits, invalid hyperparameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A file could not be read or decoded as an image.
    #[error("cannot decode image {path}: {reason}")]
    ImageDecode { path: PathBuf, reason: String },

    /// The checkpoint was trained with a different class schema.
    #[error("class schema mismatch: checkpoint has {checkpoint:?}, runtime expects {runtime:?}")]
    SchemaMismatch {
        checkpoint: Vec<String>,
        runtime: Vec<String>,
    },

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(PathBuf),

    /// Partial write, corrupt JSON, or parameters inconsistent with the
    /// stored architecture.
    #[error("checkpoint I/O error at {path}: {reason}")]
    CheckpointIo { path: PathBuf, reason: String },

    /// Non-finite values in the model output.
    #[error("inference error: {0}")]
    Inference(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::ImageDecode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn checkpoint_io(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::CheckpointIo {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable snake_case identifier, used as the `error` field of service
    /// payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration_error",
            Error::ImageDecode { .. } => "image_decode_error",
            Error::SchemaMismatch { .. } => "schema_mismatch_error",
            Error::CheckpointNotFound(_) => "checkpoint_not_found_error",
            Error::CheckpointIo { .. } => "checkpoint_io_error",
            Error::Inference(_) => "inference_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }

    /// Whether the error concerns the caller's input rather than the
    /// system's state.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::ImageDecode { .. })
    }
}
