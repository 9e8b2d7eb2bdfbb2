use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use medimg::{ExperimentConfig, InferenceRunner};

/// Read-only after startup, so handlers share it without locking.
pub type SharedState = Arc<ServiceState>;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8000";

pub struct ServiceState {
    /// `None` when no config or checkpoint could be loaded; `/analyze` then
    /// answers 503 and `/health` reports it.
    pub runner: Option<InferenceRunner>,
    /// Why the runner is missing.
    pub load_error: Option<String>,
    pub status_path: Option<PathBuf>,
}

impl ServiceState {
    /// Builds state from `MEDIMG_CONFIG` and `MEDIMG_CHECKPOINT`.
    ///
    /// A missing or broken model does not stop the service: health and
    /// comparison keep working.
    pub fn from_env() -> ServiceState {
        let Some(config_path) = env::var_os("MEDIMG_CONFIG").map(PathBuf::from) else {
            warn!("MEDIMG_CONFIG not set; serving without a model");
            return ServiceState::without_model("MEDIMG_CONFIG is not set");
        };
        let config = match ExperimentConfig::load_json(&config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Cannot load config {}: {}", config_path.display(), e);
                return ServiceState::without_model(e.to_string());
            }
        };
        let checkpoint = env::var_os("MEDIMG_CHECKPOINT")
            .map(PathBuf::from)
            .unwrap_or_else(|| config.best_checkpoint_path());

        match InferenceRunner::load(&checkpoint, &config) {
            Ok(runner) => {
                info!("Model loaded from {}", checkpoint.display());
                ServiceState {
                    runner: Some(runner),
                    load_error: None,
                    status_path: Some(config.status_path()),
                }
            }
            Err(e) => {
                warn!("Cannot load checkpoint {}: {}", checkpoint.display(), e);
                ServiceState {
                    runner: None,
                    load_error: Some(e.to_string()),
                    status_path: Some(config.status_path()),
                }
            }
        }
    }

    pub fn without_model(reason: impl Into<String>) -> ServiceState {
        ServiceState {
            runner: None,
            load_error: Some(reason.into()),
            status_path: None,
        }
    }

    pub fn addr() -> String {
        env::var("MEDIMG_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_owned())
    }
}
