use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::transform::pipeline::INPUT_CHANNELS;

/// Serializable description of the convolutional backbone.
///
/// Each entry of `conv_channels` is one block: `kernel × kernel` convolution
/// with "same" padding, then `activation`, then 2×2 max pooling. The blocks are
/// followed by global average pooling, so the head's fan-in is the last entry
/// of `conv_channels` regardless of the input resolution.
///
/// Stored in every checkpoint so a model can be rebuilt without outside
/// context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchitectureSpec {
    pub input_channels: usize,
    pub conv_channels: Vec<usize>,
    pub kernel: usize,
    pub activation: ActivationFunction,
}

impl Default for ArchitectureSpec {
    fn default() -> Self {
        ArchitectureSpec {
            input_channels: INPUT_CHANNELS,
            conv_channels: vec![8, 16, 32],
            kernel: 3,
            activation: ActivationFunction::ReLU,
        }
    }
}

impl ArchitectureSpec {
    pub fn validate(&self) -> Result<()> {
        if self.input_channels == 0 {
            return Err(Error::config("model input_channels must be positive"));
        }
        if self.conv_channels.is_empty() {
            return Err(Error::config("model needs at least one convolution block"));
        }
        if self.conv_channels.iter().any(|&c| c == 0) {
            return Err(Error::config("convolution blocks need at least one channel"));
        }
        if self.kernel == 0 || self.kernel % 2 == 0 {
            return Err(Error::config("convolution kernel size must be odd"));
        }
        if self.activation == ActivationFunction::Identity {
            return Err(Error::config("backbone activation must be non-linear"));
        }
        Ok(())
    }

    /// Size of the feature vector fed to the head.
    pub fn feature_size(&self) -> usize {
        self.conv_channels.last().copied().unwrap_or(self.input_channels)
    }
}
