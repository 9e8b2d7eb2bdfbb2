use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// Interpolation used whenever an image is resized, for the model input and
/// for comparison alignment alike.
pub const RESIZE_FILTER: FilterType = FilterType::Triangle;

/// Channels of the model input. Every source image is converted to RGB.
pub const INPUT_CHANNELS: usize = 3;

/// Everything that determines the deterministic preprocessing.
///
/// Embedded in each checkpoint so inference can verify it preprocesses
/// exactly like training did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessSpec {
    pub height: u32,
    pub width: u32,
    pub mean: [f64; 3],
    pub std: [f64; 3],
}

impl PreprocessSpec {
    pub fn validate(&self) -> Result<()> {
        if self.height == 0 || self.width == 0 {
            return Err(Error::config("image size must be positive"));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(Error::config("normalization mean must be finite"));
        }
        if self.std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(Error::config("normalization std must be finite and positive"));
        }
        Ok(())
    }
}

/// Decodes an image file. Format is detected from content, not extension.
pub fn decode_file(path: &Path) -> Result<DynamicImage> {
    let reader = image::io::Reader::open(path)
        .map_err(|e| Error::decode(path, e))?
        .with_guessed_format()
        .map_err(|e| Error::decode(path, e))?;
    reader.decode().map_err(|e| Error::decode(path, e))
}

pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes).map_err(|e| Error::decode("<upload>", e))
}

/// Deterministic image → tensor mapping shared by training, evaluation and
/// inference.
///
/// Steps: resize to `height × width` with [`RESIZE_FILTER`], convert to RGB8,
/// scale to [0, 1], then `(x - mean[c]) / std[c]` per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    spec: PreprocessSpec,
}

impl Pipeline {
    pub fn new(spec: PreprocessSpec) -> Result<Pipeline> {
        spec.validate()?;
        Ok(Pipeline { spec })
    }

    pub fn spec(&self) -> &PreprocessSpec {
        &self.spec
    }

    pub fn apply(&self, image: &DynamicImage) -> Tensor {
        let (h, w) = (self.spec.height, self.spec.width);
        let rgb = if image.width() == w && image.height() == h {
            image.to_rgb8()
        } else {
            image.resize_exact(w, h, RESIZE_FILTER).to_rgb8()
        };

        let (h, w) = (h as usize, w as usize);
        let mut tensor = Tensor::zeros(INPUT_CHANNELS, h, w);
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..INPUT_CHANNELS {
                let scaled = pixel.0[c] as f64 / 255.0;
                let idx = tensor.index(c, y as usize, x as usize);
                tensor.data[idx] = (scaled - self.spec.mean[c]) / self.spec.std[c];
            }
        }
        tensor
    }

    pub fn load(&self, path: &Path) -> Result<Tensor> {
        decode_file(path).map(|img| self.apply(&img))
    }
}
