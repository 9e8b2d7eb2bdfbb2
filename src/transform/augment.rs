//! Randomized training-time augmentation.
//!
//! Applied to the decoded image before the deterministic [`Pipeline`]; only the
//! training loader ever holds an `Augmentation`, so validation, test and
//! inference see unmodified images.
//!
//! [`Pipeline`]: crate::transform::pipeline::Pipeline

use image::{DynamicImage, Rgb, RgbImage};
use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct Augmentation {
    /// Mirror left-right with probability 0.5.
    pub horizontal_flip: bool,
    /// Rotate by an angle drawn from ±`rotation_degrees` (0 disables).
    pub rotation_degrees: f64,
    /// Minimum kept area fraction of a random crop, in (0, 1]. 1 disables.
    pub crop_scale: f64,
    /// Brightness and contrast factors drawn from 1 ± `color_jitter`.
    pub color_jitter: f64,
}

impl Augmentation {
    pub fn is_noop(&self) -> bool {
        !self.horizontal_flip
            && self.rotation_degrees <= 0.0
            && self.crop_scale >= 1.0
            && self.color_jitter <= 0.0
    }

    pub fn apply<R: Rng + ?Sized>(&self, image: &DynamicImage, rng: &mut R) -> DynamicImage {
        let mut img = image.to_rgb8();

        if self.crop_scale < 1.0 {
            img = random_crop(&img, self.crop_scale, rng);
        }
        if self.horizontal_flip && rng.gen_bool(0.5) {
            img = image::imageops::flip_horizontal(&img);
        }
        if self.rotation_degrees > 0.0 {
            let angle = rng.gen_range(-self.rotation_degrees..=self.rotation_degrees);
            img = rotate(&img, angle.to_radians());
        }
        if self.color_jitter > 0.0 {
            let j = self.color_jitter;
            let brightness = rng.gen_range(1.0 - j..=1.0 + j);
            let contrast = rng.gen_range(1.0 - j..=1.0 + j);
            jitter(&mut img, brightness.max(0.0), contrast.max(0.0));
        }
        DynamicImage::ImageRgb8(img)
    }
}

fn random_crop<R: Rng + ?Sized>(img: &RgbImage, min_scale: f64, rng: &mut R) -> RgbImage {
    let (w, h) = img.dimensions();
    let scale = rng.gen_range(min_scale.max(0.01)..=1.0);
    let side = scale.sqrt();
    let cw = ((w as f64 * side).round() as u32).clamp(1, w);
    let ch = ((h as f64 * side).round() as u32).clamp(1, h);
    let x = rng.gen_range(0..=w - cw);
    let y = rng.gen_range(0..=h - ch);
    image::imageops::crop_imm(img, x, y, cw, ch).to_image()
}

/// Rotation about the image centre with nearest-neighbour sampling. Pixels
/// mapped from outside the source are black.
fn rotate(img: &RgbImage, radians: f64) -> RgbImage {
    let (w, h) = img.dimensions();
    let (cx, cy) = ((w as f64 - 1.0) / 2.0, (h as f64 - 1.0) / 2.0);
    let (sin, cos) = radians.sin_cos();
    RgbImage::from_fn(w, h, |x, y| {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let sx = (cos * dx + sin * dy + cx).round();
        let sy = (-sin * dx + cos * dy + cy).round();
        if sx >= 0.0 && sy >= 0.0 && (sx as u32) < w && (sy as u32) < h {
            *img.get_pixel(sx as u32, sy as u32)
        } else {
            Rgb([0, 0, 0])
        }
    })
}

fn jitter(img: &mut RgbImage, brightness: f64, contrast: f64) {
    let n = (img.width() * img.height()).max(1) as f64;
    let mean: f64 = img
        .pixels()
        .map(|p| p.0.iter().map(|&c| c as f64).sum::<f64>() / 3.0)
        .sum::<f64>()
        / n
        * brightness;
    for p in img.pixels_mut() {
        for c in p.0.iter_mut() {
            let v = (*c as f64 * brightness - mean) * contrast + mean;
            *c = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}
