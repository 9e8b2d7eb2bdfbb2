//! Pairwise exam comparison, independent of any model.

pub mod ssim;

use std::path::Path;

use image::imageops;
use image::{DynamicImage, GenericImageView, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::transform::pipeline::{decode_file, RESIZE_FILTER};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Mean SSIM in [-1, 1]; 1 for identical images.
    pub similarity: f64,
    /// Mean absolute luma difference on the 0–255 scale.
    pub mean_absolute_difference: f64,
}

/// Compares `target` against `reference` on 8-bit luma.
///
/// The reference size dominates: a target of another size is resized to the
/// reference's exact width and height with [`RESIZE_FILTER`]. The reference is
/// never resized, so results for one reference are comparable across targets.
pub fn compare(reference: &DynamicImage, target: &DynamicImage) -> Result<ComparisonResult> {
    let reference = reference.to_luma8();
    let (w, h) = reference.dimensions();
    if w == 0 || h == 0 {
        return Err(Error::decode("<reference>", "image has zero width or height"));
    }
    if target.width() == 0 || target.height() == 0 {
        return Err(Error::decode("<target>", "image has zero width or height"));
    }

    let target = if target.dimensions() == (w, h) {
        target.to_luma8()
    } else {
        debug!(
            "Resizing target from {:?} to reference size {}x{}",
            target.dimensions(),
            w,
            h
        );
        imageops::resize(&target.to_luma8(), w, h, RESIZE_FILTER)
    };

    Ok(ComparisonResult {
        similarity: ssim::ssim(&reference, &target).clamp(-1.0, 1.0),
        mean_absolute_difference: mean_absolute_difference(&reference, &target),
    })
}

pub fn compare_paths(reference: &Path, target: &Path) -> Result<ComparisonResult> {
    compare(&decode_file(reference)?, &decode_file(target)?)
}

fn mean_absolute_difference(a: &GrayImage, b: &GrayImage) -> f64 {
    let total: f64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&x, &y)| (x as f64 - y as f64).abs())
        .sum();
    total / a.as_raw().len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};
    use proptest::prelude::*;

    fn exam(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            let v = ((x * 7 + y * 13) % 200) as u8 + 20;
            Rgb([v, v / 2, 255 - v])
        }))
    }

    #[test]
    fn identical_images_are_perfectly_similar() {
        let img = exam(40, 30);
        let r = compare(&img, &img).unwrap();
        assert!((r.similarity - 1.0).abs() < 1e-12);
        assert_eq!(r.mean_absolute_difference, 0.0);
    }

    #[test]
    fn brighter_patch_lowers_similarity() {
        let reference = GrayImage::from_fn(32, 32, |x, y| Luma([((x + y) * 3) as u8]));
        let mut target = reference.clone();
        for y in 10..20 {
            for x in 10..20 {
                let p = target.get_pixel_mut(x, y);
                p.0[0] = p.0[0].saturating_add(80);
            }
        }
        let r = compare(
            &DynamicImage::ImageLuma8(reference),
            &DynamicImage::ImageLuma8(target),
        )
        .unwrap();
        assert!(r.similarity < 1.0);
        assert!(r.mean_absolute_difference > 0.0);
        assert!((r.mean_absolute_difference - 100.0 * 80.0 / 1024.0).abs() < 1e-9);
    }

    #[test]
    fn different_sizes_are_aligned_to_reference() {
        let r = compare(&exam(40, 30), &exam(64, 48)).unwrap();
        assert!(r.similarity.is_finite());
        assert!((-1.0..=1.0).contains(&r.similarity));
        assert!(r.mean_absolute_difference >= 0.0);
    }

    #[test]
    fn tiny_images_use_a_smaller_window() {
        let r = compare(&exam(3, 5), &exam(3, 5)).unwrap();
        assert!((r.similarity - 1.0).abs() < 1e-12);
        let r = compare(&exam(1, 1), &exam(9, 9)).unwrap();
        assert!(r.similarity.is_finite());
    }

    #[test]
    fn missing_file_is_decode_error() {
        let err = compare_paths(Path::new("/no/such/a.png"), Path::new("/no/such/b.png")).unwrap_err();
        assert!(matches!(err, Error::ImageDecode { .. }));
    }

    fn gray(w: u32, h: u32, pixels: Vec<u8>) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_raw(w, h, pixels).unwrap())
    }

    proptest! {
        #[test]
        fn prop_self_comparison_is_identity(
            (w, h, pixels) in (1u32..24, 1u32..24).prop_flat_map(|(w, h)| {
                (Just(w), Just(h), prop::collection::vec(any::<u8>(), (w * h) as usize))
            })
        ) {
            let img = gray(w, h, pixels);
            let r = compare(&img, &img).unwrap();
            prop_assert!((r.similarity - 1.0).abs() < 1e-9);
            prop_assert_eq!(r.mean_absolute_difference, 0.0);
        }

        #[test]
        fn prop_similarity_is_bounded_and_symmetric_in_mad(
            (w, h, a, b) in (1u32..16, 1u32..16).prop_flat_map(|(w, h)| {
                let n = (w * h) as usize;
                (Just(w), Just(h), prop::collection::vec(any::<u8>(), n), prop::collection::vec(any::<u8>(), n))
            })
        ) {
            let (ia, ib) = (gray(w, h, a), gray(w, h, b));
            let ab = compare(&ia, &ib).unwrap();
            let ba = compare(&ib, &ia).unwrap();
            prop_assert!((-1.0..=1.0).contains(&ab.similarity));
            prop_assert!((ab.mean_absolute_difference - ba.mean_absolute_difference).abs() < 1e-9);
            prop_assert!((ab.similarity - ba.similarity).abs() < 1e-9);
        }
    }
}
