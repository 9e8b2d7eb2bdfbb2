//! Structural similarity (Wang et al., 2004) over a sliding uniform window.

use image::GrayImage;

/// Side of the square averaging window.
pub const WINDOW: usize = 7;
pub const K1: f64 = 0.01;
pub const K2: f64 = 0.03;
/// Dynamic range of 8-bit luma.
pub const DATA_RANGE: f64 = 255.0;

/// Summed-area table with one row and column of zero padding.
struct Integral {
    stride: usize,
    sums: Vec<f64>,
}

impl Integral {
    fn new(width: usize, height: usize, value: impl Fn(usize, usize) -> f64) -> Integral {
        let stride = width + 1;
        let mut sums = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            let mut row = 0.0;
            for x in 0..width {
                row += value(x, y);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Integral { stride, sums }
    }

    /// Sum over the `size × size` window with top-left corner `(x, y)`.
    fn window(&self, x: usize, y: usize, size: usize) -> f64 {
        let s = self.stride;
        let (x1, y1) = (x + size, y + size);
        self.sums[y1 * s + x1] - self.sums[y * s + x1] - self.sums[y1 * s + x] + self.sums[y * s + x]
    }
}

/// Largest odd window no bigger than [`WINDOW`] that fits in `width × height`.
pub fn window_size(width: u32, height: u32) -> usize {
    let fit = (width.min(height) as usize).min(WINDOW);
    if fit % 2 == 0 {
        fit.saturating_sub(1)
    } else {
        fit
    }
}

/// Mean SSIM over every fully contained window.
///
/// Local statistics use sample (N − 1) normalization. Both images must have
/// the same, non-zero dimensions.
pub fn ssim(a: &GrayImage, b: &GrayImage) -> f64 {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    let (w, h) = a.dimensions();
    let win = window_size(w, h);
    let (w, h) = (w as usize, h as usize);

    let px = |img: &GrayImage, x: usize, y: usize| img.get_pixel(x as u32, y as u32).0[0] as f64;
    let sx = Integral::new(w, h, |x, y| px(a, x, y));
    let sy = Integral::new(w, h, |x, y| px(b, x, y));
    let sxx = Integral::new(w, h, |x, y| px(a, x, y).powi(2));
    let syy = Integral::new(w, h, |x, y| px(b, x, y).powi(2));
    let sxy = Integral::new(w, h, |x, y| px(a, x, y) * px(b, x, y));

    let np = (win * win) as f64;
    let cov_norm = if np > 1.0 { np / (np - 1.0) } else { 1.0 };
    let c1 = (K1 * DATA_RANGE).powi(2);
    let c2 = (K2 * DATA_RANGE).powi(2);

    let mut total = 0.0;
    let mut count = 0usize;
    for y in 0..=(h - win) {
        for x in 0..=(w - win) {
            let ux = sx.window(x, y, win) / np;
            let uy = sy.window(x, y, win) / np;
            let uxx = sxx.window(x, y, win) / np;
            let uyy = syy.window(x, y, win) / np;
            let uxy = sxy.window(x, y, win) / np;
            let vx = cov_norm * (uxx - ux * ux);
            let vy = cov_norm * (uyy - uy * uy);
            let vxy = cov_norm * (uxy - ux * uy);

            let num = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
            let den = (ux * ux + uy * uy + c1) * (vx + vy + c2);
            total += num / den;
            count += 1;
        }
    }
    total / count as f64
}
