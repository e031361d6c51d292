use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::separable_filter_equal;
use imageproc::morphology::close;

/// Convert RGB to single-channel luminance using BT.601 weights
pub fn to_grayscale(img: &RgbImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b] = img.get_pixel(x, y).0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// 1-D Gaussian kernel of `size` taps, normalized to sum to 1.
///
/// Sigma is derived from the size as `0.3 * ((size - 1) * 0.5 - 1) + 0.8`;
/// sizes up to 7 use the fixed binomial-like tables.
pub fn gaussian_kernel(size: u32) -> Vec<f32> {
    match size {
        1 => return vec![1.0],
        3 => return vec![0.25, 0.5, 0.25],
        5 => return vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        7 => {
            return vec![0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125];
        }
        _ => {}
    }

    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let scale = -0.5 / (sigma * sigma);
    let center = (size as f64 - 1.0) / 2.0;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (scale * d * d).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Gaussian blur with a square kernel of side `kernel_size` (odd).
/// Out-of-range taps repeat the nearest edge sample.
pub fn apply_blur(img: &GrayImage, kernel_size: u32) -> GrayImage {
    if kernel_size <= 1 || img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    separable_filter_equal(img, &gaussian_kernel(kernel_size))
}

/// Gaussian blur applied to each color channel independently
pub fn apply_blur_rgb(img: &RgbImage, kernel_size: u32) -> RgbImage {
    if kernel_size <= 1 || img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    separable_filter_equal(img, &gaussian_kernel(kernel_size))
}

/// Samples at or above `threshold` become 255, everything else 0
pub fn binary_threshold(img: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = if pixel[0] >= threshold { 255 } else { 0 };
    }
    out
}

/// Morphological closing (dilate, then erode) with a square element of side
/// `kernel_size`. Non-zero samples count as foreground.
pub fn morph_close(img: &GrayImage, kernel_size: u32) -> GrayImage {
    let radius = (kernel_size.saturating_sub(1) / 2).min(u8::MAX as u32) as u8;
    if radius == 0 {
        return img.clone();
    }
    close(img, Norm::LInf, radius)
}

/// Detect edges using Canny
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_grayscale_weights() {
        let img = RgbImage::from_fn(3, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([255, 255, 255]),
        });
        let gray = to_grayscale(&img);
        assert_eq!(gray.as_raw(), &vec![76, 150, 255]);
    }

    #[test]
    fn test_kernel_normalized() {
        for size in [1, 3, 5, 7, 9, 15] {
            let kernel = gaussian_kernel(size);
            assert_eq!(kernel.len(), size as usize);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "size {} sums to {}", size, sum);
            let mid = kernel.len() / 2;
            assert!(kernel.iter().all(|w| *w <= kernel[mid]));
        }
    }

    #[test]
    fn test_blur_preserves_flat_image() {
        let img = GrayImage::from_pixel(10, 10, Luma([80]));
        let blurred = apply_blur(&img, 5);
        assert!(blurred.pixels().all(|p| p[0] == 80));
    }

    #[test]
    fn test_blur_spreads_point() {
        let mut img = GrayImage::new(9, 9);
        img.put_pixel(4, 4, Luma([255]));
        let blurred = apply_blur(&img, 3);
        // 255 * 0.25 and 255 * 0.125, give or take rounding
        assert!((63..=64).contains(&blurred.get_pixel(4, 4)[0]));
        assert!((31..=32).contains(&blurred.get_pixel(3, 4)[0]));
        assert_eq!(blurred.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_blur_replicates_border() {
        let img = GrayImage::from_fn(5, 1, |x, _| Luma([if x == 0 { 255 } else { 0 }]));
        let blurred = apply_blur(&img, 3);
        // 0.25 * 255 (repeated edge) + 0.5 * 255 + 0.25 * 0
        assert_eq!(blurred.get_pixel(0, 0)[0], 191);
        assert_eq!(blurred.get_pixel(4, 0)[0], 0);
    }

    #[test]
    fn test_blur_rgb_channels_are_independent() {
        let img = RgbImage::from_pixel(8, 6, Rgb([200, 40, 0]));
        let blurred = apply_blur_rgb(&img, 5);
        assert_eq!(blurred.dimensions(), (8, 6));
        assert!(blurred.pixels().all(|p| *p == Rgb([200, 40, 0])));
        assert_eq!(apply_blur_rgb(&img, 1), img);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([[0u8, 126, 127, 200][x as usize]]));
        let out = binary_threshold(&img, 127);
        assert_eq!(out.as_raw(), &vec![0, 0, 255, 255]);
    }

    #[test]
    fn test_close_fills_small_gap() {
        // Two bars separated by a 1-pixel gap merge after closing
        let img = GrayImage::from_fn(20, 10, |x, y| {
            if (3..7).contains(&y) && (2..18).contains(&x) && x != 9 { Luma([255]) } else { Luma([0]) }
        });
        let closed = morph_close(&img, 3);
        assert_eq!(closed.get_pixel(9, 4)[0], 255);
        assert_eq!(closed.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_edges_on_flat_image_are_empty() {
        let img = GrayImage::from_pixel(16, 16, Luma([128]));
        let edges = detect_edges(&img, 50.0, 150.0);
        assert!(edges.pixels().all(|p| p[0] == 0));
    }
}
