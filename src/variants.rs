//! Image variant generation.
//!
//! Label photos arrive with wildly different lighting, focus and print
//! contrast, so a single OCR pass is fragile. Instead the pipeline derives
//! several differently-enhanced copies of the input and recognizes all of
//! them. Each recipe is a pure `GrayImage -> GrayImage` function registered
//! in a fixed-order table; recipes share nothing and are safe to run
//! concurrently. Variants are plain in-memory buffers dropped after
//! recognition.

use image::imageops;
use image::{DynamicImage, GrayImage, Luma};

use crate::schema::ImageVariant;

type Recipe = fn(&GrayImage) -> GrayImage;

/// Fixed-order enhancement table. Order matters downstream: the result
/// selector breaks score ties by variant position.
const RECIPES: &[(&str, Recipe)] = &[
    ("normalized-sharp", normalized_sharp),
    ("contrast-sharp", contrast_sharp),
    ("denoised-sharp", denoised_sharp),
    ("binarized-sharp", binarized_sharp),
    ("grey-soft", grey_soft),
];

/// Derive all enhancement variants of one decoded image.
pub fn generate_variants(input: &DynamicImage) -> Vec<ImageVariant> {
    let grey = input.to_luma8();
    RECIPES
        .iter()
        .map(|(label, recipe)| ImageVariant {
            label,
            image: recipe(&grey),
        })
        .collect()
}

// ============================================================================
// Recipes
// ============================================================================

/// Histogram stretch + mild gamma + unsharp mask. The general-purpose
/// variant; works well on evenly lit photos.
fn normalized_sharp(img: &GrayImage) -> GrayImage {
    let stretched = stretch_contrast(img);
    let gamma = apply_gamma(&stretched, 0.9);
    imageops::unsharpen(&gamma, 1.0, 4)
}

/// Aggressive contrast boost + unsharp mask, for washed-out prints.
fn contrast_sharp(img: &GrayImage) -> GrayImage {
    let boosted = imageops::contrast(img, 40.0);
    imageops::unsharpen(&boosted, 1.2, 4)
}

/// 3x3 median denoise + unsharp mask, for grainy phone photos.
fn denoised_sharp(img: &GrayImage) -> GrayImage {
    let denoised = median3x3(img);
    imageops::unsharpen(&denoised, 1.0, 3)
}

/// Global threshold + unsharp mask. Collapses colored box art into
/// black-on-white text.
fn binarized_sharp(img: &GrayImage) -> GrayImage {
    let binary = binarize(img);
    imageops::unsharpen(&binary, 0.8, 2)
}

/// Mild contrast + slight blur. Hedges against over-sharpened inputs where
/// the other recipes amplify compression artifacts.
fn grey_soft(img: &GrayImage) -> GrayImage {
    let boosted = imageops::contrast(img, 15.0);
    imageops::blur(&boosted, 0.7)
}

// ============================================================================
// Pixel ops
// ============================================================================

/// Linear min-max stretch to the full 0–255 range.
fn stretch_contrast(img: &GrayImage) -> GrayImage {
    let (mut lo, mut hi) = (u8::MAX, u8::MIN);
    for Luma([v]) in img.pixels() {
        lo = lo.min(*v);
        hi = hi.max(*v);
    }
    if hi <= lo {
        return img.clone();
    }
    let range = f32::from(hi - lo);
    let mut out = img.clone();
    for Luma([v]) in out.pixels_mut() {
        *v = ((f32::from(*v - lo) / range) * 255.0).round() as u8;
    }
    out
}

fn apply_gamma(img: &GrayImage, gamma: f32) -> GrayImage {
    let mut out = img.clone();
    for Luma([v]) in out.pixels_mut() {
        let normalized = f32::from(*v) / 255.0;
        *v = (normalized.powf(gamma) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// 3x3 median filter. Border pixels are copied through unchanged.
fn median3x3(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = img.clone();
    if w < 3 || h < 3 {
        return out;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let mut window = [0u8; 9];
            let mut i = 0;
            for dy in 0..3 {
                for dx in 0..3 {
                    window[i] = img.get_pixel(x + dx - 1, y + dy - 1).0[0];
                    i += 1;
                }
            }
            window.sort_unstable();
            out.put_pixel(x, y, Luma([window[4]]));
        }
    }
    out
}

/// Threshold at the mean intensity. Cheaper than Otsu and close enough for
/// printed labels, which are strongly bimodal already.
fn binarize(img: &GrayImage) -> GrayImage {
    let sum: u64 = img.pixels().map(|Luma([v])| u64::from(*v)).sum();
    let count = u64::from(img.width()) * u64::from(img.height());
    let threshold = if count == 0 { 128 } else { (sum / count) as u8 };

    let mut out = img.clone();
    for Luma([v]) in out.pixels_mut() {
        *v = if *v > threshold { 255 } else { 0 };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| Luma([(x * 8).min(255) as u8]))
    }

    #[test]
    fn test_generates_all_recipes_in_order() {
        let img = DynamicImage::ImageLuma8(gradient(32, 32));
        let variants = generate_variants(&img);
        assert_eq!(variants.len(), 5);
        assert_eq!(variants[0].label, "normalized-sharp");
        assert_eq!(variants[3].label, "binarized-sharp");
        for v in &variants {
            assert_eq!(v.image.dimensions(), (32, 32));
        }
    }

    #[test]
    fn test_recipes_are_pure() {
        let img = gradient(16, 16);
        let before = img.clone();
        let _ = normalized_sharp(&img);
        let _ = binarized_sharp(&img);
        assert_eq!(img, before);
    }

    #[test]
    fn test_stretch_covers_full_range() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([100 + (x as u8) * 10]));
        let stretched = stretch_contrast(&img);
        assert_eq!(stretched.get_pixel(0, 0).0[0], 0);
        assert_eq!(stretched.get_pixel(3, 0).0[0], 255);
    }

    #[test]
    fn test_stretch_flat_image_is_identity() {
        let img = GrayImage::from_pixel(8, 8, Luma([42]));
        assert_eq!(stretch_contrast(&img), img);
    }

    #[test]
    fn test_binarize_is_two_valued() {
        let binary = binarize(&gradient(32, 4));
        assert!(binary.pixels().all(|Luma([v])| *v == 0 || *v == 255));
    }

    #[test]
    fn test_median_removes_salt_noise() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([200]));
        img.put_pixel(4, 4, Luma([0])); // lone dark speck
        let out = median3x3(&img);
        assert_eq!(out.get_pixel(4, 4).0[0], 200);
    }
}
