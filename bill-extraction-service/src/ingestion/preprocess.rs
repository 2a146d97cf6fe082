//! Page cleanup before cropping.

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use imageproc::geometry::min_area_rect;
use imageproc::point::Point;
use tracing::debug;

use crate::config::PreprocessingConfig;

/// Skews smaller than this are left alone.
const MIN_SKEW_DEGREES: f32 = 0.5;

/// Deskew, denoise, boost contrast and trim white margins from a page image.
pub fn preprocess_page(page: DynamicImage, config: &PreprocessingConfig) -> DynamicImage {
    let mut rgb = page.to_rgb8();

    if config.deskew {
        rgb = deskew(rgb);
    }

    if config.denoise {
        rgb = median_filter(&rgb, 1, 1);
    }

    if (config.contrast_factor - 1.0).abs() > f32::EPSILON {
        enhance_contrast(&mut rgb, config.contrast_factor);
    }

    let rgb = trim_margins(rgb, config.margin_threshold, config.margin_padding);
    DynamicImage::ImageRgb8(rgb)
}

/// Skew of the inked area in degrees, within `(-45, 45]`.
///
/// Positive when the content is turned clockwise. `None` for a blank page.
pub fn estimate_skew(gray: &GrayImage) -> Option<f32> {
    let level = otsu_level(gray);

    // The outermost ink pixels of each row span the same hull as all of them.
    let mut points = Vec::new();
    for y in 0..gray.height() {
        let mut ink = (0..gray.width()).filter(|&x| gray.get_pixel(x, y).0[0] <= level);
        if let Some(first) = ink.next() {
            points.push(Point::new(first as i32, y as i32));
            if let Some(last) = ink.last() {
                points.push(Point::new(last as i32, y as i32));
            }
        }
    }
    if points.is_empty() {
        return None;
    }

    let corners = min_area_rect(&points);
    let dx = (corners[1].x - corners[0].x) as f32;
    let dy = (corners[1].y - corners[0].y) as f32;

    let mut angle = dy.atan2(dx).to_degrees();
    while angle > 45.0 {
        angle -= 90.0;
    }
    while angle <= -45.0 {
        angle += 90.0;
    }
    Some(angle)
}

/// Rotate the page so its inked area lines up with the image axes.
pub fn deskew(image: RgbImage) -> RgbImage {
    let gray = image::imageops::grayscale(&image);
    match estimate_skew(&gray) {
        Some(angle) if angle.abs() >= MIN_SKEW_DEGREES => {
            debug!(angle, "Deskewing page");
            rotate_about_center(
                &image,
                -angle.to_radians(),
                Interpolation::Bilinear,
                Rgb([255, 255, 255]),
            )
        }
        _ => image,
    }
}

/// Scale each channel away from the image's mean gray level.
///
/// A factor of 0.0 produces a flat gray image, 1.0 leaves it unchanged.
pub fn enhance_contrast(image: &mut RgbImage, factor: f32) {
    let gray = image::imageops::grayscale(&*image);
    let mean = mean_level(&gray);

    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let value = mean + factor * (*channel as f32 - mean);
            *channel = value.round().clamp(0.0, 255.0) as u8;
        }
    }
}

fn mean_level(gray: &GrayImage) -> f32 {
    let count = gray.width() as u64 * gray.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = gray.pixels().map(|p| p.0[0] as u64).sum();
    (sum as f64 / count as f64).round() as f32
}

/// Bounding box of pixels darker than `threshold`, grown by `padding` and clipped.
///
/// Returns `None` when the page is blank.
pub fn content_bounds(gray: &GrayImage, threshold: u8, padding: u32) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;

    for (x, y, pixel) in gray.enumerate_pixels() {
        if pixel.0[0] >= threshold {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    bounds.map(|(x0, y0, x1, y1)| {
        (
            x0.saturating_sub(padding),
            y0.saturating_sub(padding),
            (x1 + 1 + padding).min(gray.width()),
            (y1 + 1 + padding).min(gray.height()),
        )
    })
}

fn trim_margins(image: RgbImage, threshold: u8, padding: u32) -> RgbImage {
    let gray = image::imageops::grayscale(&image);
    match content_bounds(&gray, threshold, padding) {
        Some((x0, y0, x1, y1)) => {
            image::imageops::crop_imm(&image, x0, y0, x1 - x0, y1 - y0).to_image()
        }
        None => image,
    }
}
