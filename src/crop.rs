//! Crop windows derived from detections.
//!
//! [`force_rect_crop`] cuts a square around the best detection and slides it back
//! onto the canvas instead of padding. [`adaptive_crop`] cuts a box scaled to a
//! target aspect and resizes it to that target. [`crop_rect`] cuts an arbitrary
//! rectangle, filling anything off-canvas with transparent pixels.

use std::path::Path;

use image::{imageops, imageops::FilterType, DynamicImage, GenericImageView, RgbaImage};
use log::{debug, warn};

use crate::blending::alpha_composite;
use crate::detection::Detection;
use crate::error::Result;
use crate::rect::Rect;
use crate::select::get_best_rect;

/// Square window of side `max(bbox width, bbox height)` centered on `bbox` and
/// translated to lie within a `width x height` canvas.
///
/// When the side exceeds a canvas dimension the window is cut to the canvas on
/// that axis, so it is never larger than the image.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn force_square_window(width: u32, height: u32, bbox: Rect) -> Rect {
    let (img_w, img_h) = (i64::from(width), i64::from(height));
    let (l, t, r, b) = (
        i64::from(bbox.x1),
        i64::from(bbox.y1),
        i64::from(bbox.x2),
        i64::from(bbox.y2),
    );

    let center_x = (l + r).div_euclid(2);
    let center_y = (t + b).div_euclid(2);
    let side = (r - l).max(1).max((b - t).max(1));

    let mut left = center_x - side.div_euclid(2);
    let mut top = center_y - side.div_euclid(2);
    let mut right = left + side;
    let mut bottom = top + side;

    if left < 0 {
        right -= left;
        left = 0;
    }
    if top < 0 {
        bottom -= top;
        top = 0;
    }
    if right > img_w {
        left -= right - img_w;
        right = img_w;
    }
    if bottom > img_h {
        top -= bottom - img_h;
        bottom = img_h;
    }
    debug!("window before final clamp: ({left}, {top}, {right}, {bottom})");

    let left = left.min(img_w - side).max(0);
    let top = top.min(img_h - side).max(0);
    let right = (left + side).min(img_w);
    let bottom = (top + side).min(img_h);

    Rect::new(left as i32, top as i32, right as i32, bottom as i32)
}

/// Square crop around the highest-scoring detection.
///
/// With `resize` the crop is rescaled (Lanczos3) to `crop_width x crop_height`. With a
/// `background` path, the background is scaled to `crop_width x crop_height` and a crop
/// that has an alpha channel is composited over it; opaque crops are returned as they
/// are. Background failures are logged and the plain crop is returned.
///
/// Returns `None` when there are no detections.
#[must_use]
pub fn force_rect_crop(
    image: &DynamicImage,
    detections: &[Detection],
    crop_width: u32,
    crop_height: u32,
    resize: bool,
    background: Option<&Path>,
) -> Option<DynamicImage> {
    let bbox = get_best_rect(detections, None)?;
    let (w, h) = image.dimensions();
    let window = force_square_window(w, h, bbox);
    let (x, y, cw, ch) = window.clip_to(w, h)?;

    let mut cropped = image.crop_imm(x, y, cw, ch);
    if resize && cropped.dimensions() != (crop_width, crop_height) {
        cropped = cropped.resize_exact(crop_width, crop_height, FilterType::Lanczos3);
    }

    if let Some(bg) = background {
        match compose_onto_background(&cropped, bg, crop_width, crop_height) {
            Ok(Some(composed)) => return Some(DynamicImage::ImageRgba8(composed)),
            Ok(None) => {}
            Err(e) => warn!("background {} not applied: {e}", bg.display()),
        }
    }

    Some(cropped)
}

/// `crop` over `bg` scaled to `width x height`, or `None` when the crop is opaque.
fn compose_onto_background(
    crop: &DynamicImage,
    bg: &Path,
    width: u32,
    height: u32,
) -> Result<Option<RgbaImage>> {
    let mut background = image::open(bg)?.to_rgba8();
    if background.dimensions() != (width, height) {
        background = imageops::resize(&background, width, height, FilterType::Lanczos3);
    }

    if !crop.color().has_alpha() {
        debug!("crop has no alpha channel; background skipped");
        return Ok(None);
    }
    if crop.dimensions() != (width, height) {
        warn!(
            "crop is {}x{} but background is {width}x{height}; background skipped",
            crop.width(),
            crop.height()
        );
        return Ok(None);
    }

    alpha_composite(&mut background, &crop.to_rgba8());
    Ok(Some(background))
}

/// Crop around the best detection at the `width x height` aspect, resized to exactly
/// that size.
///
/// A detection wider than `width` scales the window up to cover it; otherwise the
/// window is the detection box. The window starts at the clamped center offset and
/// is cut at the image edge.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn adaptive_crop(
    image: &DynamicImage,
    detections: &[Detection],
    width: u32,
    height: u32,
) -> Option<DynamicImage> {
    let bbox = get_best_rect(detections, None)?;
    let (img_w, img_h) = image.dimensions();
    let box_w = i64::from(bbox.width());
    let box_h = i64::from(bbox.height());

    let (new_w, new_h) = if i64::from(width) < box_w && width > 0 {
        let scale = box_w as f64 / f64::from(width);
        (
            (f64::from(width) * scale) as i64,
            (f64::from(height) * scale) as i64,
        )
    } else {
        (box_w, box_h)
    };

    let center_x = (i64::from(bbox.x1) + i64::from(bbox.x2)).div_euclid(2);
    let center_y = (i64::from(bbox.y1) + i64::from(bbox.y2)).div_euclid(2);
    let start_x = (center_x - new_w.div_euclid(2)).max(0);
    let start_y = (center_y - new_h.div_euclid(2)).max(0);
    let end_x = (start_x + new_w).min(i64::from(img_w));
    let end_y = (start_y + new_h).min(i64::from(img_h));

    let window = Rect::new(start_x as i32, start_y as i32, end_x as i32, end_y as i32);
    let (x, y, cw, ch) = window.clip_to(img_w, img_h)?;
    Some(
        image
            .crop_imm(x, y, cw, ch)
            .resize_exact(width, height, FilterType::Lanczos3),
    )
}

/// Cut `rect` out of `image` at exactly its size; off-canvas parts are transparent.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidRect`] if `rect` has inverted corners.
#[allow(clippy::cast_sign_loss)]
pub fn crop_rect(image: &DynamicImage, rect: Rect) -> Result<RgbaImage> {
    let rect = rect.validate()?;
    let (w, h) = image.dimensions();
    let mut out = RgbaImage::new(rect.width() as u32, rect.height() as u32);
    if let Some((x, y, cw, ch)) = rect.clip_to(w, h) {
        let part = image.crop_imm(x, y, cw, ch).to_rgba8();
        imageops::replace(
            &mut out,
            &part,
            i64::from(x) - i64::from(rect.x1),
            i64::from(y) - i64::from(rect.y1),
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};

    fn gradient(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([u8::try_from(x % 256).unwrap(), u8::try_from(y % 256).unwrap(), 0])
        }))
    }

    #[test]
    fn square_window_centered() {
        let win = force_square_window(400, 400, Rect::new(100, 150, 200, 210));
        assert_eq!(win.width(), 100);
        assert_eq!(win.height(), 100);
        assert_eq!(win, Rect::new(100, 130, 200, 230));
    }

    #[test]
    fn square_window_translated_back_on_canvas() {
        let left_edge = force_square_window(300, 300, Rect::new(-20, 10, 60, 50));
        assert_eq!(left_edge, Rect::new(0, 0, 80, 80));

        let bottom_right = force_square_window(300, 200, Rect::new(250, 170, 310, 200));
        assert_eq!(bottom_right, Rect::new(240, 140, 300, 200));
    }

    #[test]
    fn square_window_containment_grid() {
        let (w, h) = (160u32, 120u32);
        for x in (-40..180).step_by(17) {
            for y in (-40..140).step_by(13) {
                for (bw, bh) in [(1, 1), (10, 30), (50, 20), (120, 119)] {
                    let bbox = Rect::new(x, y, x + bw, y + bh);
                    let win = force_square_window(w, h, bbox);
                    let side = bw.max(bh);
                    assert_eq!(win.width(), side, "bbox {bbox:?}");
                    assert_eq!(win.height(), side, "bbox {bbox:?}");
                    assert!(win.x1 >= 0 && win.y1 >= 0, "bbox {bbox:?} -> {win:?}");
                    assert!(win.x2 <= 160 && win.y2 <= 120, "bbox {bbox:?} -> {win:?}");
                }
            }
        }
    }

    #[test]
    fn square_window_larger_than_canvas_is_cut() {
        let win = force_square_window(50, 200, Rect::new(0, 0, 80, 80));
        assert_eq!(win, Rect::new(0, 0, 50, 80));
    }

    #[test]
    fn force_crop_none_without_detections() {
        assert!(force_rect_crop(&gradient(10, 10), &[], 5, 5, false, None).is_none());
    }

    #[test]
    fn force_crop_picks_best_and_resizes() {
        let img = gradient(300, 300);
        let dets = vec![
            Detection::new(Rect::new(0, 0, 20, 20), 0.3),
            Detection::new(Rect::new(100, 100, 160, 140), 0.9),
        ];
        let raw = force_rect_crop(&img, &dets, 32, 32, false, None).unwrap();
        assert_eq!(raw.dimensions(), (60, 60));
        assert_eq!(raw.to_rgb8().get_pixel(0, 0), &Rgb([100, 90, 0]));

        let resized = force_rect_crop(&img, &dets, 32, 48, true, None).unwrap();
        assert_eq!(resized.dimensions(), (32, 48));
    }

    #[test]
    fn force_crop_with_missing_background_returns_crop() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(50, 50, Rgba([5, 5, 5, 100])));
        let dets = vec![Detection::new(Rect::new(10, 10, 30, 30), 0.5)];
        let out = force_rect_crop(&img, &dets, 20, 20, true, Some(Path::new("/nonexistent/bg.png")))
            .unwrap();
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(out.to_rgba8().get_pixel(5, 5)[3], 100);
    }

    #[test]
    fn force_crop_composites_transparent_crop_over_background() {
        let dir = tempfile::tempdir().unwrap();
        let bg_path = dir.path().join("bg.png");
        RgbaImage::from_pixel(16, 16, Rgba([0, 0, 255, 255]))
            .save(&bg_path)
            .unwrap();

        let mut src = RgbaImage::from_pixel(40, 40, Rgba([255, 0, 0, 0]));
        src.put_pixel(20, 20, Rgba([255, 0, 0, 255]));
        let img = DynamicImage::ImageRgba8(src);
        let dets = vec![Detection::new(Rect::new(10, 10, 26, 26), 0.7)];

        let out = force_rect_crop(&img, &dets, 16, 16, false, Some(&bg_path))
            .unwrap()
            .to_rgba8();
        assert_eq!(out.dimensions(), (16, 16));
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(out.get_pixel(10, 10), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn force_crop_ignores_background_for_opaque_crop() {
        let dir = tempfile::tempdir().unwrap();
        let bg_path = dir.path().join("bg.png");
        RgbaImage::from_pixel(4, 4, Rgba([0, 0, 255, 255]))
            .save(&bg_path)
            .unwrap();
        let dets = vec![Detection::new(Rect::new(0, 0, 10, 10), 0.7)];
        let out = force_rect_crop(&gradient(20, 20), &dets, 10, 10, false, Some(&bg_path)).unwrap();
        assert!(!out.color().has_alpha());
    }

    #[test]
    fn adaptive_crop_scales_wide_boxes() {
        let img = gradient(1000, 1000);
        let dets = vec![Detection::new(Rect::new(400, 400, 920, 600), 0.8)];
        let out = adaptive_crop(&img, &dets, 260, 340).unwrap();
        assert_eq!(out.dimensions(), (260, 340));
        assert!(adaptive_crop(&img, &[], 260, 340).is_none());
    }

    #[test]
    fn crop_rect_pads_off_canvas() {
        let img = gradient(20, 20);
        let out = crop_rect(&img, Rect::new(-5, 15, 5, 25)).unwrap();
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(out.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(out.get_pixel(5, 0), &Rgba([0, 15, 0, 255]));
        assert_eq!(out.get_pixel(5, 6), &Rgba([0, 0, 0, 0]));
        assert!(crop_rect(&img, Rect::new(5, 5, 0, 0)).is_err());
    }
}
