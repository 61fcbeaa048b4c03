//! Geometric fade-out masks.
//!
//! Inside a rectangle, opacity falls linearly from 255 to 0 across a band of
//! `blur_size` pixels along each edge. In the corners the distance is measured
//! radially, which rounds them off with radius `blur_size`. This is not a
//! Gaussian blur; the result is exact and deterministic.

use image::{GrayImage, Luma};

use crate::error::Result;
use crate::rect::Rect;

/// Build a `width x height` mask that fades out toward the edges of `rect`.
///
/// Pixels outside `rect` are 0. For a pixel inside, `dx` is how far it sits inside the
/// left band (`x < x1 + blur_size`) or the right band (`x > x2 - blur_size - 1`), and
/// `dy` likewise for the top and bottom bands. With `d = sqrt(dx² + dy²)` the value is
/// `round(255 * (1 - d / blur_size))`, or 0 once `d >= blur_size`.
///
/// A `blur_size` of 0 gives a hard-edged rectangle.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidRect`] if `rect` has inverted corners.
pub fn fadeout_mask(width: u32, height: u32, rect: Rect, blur_size: u32) -> Result<GrayImage> {
    let rect = rect.validate()?;
    let mut mask = GrayImage::new(width, height);
    let Some((cx, cy, cw, ch)) = rect.clip_to(width, height) else {
        return Ok(mask);
    };

    if blur_size == 0 {
        for y in cy..cy + ch {
            for x in cx..cx + cw {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        return Ok(mask);
    }

    let b = i64::from(blur_size);
    let bf = f64::from(blur_size);
    let (x1, y1, x2, y2) = (
        i64::from(rect.x1),
        i64::from(rect.y1),
        i64::from(rect.x2),
        i64::from(rect.y2),
    );

    for y in cy..cy + ch {
        let dy = band_depth(i64::from(y), y1, y2, b);
        for x in cx..cx + cw {
            let dx = band_depth(i64::from(x), x1, x2, b);
            #[allow(clippy::cast_precision_loss)]
            let d = ((dx * dx + dy * dy) as f64).sqrt();
            let alpha = if d >= bf {
                0
            } else {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    (255.0 * (1.0 - d / bf)).round() as u8
                }
            };
            mask.put_pixel(x, y, Luma([alpha]));
        }
    }

    Ok(mask)
}

/// How far `v` lies inside the fade band of `[lo, hi)`, or 0 in the interior.
///
/// The near band is tested first, so a coordinate in both bands of a narrow
/// rectangle measures from the near edge.
fn band_depth(v: i64, lo: i64, hi: i64, b: i64) -> i64 {
    if v < lo + b {
        lo + b - v
    } else if v > hi - b - 1 {
        v - (hi - b - 1)
    } else {
        0
    }
}
