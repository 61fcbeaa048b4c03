//! Per-pixel alpha math shared by the mask builder and the layer composer.
//!
//! "Over" compositing places a source pixel with alpha `a_s` on a destination
//! with alpha `a_d`:
//! `a_o = a_s + a_d * (1 - a_s)` and
//! `c_o = (c_s * a_s + c_d * a_d * (1 - a_s)) / a_o`.

use image::{GrayImage, Luma, RgbaImage};

/// Integer `v / 255` with rounding, exact for `v <= 255 * 255`.
#[inline]
fn div255(v: u32) -> u8 {
    let t = v + 128;
    #[allow(clippy::cast_possible_truncation)]
    {
        ((t + (t >> 8)) >> 8) as u8
    }
}

/// Composite `src` over `dst` in place.
///
/// Both images must have the same dimensions; only the overlapping area is touched
/// otherwise.
pub fn alpha_composite(dst: &mut RgbaImage, src: &RgbaImage) {
    let w = dst.width().min(src.width());
    let h = dst.height().min(src.height());

    for y in 0..h {
        for x in 0..w {
            let s = src.get_pixel(x, y);
            let d = dst.get_pixel_mut(x, y);

            let sa = f32::from(s[3]) / 255.0;
            let da = f32::from(d[3]) / 255.0;
            let out_a = sa + da * (1.0 - sa);

            if out_a <= 0.0 {
                d.0 = [0, 0, 0, 0];
                continue;
            }

            let dst_weight = da * (1.0 - sa);
            for ch in 0..3 {
                let c = (f32::from(s[ch]) * sa + f32::from(d[ch]) * dst_weight) / out_a;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    d[ch] = c.round().clamp(0.0, 255.0) as u8;
                }
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                d[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Paste `src` onto `dst` at `(x, y)`, weighting every channel (alpha included)
/// by the source's own alpha.
///
/// Parts of `src` that fall outside `dst` are dropped.
pub fn paste_with_alpha(dst: &mut RgbaImage, src: &RgbaImage, x: i64, y: i64) {
    let dst_w = i64::from(dst.width());
    let dst_h = i64::from(dst.height());

    for (sx, sy, s) in src.enumerate_pixels() {
        let tx = x + i64::from(sx);
        let ty = y + i64::from(sy);
        if tx < 0 || ty < 0 || tx >= dst_w || ty >= dst_h {
            continue;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let d = dst.get_pixel_mut(tx as u32, ty as u32);
        let m = u32::from(s[3]);
        for ch in 0..4 {
            d[ch] = div255(u32::from(s[ch]) * m + u32::from(d[ch]) * (255 - m));
        }
    }
}

/// Extract the alpha channel of `img`.
#[must_use]
pub fn alpha_channel(img: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| Luma([img.get_pixel(x, y)[3]]))
}

/// Replace the alpha channel of `img` with `mask`.
///
/// Pixels outside `mask` become fully transparent.
pub fn put_alpha(img: &mut RgbaImage, mask: &GrayImage) {
    for (x, y, px) in img.enumerate_pixels_mut() {
        px[3] = if x < mask.width() && y < mask.height() {
            mask.get_pixel(x, y)[0]
        } else {
            0
        };
    }
}

/// Per-pixel minimum of two masks of equal size.
#[must_use]
pub fn darker(a: &GrayImage, b: &GrayImage) -> GrayImage {
    debug_assert_eq!(a.dimensions(), b.dimensions());
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y)[0].min(b.get_pixel(x, y)[0])])
    })
}

/// Take `a` where `mask` is non-zero and `b` elsewhere, blended by `mask`.
#[must_use]
pub fn composite_masks(a: &GrayImage, b: &GrayImage, mask: &GrayImage) -> GrayImage {
    debug_assert_eq!(a.dimensions(), mask.dimensions());
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        let m = u32::from(mask.get_pixel(x, y)[0]);
        let va = u32::from(a.get_pixel(x, y)[0]);
        let vb = u32::from(b.get_pixel(x, y)[0]);
        Luma([div255(va * m + vb * (255 - m))])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn div255_rounds() {
        assert_eq!(div255(0), 0);
        assert_eq!(div255(255 * 255), 255);
        assert_eq!(div255(255 * 128), 128);
        assert_eq!(div255(127), 0);
        assert_eq!(div255(128), 1);
    }

    #[test]
    fn opaque_source_replaces_destination() {
        let mut dst = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let src = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 255]));
        alpha_composite(&mut dst, &src);
        assert_eq!(dst.get_pixel(1, 1), &Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn transparent_source_keeps_destination() {
        let mut dst = RgbaImage::from_pixel(2, 2, Rgba([10, 20, 30, 255]));
        let src = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 0]));
        alpha_composite(&mut dst, &src);
        assert_eq!(dst.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn half_alpha_over_opaque_mixes_evenly() {
        let mut dst = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 255]));
        let src = RgbaImage::from_pixel(1, 1, Rgba([255, 255, 255, 128]));
        alpha_composite(&mut dst, &src);
        let px = dst.get_pixel(0, 0);
        assert_eq!(px[3], 255);
        assert!((i32::from(px[0]) - 128).abs() <= 1, "got {}", px[0]);
    }

    #[test]
    fn both_transparent_yields_zero() {
        let mut dst = RgbaImage::new(1, 1);
        alpha_composite(&mut dst, &RgbaImage::new(1, 1));
        assert_eq!(dst.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn paste_clips_and_weights_by_alpha() {
        let mut dst = RgbaImage::new(4, 4);
        let src = RgbaImage::from_pixel(3, 3, Rgba([255, 0, 0, 255]));
        paste_with_alpha(&mut dst, &src, 2, -1);
        assert_eq!(dst.get_pixel(2, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(dst.get_pixel(3, 1), &Rgba([255, 0, 0, 255]));
        assert_eq!(dst.get_pixel(1, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(dst.get_pixel(2, 2), &Rgba([0, 0, 0, 0]));

        let mut dst = RgbaImage::new(1, 1);
        paste_with_alpha(&mut dst, &RgbaImage::from_pixel(1, 1, Rgba([200, 200, 200, 0])), 0, 0);
        assert_eq!(dst.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn alpha_roundtrip_through_put_alpha() {
        let mut img = RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 255]));
        let mask = GrayImage::from_fn(3, 2, |x, _| Luma([u8::try_from(x * 100).unwrap()]));
        put_alpha(&mut img, &mask);
        assert_eq!(alpha_channel(&img), mask);
        assert_eq!(img.get_pixel(2, 0), &Rgba([1, 2, 3, 200]));
    }

    #[test]
    fn darker_and_composite_masks() {
        let a = GrayImage::from_pixel(2, 1, Luma([100]));
        let b = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 50 } else { 255 }]));
        assert_eq!(darker(&a, &b).as_raw(), &vec![50, 100]);

        let mask = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 255 } else { 0 }]));
        assert_eq!(composite_masks(&a, &b, &mask).as_raw(), &vec![100, 255]);
    }
}
