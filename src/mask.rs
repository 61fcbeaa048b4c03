//! Region masks: hard rectangles, soft fade-out crops, and blurred alpha cutouts.

use image::{imageops, DynamicImage, GenericImageView, GrayImage, Luma, RgbaImage};
use log::debug;

use crate::blending::{alpha_channel, composite_masks, darker, put_alpha};
use crate::error::{Error, Result};
use crate::fadeout::fadeout_mask;
use crate::info::{RectInfo, RegionContext};
use crate::rect::Rect;

/// A source image prepared for masking, plus a hard mask of one region.
#[derive(Debug, Clone)]
pub struct RegionMask {
    /// The source with an alpha channel (opaque where the source had none).
    pub image: RgbaImage,
    /// The source's alpha channel.
    pub origin_alpha: GrayImage,
    /// 255 inside the region, 0 elsewhere.
    pub mask: GrayImage,
    /// The region itself.
    pub origin_rect: Rect,
}

/// Output of [`create_blurred_mask`].
#[derive(Debug, Clone)]
pub struct BlurredMask {
    /// The full source image with an alpha channel.
    pub image: RgbaImage,
    /// The region mask with faded edges.
    pub mask: GrayImage,
    /// Geometry and file names for the region.
    pub info: RectInfo,
}

/// Output of [`create_blurred_alpha_mask`].
#[derive(Debug, Clone)]
pub struct AlphaCutout {
    /// The source image with `mask` as its alpha channel.
    pub image: RgbaImage,
    /// Gaussian-blurred region alpha.
    pub mask: GrayImage,
}

/// Hard-edged mask of `rect` over `image`.
///
/// # Errors
///
/// Returns [`Error::InvalidRect`] if `rect` has inverted corners.
pub fn create_mask(image: &DynamicImage, rect: Rect) -> Result<RegionMask> {
    let rect = rect.validate()?;
    let rgba = image.to_rgba8();
    let (w, h) = image.dimensions();
    let origin_alpha = alpha_channel(&rgba);

    let mut mask = GrayImage::new(w, h);
    if let Some((x, y, cw, ch)) = rect.clip_to(w, h) {
        for py in y..y + ch {
            for px in x..x + cw {
                mask.put_pixel(px, py, Luma([255]));
            }
        }
    }

    Ok(RegionMask {
        image: rgba,
        origin_alpha,
        mask,
        origin_rect: rect,
    })
}

/// Soft-edged mask of `rect` and the region geometry to crop and restore it.
///
/// With a positive `blur_size` the hard mask is intersected with a
/// [`fadeout_mask`], and two rectangles are derived, both clamped to the canvas:
/// - `mask_rect`: `rect` shrunk by `blur_size` on every side, the fully opaque core;
/// - `origin_rect`: `rect` grown by `blur_size` on every side, the area to crop.
///
/// With `blur_size == 0` both equal `rect`.
///
/// # Errors
///
/// Returns [`Error::InvalidRect`] for inverted corners and [`Error::InvalidBlurSize`]
/// when `blur_size` exceeds the coordinate range.
pub fn create_blurred_mask(
    image: &DynamicImage,
    rect: Rect,
    blur_size: u32,
    ctx: &RegionContext,
) -> Result<BlurredMask> {
    let RegionMask {
        image: rgba,
        mut mask,
        origin_rect,
        ..
    } = create_mask(image, rect)?;

    let (origin_rect, mask_rect) = if blur_size > 0 {
        let b = i32::try_from(blur_size).map_err(|_| Error::InvalidBlurSize(blur_size))?;
        let (w, h) = rgba.dimensions();
        let fade = fadeout_mask(w, h, origin_rect, blur_size)?;
        mask = darker(&mask, &fade);
        (
            origin_rect.grow_within(b, w, h),
            origin_rect.shrink_within(b, w, h),
        )
    } else {
        (origin_rect, origin_rect)
    };

    let info = ctx.rect_info(origin_rect, mask_rect);
    debug!(
        "{}: origin_rect={:?} mask_rect={:?}",
        info.filename,
        origin_rect.to_tuple(),
        mask_rect.to_tuple()
    );

    Ok(BlurredMask {
        image: rgba,
        mask,
        info,
    })
}

/// Cut `rect` out of `image`, keeping the source alpha inside it and blurring the
/// edge with a Gaussian of sigma `blur_size`.
///
/// # Errors
///
/// Returns [`Error::InvalidRect`] if `rect` has inverted corners.
pub fn create_blurred_alpha_mask(
    image: &DynamicImage,
    rect: Rect,
    blur_size: u32,
) -> Result<AlphaCutout> {
    let RegionMask {
        image: mut rgba,
        origin_alpha,
        mask,
        ..
    } = create_mask(image, rect)?;

    let mut cutout = composite_masks(&origin_alpha, &mask, &mask);
    if blur_size > 0 {
        #[allow(clippy::cast_precision_loss)]
        let sigma = blur_size as f32;
        cutout = imageops::blur(&cutout, sigma);
    }
    put_alpha(&mut rgba, &cutout);

    Ok(AlphaCutout {
        image: rgba,
        mask: cutout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};
    use std::path::Path;

    fn opaque(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([90, 120, 150])))
    }

    fn head_ctx() -> RegionContext {
        RegionContext::for_image(Path::new("a.png"), "head")
    }

    #[test]
    fn create_mask_synthesizes_opaque_alpha() {
        let m = create_mask(&opaque(20, 10), Rect::new(2, 3, 6, 8)).unwrap();
        assert!(m.origin_alpha.pixels().all(|p| p[0] == 255));
        assert_eq!(m.image.get_pixel(0, 0), &Rgba([90, 120, 150, 255]));
        assert_eq!(m.mask.get_pixel(2, 3)[0], 255);
        assert_eq!(m.mask.get_pixel(5, 7)[0], 255);
        assert_eq!(m.mask.get_pixel(6, 7)[0], 0);
        assert_eq!(m.mask.get_pixel(1, 3)[0], 0);
        assert_eq!(m.origin_rect, Rect::new(2, 3, 6, 8));
    }

    #[test]
    fn create_mask_keeps_source_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 40])));
        let m = create_mask(&img, Rect::new(0, 0, 2, 2)).unwrap();
        assert!(m.origin_alpha.pixels().all(|p| p[0] == 40));
    }

    #[test]
    fn blurred_mask_shrinks_and_grows() {
        let out = create_blurred_mask(&opaque(200, 200), Rect::new(10, 10, 100, 100), 10, &head_ctx())
            .unwrap();
        assert_eq!(out.info.mask_rect, Rect::new(20, 20, 90, 90));
        assert_eq!(out.info.origin_rect, Rect::new(0, 0, 110, 110));
        assert_eq!(out.info.filename, "a_head");
        assert_eq!(out.mask.get_pixel(55, 55)[0], 255);
        assert_eq!(out.mask.get_pixel(10, 55)[0], 0);
        assert_eq!(out.mask.get_pixel(150, 150)[0], 0);
        assert_eq!(out.image.dimensions(), (200, 200));
    }

    #[test]
    fn blurred_mask_without_blur_keeps_rect() {
        let rect = Rect::new(5, 6, 50, 60);
        let out = create_blurred_mask(&opaque(100, 100), rect, 0, &head_ctx()).unwrap();
        assert_eq!(out.info.origin_rect, rect);
        assert_eq!(out.info.mask_rect, rect);
        assert_eq!(out.mask.get_pixel(5, 6)[0], 255);
    }

    #[test]
    fn blurred_mask_rejects_bad_input() {
        let img = opaque(10, 10);
        assert!(matches!(
            create_blurred_mask(&img, Rect::new(5, 5, 1, 1), 2, &head_ctx()),
            Err(Error::InvalidRect { .. })
        ));
        assert!(matches!(
            create_blurred_mask(&img, Rect::new(1, 1, 5, 5), u32::MAX, &head_ctx()),
            Err(Error::InvalidBlurSize(_))
        ));
    }

    #[test]
    fn alpha_cutout_keeps_inner_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(60, 60, Rgba([9, 9, 9, 200])));
        let cut = create_blurred_alpha_mask(&img, Rect::new(10, 10, 50, 50), 0).unwrap();
        assert_eq!(cut.mask.get_pixel(30, 30)[0], 200);
        assert_eq!(cut.mask.get_pixel(5, 5)[0], 0);
        assert_eq!(cut.image.get_pixel(30, 30)[3], 200);
        assert_eq!(cut.image.get_pixel(5, 5)[3], 0);
    }

    #[test]
    fn alpha_cutout_blur_softens_edge() {
        let cut = create_blurred_alpha_mask(&opaque(80, 80), Rect::new(20, 20, 60, 60), 3).unwrap();
        let edge = cut.mask.get_pixel(20, 40)[0];
        assert!(edge > 0 && edge < 255, "edge value {edge}");
        assert!(cut.mask.get_pixel(40, 40)[0] >= 254);
        assert!(cut.mask.get_pixel(2, 2)[0] <= 1);
    }
}
