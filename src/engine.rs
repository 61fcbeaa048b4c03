//! Crop stage driver: detections in, region crops and metadata out.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat};
use log::{debug, info, warn};

use crate::config::{CropAction, CropOptions};
use crate::crop::{adaptive_crop, crop_rect, force_rect_crop};
use crate::detection::{Detection, Detector};
use crate::error::{Error, Result};
use crate::info::{base_filename, RegionContext};
use crate::mask::{create_blurred_mask, BlurredMask};
use crate::rect::Rect;
use crate::select::{get_best_rect, get_top_rects, matching};

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Whether processing succeeded.
    pub success: bool,
    /// Whether the file was skipped (no usable detection).
    pub skipped: bool,
    /// Number of regions cropped.
    pub regions: usize,
    /// Files written, or that would be written in a dry run.
    pub outputs: Vec<PathBuf>,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            skipped: false,
            regions: 0,
            outputs: Vec::new(),
            message: String::new(),
        }
    }
}

/// Cuts detected regions out of images according to a [`CropOptions`].
///
/// Create once per batch; the engine holds no per-image state.
pub struct CropEngine {
    options: CropOptions,
}

impl CropEngine {
    /// Create an engine, making the output directory when `make_dirs` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the output directory cannot be created.
    pub fn new(options: CropOptions) -> Result<Self> {
        if options.make_dirs && !options.dry_run && !options.output_dir.exists() {
            std::fs::create_dir_all(&options.output_dir)?;
        }
        Ok(Self { options })
    }

    /// The settings this engine applies.
    #[must_use]
    pub fn options(&self) -> &CropOptions {
        &self.options
    }

    /// Process a single image file: detect, select, crop, save.
    ///
    /// Returns a [`ProcessResult`] indicating success, skip, or failure.
    #[must_use]
    pub fn process_file<D: Detector + ?Sized>(&self, input: &Path, detector: &D) -> ProcessResult {
        let mut result = ProcessResult::new(input);

        let detections = match detector.detect(input) {
            Ok(d) => d,
            Err(e) => {
                result.message = format!("Detection failed: {e}");
                return result;
            }
        };

        let filter = self.options.filter_label();
        if get_best_rect(&detections, filter).is_none() {
            result.skipped = true;
            result.success = true;
            result.message = match filter {
                Some(label) => format!("No region found for filter '{label}'"),
                None => "No detections".to_string(),
            };
            return result;
        }

        if self.options.dry_run {
            result.outputs = self.planned_outputs(input, &detections);
            result.success = true;
            result.message = format!("Would write {} file(s)", result.outputs.len());
            return result;
        }

        match self.write_outputs(input, &detections) {
            Ok((regions, outputs)) => {
                result.success = true;
                result.regions = regions;
                result.message = format!("{regions} region(s) cropped");
                result.outputs = outputs;
            }
            Err(e) => {
                result.message = format!("Failed: {e}");
            }
        }

        result
    }

    /// Process all supported images in a directory, in file name order.
    ///
    /// Uses parallel iteration when the `cli` feature is enabled (via rayon).
    /// Returns a [`ProcessResult`] for each image found.
    #[must_use]
    pub fn process_directory<D: Detector + Sync + ?Sized>(
        &self,
        input_dir: &Path,
        detector: &D,
    ) -> Vec<ProcessResult> {
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().is_ok_and(|ft| ft.is_file()))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p))
                .collect(),
            Err(e) => {
                let mut failed = ProcessResult::new(input_dir);
                failed.message = format!("Failed to read directory: {e}");
                return vec![failed];
            }
        };
        entries.sort();
        info!("{} image(s) in {}", entries.len(), input_dir.display());

        let jobs = claim_base_names(entries);
        let run = |(path, owner): &(PathBuf, Option<PathBuf>)| match owner {
            Some(owner) => collision_result(path, owner),
            None => self.process_file(path, detector),
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            jobs.par_iter().map(run).collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            jobs.iter().map(run).collect()
        }
    }

    /// Naming contexts for up to `count` regions of `input`.
    fn contexts(&self, input: &Path, count: usize) -> Vec<RegionContext> {
        let base = RegionContext::for_image(input, &self.options.mode)
            .with_filter(self.options.filter_label());
        let indexed = self.options.top_n > 1;
        (1..=count)
            .map(|i| base.clone().with_index(indexed.then_some(i)))
            .collect()
    }

    fn output_path(&self, name: &str) -> PathBuf {
        self.options.output_dir.join(format!("{name}.png"))
    }

    fn planned_outputs(&self, input: &Path, detections: &[Detection]) -> Vec<PathBuf> {
        match self.options.action {
            CropAction::Mask => {
                let count = get_top_rects(detections, self.options.filter_label(), self.options.top_n).len();
                let mut outputs = Vec::new();
                for ctx in self.contexts(input, count) {
                    let info = ctx.rect_info(Rect::default(), Rect::default());
                    outputs.push(self.output_path(&info.rect_filename));
                    outputs.push(self.output_path(&info.mask_name));
                    if self.options.save_info {
                        outputs.push(self.options.output_dir.join(format!("{}.json", info.filename)));
                    }
                }
                outputs
            }
            CropAction::ForceRect | CropAction::Adaptive => {
                let ctx = RegionContext::for_image(input, &self.options.mode);
                vec![self.output_path(&ctx.base_filename)]
            }
        }
    }

    fn write_outputs(&self, input: &Path, detections: &[Detection]) -> Result<(usize, Vec<PathBuf>)> {
        let image = image::open(input)?;
        let opts = &self.options;

        if !opts.output_dir.exists() {
            std::fs::create_dir_all(&opts.output_dir)?;
        }

        match opts.action {
            CropAction::Mask => {
                let rects = get_top_rects(detections, opts.filter_label(), opts.top_n);
                let mut outputs = Vec::new();
                for (ctx, rect) in self.contexts(input, rects.len()).iter().zip(&rects) {
                    let BlurredMask { mask, info, .. } =
                        create_blurred_mask(&image, *rect, opts.blur_size, ctx)?;
                    let crop = crop_rect(&image, info.origin_rect)?;

                    let crop_path = self.output_path(&info.rect_filename);
                    save_image(&DynamicImage::ImageRgba8(crop), &crop_path)?;
                    let mask_path = self.output_path(&info.mask_name);
                    save_image(&DynamicImage::ImageLuma8(mask), &mask_path)?;
                    outputs.push(crop_path);
                    outputs.push(mask_path);

                    if opts.save_info {
                        let json_path = opts.output_dir.join(format!("{}.json", info.filename));
                        info.save_to_file(&json_path)?;
                        outputs.push(json_path);
                    }
                    debug!("{}: saved {}", input.display(), info.filename);
                }
                Ok((rects.len(), outputs))
            }
            CropAction::ForceRect | CropAction::Adaptive => {
                let candidates: Vec<Detection> =
                    matching(detections, opts.filter_label()).cloned().collect();
                let cropped = if opts.action == CropAction::ForceRect {
                    force_rect_crop(
                        &image,
                        &candidates,
                        opts.crop_width,
                        opts.crop_height,
                        opts.resize,
                        opts.background.as_deref(),
                    )
                } else {
                    adaptive_crop(&image, &candidates, opts.crop_width, opts.crop_height)
                };
                let Some(cropped) = cropped else {
                    return Ok((0, Vec::new()));
                };
                let ctx = RegionContext::for_image(input, &opts.mode);
                let path = self.output_path(&ctx.base_filename);
                save_image(&cropped, &path)?;
                Ok((1, vec![path]))
            }
        }
    }
}

/// Pair each path with the earlier path that already owns its base name, if any.
///
/// Output names derive from the base name, so only the first image per base name
/// may write.
fn claim_base_names(entries: Vec<PathBuf>) -> Vec<(PathBuf, Option<PathBuf>)> {
    let mut owners: BTreeMap<String, PathBuf> = BTreeMap::new();
    entries
        .into_iter()
        .map(|path| {
            let base = base_filename(&path);
            if let Some(owner) = owners.get(&base) {
                let owner = owner.clone();
                (path, Some(owner))
            } else {
                owners.insert(base, path.clone());
                (path, None)
            }
        })
        .collect()
}

fn collision_result(path: &Path, owner: &Path) -> ProcessResult {
    let owner_name = owner
        .file_name()
        .map_or_else(|| owner.display().to_string(), |n| n.to_string_lossy().into_owned());
    warn!("{}: output name collides with {owner_name}", path.display());
    let mut result = ProcessResult::new(path);
    result.message = format!("output name collides with {owner_name}");
    result
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Save an image with format-specific settings.
///
/// JPEG output drops the alpha channel and is written at quality 100.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &DynamicImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let file = std::fs::File::create(path)?;
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 100);
            encoder.encode_image(&img.to_rgb8())?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp => {
            img.save(path)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}
