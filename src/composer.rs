//! Reassembling layer crops over their base images.
//!
//! The input folder holds `origin/` with the base images and one folder per layer
//! with the crop stage's outputs (`<filename>.png`, `<mask_name>.png` and the
//! `<filename>.json` metadata). Composition runs in two phases:
//!
//! 1. every layer's crops are restored to full-canvas RGBA images under
//!    `<output>/<layer>/<base>_processed.png`;
//! 2. for each base image the restored layers are alpha-composited over it in
//!    layer order and written to `<output>/merged/<base>_merged.png`.
//!
//! Phase 2 starts only once phase 1 has finished for every layer.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops, imageops::FilterType, GrayImage, Rgba, RgbaImage};
use log::{debug, info, warn};

use crate::blending::{alpha_composite, paste_with_alpha, put_alpha};
use crate::config::ComposeOptions;
use crate::engine::is_supported_image;
use crate::error::{Error, Result};
use crate::info::{base_filename, RectInfo};
use crate::rect::Rect;

/// Folder of base images inside the input folder.
pub const ORIGIN_DIR: &str = "origin";
/// Folder of merged images inside the output folder.
pub const MERGED_DIR: &str = "merged";

/// Base names restored per layer during phase 1.
pub type ProcessedLayers = BTreeMap<String, BTreeSet<String>>;

/// One layer region ready to be restored.
#[derive(Debug, Clone)]
pub struct LayerEntry {
    /// The region's metadata.
    pub info: RectInfo,
    /// The metadata file it was read from.
    pub config_path: PathBuf,
    /// The layer folder holding the crop and mask.
    pub layer_dir: PathBuf,
}

impl LayerEntry {
    /// Path of the cropped region image.
    #[must_use]
    pub fn image_path(&self) -> PathBuf {
        self.layer_dir.join(format!("{}.png", self.info.rect_filename))
    }

    /// Path of the region mask.
    #[must_use]
    pub fn mask_path(&self) -> PathBuf {
        self.layer_dir.join(format!("{}.png", self.info.mask_name))
    }
}

/// How many base images one layer covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerCoverage {
    /// Layer name.
    pub layer: String,
    /// Base images with metadata in this layer.
    pub covered: usize,
    /// Base images in `origin/`.
    pub total: usize,
}

impl LayerCoverage {
    /// Covered share in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.covered as f64 * 100.0 / self.total as f64
        }
    }
}

/// Counts from phase 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Base images with at least one layer merged.
    pub merged: usize,
    /// Base images without any restored layer.
    pub skipped: usize,
    /// Base images that failed to load or save.
    pub failed: usize,
    /// Base images considered.
    pub total: usize,
}

enum MergeOutcome {
    Merged(Vec<String>),
    Skipped,
    Failed(String),
}

/// Restores layer crops and merges them over the base images.
#[derive(Debug)]
pub struct LayerComposer {
    options: ComposeOptions,
    origins: BTreeMap<String, PathBuf>,
    layers: Vec<(String, PathBuf)>,
}

impl LayerComposer {
    /// Analyze the input folder.
    ///
    /// Requested layers without a folder are dropped with a warning; the rest keep
    /// their requested order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingOrigin`] without an `origin/` folder, [`Error::NoLayers`]
    /// when none of the requested layers exists, or [`Error::Io`] if a folder cannot
    /// be read.
    pub fn new(options: ComposeOptions) -> Result<Self> {
        let origin_dir = options.input_dir.join(ORIGIN_DIR);
        if !origin_dir.is_dir() {
            return Err(Error::MissingOrigin(origin_dir));
        }

        let mut origins = BTreeMap::new();
        for entry in fs::read_dir(&origin_dir)? {
            let path = entry?.path();
            if path.is_file() && is_supported_image(&path) {
                origins.insert(base_filename(&path), path);
            }
        }

        let mut layers = Vec::new();
        for layer in &options.layers {
            let dir = options.input_dir.join(layer);
            if dir.is_dir() {
                layers.push((layer.clone(), dir));
            } else {
                warn!("layer folder missing: {}", dir.display());
            }
        }
        if layers.is_empty() {
            return Err(Error::NoLayers(options.input_dir.clone()));
        }

        info!(
            "{} base image(s), layers: {}",
            origins.len(),
            layers.iter().map(|(l, _)| l.as_str()).collect::<Vec<_>>().join(", ")
        );

        Ok(Self {
            options,
            origins,
            layers,
        })
    }

    /// Base image names, sorted.
    pub fn base_images(&self) -> impl Iterator<Item = &str> {
        self.origins.keys().map(String::as_str)
    }

    /// Available layers in composition order.
    pub fn layers(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|(l, _)| l.as_str())
    }

    /// Metadata of one layer keyed by base name.
    ///
    /// Files that fail to parse are logged and skipped. Files are read in name order,
    /// so for a repeated base name the last file wins.
    #[must_use]
    pub fn layer_mapping(&self, layer: &str) -> BTreeMap<String, LayerEntry> {
        let Some((_, dir)) = self.layers.iter().find(|(l, _)| l == layer) else {
            return BTreeMap::new();
        };

        let mut configs: Vec<PathBuf> = match fs::read_dir(dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|e| e == "json"))
                .collect(),
            Err(e) => {
                warn!("cannot read layer folder {}: {e}", dir.display());
                return BTreeMap::new();
            }
        };
        configs.sort();

        let mut mapping = BTreeMap::new();
        for config_path in configs {
            match RectInfo::load_from_file(&config_path) {
                Ok(info) => {
                    mapping.insert(
                        info.base_filename.clone(),
                        LayerEntry {
                            info,
                            config_path,
                            layer_dir: dir.clone(),
                        },
                    );
                }
                Err(e) => warn!("skipping {}: {e}", config_path.display()),
            }
        }
        mapping
    }

    /// Per-layer coverage of the base images, without producing output.
    #[must_use]
    pub fn plan(&self) -> Vec<LayerCoverage> {
        self.layers()
            .map(|layer| {
                let mapping = self.layer_mapping(layer);
                LayerCoverage {
                    layer: layer.to_string(),
                    covered: self.origins.keys().filter(|b| mapping.contains_key(*b)).count(),
                    total: self.origins.len(),
                }
            })
            .collect()
    }

    /// Entries of `layer` that have a base image in `origin/`.
    ///
    /// Entries without one are logged and left out.
    #[must_use]
    pub fn restorable_entries(&self, layer: &str) -> Vec<LayerEntry> {
        self.layer_mapping(layer)
            .into_values()
            .filter(|entry| {
                let known = self.origins.contains_key(&entry.info.base_filename);
                if !known {
                    warn!(
                        "{}: no base image '{}' in {ORIGIN_DIR}/",
                        entry.config_path.display(),
                        entry.info.base_filename
                    );
                }
                known
            })
            .collect()
    }

    /// Phase 1: restore every layer's regions to full-canvas images.
    ///
    /// Regions whose base image, crop, or mask is missing are skipped with a warning.
    #[must_use]
    pub fn process_all_layers(&self) -> ProcessedLayers {
        let mut processed = ProcessedLayers::new();
        for layer in self.layers() {
            let out_dir = self.options.output_dir.join(layer);
            if let Err(e) = fs::create_dir_all(&out_dir) {
                warn!("cannot create {}: {e}", out_dir.display());
                processed.insert(layer.to_string(), BTreeSet::new());
                continue;
            }

            let entries = self.restorable_entries(layer);

            let restored = restore_entries(&entries, &out_dir);
            info!("[{layer}] restored {}/{}", restored.len(), entries.len());
            processed.insert(layer.to_string(), restored);
        }
        processed
    }

    /// Phase 2: composite the restored layers over each base image in layer order.
    #[must_use]
    pub fn merge_all(&self, processed: &ProcessedLayers) -> MergeSummary {
        let merged_dir = self.options.output_dir.join(MERGED_DIR);
        if let Err(e) = fs::create_dir_all(&merged_dir) {
            warn!("cannot create {}: {e}", merged_dir.display());
            return MergeSummary {
                failed: self.origins.len(),
                total: self.origins.len(),
                ..MergeSummary::default()
            };
        }

        let bases: Vec<(&String, &PathBuf)> = self.origins.iter().collect();
        let merge = |(base, origin): &(&String, &PathBuf)| {
            self.merge_one(base, origin, processed, &merged_dir)
        };

        #[cfg(feature = "cli")]
        let outcomes: Vec<MergeOutcome> = {
            use rayon::prelude::*;
            bases.par_iter().map(merge).collect()
        };

        #[cfg(not(feature = "cli"))]
        let outcomes: Vec<MergeOutcome> = bases.iter().map(merge).collect();

        let mut summary = MergeSummary {
            total: bases.len(),
            ..MergeSummary::default()
        };
        for ((base, _), outcome) in bases.iter().zip(outcomes) {
            match outcome {
                MergeOutcome::Merged(applied) => {
                    debug!("{base}: merged {}", applied.join(" + "));
                    summary.merged += 1;
                }
                MergeOutcome::Skipped => {
                    debug!("{base}: no layers");
                    summary.skipped += 1;
                }
                MergeOutcome::Failed(message) => {
                    warn!("{base}: {message}");
                    summary.failed += 1;
                }
            }
        }
        info!(
            "merged {}, skipped {}, failed {} (total {})",
            summary.merged, summary.skipped, summary.failed, summary.total
        );
        summary
    }

    fn merge_one(
        &self,
        base: &str,
        origin: &Path,
        processed: &ProcessedLayers,
        merged_dir: &Path,
    ) -> MergeOutcome {
        let mut restored = Vec::new();
        for layer in self.layers() {
            if !processed.get(layer).is_some_and(|set| set.contains(base)) {
                continue;
            }
            let path = self
                .options
                .output_dir
                .join(layer)
                .join(format!("{base}_processed.png"));
            match image::open(&path) {
                Ok(img) => restored.push((layer.to_string(), img.to_rgba8())),
                Err(e) => warn!("{}: {e}", path.display()),
            }
        }
        if restored.is_empty() {
            return MergeOutcome::Skipped;
        }

        let base_image = match image::open(origin) {
            Ok(img) => img.to_rgba8(),
            Err(e) => return MergeOutcome::Failed(e.to_string()),
        };
        let (names, images): (Vec<String>, Vec<RgbaImage>) = restored.into_iter().unzip();
        let merged = merge_layers(&base_image, &images);

        let path = merged_dir.join(format!("{base}_merged.png"));
        match merged.save(&path) {
            Ok(()) => MergeOutcome::Merged(names),
            Err(e) => MergeOutcome::Failed(e.to_string()),
        }
    }

    /// Both phases; the merge phase only when `merge` is set.
    #[must_use]
    pub fn run(&self) -> (ProcessedLayers, Option<MergeSummary>) {
        let processed = self.process_all_layers();
        let summary = self.options.merge.then(|| self.merge_all(&processed));
        (processed, summary)
    }
}

fn restore_entries(entries: &[LayerEntry], out_dir: &Path) -> BTreeSet<String> {
    let restore = |entry: &LayerEntry| match restore_entry(entry, out_dir) {
        Ok(path) => {
            debug!("restored {}", path.display());
            Some(entry.info.base_filename.clone())
        }
        Err(e) => {
            warn!("{}: {e}", entry.config_path.display());
            None
        }
    };

    #[cfg(feature = "cli")]
    {
        use rayon::prelude::*;
        entries.par_iter().filter_map(restore).collect()
    }

    #[cfg(not(feature = "cli"))]
    {
        entries.iter().filter_map(restore).collect()
    }
}

fn restore_entry(entry: &LayerEntry, out_dir: &Path) -> Result<PathBuf> {
    let image_path = entry.image_path();
    let mask_path = entry.mask_path();
    for path in [&image_path, &mask_path] {
        if !path.is_file() {
            return Err(Error::MissingArtifact(path.clone()));
        }
    }

    let crop = image::open(&image_path)?.to_rgba8();
    let mask = image::open(&mask_path)?.to_luma8();
    let restored = restore_layer(&crop, &mask, entry.info.origin_rect)?;

    let out = out_dir.join(format!("{}_processed.png", entry.info.base_filename));
    restored.save(&out)?;
    Ok(out)
}

/// Put `crop` back at `origin_rect` on a transparent canvas the size of `mask`,
/// then use `mask` as the alpha channel.
///
/// The crop is resized to the rect when their sizes differ.
///
/// # Errors
///
/// Returns [`Error::InvalidRect`] if `origin_rect` has inverted corners.
pub fn restore_layer(crop: &RgbaImage, mask: &GrayImage, origin_rect: Rect) -> Result<RgbaImage> {
    let rect = origin_rect.validate()?;
    let (w, h) = mask.dimensions();
    let mut canvas = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 0]));

    #[allow(clippy::cast_sign_loss)]
    let (rw, rh) = (rect.width() as u32, rect.height() as u32);
    if rw > 0 && rh > 0 {
        if crop.dimensions() == (rw, rh) {
            paste_with_alpha(&mut canvas, crop, i64::from(rect.x1), i64::from(rect.y1));
        } else {
            let resized = imageops::resize(crop, rw, rh, FilterType::Lanczos3);
            paste_with_alpha(&mut canvas, &resized, i64::from(rect.x1), i64::from(rect.y1));
        }
    }

    put_alpha(&mut canvas, mask);
    Ok(canvas)
}

/// Alpha-composite `layers` over `base`, bottom first.
///
/// Layers of a different size are resized to the base first.
#[must_use]
pub fn merge_layers(base: &RgbaImage, layers: &[RgbaImage]) -> RgbaImage {
    let mut merged = base.clone();
    let (w, h) = base.dimensions();
    for layer in layers {
        if layer.dimensions() == (w, h) {
            alpha_composite(&mut merged, layer);
        } else {
            let resized = imageops::resize(layer, w, h, FilterType::Lanczos3);
            alpha_composite(&mut merged, &resized);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn restore_places_crop_and_applies_mask() {
        let crop = RgbaImage::from_pixel(4, 4, Rgba([200, 10, 10, 255]));
        let mut mask = GrayImage::new(10, 10);
        mask.put_pixel(3, 3, Luma([255]));
        mask.put_pixel(4, 4, Luma([100]));

        let out = restore_layer(&crop, &mask, Rect::new(2, 2, 6, 6)).unwrap();
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(out.get_pixel(3, 3), &Rgba([200, 10, 10, 255]));
        assert_eq!(out.get_pixel(4, 4), &Rgba([200, 10, 10, 100]));
        assert_eq!(out.get_pixel(2, 2)[3], 0);
        assert_eq!(out.get_pixel(8, 8), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn restore_resizes_mismatched_crop() {
        let crop = RgbaImage::from_pixel(2, 2, Rgba([50, 60, 70, 255]));
        let mask = GrayImage::from_pixel(8, 8, Luma([255]));
        let out = restore_layer(&crop, &mask, Rect::new(0, 0, 8, 8)).unwrap();
        let p = out.get_pixel(4, 4);
        assert!(p[0].abs_diff(50) <= 1 && p[1].abs_diff(60) <= 1 && p[2].abs_diff(70) <= 1);
    }

    #[test]
    fn restore_rejects_inverted_rect() {
        let crop = RgbaImage::new(1, 1);
        let mask = GrayImage::new(4, 4);
        assert!(restore_layer(&crop, &mask, Rect::new(3, 3, 1, 1)).is_err());
    }

    #[test]
    fn merge_order_determines_top_layer() {
        let base = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let red = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        let blue = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 255, 255]));
        assert_eq!(
            merge_layers(&base, &[red.clone(), blue.clone()]).get_pixel(0, 0),
            &Rgba([0, 0, 255, 255])
        );
        assert_eq!(
            merge_layers(&base, &[blue, red]).get_pixel(0, 0),
            &Rgba([255, 0, 0, 255])
        );
    }

    #[test]
    fn merge_transparent_layer_keeps_base() {
        let base = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 255]));
        let clear = RgbaImage::new(6, 6);
        assert_eq!(merge_layers(&base, &[clear]), base);
    }

    #[test]
    fn coverage_percent() {
        let c = LayerCoverage {
            layer: "head".into(),
            covered: 1,
            total: 4,
        };
        assert!((c.percent() - 25.0).abs() < f64::EPSILON);
        let empty = LayerCoverage { total: 0, ..c };
        assert!(empty.percent().abs() < f64::EPSILON);
    }

    #[test]
    fn missing_origin_folder() {
        let dir = tempfile::tempdir().unwrap();
        let err = LayerComposer::new(ComposeOptions {
            input_dir: dir.path().to_path_buf(),
            layers: vec!["head".into()],
            ..ComposeOptions::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::MissingOrigin(_)));
    }

    #[test]
    fn no_available_layers() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(ORIGIN_DIR)).unwrap();
        let err = LayerComposer::new(ComposeOptions {
            input_dir: dir.path().to_path_buf(),
            layers: vec!["head".into(), "penis".into()],
            ..ComposeOptions::default()
        })
        .unwrap_err();
        assert!(matches!(err, Error::NoLayers(_)));
    }

    #[test]
    fn entries_without_base_image_are_left_out() {
        let dir = tempfile::tempdir().unwrap();
        let origin = dir.path().join(ORIGIN_DIR);
        fs::create_dir(&origin).unwrap();
        RgbaImage::new(8, 8).save(origin.join("a.png")).unwrap();
        let head = dir.path().join("head");
        fs::create_dir(&head).unwrap();
        for base in ["a", "a_1", "b"] {
            RectInfo::new(Rect::new(0, 0, 4, 4), Rect::new(1, 1, 3, 3), base, "head", None)
                .save_to_file(&head.join(format!("{base}_head.json")))
                .unwrap();
        }

        let composer = LayerComposer::new(ComposeOptions {
            input_dir: dir.path().to_path_buf(),
            layers: vec!["head".into()],
            output_dir: dir.path().join("out"),
            ..ComposeOptions::default()
        })
        .unwrap();
        assert_eq!(composer.layer_mapping("head").len(), 3);
        let kept: Vec<String> = composer
            .restorable_entries("head")
            .into_iter()
            .map(|e| e.info.base_filename)
            .collect();
        assert_eq!(kept, vec!["a"]);
    }

    #[test]
    fn layer_mapping_skips_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(ORIGIN_DIR)).unwrap();
        let head = dir.path().join("head");
        fs::create_dir(&head).unwrap();
        fs::write(head.join("broken.json"), "{not json").unwrap();
        RectInfo::new(Rect::new(0, 0, 4, 4), Rect::new(1, 1, 3, 3), "a", "head", None)
            .save_to_file(&head.join("a_head.json"))
            .unwrap();

        let composer = LayerComposer::new(ComposeOptions {
            input_dir: dir.path().to_path_buf(),
            layers: vec!["head".into(), "missing".into()],
            ..ComposeOptions::default()
        })
        .unwrap();
        assert_eq!(composer.layers().collect::<Vec<_>>(), vec!["head"]);
        assert_eq!(composer.base_images().count(), 0);
        let mapping = composer.layer_mapping("head");
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping["a"].image_path(), head.join("a_head.png"));
        assert_eq!(mapping["a"].mask_path(), head.join("a_head_mask.png"));
    }
}
