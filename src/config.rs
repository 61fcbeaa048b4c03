//! Settings for the crop stage and the layer composer.
//!
//! [`CropOptions`] can be stored as JSON and loaded with [`CropOptions::from_file`];
//! missing fields take their defaults.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What the crop stage writes for each image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CropAction {
    /// Soft-edged region crop, mask, and metadata for each selected region.
    #[default]
    Mask,
    /// Square crop around the best detection, slid back inside the image.
    ForceRect,
    /// Aspect-preserving crop around the best detection, resized to the target size.
    Adaptive,
}

impl fmt::Display for CropAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CropAction::Mask => "mask",
            CropAction::ForceRect => "force-rect",
            CropAction::Adaptive => "adaptive",
        })
    }
}

impl FromStr for CropAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mask" => Ok(CropAction::Mask),
            "force-rect" | "force_rect" => Ok(CropAction::ForceRect),
            "adaptive" => Ok(CropAction::Adaptive),
            other => Err(format!(
                "invalid crop action '{other}'; expected 'mask', 'force-rect' or 'adaptive'"
            )),
        }
    }
}

/// Crop stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropOptions {
    /// Directory receiving crops, masks, and metadata.
    pub output_dir: PathBuf,
    /// Layer name embedded in output file names, e.g. `head`.
    pub mode: String,
    /// Only consider detections with this label.
    pub filter: Option<String>,
    /// What to produce per image.
    pub action: CropAction,
    /// Width of the fade band around each mask region, in pixels.
    pub blur_size: u32,
    /// Regions taken per image in mask mode; above 1 the names gain an `_<index>` suffix.
    pub top_n: usize,
    /// Write the JSON metadata next to each mask crop.
    pub save_info: bool,
    /// Target width for force-rect and adaptive crops.
    pub crop_width: u32,
    /// Target height for force-rect and adaptive crops.
    pub crop_height: u32,
    /// Resize force-rect crops to the target size.
    pub resize: bool,
    /// Background composited under transparent force-rect crops.
    pub background: Option<PathBuf>,
    /// Create the output directory when missing.
    pub make_dirs: bool,
    /// Report what would be written without touching the filesystem.
    pub dry_run: bool,
}

impl Default for CropOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            mode: "head".to_string(),
            filter: None,
            action: CropAction::Mask,
            blur_size: 10,
            top_n: 1,
            save_info: true,
            crop_width: 260,
            crop_height: 340,
            resize: false,
            background: None,
            make_dirs: true,
            dry_run: false,
        }
    }
}

impl CropOptions {
    /// Load settings from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// The label filter, treating an empty string as none.
    #[must_use]
    pub fn filter_label(&self) -> Option<&str> {
        self.filter.as_deref().filter(|f| !f.is_empty())
    }
}

/// Layer composer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeOptions {
    /// Folder holding `origin/` and one folder per layer.
    pub input_dir: PathBuf,
    /// Layer names, bottom first.
    pub layers: Vec<String>,
    /// Folder receiving `<layer>/<base>_processed.png` and `merged/<base>_merged.png`.
    pub output_dir: PathBuf,
    /// Run the merge phase after processing the layers.
    pub merge: bool,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            layers: Vec::new(),
            output_dir: PathBuf::from("output"),
            merge: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = CropOptions::default();
        assert_eq!(opts.blur_size, 10);
        assert_eq!(opts.top_n, 1);
        assert_eq!((opts.crop_width, opts.crop_height), (260, 340));
        assert_eq!(opts.action, CropAction::Mask);
        assert!(opts.save_info);
        assert!(ComposeOptions::default().merge);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let opts: CropOptions =
            serde_json::from_str(r#"{"mode": "censor", "filter": "penis", "action": "force-rect"}"#)
                .unwrap();
        assert_eq!(opts.mode, "censor");
        assert_eq!(opts.filter_label(), Some("penis"));
        assert_eq!(opts.action, CropAction::ForceRect);
        assert_eq!(opts.blur_size, 10);
    }

    #[test]
    fn empty_filter_is_none() {
        let opts = CropOptions {
            filter: Some(String::new()),
            ..CropOptions::default()
        };
        assert_eq!(opts.filter_label(), None);
    }

    #[test]
    fn crop_action_parse_and_display() {
        for action in [CropAction::Mask, CropAction::ForceRect, CropAction::Adaptive] {
            assert_eq!(action.to_string().parse::<CropAction>().unwrap(), action);
        }
        assert_eq!("FORCE_RECT".parse::<CropAction>().unwrap(), CropAction::ForceRect);
        assert!("blur".parse::<CropAction>().is_err());
    }

    #[test]
    fn from_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crop.json");
        fs::write(&path, r#"{"blur_size": 32, "top_n": 3}"#).unwrap();
        let opts = CropOptions::from_file(&path).unwrap();
        assert_eq!(opts.blur_size, 32);
        assert_eq!(opts.top_n, 3);
    }
}
