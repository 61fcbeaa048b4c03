//! Region metadata persisted next to each crop.
//!
//! A [`RectInfo`] ties a cropped region's files to its place on the base
//! image. The crop stage writes it as pretty-printed JSON and the layer
//! composer reads it back.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rect::Rect;

/// Geometry and file names for one cropped region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectInfo {
    /// Source image name without extension, plus `_<index>` for multi-region crops.
    pub base_filename: String,
    /// `base_filename_mode` or `base_filename_mode_filter`.
    pub filename: String,
    /// Name of the cropped region image (without extension).
    pub rect_filename: String,
    /// Name of the mask image (without extension).
    pub mask_name: String,
    /// Layer mode the region was produced for, e.g. `head`.
    pub mode: String,
    /// Detection label filter, empty when none was applied.
    #[serde(default)]
    pub filter: String,
    /// The widened region that was cropped and is pasted back by the composer.
    pub origin_rect: Rect,
    /// The inner region where the mask is fully opaque.
    pub mask_rect: Rect,
}

impl RectInfo {
    /// Build the metadata record, deriving the file names.
    #[must_use]
    pub fn new(
        origin_rect: Rect,
        mask_rect: Rect,
        base_filename: &str,
        mode: &str,
        filter: Option<&str>,
    ) -> Self {
        let filter = filter.unwrap_or_default();
        let filename = if filter.is_empty() {
            format!("{base_filename}_{mode}")
        } else {
            format!("{base_filename}_{mode}_{filter}")
        };
        Self {
            base_filename: base_filename.to_string(),
            rect_filename: filename.clone(),
            mask_name: format!("{filename}_mask"),
            filename,
            mode: mode.to_string(),
            filter: filter.to_string(),
            origin_rect,
            mask_rect,
        }
    }

    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a record from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] on malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the record to `path`.
    ///
    /// The JSON goes to a temporary sibling first and is renamed into place, so
    /// readers never observe a truncated file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read a record from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }
}

/// The part of `path`'s file name before the first dot.
#[must_use]
pub fn base_filename(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_string_lossy().split('.').next().map(str::to_string))
        .unwrap_or_default()
}

/// Naming inputs for the regions cut from one image.
///
/// Carried explicitly from region selection to metadata creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionContext {
    /// Source image name without extension.
    pub base_filename: String,
    /// Layer mode, e.g. `head` or `censor`.
    pub mode: String,
    /// Label the detections were filtered by.
    pub filter: Option<String>,
    /// 1-based position among several regions of the same image.
    pub index: Option<usize>,
}

impl RegionContext {
    /// Context for `image_path`, named after the part of its file name before the first dot.
    #[must_use]
    pub fn for_image(image_path: &Path, mode: &str) -> Self {
        Self {
            base_filename: base_filename(image_path),
            mode: mode.to_string(),
            filter: None,
            index: None,
        }
    }

    /// Same context with a label filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Option<&str>) -> Self {
        self.filter = filter.filter(|f| !f.is_empty()).map(str::to_string);
        self
    }

    /// Same context for the `index`-th region.
    #[must_use]
    pub fn with_index(mut self, index: Option<usize>) -> Self {
        self.index = index;
        self
    }

    /// Base file name including the region index suffix, if any.
    #[must_use]
    pub fn indexed_base(&self) -> String {
        match self.index {
            Some(i) => format!("{}_{i}", self.base_filename),
            None => self.base_filename.clone(),
        }
    }

    /// Metadata record for a region cut under this context.
    #[must_use]
    pub fn rect_info(&self, origin_rect: Rect, mask_rect: Rect) -> RectInfo {
        RectInfo::new(
            origin_rect,
            mask_rect,
            &self.indexed_base(),
            &self.mode,
            self.filter.as_deref(),
        )
    }
}
