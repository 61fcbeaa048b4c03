//! Detections produced by an external object detector.
//!
//! The crate never runs a model. Detections arrive through the [`Detector`]
//! trait, most commonly from a [`DetectionCatalog`] JSON file written by a
//! separate detector run. Both tuple-shaped and record-shaped detections are
//! accepted:
//!
//! ```json
//! {
//!   "a.png": [
//!     [[50, 50, 150, 150], 0.8],
//!     [[10, 12, 40, 44], "penis", 0.65],
//!     {"bbox": [200, 20, 260, 90], "score": 0.4, "label": "head"}
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rect::Rect;

/// A scored bounding box, in one of the shapes detectors emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Detection {
    /// `[bbox, score]`.
    Pair([f64; 4], f64),
    /// `[bbox, label, score]`.
    Labeled([f64; 4], String, f64),
    /// `{"bbox": ..., "score": ..., "label": ...}`.
    Record {
        /// `[x1, y1, x2, y2]` in pixels.
        bbox: [f64; 4],
        /// Detector confidence.
        score: f64,
        /// Category label, if the detector reports one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

impl Detection {
    /// Unlabeled detection.
    #[must_use]
    pub fn new(bbox: Rect, score: f64) -> Self {
        Self::Pair(rect_coords(bbox), score)
    }

    /// Labeled detection.
    #[must_use]
    pub fn labeled(bbox: Rect, label: &str, score: f64) -> Self {
        Self::Record {
            bbox: rect_coords(bbox),
            score,
            label: Some(label.to_string()),
        }
    }

    /// Bounding box, coordinates truncated toward zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn bbox(&self) -> Rect {
        let b = match self {
            Self::Pair(b, _) | Self::Labeled(b, _, _) | Self::Record { bbox: b, .. } => b,
        };
        Rect::new(b[0] as i32, b[1] as i32, b[2] as i32, b[3] as i32)
    }

    /// Detector confidence.
    #[must_use]
    pub fn score(&self) -> f64 {
        match self {
            Self::Pair(_, s) | Self::Labeled(_, _, s) | Self::Record { score: s, .. } => *s,
        }
    }

    /// Category label, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Pair(..) => None,
            Self::Labeled(_, l, _) => Some(l),
            Self::Record { label, .. } => label.as_deref(),
        }
    }
}

fn rect_coords(r: Rect) -> [f64; 4] {
    [
        f64::from(r.x1),
        f64::from(r.y1),
        f64::from(r.x2),
        f64::from(r.y2),
    ]
}

/// Source of detections for an image.
pub trait Detector {
    /// Detections for the image at `image`, unordered.
    ///
    /// # Errors
    ///
    /// Implementations return an error when detection cannot be performed at all.
    /// An image without detections is an empty list, not an error.
    fn detect(&self, image: &Path) -> Result<Vec<Detection>>;
}

/// Precomputed detections keyed by image file name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionCatalog(BTreeMap<String, Vec<Detection>>);

impl DetectionCatalog {
    /// Load a catalog from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid catalog.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Parse a catalog from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Json`] on malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Record the detections for `name`.
    pub fn insert(&mut self, name: impl Into<String>, detections: Vec<Detection>) {
        self.0.insert(name.into(), detections);
    }

    /// Detections recorded under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[Detection]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// Number of images in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the catalog has no images.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Detector for DetectionCatalog {
    /// Looks the image up by file name, then by file stem.
    fn detect(&self, image: &Path) -> Result<Vec<Detection>> {
        let by_name = image
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| self.get(n));
        let found = by_name.or_else(|| {
            image
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(|n| self.get(n))
        });
        Ok(found.map(<[Detection]>::to_vec).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_shapes() {
        let json = r#"[
            [[50, 50, 150, 150], 0.8],
            [[10.7, 12, 40, 44.9], "penis", 0.65],
            {"bbox": [200, 20, 260, 90], "score": 0.4, "label": "head"},
            {"bbox": [1, 2, 3, 4], "score": 0.1}
        ]"#;
        let dets: Vec<Detection> = serde_json::from_str(json).unwrap();
        assert_eq!(dets.len(), 4);

        assert_eq!(dets[0].bbox(), Rect::new(50, 50, 150, 150));
        assert!((dets[0].score() - 0.8).abs() < 1e-12);
        assert_eq!(dets[0].label(), None);

        assert_eq!(dets[1].bbox(), Rect::new(10, 12, 40, 44));
        assert_eq!(dets[1].label(), Some("penis"));

        assert_eq!(dets[2].label(), Some("head"));
        assert_eq!(dets[3].label(), None);
        assert_eq!(dets[3].bbox(), Rect::new(1, 2, 3, 4));
    }

    #[test]
    fn constructors_expose_fields() {
        let d = Detection::labeled(Rect::new(0, 0, 5, 5), "head", 0.5);
        assert_eq!(d.label(), Some("head"));
        assert_eq!(d.bbox().width(), 5);
        assert!((Detection::new(Rect::new(1, 1, 2, 2), 0.25).score() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn catalog_lookup_by_name_then_stem() {
        let catalog = DetectionCatalog::from_json(
            r#"{"a.png": [[[0, 0, 10, 10], 0.9]], "b": [[[1, 1, 2, 2], 0.3]]}"#,
        )
        .unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.detect(Path::new("dir/a.png")).unwrap().len(), 1);
        assert_eq!(catalog.detect(Path::new("b.png")).unwrap().len(), 1);
        assert!(catalog.detect(Path::new("c.png")).unwrap().is_empty());
    }
}
