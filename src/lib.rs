//! Soft-edged region crops and ordered layer re-compositing.
//!
//! The crop stage takes detection boxes for an image, cuts each selected region
//! out with a margin, builds a mask that fades out toward the region's edges, and
//! records the geometry as JSON. The composer stage reads those outputs back for
//! several layers (e.g. `head`, `censor`) and alpha-composites them over the base
//! images in a fixed layer order.
//!
//! # Quick Start
//!
//! ```no_run
//! use layer_crop::{CropEngine, CropOptions, DetectionCatalog};
//! use std::path::Path;
//!
//! let detections = DetectionCatalog::from_file(Path::new("detections.json")).unwrap();
//! let engine = CropEngine::new(CropOptions::default()).expect("failed to init engine");
//! let result = engine.process_file(Path::new("photo.png"), &detections);
//! println!("{}: {}", result.path.display(), result.message);
//! ```
//!
//! # Layer composition
//!
//! ```no_run
//! use layer_crop::{ComposeOptions, LayerComposer};
//!
//! let composer = LayerComposer::new(ComposeOptions {
//!     input_dir: "layers".into(),
//!     layers: vec!["pussy".into(), "penis".into(), "head".into()],
//!     ..ComposeOptions::default()
//! })
//! .expect("invalid input folder");
//! let (_, summary) = composer.run();
//! println!("{summary:?}");
//! ```

#![deny(missing_docs)]

pub mod blending;
pub mod composer;
pub mod config;
pub mod crop;
pub mod detection;
mod engine;
pub mod error;
pub mod fadeout;
pub mod info;
pub mod mask;
pub mod rect;
pub mod select;

pub use composer::{LayerComposer, LayerCoverage, MergeSummary};
pub use config::{ComposeOptions, CropAction, CropOptions};
pub use detection::{Detection, DetectionCatalog, Detector};
pub use engine::{is_supported_image, save_image, CropEngine, ProcessResult};
pub use error::{Error, Result};
pub use info::{RectInfo, RegionContext};
pub use rect::Rect;
