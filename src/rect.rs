//! Axis-aligned integer rectangles.
//!
//! Rectangles are half-open: a pixel `(x, y)` is inside when
//! `x1 <= x < x2` and `y1 <= y < y2`. They are plain values and are rebuilt
//! rather than mutated.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An integer rectangle given by its top-left `(x1, y1)` and bottom-right `(x2, y2)` corners.
///
/// Serializes with the derived `position`, `width` and `height` fields alongside the
/// corners. The derived fields are ignored when deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "RectRecord", from = "RectRecord")]
pub struct Rect {
    /// Left edge.
    pub x1: i32,
    /// Top edge.
    pub y1: i32,
    /// Right edge (exclusive).
    pub x2: i32,
    /// Bottom edge (exclusive).
    pub y2: i32,
}

/// On-disk shape of a [`Rect`].
#[derive(Serialize, Deserialize)]
struct RectRecord {
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    #[serde(default)]
    position: (i32, i32),
    #[serde(default)]
    width: i32,
    #[serde(default)]
    height: i32,
}

impl From<Rect> for RectRecord {
    fn from(r: Rect) -> Self {
        Self {
            x1: r.x1,
            y1: r.y1,
            x2: r.x2,
            y2: r.y2,
            position: r.position(),
            width: r.width(),
            height: r.height(),
        }
    }
}

impl From<RectRecord> for Rect {
    fn from(r: RectRecord) -> Self {
        Self::new(r.x1, r.y1, r.x2, r.y2)
    }
}

impl Rect {
    /// Create a rectangle from its corner coordinates.
    #[must_use]
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Corner coordinates as `(x1, y1, x2, y2)`.
    #[must_use]
    pub const fn to_tuple(self) -> (i32, i32, i32, i32) {
        (self.x1, self.y1, self.x2, self.y2)
    }

    /// Top-left corner.
    #[must_use]
    pub const fn position(self) -> (i32, i32) {
        (self.x1, self.y1)
    }

    /// Horizontal extent, `x2 - x1`.
    #[must_use]
    pub const fn width(self) -> i32 {
        self.x2 - self.x1
    }

    /// Vertical extent, `y2 - y1`.
    #[must_use]
    pub const fn height(self) -> i32 {
        self.y2 - self.y1
    }

    /// Check that the corners are ordered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRect`] when `x1 > x2` or `y1 > y2`.
    pub fn validate(self) -> Result<Self> {
        if self.x1 > self.x2 || self.y1 > self.y2 {
            return Err(Error::InvalidRect {
                x1: self.x1,
                y1: self.y1,
                x2: self.x2,
                y2: self.y2,
            });
        }
        Ok(self)
    }

    /// Move every edge inward by `amount`, keeping the result inside `[0, width] x [0, height]`.
    ///
    /// A rectangle narrower than `2 * amount` comes back inverted.
    #[must_use]
    pub fn shrink_within(self, amount: i32, width: u32, height: u32) -> Self {
        let (w, h) = canvas_limits(width, height);
        Self::new(
            (self.x1 + amount).max(0),
            (self.y1 + amount).max(0),
            (self.x2 - amount).min(w),
            (self.y2 - amount).min(h),
        )
    }

    /// Move every edge outward by `amount`, keeping the result inside `[0, width] x [0, height]`.
    #[must_use]
    pub fn grow_within(self, amount: i32, width: u32, height: u32) -> Self {
        let (w, h) = canvas_limits(width, height);
        Self::new(
            (self.x1 - amount).max(0),
            (self.y1 - amount).max(0),
            (self.x2 + amount).min(w),
            (self.y2 + amount).min(h),
        )
    }

    /// Whether pixel `(x, y)` lies inside the rectangle.
    #[must_use]
    pub const fn contains(self, x: i32, y: i32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }

    /// The part of the rectangle that lies on a `width x height` canvas, as
    /// unsigned `(x, y, w, h)`. `None` when nothing overlaps.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn clip_to(self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let (w, h) = canvas_limits(width, height);
        let x1 = self.x1.clamp(0, w);
        let y1 = self.y1.clamp(0, h);
        let x2 = self.x2.clamp(0, w);
        let y2 = self.y2.clamp(0, h);
        if x1 >= x2 || y1 >= y2 {
            return None;
        }
        Some((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
    }
}

fn canvas_limits(width: u32, height: u32) -> (i32, i32) {
    (
        i32::try_from(width).unwrap_or(i32::MAX),
        i32::try_from(height).unwrap_or(i32::MAX),
    )
}
