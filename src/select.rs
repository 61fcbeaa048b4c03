//! Picking regions out of a detection list.

use crate::detection::Detection;
use crate::rect::Rect;

/// Detections carrying `filter_label`, or all of them when no label is given.
///
/// An empty label counts as no filter.
pub fn matching<'a>(
    detections: &'a [Detection],
    filter_label: Option<&'a str>,
) -> impl Iterator<Item = &'a Detection> + 'a {
    let label = filter_label.filter(|l| !l.is_empty());
    detections
        .iter()
        .filter(move |d| label.is_none_or(|l| d.label() == Some(l)))
}

/// Highest-scoring detection, optionally restricted to one label.
///
/// On equal scores the later detection wins. Returns `None` when nothing remains
/// after filtering.
#[must_use]
pub fn best_detection<'a>(
    detections: &'a [Detection],
    filter_label: Option<&'a str>,
) -> Option<&'a Detection> {
    matching(detections, filter_label).fold(None, |best: Option<&Detection>, d| match best {
        Some(b) if d.score() < b.score() => Some(b),
        _ => Some(d),
    })
}

/// Bounding box of [`best_detection`].
#[must_use]
pub fn get_best_rect(detections: &[Detection], filter_label: Option<&str>) -> Option<Rect> {
    best_detection(detections, filter_label).map(Detection::bbox)
}

/// Bounding boxes of the `top_n` highest-scoring detections, best first.
#[must_use]
pub fn get_top_rects(detections: &[Detection], filter_label: Option<&str>, top_n: usize) -> Vec<Rect> {
    let mut ranked: Vec<&Detection> = matching(detections, filter_label).collect();
    ranked.sort_by(|a, b| b.score().total_cmp(&a.score()));
    ranked.into_iter().take(top_n).map(Detection::bbox).collect()
}
