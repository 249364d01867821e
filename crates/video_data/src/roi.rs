//! Region-of-interest output.
//!
//! Each item gets exactly `num_rois` rows of `(slot, x1, y1, x2, y2)`: up to
//! `num_rois - 1` decoded boxes whose sides are both at least
//! [`MIN_ROI_SIDE`], followed by full-frame boxes until the count is reached.
//! Sides are measured between corners truncated to whole pixels; emitted boxes
//! keep their fractional corners.

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Smallest accepted box width and height.
pub const MIN_ROI_SIDE: f32 = 50.0;

/// Values per ROI row: slot index then the four corners.
pub const ROI_COLUMNS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiBox {
    pub batch_slot: usize,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl RoiBox {
    pub fn new(batch_slot: usize, [x1, y1, x2, y2]: [f32; 4]) -> Self {
        Self {
            batch_slot,
            x1,
            y1,
            x2,
            y2,
        }
    }

    /// Box covering a whole `width x height` frame.
    pub fn full_frame(batch_slot: usize, width: usize, height: usize) -> Self {
        Self::new(
            batch_slot,
            [0.0, 0.0, width as f32 - 1.0, height as f32 - 1.0],
        )
    }

    pub fn row(&self) -> [f32; ROI_COLUMNS] {
        [self.batch_slot as f32, self.x1, self.y1, self.x2, self.y2]
    }
}

/// Whether both sides of `[x1, y1, x2, y2]` reach [`MIN_ROI_SIDE`], with
/// corners truncated toward zero first.
pub fn is_large_enough(b: &[f32; 4]) -> bool {
    let [x1, y1, x2, y2] = b.map(f32::trunc);
    (x2 - x1).min(y2 - y1) >= MIN_ROI_SIDE
}

/// Picks the boxes emitted for one batch slot.
///
/// `width` and `height` are those of the transformed frame and size the
/// padding boxes. Returns exactly `num_rois` boxes.
pub fn select_rois(
    boxes: &[[f32; 4]],
    batch_slot: usize,
    num_rois: usize,
    width: usize,
    height: usize,
) -> Vec<RoiBox> {
    let mut selected: Vec<RoiBox> = boxes
        .iter()
        .filter(|b| is_large_enough(b))
        .take(num_rois.saturating_sub(1))
        .map(|b| RoiBox::new(batch_slot, *b))
        .collect();
    selected.resize(num_rois, RoiBox::full_frame(batch_slot, width, height));
    selected
}

/// ROI file of a video: `<folder>/<file stem of video>.mat`.
pub fn roi_file(folder: &Path, video: &str) -> PathBuf {
    let stem = Path::new(video)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    folder.join(format!("{}.mat", stem))
}

/// Reads the boxes of one frame from an ROI file. Errors are treated as
/// transient: the video is skipped.
pub trait RoiReader: Send {
    fn read(&self, path: &Path, frame_offset: usize) -> Result<Vec<[f32; 4]>>;
}

impl<F> RoiReader for F
where
    F: Fn(&Path, usize) -> Result<Vec<[f32; 4]>> + Send,
{
    fn read(&self, path: &Path, frame_offset: usize) -> Result<Vec<[f32; 4]>> {
        self(path, frame_offset)
    }
}
