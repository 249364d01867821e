use crate::config::{Phase, TransformConfig};
use crate::frames::DecodedClip;
use anyhow::{ensure, Result};
use rand::{rngs::StdRng, Rng};

/// Writes a decoded clip into one slot of the staging data buffer.
///
/// `rois`, when present, holds `[x1, y1, x2, y2]` boxes in decoded-frame
/// coordinates; implementations move them into the coordinates of the
/// written output.
pub trait ClipTransform: Send {
    /// Output `[C, H, W]` for a clip shaped like `clip`.
    fn output_shape(&self, clip: &DecodedClip) -> [usize; 3];

    fn transform(
        &self,
        clip: &DecodedClip,
        output: &mut [f32],
        rois: Option<&mut Vec<[f32; 4]>>,
        rng: &mut StdRng,
    ) -> Result<()>;
}

// ============================================================================
// CropMirrorTransform
// ============================================================================

/// Square crop, horizontal mirror, mean subtraction and scaling.
///
/// - Crop: random position in training, centered in testing. A `crop_size`
///   of 0 keeps the full frame.
/// - Mirror: a fair coin per clip, training only.
/// - Values: `(pixel - mean[c]) * scale`, with `mean` empty (no subtraction),
///   one value for every channel, or one value per channel.
///
/// All frames of a clip share one crop window and one mirror decision.
#[derive(Debug, Clone)]
pub struct CropMirrorTransform {
    crop_size: usize,
    mirror: bool,
    scale: f32,
    mean_values: Vec<f32>,
    phase: Phase,
}

impl CropMirrorTransform {
    pub fn new(config: &TransformConfig, phase: Phase) -> Result<Self> {
        ensure!(
            config.scale.is_finite(),
            "Transform scale must be finite (got {})",
            config.scale
        );
        Ok(Self {
            crop_size: config.crop_size,
            mirror: config.mirror,
            scale: config.scale,
            mean_values: config.mean_values.clone(),
            phase,
        })
    }

    fn mean(&self, channel: usize) -> f32 {
        match self.mean_values.as_slice() {
            [] => 0.0,
            [value] => *value,
            values => values[channel],
        }
    }
}

impl ClipTransform for CropMirrorTransform {
    fn output_shape(&self, clip: &DecodedClip) -> [usize; 3] {
        if self.crop_size > 0 {
            [clip.channels, self.crop_size, self.crop_size]
        } else {
            clip.shape()
        }
    }

    fn transform(
        &self,
        clip: &DecodedClip,
        output: &mut [f32],
        rois: Option<&mut Vec<[f32; 4]>>,
        rng: &mut StdRng,
    ) -> Result<()> {
        let [channels, height, width] = self.output_shape(clip);
        ensure!(
            output.len() == channels * height * width,
            "Output slot holds {} values but the clip transforms to {}x{}x{}",
            output.len(),
            channels,
            height,
            width
        );
        ensure!(
            self.mean_values.len() <= 1 || self.mean_values.len() == channels,
            "Got {} mean values for {} channels",
            self.mean_values.len(),
            channels
        );
        ensure!(
            clip.height >= height && clip.width >= width,
            "Crop {}x{} is larger than the decoded {}x{} frame",
            height,
            width,
            clip.height,
            clip.width
        );

        let (h_off, w_off) = match self.phase {
            Phase::Train => (
                rng.random_range(0..=clip.height - height),
                rng.random_range(0..=clip.width - width),
            ),
            Phase::Test => ((clip.height - height) / 2, (clip.width - width) / 2),
        };
        let flip = self.mirror && self.phase == Phase::Train && rng.random_bool(0.5);

        for c in 0..channels {
            let mean = self.mean(c);
            for y in 0..height {
                let row = &mut output[(c * height + y) * width..][..width];
                for x in 0..width {
                    let value = f32::from(clip.at(c, y + h_off, x + w_off));
                    let dst = if flip { width - 1 - x } else { x };
                    row[dst] = (value - mean) * self.scale;
                }
            }
        }

        if let Some(boxes) = rois {
            let max_x = (width - 1) as f32;
            let max_y = (height - 1) as f32;
            for b in boxes.iter_mut() {
                let x1 = (b[0] - w_off as f32).clamp(0.0, max_x);
                let y1 = (b[1] - h_off as f32).clamp(0.0, max_y);
                let x2 = (b[2] - w_off as f32).clamp(0.0, max_x);
                let y2 = (b[3] - h_off as f32).clamp(0.0, max_y);
                *b = if flip {
                    [max_x - x2, y1, max_x - x1, y2]
                } else {
                    [x1, y1, x2, y2]
                };
            }
        }
        Ok(())
    }
}
