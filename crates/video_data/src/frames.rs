//! Frame reading for sampled clips.
//!
//! A [`FrameReader`] turns the offsets chosen by the segment sampler into one
//! decoded, channel-major pixel record per video. Errors returned by a reader
//! are treated as transient: the fetch loop skips the video and moves on.
//!
//! [`JpegFrameReader`] is the default reader for videos extracted to one image
//! per frame:
//!
//! ```text
//! <root>/<video>/img_00001.jpg      appearance frames (RGB)
//! <root>/<video>/flow_x_00001.jpg   horizontal flow (grayscale)
//! <root>/<video>/flow_y_00001.jpg   vertical flow (grayscale)
//! ```

use crate::config::{Modality, StreamLayout};
use anyhow::{anyhow, ensure, Context, Result};
use image::{imageops::FilterType, DynamicImage, ImageReader};
use std::path::{Path, PathBuf};

/// Decoded pixels of one clip, stored channel-major (`[C, H, W]`).
///
/// Channels are stacked frame after frame: 3 per RGB frame, 2 per flow frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedClip {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<u8>,
}

impl DecodedClip {
    pub fn new(channels: usize, height: usize, width: usize, data: Vec<u8>) -> Result<Self> {
        ensure!(
            data.len() == channels * height * width,
            "Clip buffer holds {} values, expected {}x{}x{}",
            data.len(),
            channels,
            height,
            width
        );
        Ok(Self {
            channels,
            height,
            width,
            data,
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    /// Value at channel `c`, row `y`, column `x`.
    #[inline]
    pub fn at(&self, c: usize, y: usize, x: usize) -> u8 {
        self.data[(c * self.height + y) * self.width + x]
    }
}

/// Everything a reader needs to decode one clip.
#[derive(Debug, Clone, Copy)]
pub struct ClipRequest<'a> {
    pub layout: &'a StreamLayout,
    /// Video identifier from the list file, relative to each root folder.
    pub video: &'a str,
    /// Start frame (0-based) of each segment's clip.
    pub offsets: &'a [usize],
    /// Resize target; 0 in either dimension keeps the stored size.
    pub new_height: u32,
    pub new_width: u32,
}

/// Decodes the frames selected for one video.
pub trait FrameReader: Send {
    fn read(&self, request: &ClipRequest<'_>) -> Result<DecodedClip>;
}

impl<F> FrameReader for F
where
    F: Fn(&ClipRequest<'_>) -> Result<DecodedClip> + Send,
{
    fn read(&self, request: &ClipRequest<'_>) -> Result<DecodedClip> {
        self(request)
    }
}

/// Accumulates channel planes of identical size into a [`DecodedClip`].
#[derive(Debug, Default)]
struct ClipBuilder {
    size: Option<(usize, usize)>,
    channels: usize,
    data: Vec<u8>,
}

impl ClipBuilder {
    fn push_plane(&mut self, width: usize, height: usize, plane: &[u8], source: &Path) -> Result<()> {
        match self.size {
            None => self.size = Some((width, height)),
            Some(size) => ensure!(
                size == (width, height),
                "Frame {} is {}x{}, earlier frames of the clip are {}x{}",
                source.display(),
                width,
                height,
                size.0,
                size.1
            ),
        }
        self.data.extend_from_slice(plane);
        self.channels += 1;
        Ok(())
    }

    fn finish(self) -> Result<DecodedClip> {
        let (width, height) = self.size.ok_or_else(|| anyhow!("Clip has no frames"))?;
        DecodedClip::new(self.channels, height, width, self.data)
    }
}

/// Reads clips from per-frame image files with the `image` crate.
#[derive(Debug, Clone)]
pub struct JpegFrameReader {
    rgb_prefix: String,
    flow_x_prefix: String,
    flow_y_prefix: String,
    extension: String,
    filter: FilterType,
}

impl Default for JpegFrameReader {
    fn default() -> Self {
        Self {
            rgb_prefix: "img_".to_string(),
            flow_x_prefix: "flow_x_".to_string(),
            flow_y_prefix: "flow_y_".to_string(),
            extension: "jpg".to_string(),
            filter: FilterType::Triangle,
        }
    }
}

impl JpegFrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the file name prefixes (`img_`, `flow_x_`, `flow_y_` by default).
    pub fn with_prefixes(
        mut self,
        rgb: impl Into<String>,
        flow_x: impl Into<String>,
        flow_y: impl Into<String>,
    ) -> Self {
        self.rgb_prefix = rgb.into();
        self.flow_x_prefix = flow_x.into();
        self.flow_y_prefix = flow_y.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Path of frame `index` (1-based, zero-padded to five digits).
    pub fn frame_path(&self, dir: &Path, prefix: &str, index: usize) -> PathBuf {
        dir.join(format!("{}{:05}.{}", prefix, index, self.extension))
    }

    fn load(&self, path: &Path, new_height: u32, new_width: u32) -> Result<DynamicImage> {
        let image = ImageReader::open(path)
            .with_context(|| format!("Failed to open frame: {}", path.display()))?
            .with_guessed_format()
            .with_context(|| format!("Failed to detect frame format: {}", path.display()))?
            .decode()
            .with_context(|| format!("Failed to decode frame: {}", path.display()))?;

        if new_height > 0 && new_width > 0 {
            Ok(image.resize_exact(new_width, new_height, self.filter))
        } else {
            Ok(image)
        }
    }

    fn read_rgb(
        &self,
        dir: &Path,
        request: &ClipRequest<'_>,
        clip_length: usize,
        clip: &mut ClipBuilder,
    ) -> Result<()> {
        for &offset in request.offsets {
            for index in offset + 1..=offset + clip_length {
                let path = self.frame_path(dir, &self.rgb_prefix, index);
                let rgb = self
                    .load(&path, request.new_height, request.new_width)?
                    .to_rgb8();
                let (width, height) = (rgb.width() as usize, rgb.height() as usize);
                let mut planes = vec![Vec::with_capacity(width * height); 3];
                for pixel in rgb.pixels() {
                    for (plane, &value) in planes.iter_mut().zip(pixel.0.iter()) {
                        plane.push(value);
                    }
                }
                for plane in &planes {
                    clip.push_plane(width, height, plane, &path)?;
                }
            }
        }
        Ok(())
    }

    fn read_flow(
        &self,
        dir: &Path,
        request: &ClipRequest<'_>,
        clip_length: usize,
        clip: &mut ClipBuilder,
    ) -> Result<()> {
        for &offset in request.offsets {
            for index in offset + 1..=offset + clip_length {
                for prefix in [&self.flow_x_prefix, &self.flow_y_prefix] {
                    let path = self.frame_path(dir, prefix, index);
                    let gray = self
                        .load(&path, request.new_height, request.new_width)?
                        .to_luma8();
                    let (width, height) = (gray.width() as usize, gray.height() as usize);
                    clip.push_plane(width, height, gray.as_raw(), &path)?;
                }
            }
        }
        Ok(())
    }
}

impl FrameReader for JpegFrameReader {
    fn read(&self, request: &ClipRequest<'_>) -> Result<DecodedClip> {
        let layout = request.layout;
        let mut clip = ClipBuilder::default();

        match layout.modality {
            Modality::Rgb => {
                let dir = layout.root_folders[0].join(request.video);
                self.read_rgb(&dir, request, layout.clip_lengths[0], &mut clip)?;
            }
            Modality::Flow => {
                let dir = layout.root_folders[0].join(request.video);
                self.read_flow(&dir, request, layout.clip_lengths[0], &mut clip)?;
            }
            Modality::Both => {
                let rgb_dir = layout.root_folders[0].join(request.video);
                self.read_rgb(&rgb_dir, request, layout.clip_lengths[0], &mut clip)?;
                let flow_dir = layout.root_folders[1].join(request.video);
                self.read_flow(&flow_dir, request, layout.clip_lengths[1], &mut clip)?;
            }
        }
        clip.finish()
            .with_context(|| format!("Failed to assemble clip for {}", request.video))
    }
}
