//! src/config.rs
//!
//! Configuration for the video data layer.
//!
//! `VideoDataConfig` holds every option the layer recognizes. It can be built
//! in code with the builder or deserialized from JSON, and is validated once
//! at setup into a [`StreamLayout`] that the prefetch worker uses unchanged
//! for the rest of the run.
//!
//! Example:
//! ```ignore
//! let config = VideoDataConfig::builder()
//!     .source("train_list.txt")
//!     .modality(Modality::Both)
//!     .root_folders(["frames/", "flow/"])
//!     .new_lengths([1, 5])
//!     .interval(1)
//!     .num_segments(3)
//!     .batch_size(32)
//!     .shuffle(true)
//!     .build();
//! let layout = config.validate()?;
//! ```

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Visual stream(s) provided by each video sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    /// Appearance frames only.
    #[default]
    Rgb,
    /// Optical-flow frames only (x and y planes per frame).
    Flow,
    /// Appearance frames from the first root folder followed by flow frames
    /// from the second.
    Both,
}

impl Modality {
    /// Number of root folders (and at most the number of clip lengths) this
    /// modality reads from.
    pub fn num_streams(self) -> usize {
        match self {
            Modality::Rgb | Modality::Flow => 1,
            Modality::Both => 2,
        }
    }
}

/// Sampling phase. Training draws random segment offsets; testing uses the
/// center of each segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    #[default]
    Train,
    Test,
}

/// Per-item pixel transform options (crop, mirror, mean subtraction, scale).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Square crop side; 0 keeps the decoded frame size.
    pub crop_size: usize,
    /// Random horizontal flip during training.
    pub mirror: bool,
    /// Multiplier applied after mean subtraction.
    pub scale: f32,
    /// Either empty, a single value for all channels, or one value per channel.
    pub mean_values: Vec<f32>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            crop_size: 0,
            mirror: false,
            scale: 1.0,
            mean_values: Vec::new(),
        }
    }
}

/// Configuration for [`crate::VideoDataLayer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoDataConfig {
    /// Video list file (`<path> <length> <label>...` per record).
    pub source: Option<PathBuf>,
    pub modality: Modality,
    /// One root folder, or two for `Modality::Both` (RGB first, flow second).
    pub root_folders: Vec<PathBuf>,
    /// Frames per clip. `Modality::Both` accepts one value, which is used for
    /// both streams, or two values.
    pub new_lengths: Vec<usize>,
    /// Frames subtracted from each raw length to get the usable duration.
    /// Must be positive for flow input; ignored for RGB.
    pub interval: usize,
    pub num_segments: usize,
    /// Decode-time resize target; 0 keeps the stored frame size.
    pub new_height: u32,
    pub new_width: u32,
    pub batch_size: usize,
    pub shuffle: bool,
    /// Root seed for shuffling, segment sampling and random transforms.
    /// A random seed is drawn at setup when unset.
    pub seed: Option<u64>,
    pub num_labels: usize,
    /// Boxes emitted per item; 0 disables the ROI output.
    pub num_rois: usize,
    /// Folder holding one `<video stem>.mat` ROI file per video.
    pub roi_folder: Option<PathBuf>,
    pub phase: Phase,
    /// Optional cap on consecutive unreadable items while filling one batch:
    /// the fetch fails on the `skip_limit`-th one. 0 (the default) leaves only
    /// the full-pass check, which fails once every video of the list was
    /// skipped in a row.
    pub skip_limit: usize,
    pub transform: TransformConfig,
}

impl Default for VideoDataConfig {
    fn default() -> Self {
        Self {
            source: None,
            modality: Modality::Rgb,
            root_folders: Vec::new(),
            new_lengths: vec![1],
            interval: 0,
            num_segments: 1,
            new_height: 0,
            new_width: 0,
            batch_size: 1,
            shuffle: false,
            seed: None,
            num_labels: 1,
            num_rois: 0,
            roi_folder: None,
            phase: Phase::Train,
            skip_limit: 0,
            transform: TransformConfig::default(),
        }
    }
}

/// Stream settings resolved once at setup: one `(root folder, clip length)`
/// pair per stream of the configured modality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamLayout {
    pub modality: Modality,
    pub root_folders: Vec<PathBuf>,
    pub clip_lengths: Vec<usize>,
}

impl StreamLayout {
    /// Longest clip across streams; segment offsets must leave room for it.
    pub fn max_clip_length(&self) -> usize {
        self.clip_lengths.iter().copied().max().unwrap_or(0)
    }
}

impl VideoDataConfig {
    pub fn builder() -> VideoDataConfigBuilder {
        VideoDataConfigBuilder::default()
    }

    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Checks the structural constraints of the pipeline and resolves the
    /// per-stream layout.
    pub fn validate(&self) -> Result<StreamLayout> {
        let streams = self.modality.num_streams();

        ensure!(self.batch_size > 0, "batch_size must be positive");
        ensure!(self.num_segments > 0, "num_segments must be positive");
        ensure!(self.num_labels > 0, "num_labels must be positive");

        ensure!(
            self.root_folders.len() == streams,
            "{} root folder(s) should be specified for modality {:?}, got {}",
            streams,
            self.modality,
            self.root_folders.len()
        );

        let clip_lengths = match (self.modality, self.new_lengths.as_slice()) {
            (Modality::Both, [length]) => vec![*length; 2],
            (_, lengths) => {
                ensure!(
                    lengths.len() == streams,
                    "{} new_length value(s) should be specified for modality {:?}, got {}",
                    streams,
                    self.modality,
                    lengths.len()
                );
                lengths.to_vec()
            }
        };
        ensure!(
            clip_lengths.iter().all(|&length| length > 0),
            "new_length values must be positive (got {:?})",
            clip_lengths
        );

        if self.modality != Modality::Rgb {
            ensure!(
                self.interval > 0,
                "Flow data must have interval > 0 (modality {:?})",
                self.modality
            );
        }

        if self.num_rois > 0 {
            ensure!(
                self.num_segments == 1,
                "Number of segments per video should be one when ROIs are given (got {})",
                self.num_segments
            );
            ensure!(
                self.roi_folder.is_some(),
                "roi_folder is required when num_rois > 0"
            );
        }

        Ok(StreamLayout {
            modality: self.modality,
            root_folders: self.root_folders.clone(),
            clip_lengths,
        })
    }

    /// Number of output tensors the layer produces: data and labels, plus
    /// ROIs when enabled.
    pub fn output_count(&self) -> usize {
        if self.num_rois > 0 {
            3
        } else {
            2
        }
    }

    /// Checks that the enclosing graph wired as many outputs as the layer
    /// produces.
    pub fn check_outputs(&self, num_outputs: usize) -> Result<()> {
        ensure!(
            num_outputs == self.output_count(),
            "There should be {} outputs{}, got {}",
            self.output_count(),
            if self.num_rois > 0 {
                " when ROIs are given"
            } else {
                ""
            },
            num_outputs
        );
        Ok(())
    }

    /// Frames subtracted from each raw length: `interval` for flow input,
    /// 0 for RGB.
    pub fn effective_interval(&self) -> usize {
        match self.modality {
            Modality::Rgb => 0,
            Modality::Flow | Modality::Both => self.interval,
        }
    }

    /// Usable frames of a video with `raw_length` stored frames.
    pub fn usable_duration(&self, raw_length: usize) -> usize {
        raw_length.saturating_sub(self.effective_interval())
    }
}

/// Builder for VideoDataConfig with method chaining
#[derive(Default)]
pub struct VideoDataConfigBuilder {
    config: VideoDataConfig,
}

impl VideoDataConfigBuilder {
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.source = Some(path.into());
        self
    }

    pub fn modality(mut self, modality: Modality) -> Self {
        self.config.modality = modality;
        self
    }

    pub fn root_folders<P: Into<PathBuf>>(mut self, folders: impl IntoIterator<Item = P>) -> Self {
        self.config.root_folders = folders.into_iter().map(Into::into).collect();
        self
    }

    pub fn new_lengths(mut self, lengths: impl IntoIterator<Item = usize>) -> Self {
        self.config.new_lengths = lengths.into_iter().collect();
        self
    }

    pub fn interval(mut self, interval: usize) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn num_segments(mut self, segments: usize) -> Self {
        self.config.num_segments = segments;
        self
    }

    /// Set the decode-time resize target (0 keeps the stored size).
    pub fn new_size(mut self, height: u32, width: u32) -> Self {
        self.config.new_height = height;
        self.config.new_width = width;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set whether to reshuffle the video list at setup and at every epoch wrap
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.config.shuffle = shuffle;
        self
    }

    /// Set the root seed for reproducible shuffling and sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn num_labels(mut self, labels: usize) -> Self {
        self.config.num_labels = labels;
        self
    }

    /// Enable the ROI output with `num_rois` boxes per item read from `folder`.
    pub fn rois(mut self, num_rois: usize, folder: impl Into<PathBuf>) -> Self {
        self.config.num_rois = num_rois;
        self.config.roi_folder = Some(folder.into());
        self
    }

    pub fn phase(mut self, phase: Phase) -> Self {
        self.config.phase = phase;
        self
    }

    pub fn skip_limit(mut self, limit: usize) -> Self {
        self.config.skip_limit = limit;
        self
    }

    pub fn crop_size(mut self, crop_size: usize) -> Self {
        self.config.transform.crop_size = crop_size;
        self
    }

    pub fn mirror(mut self, mirror: bool) -> Self {
        self.config.transform.mirror = mirror;
        self
    }

    pub fn scale(mut self, scale: f32) -> Self {
        self.config.transform.scale = scale;
        self
    }

    pub fn mean_values(mut self, values: impl IntoIterator<Item = f32>) -> Self {
        self.config.transform.mean_values = values.into_iter().collect();
        self
    }

    pub fn build(self) -> VideoDataConfig {
        self.config
    }
}
