//! The batch fetch loop run by the prefetch worker.
//!
//! `BatchFetcher` owns everything the worker touches while a fetch is running:
//! the video list, the epoch cursor, the shuffle and frame RNGs and the
//! collaborators. It is moved into the worker thread for each run and moved
//! back when the run is joined, so none of this state is ever shared with
//! the consumer.

use crate::config::{Phase, StreamLayout, VideoDataConfig};
use crate::frames::{ClipRequest, DecodedClip, FrameReader};
use crate::roi::{roi_file, select_rois, RoiReader};
use crate::segment::SegmentSampler;
use crate::shuffle::ShuffleCoordinator;
use crate::staging::StagingBatch;
use crate::transform::ClipTransform;
use crate::video_list::VideoList;
use anyhow::{anyhow, bail, ensure, Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::PathBuf;
use tracing::{debug, warn};

/// External decoders and transforms used by the fetch loop.
pub struct Collaborators {
    pub frames: Box<dyn FrameReader>,
    pub transform: Box<dyn ClipTransform>,
    /// Required when the configuration enables ROIs.
    pub rois: Option<Box<dyn RoiReader>>,
}

impl Collaborators {
    pub fn new(frames: impl FrameReader + 'static, transform: impl ClipTransform + 'static) -> Self {
        Self {
            frames: Box::new(frames),
            transform: Box::new(transform),
            rois: None,
        }
    }

    pub fn with_rois(mut self, rois: impl RoiReader + 'static) -> Self {
        self.rois = Some(Box::new(rois));
        self
    }
}

/// Position of the next video to read, and the number of completed passes
/// over the list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpochCursor {
    position: usize,
    epoch: usize,
}

impl EpochCursor {
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Moves to the next video. Returns `true` when the list end was reached
    /// and the cursor wrapped to 0.
    fn advance(&mut self, len: usize) -> bool {
        self.position += 1;
        if self.position >= len {
            self.position = 0;
            self.epoch += 1;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone)]
struct RoiSettings {
    folder: PathBuf,
    num_rois: usize,
}

enum SlotOutcome {
    Filled,
    Skipped,
}

/// Fills staging batches one item at a time.
pub struct BatchFetcher {
    list: VideoList,
    cursor: EpochCursor,
    shuffler: Option<ShuffleCoordinator>,
    sampler: SegmentSampler,
    frame_rng: StdRng,
    layout: StreamLayout,
    new_height: u32,
    new_width: u32,
    roi: Option<RoiSettings>,
    collaborators: Collaborators,
    skip_limit: usize,
    skipped_total: usize,
}

impl BatchFetcher {
    /// Builds the fetcher and, when shuffling is enabled, shuffles the list
    /// once before the first epoch.
    ///
    /// One root seed (`config.seed`, or a random one) derives both the
    /// shuffle seed and the frame-sampling seed.
    pub fn new(
        config: &VideoDataConfig,
        layout: StreamLayout,
        mut list: VideoList,
        collaborators: Collaborators,
    ) -> Result<Self> {
        ensure!(!list.is_empty(), "The video list is empty");
        list.check_paired()?;

        let roi = if config.num_rois > 0 {
            let folder = config
                .roi_folder
                .clone()
                .ok_or_else(|| anyhow!("roi_folder is required when num_rois > 0"))?;
            ensure!(
                collaborators.rois.is_some(),
                "An ROI reader is required when num_rois > 0"
            );
            Some(RoiSettings {
                folder,
                num_rois: config.num_rois,
            })
        } else {
            None
        };

        let root_seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let mut root_rng = StdRng::seed_from_u64(root_seed);
        let shuffle_seed: u64 = root_rng.random();
        let frame_seed: u64 = root_rng.random();

        let shuffler = if config.shuffle {
            let mut coordinator = ShuffleCoordinator::new(shuffle_seed);
            list.shuffle_with(&mut coordinator)?;
            Some(coordinator)
        } else {
            None
        };

        let sampler = SegmentSampler::new(config.num_segments, layout.max_clip_length(), config.phase)?;

        Ok(Self {
            list,
            cursor: EpochCursor::default(),
            shuffler,
            sampler,
            frame_rng: StdRng::seed_from_u64(frame_seed),
            layout,
            new_height: config.new_height,
            new_width: config.new_width,
            roi,
            collaborators,
            skip_limit: config.skip_limit,
            skipped_total: 0,
        })
    }

    pub fn list(&self) -> &VideoList {
        &self.list
    }

    pub fn cursor(&self) -> EpochCursor {
        self.cursor
    }

    pub fn phase(&self) -> Phase {
        self.sampler.phase()
    }

    /// Items skipped because their frames or ROIs could not be read.
    pub fn skipped(&self) -> usize {
        self.skipped_total
    }

    /// Reads the clip of the video under the cursor without advancing it.
    /// Used at setup to size the staging buffers.
    pub fn probe(&mut self) -> Result<DecodedClip> {
        let record = self
            .list
            .get(self.cursor.position)
            .ok_or_else(|| anyhow!("Cursor {} out of range", self.cursor.position))?;
        let offsets = self
            .sampler
            .sample(record.usable_duration, &mut self.frame_rng)
            .with_context(|| format!("Failed to sample segments of {}", record.path))?;
        self.collaborators
            .frames
            .read(&ClipRequest {
                layout: &self.layout,
                video: record.path,
                offsets: &offsets,
                new_height: self.new_height,
                new_width: self.new_width,
            })
            .with_context(|| format!("Failed to read the first clip of {}", record.path))
    }

    /// `[C, H, W]` written per item for a clip shaped like `clip`.
    pub fn item_shape(&self, clip: &DecodedClip) -> [usize; 3] {
        self.collaborators.transform.output_shape(clip)
    }

    /// Fills every slot of `batch`.
    ///
    /// Unreadable videos are skipped and their slot is retried with the next
    /// video, so the batch is always complete when this returns `Ok`. Fails
    /// when a whole pass over the list (or `skip_limit` items) in a row could
    /// not be read.
    pub fn fill(&mut self, batch: &mut StagingBatch) -> Result<()> {
        let mut slot = 0;
        let mut consecutive_skips = 0;

        while slot < batch.batch_size() {
            ensure!(
                self.list.len() > self.cursor.position,
                "Cursor {} out of range for {} videos",
                self.cursor.position,
                self.list.len()
            );

            match self.fill_slot(slot, batch)? {
                SlotOutcome::Filled => {
                    slot += 1;
                    consecutive_skips = 0;
                }
                SlotOutcome::Skipped => {
                    self.skipped_total += 1;
                    consecutive_skips += 1;
                    if consecutive_skips >= self.max_consecutive_skips() {
                        bail!(
                            "Skipped {} consecutive unreadable videos while filling slot {}",
                            consecutive_skips,
                            slot
                        );
                    }
                }
            }
            self.advance()?;
        }
        Ok(())
    }

    /// Consecutive skips after which a fill gives up: one full pass over the
    /// list, or `skip_limit` when that is set and smaller.
    fn max_consecutive_skips(&self) -> usize {
        match self.skip_limit {
            0 => self.list.len(),
            limit => limit.min(self.list.len()),
        }
    }

    fn fill_slot(&mut self, slot: usize, batch: &mut StagingBatch) -> Result<SlotOutcome> {
        let position = self.cursor.position;
        let record = self
            .list
            .get(position)
            .ok_or_else(|| anyhow!("Cursor {} out of range", position))?;

        let offsets = self
            .sampler
            .sample(record.usable_duration, &mut self.frame_rng)
            .with_context(|| format!("Failed to sample segments of {}", record.path))?;

        let request = ClipRequest {
            layout: &self.layout,
            video: record.path,
            offsets: &offsets,
            new_height: self.new_height,
            new_width: self.new_width,
        };
        let clip = match self.collaborators.frames.read(&request) {
            Ok(clip) => clip,
            Err(err) => {
                debug!(video = record.path, position, "skipping unreadable video: {:#}", err);
                return Ok(SlotOutcome::Skipped);
            }
        };

        let mut boxes = match (&self.roi, &self.collaborators.rois) {
            (Some(settings), Some(reader)) => {
                let file = roi_file(&settings.folder, record.path);
                match reader.read(&file, offsets[0]) {
                    Ok(boxes) => Some(boxes),
                    Err(err) => {
                        warn!(
                            file = %file.display(),
                            frame = offsets[0],
                            "Error reading ROI file: {:#}",
                            err
                        );
                        return Ok(SlotOutcome::Skipped);
                    }
                }
            }
            _ => None,
        };

        self.collaborators
            .transform
            .transform(&clip, batch.item_mut(slot), boxes.as_mut(), &mut self.frame_rng)
            .with_context(|| format!("Failed to transform clip of {}", record.path))?;

        if let (Some(settings), Some(boxes)) = (&self.roi, boxes) {
            let [_, height, width] = batch.item_shape();
            let selected = select_rois(&boxes, slot, settings.num_rois, width, height);
            batch.write_rois(slot, &selected)?;
        }

        batch.write_labels(slot, record.labels)?;
        Ok(SlotOutcome::Filled)
    }

    fn advance(&mut self) -> Result<()> {
        if self.cursor.advance(self.list.len()) {
            debug!(epoch = self.cursor.epoch, "Restarting data prefetching from start");
            if let Some(shuffler) = self.shuffler.as_mut() {
                self.list.shuffle_with(shuffler)?;
            }
        }
        Ok(())
    }
}
