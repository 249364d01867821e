//! src/layer.rs
//!
//! The video data layer: setup plus the double-buffered forward protocol.
//!
//! ```text
//!   setup ─► probe clip ─► allocate front + back ─► start(fill back)
//!
//!   forward:  wait() ─► swap(front, back) ─► start(fill back) ─► &front
//!                                                   │
//!                     consumer computes on front ◄──┘ (overlaps with the fill)
//! ```
//!
//! Only a back buffer whose fill returned `Ok` is ever swapped to the front.
//! After a failed fill the next `forward` refills it in the foreground first.

use crate::config::{StreamLayout, VideoDataConfig};
use crate::fetch::{BatchFetcher, Collaborators};
use crate::frames::JpegFrameReader;
use crate::prefetch::{PrefetchJob, PrefetchScheduler};
use crate::staging::StagingBatch;
use crate::transform::CropMirrorTransform;
use crate::video_list::VideoList;
use anyhow::{anyhow, Result};
use std::mem;
use tracing::info;

/// Prefetch job: fill the back buffer with the next batch.
pub struct FetchJob {
    pub fetcher: BatchFetcher,
    pub batch: StagingBatch,
    /// Set only when the last fill of `batch` completed.
    filled: bool,
}

impl FetchJob {
    fn new(fetcher: BatchFetcher, batch: StagingBatch) -> Self {
        Self {
            fetcher,
            batch,
            filled: false,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }
}

impl PrefetchJob for FetchJob {
    fn run(&mut self) -> Result<()> {
        self.filled = false;
        self.fetcher.fill(&mut self.batch)?;
        self.filled = true;
        Ok(())
    }
}

/// Shapes of the layer outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputShapes {
    pub data: [usize; 4],
    pub labels: [usize; 4],
    pub rois: Option<[usize; 2]>,
}

/// Turns a video list into fixed-shape batches, decoding the next batch on a
/// background thread while the consumer works on the current one.
pub struct VideoDataLayer {
    scheduler: PrefetchScheduler<FetchJob>,
    front: StagingBatch,
    shapes: OutputShapes,
}

impl VideoDataLayer {
    /// Validates `config`, loads the list file named by `config.source` and
    /// starts the first prefetch.
    ///
    /// `num_outputs` is the number of output tensors wired by the enclosing
    /// graph: 2, or 3 when ROIs are enabled.
    pub fn setup(config: &VideoDataConfig, collaborators: Collaborators, num_outputs: usize) -> Result<Self> {
        let layout = config.validate()?;
        config.check_outputs(num_outputs)?;
        let source = config
            .source
            .as_ref()
            .ok_or_else(|| anyhow!("No video list source configured"))?;
        info!(source = %source.display(), "Opening file");
        let list = VideoList::from_file(source, config.num_labels, config.effective_interval())?;
        Self::build(config, layout, list, collaborators)
    }

    /// Like [`setup`](Self::setup), with the list already in memory.
    pub fn setup_with_list(
        config: &VideoDataConfig,
        list: VideoList,
        collaborators: Collaborators,
        num_outputs: usize,
    ) -> Result<Self> {
        let layout = config.validate()?;
        config.check_outputs(num_outputs)?;
        Self::build(config, layout, list, collaborators)
    }

    fn build(
        config: &VideoDataConfig,
        layout: StreamLayout,
        list: VideoList,
        collaborators: Collaborators,
    ) -> Result<Self> {
        info!(num_labels = config.num_labels, videos = list.len(), "A total of {} videos", list.len());

        let mut fetcher = BatchFetcher::new(config, layout, list, collaborators)?;
        let probe = fetcher.probe()?;
        let item_shape = fetcher.item_shape(&probe);

        let back = StagingBatch::new(config.batch_size, item_shape, config.num_labels, config.num_rois);
        let front = back.clone();
        let shapes = OutputShapes {
            data: back.data_shape(),
            labels: back.label_shape(),
            rois: back.roi_shape(),
        };
        info!(
            "output data size: {},{},{},{}",
            shapes.data[0], shapes.data[1], shapes.data[2], shapes.data[3]
        );

        let mut scheduler = PrefetchScheduler::new(FetchJob::new(fetcher, back));
        scheduler.start()?;

        Ok(Self {
            scheduler,
            front,
            shapes,
        })
    }

    /// Collaborators built from the configuration alone: the per-frame image
    /// reader and the crop/mirror transform.
    pub fn default_collaborators(config: &VideoDataConfig) -> Result<Collaborators> {
        let transform = CropMirrorTransform::new(&config.transform, config.phase)?;
        Ok(Collaborators::new(JpegFrameReader::new(), transform))
    }

    pub fn output_shapes(&self) -> OutputShapes {
        self.shapes
    }

    /// Waits for the outstanding prefetch, hands its batch to the caller and
    /// starts filling the other buffer.
    ///
    /// A failed fill is returned as the error of this call. The buffer it left
    /// behind is never handed out: the next call fills it again and waits for
    /// that fill before swapping.
    pub fn forward(&mut self) -> Result<&StagingBatch> {
        self.scheduler.wait()?;
        if !self.scheduler.job()?.is_filled() {
            self.scheduler.start()?;
            self.scheduler.wait()?;
        }
        let job = self.scheduler.job_mut()?;
        mem::swap(&mut job.batch, &mut self.front);
        job.filled = false;
        self.scheduler.start()?;
        Ok(&self.front)
    }

    /// Waits for the outstanding prefetch and exposes the fetcher state. The
    /// batch it filled is still returned by the next `forward`.
    pub fn fetcher(&mut self) -> Result<&BatchFetcher> {
        self.scheduler.wait()?;
        Ok(&self.scheduler.job()?.fetcher)
    }
}
