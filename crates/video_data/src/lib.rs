//! Video data ingestion for training: temporal-segment sampling with a
//! double-buffered prefetch worker.
//!
//! ```text
//!  VideoList ─► ShuffleCoordinator ─► SegmentSampler ─► FrameReader ─► ClipTransform
//!                 (epoch wrap)          (per item)        (decode)        (into slot)
//!                                                                            │
//!  consumer ◄── VideoDataLayer::forward ◄── PrefetchScheduler ◄── StagingBatch
//! ```

pub mod config;
pub mod fetch;
pub mod frames;
pub mod layer;
pub mod prefetch;
pub mod roi;
pub mod segment;
pub mod shuffle;
pub mod staging;
pub mod transform;
pub mod video_list;

pub use config::{Modality, Phase, StreamLayout, TransformConfig, VideoDataConfig};
pub use fetch::{BatchFetcher, Collaborators, EpochCursor};
pub use frames::{ClipRequest, DecodedClip, FrameReader, JpegFrameReader};
pub use layer::{OutputShapes, VideoDataLayer};
pub use prefetch::{PrefetchJob, PrefetchScheduler};
pub use roi::{RoiBox, RoiReader};
pub use segment::SegmentSampler;
pub use shuffle::ShuffleCoordinator;
pub use staging::StagingBatch;
pub use transform::{ClipTransform, CropMirrorTransform};
pub use video_list::{VideoList, VideoRecord};
