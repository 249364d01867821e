use crate::config::Phase;
use anyhow::{ensure, Result};
use rand::Rng;

/// Maps a video's usable duration to one clip start offset per temporal
/// segment.
///
/// The duration is split into `num_segments` equal segments of
/// `avg = duration / num_segments` frames, and each offset leaves room for a
/// clip of `clip_length` frames inside its segment:
/// - `Phase::Train`: a uniform draw from `[0, avg - clip_length + 1)` plus `i * avg`.
/// - `Phase::Test`: the segment center, `(avg - clip_length + 1) / 2 + i * avg`.
///
/// # Example
/// ```ignore
/// let sampler = SegmentSampler::new(3, 5, Phase::Test)?;
/// let offsets = sampler.sample(90, &mut rng)?; // [13, 43, 73]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSampler {
    num_segments: usize,
    clip_length: usize,
    phase: Phase,
}

impl SegmentSampler {
    pub fn new(num_segments: usize, clip_length: usize, phase: Phase) -> Result<Self> {
        ensure!(num_segments > 0, "num_segments must be positive");
        ensure!(clip_length > 0, "clip_length must be positive");
        Ok(Self {
            num_segments,
            clip_length,
            phase,
        })
    }

    pub fn num_segments(&self) -> usize {
        self.num_segments
    }

    pub fn clip_length(&self) -> usize {
        self.clip_length
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns `num_segments` offsets, each in `[0, usable_duration)`.
    ///
    /// Consumes one draw from `rng` per segment in training, none in testing.
    /// Fails when a segment is too short to hold one clip.
    pub fn sample<R: Rng + ?Sized>(&self, usable_duration: usize, rng: &mut R) -> Result<Vec<usize>> {
        let average = usable_duration / self.num_segments;
        ensure!(
            average >= self.clip_length,
            "Segments of {} frames cannot hold a clip of {} frames \
            (usable duration {}, {} segments)",
            average,
            self.clip_length,
            usable_duration,
            self.num_segments
        );
        let range = average - self.clip_length + 1;

        let offsets = (0..self.num_segments)
            .map(|segment| {
                let start = match self.phase {
                    Phase::Train => rng.random_range(0..range),
                    Phase::Test => range / 2,
                };
                start + segment * average
            })
            .collect();
        Ok(offsets)
    }
}
