#![allow(dead_code)]

use video_data::{ClipRequest, DecodedClip, FrameReader, RoiReader, VideoList};

use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// One call received by `MockFrames`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCall {
    pub video: String,
    pub offsets: Vec<usize>,
    pub ok: bool,
}

/// Frame reader returning constant clips whose pixels carry the numeric
/// suffix of the video name (`v7` -> 7), with configurable failures.
#[derive(Clone)]
pub struct MockFrames {
    shape: [usize; 3],
    fail_calls: Arc<HashSet<usize>>,
    fail_after: Option<usize>,
    fail_videos: Arc<HashSet<String>>,
    calls: Arc<AtomicUsize>,
    log: Arc<Mutex<Vec<ReadCall>>>,
}

impl MockFrames {
    pub fn new(shape: [usize; 3]) -> Self {
        Self {
            shape,
            fail_calls: Arc::new(HashSet::new()),
            fail_after: None,
            fail_videos: Arc::new(HashSet::new()),
            calls: Arc::new(AtomicUsize::new(0)),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fails the given call indices (0-based, counting every read).
    pub fn failing_calls(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
        self.fail_calls = Arc::new(calls.into_iter().collect());
        self
    }

    /// Fails every call from index `n` on.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn failing_videos<S: Into<String>>(mut self, videos: impl IntoIterator<Item = S>) -> Self {
        self.fail_videos = Arc::new(videos.into_iter().map(Into::into).collect());
        self
    }

    pub fn calls(&self) -> Vec<ReadCall> {
        self.log.lock().unwrap().clone()
    }
}

pub fn video_value(video: &str) -> u8 {
    video
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

impl FrameReader for MockFrames {
    fn read(&self, request: &ClipRequest<'_>) -> Result<DecodedClip> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail_calls.contains(&call)
            || self.fail_after.is_some_and(|n| call >= n)
            || self.fail_videos.contains(request.video);
        self.log.lock().unwrap().push(ReadCall {
            video: request.video.to_string(),
            offsets: request.offsets.to_vec(),
            ok: !fail,
        });
        if fail {
            bail!("corrupt frames for {}", request.video);
        }
        let [c, h, w] = self.shape;
        DecodedClip::new(c, h, w, vec![video_value(request.video); c * h * w])
    }
}

/// ROI reader serving fixed boxes per file stem; stems without an entry
/// fail like a missing file.
#[derive(Clone, Default)]
pub struct MockRois {
    boxes: Arc<HashMap<String, Vec<[f32; 4]>>>,
    requests: Arc<Mutex<Vec<(PathBuf, usize)>>>,
}

impl MockRois {
    pub fn new<S: Into<String>>(boxes: impl IntoIterator<Item = (S, Vec<[f32; 4]>)>) -> Self {
        Self {
            boxes: Arc::new(boxes.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<(PathBuf, usize)> {
        self.requests.lock().unwrap().clone()
    }
}

impl RoiReader for MockRois {
    fn read(&self, path: &Path, frame_offset: usize) -> Result<Vec<[f32; 4]>> {
        self.requests
            .lock()
            .unwrap()
            .push((path.to_path_buf(), frame_offset));
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        match self.boxes.get(&stem) {
            Some(boxes) => Ok(boxes.clone()),
            None => bail!("no ROI file {}", path.display()),
        }
    }
}

/// Writes list records to a temporary file.
pub fn list_file(lines: &[&str]) -> Result<NamedTempFile> {
    let mut file = NamedTempFile::new()?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    Ok(file)
}

/// `n` videos named `v0..vn` with label `i` and the given usable duration.
pub fn numbered_list(n: usize, duration: usize) -> VideoList {
    let mut list = VideoList::new();
    for i in 0..n {
        list.push(format!("v{}", i), vec![i as i64], duration);
    }
    list
}
