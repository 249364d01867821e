use crate::shuffle::ShuffleCoordinator;
use anyhow::{ensure, Context, Result};
use std::fs;
use std::path::Path;

/// One video of the list, as seen by the fetch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoRecord<'a> {
    pub path: &'a str,
    pub labels: &'a [i64],
    /// Frames available for sampling (raw length minus the flow interval).
    pub usable_duration: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ListEntry {
    path: String,
    labels: Vec<i64>,
}

/// The video list, loaded once at setup.
///
/// Entries and usable durations are stored as two parallel sequences that
/// are only ever read together through [`VideoList::get`] and only ever
/// reordered together through [`VideoList::shuffle_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoList {
    entries: Vec<ListEntry>,
    durations: Vec<usize>,
}

impl VideoList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a list file of `<path> <raw_length> <label_1> ... <label_k>`
    /// records with `k = num_labels`.
    ///
    /// Reading stops at the first token that does not parse, and a record cut
    /// short by it is not added. `interval` is subtracted from every raw
    /// length; pass 0 for RGB input.
    pub fn from_file(path: impl AsRef<Path>, num_labels: usize, interval: usize) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to open video list: {}", path.display()))?;
        Ok(Self::parse(&text, num_labels, interval))
    }

    /// Parses list records from whitespace-separated tokens.
    pub fn parse(text: &str, num_labels: usize, interval: usize) -> Self {
        let mut list = Self::new();
        let mut tokens = text.split_whitespace();

        while let Some(path) = tokens.next() {
            let Some(raw_length) = tokens.next().and_then(|t| t.parse::<usize>().ok()) else {
                break;
            };
            let labels: Option<Vec<i64>> = (0..num_labels)
                .map(|_| tokens.next().and_then(|t| t.parse().ok()))
                .collect();
            let Some(labels) = labels else {
                break;
            };
            list.push(path, labels, raw_length.saturating_sub(interval));
        }
        list
    }

    /// Appends a video with its already-computed usable duration.
    pub fn push(&mut self, path: impl Into<String>, labels: Vec<i64>, usable_duration: usize) {
        self.entries.push(ListEntry {
            path: path.into(),
            labels,
        });
        self.durations.push(usable_duration);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<VideoRecord<'_>> {
        let entry = self.entries.get(index)?;
        let usable_duration = *self.durations.get(index)?;
        Some(VideoRecord {
            path: &entry.path,
            labels: &entry.labels,
            usable_duration,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = VideoRecord<'_>> + '_ {
        (0..self.len()).filter_map(move |index| self.get(index))
    }

    /// Reorders the list with one permutation applied to both sequences.
    pub fn shuffle_with(&mut self, coordinator: &mut ShuffleCoordinator) -> Result<()> {
        coordinator.shuffle_pair(&mut self.entries, &mut self.durations)
    }

    pub(crate) fn check_paired(&self) -> Result<()> {
        ensure!(
            self.entries.len() == self.durations.len(),
            "Video list lost its duration pairing ({} videos, {} durations)",
            self.entries.len(),
            self.durations.len()
        );
        Ok(())
    }
}
