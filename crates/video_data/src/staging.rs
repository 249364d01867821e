use crate::roi::{RoiBox, ROI_COLUMNS};
use anyhow::{ensure, Result};

/// Preallocated destination buffers for one batch.
///
/// - data: `[batch_size, C, H, W]`
/// - labels: `[batch_size, num_labels, 1, 1]`
/// - rois (optional): `[batch_size * num_rois, 5]`
///
/// Allocated once at setup and overwritten in place by every fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingBatch {
    data: Vec<f32>,
    item_shape: [usize; 3],
    batch_size: usize,
    labels: Vec<i64>,
    num_labels: usize,
    rois: Vec<f32>,
    num_rois: usize,
}

impl StagingBatch {
    pub fn new(batch_size: usize, item_shape: [usize; 3], num_labels: usize, num_rois: usize) -> Self {
        let item_len: usize = item_shape.iter().product();
        Self {
            data: vec![0.0; batch_size * item_len],
            item_shape,
            batch_size,
            labels: vec![0; batch_size * num_labels],
            num_labels,
            rois: vec![0.0; batch_size * num_rois * ROI_COLUMNS],
            num_rois,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// `[C, H, W]` of one item.
    pub fn item_shape(&self) -> [usize; 3] {
        self.item_shape
    }

    pub fn data_shape(&self) -> [usize; 4] {
        let [c, h, w] = self.item_shape;
        [self.batch_size, c, h, w]
    }

    pub fn label_shape(&self) -> [usize; 4] {
        [self.batch_size, self.num_labels, 1, 1]
    }

    pub fn roi_shape(&self) -> Option<[usize; 2]> {
        (self.num_rois > 0).then(|| [self.batch_size * self.num_rois, ROI_COLUMNS])
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn labels(&self) -> &[i64] {
        &self.labels
    }

    pub fn rois(&self) -> Option<&[f32]> {
        (self.num_rois > 0).then_some(self.rois.as_slice())
    }

    fn item_len(&self) -> usize {
        self.item_shape.iter().product()
    }

    pub fn item(&self, slot: usize) -> &[f32] {
        let len = self.item_len();
        &self.data[slot * len..][..len]
    }

    pub fn item_mut(&mut self, slot: usize) -> &mut [f32] {
        let len = self.item_len();
        &mut self.data[slot * len..][..len]
    }

    pub fn label(&self, slot: usize) -> &[i64] {
        &self.labels[slot * self.num_labels..][..self.num_labels]
    }

    pub fn write_labels(&mut self, slot: usize, labels: &[i64]) -> Result<()> {
        ensure!(slot < self.batch_size, "Slot {} out of range", slot);
        ensure!(
            labels.len() == self.num_labels,
            "Expected {} labels, got {}",
            self.num_labels,
            labels.len()
        );
        let n = self.num_labels;
        self.labels[slot * n..][..n].copy_from_slice(labels);
        Ok(())
    }

    /// ROI rows of one slot, `num_rois` rows of 5 values.
    pub fn slot_rois(&self, slot: usize) -> Option<&[f32]> {
        let len = self.num_rois * ROI_COLUMNS;
        (len > 0).then(|| &self.rois[slot * len..][..len])
    }

    pub fn write_rois(&mut self, slot: usize, boxes: &[RoiBox]) -> Result<()> {
        ensure!(self.num_rois > 0, "Batch has no ROI output");
        ensure!(slot < self.batch_size, "Slot {} out of range", slot);
        ensure!(
            boxes.len() == self.num_rois,
            "Expected {} ROIs, got {}",
            self.num_rois,
            boxes.len()
        );
        let len = self.num_rois * ROI_COLUMNS;
        let rows = self.rois[slot * len..][..len].chunks_exact_mut(ROI_COLUMNS);
        for (row, roi) in rows.zip(boxes) {
            row.copy_from_slice(&roi.row());
        }
        Ok(())
    }
}

/// Batch buffers as libtorch tensors.
#[cfg(feature = "tch")]
#[derive(Debug)]
pub struct BatchTensors {
    pub data: tch::Tensor,
    pub labels: tch::Tensor,
    pub rois: Option<tch::Tensor>,
}

#[cfg(feature = "tch")]
impl StagingBatch {
    /// Copies the buffers into CPU tensors of the documented shapes.
    pub fn to_tensors(&self) -> BatchTensors {
        let dims = |shape: &[usize]| shape.iter().map(|&d| d as i64).collect::<Vec<_>>();
        BatchTensors {
            data: tch::Tensor::from_slice(&self.data).reshape(dims(&self.data_shape())),
            labels: tch::Tensor::from_slice(&self.labels).reshape(dims(&self.label_shape())),
            rois: self
                .roi_shape()
                .map(|shape| tch::Tensor::from_slice(&self.rois).reshape(dims(&shape))),
        }
    }
}
