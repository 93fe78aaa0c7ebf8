//! Overlap metrics between a reference mask and a predicted mask.
//!
//! Masks are binary: any non-zero voxel counts as foreground. Every ratio is
//! smoothed with [`SMOOTH`] on both sides so empty masks score 1.0 instead of
//! dividing by zero.

use ndarray::{ArrayView3, Zip};
use thiserror::Error;

pub const SMOOTH: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MetricsError {
    #[error("mask shapes differ: {truth:?} vs {pred:?}")]
    ShapeMismatch {
        truth: (usize, usize, usize),
        pred: (usize, usize, usize),
    },
}

/// Confusion counts of a prediction against the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Confusion {
    pub true_positive: u64,
    pub false_positive: u64,
    pub false_negative: u64,
    pub true_negative: u64,
}

impl Confusion {
    pub fn compute(truth: ArrayView3<'_, u8>, pred: ArrayView3<'_, u8>) -> Result<Self, MetricsError> {
        if truth.dim() != pred.dim() {
            return Err(MetricsError::ShapeMismatch {
                truth: truth.dim(),
                pred: pred.dim(),
            });
        }
        let mut counts = Confusion::default();
        Zip::from(&truth).and(&pred).for_each(|&t, &p| match (t != 0, p != 0) {
            (true, true) => counts.true_positive += 1,
            (false, true) => counts.false_positive += 1,
            (true, false) => counts.false_negative += 1,
            (false, false) => counts.true_negative += 1,
        });
        Ok(counts)
    }

    /// `2|A ∩ B| / (|A| + |B|)`
    pub fn dice(&self) -> f64 {
        let tp = self.true_positive as f64;
        let truth = tp + self.false_negative as f64;
        let pred = tp + self.false_positive as f64;
        (2.0 * tp + SMOOTH) / (truth + pred + SMOOTH)
    }

    /// `|A ∩ B| / |A ∪ B|`
    pub fn iou(&self) -> f64 {
        let tp = self.true_positive as f64;
        let union = tp + self.false_positive as f64 + self.false_negative as f64;
        (tp + SMOOTH) / (union + SMOOTH)
    }

    /// `TP / (TP + FN)`
    pub fn sensitivity(&self) -> f64 {
        let tp = self.true_positive as f64;
        (tp + SMOOTH) / (tp + self.false_negative as f64 + SMOOTH)
    }

    /// `TN / (TN + FP)`
    pub fn specificity(&self) -> f64 {
        let tn = self.true_negative as f64;
        (tn + SMOOTH) / (tn + self.false_positive as f64 + SMOOTH)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskMetrics {
    pub dice: f64,
    pub iou: f64,
    pub sensitivity: f64,
    pub specificity: f64,
}

impl MaskMetrics {
    pub fn compute(truth: ArrayView3<'_, u8>, pred: ArrayView3<'_, u8>) -> Result<Self, MetricsError> {
        let counts = Confusion::compute(truth, pred)?;
        Ok(Self {
            dice: counts.dice(),
            iou: counts.iou(),
            sensitivity: counts.sensitivity(),
            specificity: counts.specificity(),
        })
    }
}

pub fn dice(truth: ArrayView3<'_, u8>, pred: ArrayView3<'_, u8>) -> Result<f64, MetricsError> {
    Ok(Confusion::compute(truth, pred)?.dice())
}

pub fn iou(truth: ArrayView3<'_, u8>, pred: ArrayView3<'_, u8>) -> Result<f64, MetricsError> {
    Ok(Confusion::compute(truth, pred)?.iou())
}

pub fn sensitivity(truth: ArrayView3<'_, u8>, pred: ArrayView3<'_, u8>) -> Result<f64, MetricsError> {
    Ok(Confusion::compute(truth, pred)?.sensitivity())
}

pub fn specificity(truth: ArrayView3<'_, u8>, pred: ArrayView3<'_, u8>) -> Result<f64, MetricsError> {
    Ok(Confusion::compute(truth, pred)?.specificity())
}
