//! Hounsfield-unit windowing.
//!
//! A window `[min, max]` maps raw intensities onto `[0, 1]`, clipping
//! everything outside. Normalizing twice is only a no-op for the unit window;
//! any other window will rescale already-normalized data again.

use ndarray::{Array3, ArrayView3, ArrayViewMut3, Zip};
use num::traits::AsPrimitive;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("invalid window [{min}, {max}]: max must be greater than min")]
    InvalidWindow { min: f64, max: f64 },

    #[error("output buffer has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },
}

/// Intensity window, in the units of the raw data (HU for CT).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HuWindow {
    min: f64,
    max: f64,
}

impl HuWindow {
    /// Lung window, air (-1000 HU) to bone (400 HU).
    pub const LUNG: HuWindow = HuWindow {
        min: -1000.0,
        max: 400.0,
    };

    pub const UNIT: HuWindow = HuWindow { min: 0.0, max: 1.0 };

    pub fn new(min: f64, max: f64) -> Result<Self, NormalizeError> {
        if !(min.is_finite() && max.is_finite() && max > min && (max - min).is_finite()) {
            return Err(NormalizeError::InvalidWindow { min, max });
        }
        Ok(Self { min, max })
    }

    #[inline]
    pub fn min(&self) -> f64 {
        self.min
    }

    #[inline]
    pub fn max(&self) -> f64 {
        self.max
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    /// Map a single value into `[0, 1]`. NaN maps to 0, like air.
    #[inline]
    pub fn apply(&self, value: f64) -> f32 {
        if value.is_nan() {
            return 0.0;
        }
        ((value.clamp(self.min, self.max) - self.min) / self.width()) as f32
    }
}

impl Default for HuWindow {
    fn default() -> Self {
        Self::LUNG
    }
}

/// `(clamp(value, min, max) - min) / (max - min)`.
///
/// # Errors
///
/// Returns [`NormalizeError::InvalidWindow`] unless `max > min`.
pub fn normalize(value: f64, min: f64, max: f64) -> Result<f32, NormalizeError> {
    Ok(HuWindow::new(min, max)?.apply(value))
}

/// Normalize a whole grid into a freshly allocated array. The source is left
/// untouched.
pub fn normalize_array<T>(data: ArrayView3<'_, T>, window: &HuWindow) -> Array3<f32>
where
    T: AsPrimitive<f64> + Send + Sync,
{
    let mut out = Array3::<f32>::zeros(data.dim());
    Zip::from(&mut out)
        .and(&data)
        .par_for_each(|o, &v| *o = window.apply(v.as_()));
    out
}

/// Normalize `data` into a caller-supplied buffer of the same shape.
///
/// # Errors
///
/// Returns [`NormalizeError::ShapeMismatch`] when `out` and `data` differ in
/// shape; `out` is not written in that case.
pub fn normalize_into<T>(
    data: ArrayView3<'_, T>,
    window: &HuWindow,
    mut out: ArrayViewMut3<'_, f32>,
) -> Result<(), NormalizeError>
where
    T: AsPrimitive<f64> + Send + Sync,
{
    if data.dim() != out.dim() {
        return Err(NormalizeError::ShapeMismatch {
            expected: data.dim(),
            found: out.dim(),
        });
    }
    Zip::from(&mut out)
        .and(&data)
        .par_for_each(|o, &v| *o = window.apply(v.as_()));
    Ok(())
}
