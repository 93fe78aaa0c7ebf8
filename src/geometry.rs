//! Mapping between physical (millimeter) space and voxel index space.
//!
//! All vectors are in the volume's own `(depth, height, width)` order. The
//! transform is axis aligned: each axis is scaled by its spacing and shifted
//! by its origin, independently of the others.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enums::RoundingMode;

/// A physical point in millimeters, `(depth, height, width)` order.
pub type PhysicalPoint = [f64; 3];

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeometryError {
    #[error("invalid spacing on axis {axis}: {value} (must be finite and > 0)")]
    InvalidSpacing { axis: usize, value: f64 },

    #[error("invalid origin on axis {axis}: {value} (must be finite)")]
    InvalidOrigin { axis: usize, value: f64 },
}

/// Integer voxel index. Components may be negative or exceed the grid, which
/// means the point lies outside the scanned region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VoxelCoordinate(pub [i64; 3]);

impl VoxelCoordinate {
    pub fn new(depth: i64, height: i64, width: i64) -> Self {
        Self([depth, height, width])
    }

    pub fn in_bounds(&self, shape: (usize, usize, usize)) -> bool {
        self.to_index(shape).is_some()
    }

    /// Array index for a grid of `shape`, or `None` when out of bounds.
    pub fn to_index(&self, shape: (usize, usize, usize)) -> Option<[usize; 3]> {
        let dims = [shape.0, shape.1, shape.2];
        let mut index = [0usize; 3];
        for axis in 0..3 {
            let v = usize::try_from(self.0[axis]).ok()?;
            if v >= dims[axis] {
                return None;
            }
            index[axis] = v;
        }
        Some(index)
    }
}

impl std::ops::Index<usize> for VoxelCoordinate {
    type Output = i64;

    fn index(&self, axis: usize) -> &i64 {
        &self.0[axis]
    }
}

impl From<[i64; 3]> for VoxelCoordinate {
    fn from(value: [i64; 3]) -> Self {
        Self(value)
    }
}

/// Calibration of a grid in physical space: origin of voxel (0,0,0) and the
/// per-axis spacing. Both are validated once at construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    origin: [f64; 3],
    spacing: [f64; 3],
}

impl Geometry {
    pub fn new(origin: [f64; 3], spacing: [f64; 3]) -> Result<Self, GeometryError> {
        validate_spacing(&spacing)?;
        if let Some((axis, &value)) = origin.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(GeometryError::InvalidOrigin { axis, value });
        }
        Ok(Self { origin, spacing })
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    /// `round((p - origin) / spacing)` per axis, ties away from zero.
    ///
    /// Components beyond the `i64` range saturate. A NaN component maps to
    /// `i64::MIN`, which no grid contains, so [`VoxelCoordinate::to_index`]
    /// rejects it.
    pub fn to_voxel(&self, point: &PhysicalPoint) -> VoxelCoordinate {
        self.to_voxel_with(point, RoundingMode::default())
    }

    pub fn to_voxel_with(&self, point: &PhysicalPoint, rounding: RoundingMode) -> VoxelCoordinate {
        let continuous = self.to_continuous_index(point);
        VoxelCoordinate(continuous.map(|c| if c.is_nan() { i64::MIN } else { rounding.round(c) as i64 }))
    }

    /// Fractional index, before rounding.
    pub fn to_continuous_index(&self, point: &PhysicalPoint) -> [f64; 3] {
        std::array::from_fn(|axis| (point[axis] - self.origin[axis]) / self.spacing[axis])
    }

    /// `v * spacing + origin` per axis.
    pub fn to_physical(&self, voxel: &VoxelCoordinate) -> PhysicalPoint {
        std::array::from_fn(|axis| voxel[axis] as f64 * self.spacing[axis] + self.origin[axis])
    }
}

fn validate_spacing(spacing: &[f64; 3]) -> Result<(), GeometryError> {
    for (axis, &value) in spacing.iter().enumerate() {
        // Also rejects NaN.
        if !(value.is_finite() && value > 0.0) {
            return Err(GeometryError::InvalidSpacing { axis, value });
        }
    }
    Ok(())
}

/// Convert a physical point to a voxel coordinate.
///
/// # Errors
///
/// Returns [`GeometryError::InvalidSpacing`] if any spacing component is not
/// strictly positive, [`GeometryError::InvalidOrigin`] if the origin is not
/// finite.
pub fn world_to_voxel(
    point: &PhysicalPoint,
    origin: &[f64; 3],
    spacing: &[f64; 3],
) -> Result<VoxelCoordinate, GeometryError> {
    Ok(Geometry::new(*origin, *spacing)?.to_voxel(point))
}

/// Convert a voxel coordinate to the physical point of its center.
///
/// # Errors
///
/// Returns [`GeometryError::InvalidSpacing`] if any spacing component is not
/// strictly positive.
pub fn voxel_to_world(
    voxel: &VoxelCoordinate,
    origin: &[f64; 3],
    spacing: &[f64; 3],
) -> Result<PhysicalPoint, GeometryError> {
    Ok(Geometry::new(*origin, *spacing)?.to_physical(voxel))
}
