//! Binary masks for annotated nodules.

use ndarray::{Array3, Zip, s};
use thiserror::Error;

use crate::annotation::Annotation;
use crate::geometry::{Geometry, VoxelCoordinate};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MaskError {
    #[error("invalid nodule diameter {0} mm")]
    InvalidDiameter(f64),
}

/// Mask of the voxels within `diameter_mm / 2` millimeters of `center`.
///
/// Distances are physical, so with anisotropic spacing the sphere becomes an
/// ellipsoid in index space. Parts of the sphere outside `shape` are dropped;
/// a center far outside the grid yields an all-zero mask.
pub fn nodule_mask(
    shape: (usize, usize, usize),
    center: &VoxelCoordinate,
    diameter_mm: f64,
    geometry: &Geometry,
) -> Result<Array3<u8>, MaskError> {
    let mut mask = Array3::<u8>::zeros(shape);
    paint_sphere(&mut mask, center, diameter_mm, geometry)?;
    Ok(mask)
}

/// Union of the masks of every annotation, placed with `geometry`.
pub fn annotation_mask<'a>(
    shape: (usize, usize, usize),
    annotations: impl IntoIterator<Item = &'a Annotation>,
    geometry: &Geometry,
) -> Result<Array3<u8>, MaskError> {
    let mut mask = Array3::<u8>::zeros(shape);
    for annotation in annotations {
        let center = annotation.voxel_center(geometry);
        paint_sphere(&mut mask, &center, annotation.diameter_mm, geometry)?;
    }
    Ok(mask)
}

fn paint_sphere(
    mask: &mut Array3<u8>,
    center: &VoxelCoordinate,
    diameter_mm: f64,
    geometry: &Geometry,
) -> Result<(), MaskError> {
    if !(diameter_mm.is_finite() && diameter_mm >= 0.0) {
        return Err(MaskError::InvalidDiameter(diameter_mm));
    }
    let radius = diameter_mm / 2.0;
    let spacing = geometry.spacing();
    let (depth, height, width) = mask.dim();
    let dims = [depth as i64, height as i64, width as i64];

    let mut lo = [0i64; 3];
    let mut hi = [0i64; 3];
    for axis in 0..3 {
        // Float-to-int casts saturate, so far-away centers stay at the i64 limits.
        let reach = ((radius / spacing[axis]).floor() as i64).saturating_add(1);
        lo[axis] = center[axis].saturating_sub(reach).max(0);
        hi[axis] = center[axis].saturating_add(reach).min(dims[axis] - 1);
        if lo[axis] > hi[axis] {
            return Ok(());
        }
    }

    let [l0, l1, l2] = lo.map(|v| v as usize);
    let [h0, h1, h2] = hi.map(|v| v as usize);
    let radius_sq = radius * radius;
    Zip::indexed(mask.slice_mut(s![l0..=h0, l1..=h1, l2..=h2])).par_for_each(|(d, h, w), value| {
        let offset = [
            ((lo[0] + d as i64) as f64 - center[0] as f64) * spacing[0],
            ((lo[1] + h as i64) as f64 - center[1] as f64) * spacing[1],
            ((lo[2] + w as i64) as f64 - center[2] as f64) * spacing[2],
        ];
        if offset.iter().map(|o| o * o).sum::<f64>() <= radius_sq {
            *value = 1;
        }
    });
    Ok(())
}
