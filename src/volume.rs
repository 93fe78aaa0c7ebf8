use crate::enums::{ElementType, Orientation};
use crate::geometry::{Geometry, GeometryError, PhysicalPoint, VoxelCoordinate};
use crate::normalize::{self, HuWindow, NormalizeError};

use ndarray::{Array2, Array3, ArrayView3, ArrayViewMut3, s};
use num::traits::AsPrimitive;

/// Voxel grid in `(depth, height, width)` order, stored in the element type
/// the payload declared.
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelData {
    I8(Array3<i8>),
    U8(Array3<u8>),
    I16(Array3<i16>),
    U16(Array3<u16>),
    I32(Array3<i32>),
    U32(Array3<u32>),
    F32(Array3<f32>),
    F64(Array3<f64>),
}

/// Run `$body` with `$arr` bound to the typed array inside a [`VoxelData`].
macro_rules! with_array {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            VoxelData::I8($arr) => $body,
            VoxelData::U8($arr) => $body,
            VoxelData::I16($arr) => $body,
            VoxelData::U16($arr) => $body,
            VoxelData::I32($arr) => $body,
            VoxelData::U32($arr) => $body,
            VoxelData::F32($arr) => $body,
            VoxelData::F64($arr) => $body,
        }
    };
}

macro_rules! impl_from_array {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Array3<$ty>> for VoxelData {
                fn from(value: Array3<$ty>) -> Self {
                    VoxelData::$variant(value)
                }
            }
        )*
    };
}

impl_from_array!(
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    f32 => F32,
    f64 => F64,
);

impl VoxelData {
    /// (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        with_array!(self, arr => arr.dim())
    }

    pub fn len(&self) -> usize {
        with_array!(self, arr => arr.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            VoxelData::I8(_) => ElementType::I8,
            VoxelData::U8(_) => ElementType::U8,
            VoxelData::I16(_) => ElementType::I16,
            VoxelData::U16(_) => ElementType::U16,
            VoxelData::I32(_) => ElementType::I32,
            VoxelData::U32(_) => ElementType::U32,
            VoxelData::F32(_) => ElementType::F32,
            VoxelData::F64(_) => ElementType::F64,
        }
    }

    /// Borrow the grid as `i16`, the usual storage type for CT in HU.
    pub fn as_i16(&self) -> Option<&Array3<i16>> {
        match self {
            VoxelData::I16(arr) => Some(arr),
            _ => None,
        }
    }
}

/// A loaded scan: voxel grid plus its calibration in physical space.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: VoxelData,
    geometry: Geometry,
}

impl Volume {
    /// Build a volume from a depth-first grid and depth-first calibration.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::InvalidSpacing`] if any spacing component is
    /// not strictly positive, [`GeometryError::InvalidOrigin`] if the origin
    /// is not finite.
    pub fn new(
        data: impl Into<VoxelData>,
        origin: [f64; 3],
        spacing: [f64; 3],
    ) -> Result<Self, GeometryError> {
        Ok(Self::with_geometry(data, Geometry::new(origin, spacing)?))
    }

    pub fn with_geometry(data: impl Into<VoxelData>, geometry: Geometry) -> Self {
        Self {
            data: data.into(),
            geometry,
        }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &VoxelData {
        &self.data
    }

    pub fn into_data(self) -> VoxelData {
        self.data
    }

    pub fn element_type(&self) -> ElementType {
        self.data.element_type()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Physical location of voxel (0,0,0), (depth, height, width) order.
    pub fn origin(&self) -> [f64; 3] {
        self.geometry.origin()
    }

    /// Millimeters per voxel step, (depth, height, width) order.
    pub fn spacing(&self) -> [f64; 3] {
        self.geometry.spacing()
    }

    pub fn world_to_voxel(&self, point: &PhysicalPoint) -> VoxelCoordinate {
        self.geometry.to_voxel(point)
    }

    pub fn voxel_to_world(&self, voxel: &VoxelCoordinate) -> PhysicalPoint {
        self.geometry.to_physical(voxel)
    }

    pub fn contains(&self, voxel: &VoxelCoordinate) -> bool {
        voxel.in_bounds(self.dim())
    }

    /// Value at `voxel`, or `None` if it lies outside the grid.
    pub fn get(&self, voxel: &VoxelCoordinate) -> Option<f64> {
        let index = voxel.to_index(self.dim())?;
        with_array!(&self.data, arr => arr.get(index).map(|&v| AsPrimitive::<f64>::as_(v)))
    }

    pub fn to_f32(&self) -> Array3<f32> {
        with_array!(&self.data, arr => arr.mapv(AsPrimitive::<f32>::as_))
    }

    /// Windowed copy of the grid in `[0, 1]`. The raw values stay available.
    pub fn normalized(&self, window: &HuWindow) -> Array3<f32> {
        with_array!(&self.data, arr => normalize::normalize_array(arr.view(), window))
    }

    pub fn normalize_into(
        &self,
        window: &HuWindow,
        out: ArrayViewMut3<'_, f32>,
    ) -> Result<(), NormalizeError> {
        with_array!(&self.data, arr => normalize::normalize_into(arr.view(), window, out))
    }

    /// Plane at `index` along the axis fixed by `orientation`, or `None` if
    /// `index` is past the end of that axis.
    pub fn slice(&self, index: usize, orientation: Orientation) -> Option<Array2<f32>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let plane: Array2<f32> = with_array!(&self.data, arr => {
            let view = match orientation {
                Orientation::Axial => arr.slice(s![index, .., ..]),
                Orientation::Coronal => arr.slice(s![.., index, ..]),
                Orientation::Sagittal => arr.slice(s![.., .., index]),
            };
            view.mapv(AsPrimitive::<f32>::as_)
        });
        Some(plane)
    }

    /// Cube of `size` voxels centered on `center`. Cells falling outside the
    /// grid are set to `fill`, so centers near or beyond the border still
    /// produce a full-size patch.
    pub fn patch(&self, center: &VoxelCoordinate, size: [usize; 3], fill: f32) -> Array3<f32> {
        let start: [i64; 3] =
            std::array::from_fn(|axis| center[axis].saturating_sub((size[axis] / 2) as i64));
        let shape = self.dim();
        let dims = [shape.0, shape.1, shape.2];
        let disjoint = (0..3).any(|axis| {
            let end = start[axis].saturating_add(size[axis] as i64);
            end <= 0 || start[axis] >= dims[axis] as i64
        });
        if disjoint {
            return Array3::from_elem((size[0], size[1], size[2]), fill);
        }
        with_array!(&self.data, arr => extract_patch(arr.view(), start, size, fill))
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        let dim = self.dim();
        let max_index = match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        };
        index < max_index
    }
}

fn extract_patch<T>(data: ArrayView3<'_, T>, start: [i64; 3], size: [usize; 3], fill: f32) -> Array3<f32>
where
    T: AsPrimitive<f32>,
{
    let shape = data.dim();
    Array3::from_shape_fn((size[0], size[1], size[2]), |(d, h, w)| {
        let voxel = VoxelCoordinate::new(
            start[0].saturating_add(d as i64),
            start[1].saturating_add(h as i64),
            start[2].saturating_add(w as i64),
        );
        match voxel.to_index(shape) {
            Some(index) => data[index].as_(),
            None => fill,
        }
    })
}
