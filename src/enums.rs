#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Slicing plane of a depth-first volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Fixed depth index, yields a (height, width) plane.
    Axial,
    /// Fixed height index, yields a (depth, width) plane.
    Coronal,
    /// Fixed width index, yields a (depth, height) plane.
    Sagittal,
}

/// Tie-breaking rule used when a physical point falls exactly half way
/// between two voxel centers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingMode {
    /// `2.5 -> 3`, `-2.5 -> -3`.
    #[default]
    HalfAwayFromZero,
    /// `2.5 -> 2`, `3.5 -> 4`. Matches `numpy.rint`.
    HalfToEven,
}

impl RoundingMode {
    #[inline]
    pub fn round(self, value: f64) -> f64 {
        match self {
            RoundingMode::HalfAwayFromZero => value.round(),
            RoundingMode::HalfToEven => value.round_ties_even(),
        }
    }
}

/// Scalar types a MetaImage payload may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ElementType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ElementType {
    /// Parse a MetaImage `ElementType` value such as `MET_SHORT`.
    pub fn from_met(name: &str) -> Option<Self> {
        match name {
            "MET_CHAR" => Some(ElementType::I8),
            "MET_UCHAR" => Some(ElementType::U8),
            "MET_SHORT" => Some(ElementType::I16),
            "MET_USHORT" => Some(ElementType::U16),
            "MET_INT" | "MET_LONG" => Some(ElementType::I32),
            "MET_UINT" | "MET_ULONG" => Some(ElementType::U32),
            "MET_FLOAT" => Some(ElementType::F32),
            "MET_DOUBLE" => Some(ElementType::F64),
            _ => None,
        }
    }

    pub fn met_name(self) -> &'static str {
        match self {
            ElementType::I8 => "MET_CHAR",
            ElementType::U8 => "MET_UCHAR",
            ElementType::I16 => "MET_SHORT",
            ElementType::U16 => "MET_USHORT",
            ElementType::I32 => "MET_INT",
            ElementType::U32 => "MET_UINT",
            ElementType::F32 => "MET_FLOAT",
            ElementType::F64 => "MET_DOUBLE",
        }
    }

    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            ElementType::I8 | ElementType::U8 => 1,
            ElementType::I16 | ElementType::U16 => 2,
            ElementType::I32 | ElementType::U32 | ElementType::F32 => 4,
            ElementType::F64 => 8,
        }
    }
}
