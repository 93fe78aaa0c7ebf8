//! # luna-volume
//!
//! Geometry and intensity preprocessing for lung CT volumes stored as
//! MetaImage (`.mhd` + `.raw`), the format of the LUNA16 challenge.
//!
//! The crate covers three steps every downstream stage depends on:
//!  - Loading: [`VolumeLoader`] reads the header and payload into a
//!    [`Volume`] whose grid, origin and spacing all use
//!    `(depth, height, width)` order. Headers list vectors as X, Y, Z; the
//!    reversal happens once, in the loader.
//!  - Coordinates: [`Geometry`] maps millimeter points to voxel indices with
//!    `round((p - origin) / spacing)` and back with `v * spacing + origin`.
//!    Indices outside the grid are valid results; check them with
//!    [`VoxelCoordinate::to_index`] before indexing.
//!  - Intensities: [`HuWindow`] clips Hounsfield units to a window and maps
//!    them onto `[0, 1]` without touching the raw grid.
//!
//! Around these sit LUNA16 annotation tables, spherical nodule masks and
//! overlap metrics for comparing masks.
//!
//! # Examples
//!
//! ## Locating an annotated nodule
//!
//! ```no_run
//! # use luna_volume::{AnnotationTable, HuWindow, VolumeLoader};
//! let volume = VolumeLoader::load("subset0/scan.mhd")
//!     .expect("should have loaded the scan");
//! let table = AnnotationTable::from_csv_path("annotations.csv")
//!     .expect("should have read annotations");
//! let normalized = volume.normalized(&HuWindow::LUNG);
//! for nodule in table.for_series("scan") {
//!     let voxel = nodule.voxel_center(volume.geometry());
//!     match voxel.to_index(volume.dim()) {
//!         Some(index) => println!("{:?}: {}", voxel, normalized[index]),
//!         None => println!("{:?} lies outside the scan", voxel),
//!     }
//! }
//! ```

pub mod annotation;
pub mod enums;
pub mod geometry;
pub mod mask;
pub mod meta_header;
pub mod metrics;
pub mod normalize;
pub mod volume;
pub mod volume_loader;

pub use annotation::{Annotation, AnnotationError, AnnotationTable};
pub use enums::{ElementType, Orientation, RoundingMode};
pub use geometry::{
    Geometry, GeometryError, PhysicalPoint, VoxelCoordinate, voxel_to_world, world_to_voxel,
};
pub use mask::{MaskError, annotation_mask, nodule_mask};
pub use meta_header::{DataFile, MetaHeader};
pub use metrics::{MaskMetrics, MetricsError};
pub use normalize::{HuWindow, NormalizeError, normalize, normalize_array, normalize_into};
pub use volume::{Volume, VoxelData};
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
