use crate::enums::ElementType;
use crate::geometry::{Geometry, GeometryError};
use crate::meta_header::{DataFile, MetaHeader};
use crate::volume::{Volume, VoxelData};

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use ndarray::Array3;
use rayon::prelude::*;
use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("Malformed header field `{field}`: {reason}")]
    MalformedHeader { field: String, reason: String },

    #[error("Payload holds {found} elements ({bytes} bytes), header declares {expected}")]
    PayloadSizeMismatch {
        expected: usize,
        found: usize,
        bytes: usize,
    },

    #[error("Unsupported element type `{0}`")]
    UnsupportedElementType(String),

    #[error("Invalid spacing: {0}")]
    InvalidSpacing(#[from] GeometryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a volume from a MetaImage header (`.mhd`) and its payload
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the header. A relative `ElementDataFile` is
    ///   resolved against the header's directory.
    ///
    /// # Errors
    ///
    /// Returns error if the header is incomplete, the element type is not
    /// supported, the spacing is not strictly positive or the payload does
    /// not hold exactly the declared number of elements.
    pub fn load(path: impl AsRef<Path>) -> Result<Volume, VolumeLoaderError> {
        let path = path.as_ref();
        let header_bytes = fs::read(path)?;
        let (header, header_end) = MetaHeader::parse_bytes(&header_bytes)?;
        debug!(
            path = %path.display(),
            dim_size = ?header.dim_size,
            spacing = ?header.element_spacing,
            offset = ?header.offset,
            element_type = header.element_type.met_name(),
            "parsed MetaImage header"
        );

        let payload = match &header.data_file {
            DataFile::Local => Self::unpack_payload(&header, &header_bytes[header_end..])?,
            DataFile::Path(name) => {
                let payload_path = Self::payload_path(path, name);
                let raw = fs::read(&payload_path)?;
                Self::unpack_payload(&header, &raw)?
            }
        };

        Self::load_from_parts(&header, &payload)
    }

    /// Parse only the header at `path`.
    pub fn load_header(path: impl AsRef<Path>) -> Result<MetaHeader, VolumeLoaderError> {
        let bytes = fs::read(path.as_ref())?;
        MetaHeader::parse_bytes(&bytes).map(|(header, _)| header)
    }

    /// Load several volumes in parallel. Each load is independent; results
    /// come back in the order of `paths`.
    pub fn load_many<P>(paths: &[P]) -> Vec<Result<Volume, VolumeLoaderError>>
    where
        P: AsRef<Path> + Sync,
    {
        info!(count = paths.len(), "loading volumes");
        paths.par_iter().map(|path| Self::load(path)).collect()
    }

    /// Build a volume from an already parsed header and its decoded payload
    /// bytes (decompressed, header bytes skipped).
    pub fn load_from_parts(header: &MetaHeader, payload: &[u8]) -> Result<Volume, VolumeLoaderError> {
        let geometry = Geometry::new(header.origin_zyx(), header.spacing_zyx())?;
        let data = Self::decode_payload(header, payload)?;
        debug!(shape = ?data.dim(), origin = ?geometry.origin(), spacing = ?geometry.spacing(), "loaded volume");
        Ok(Volume::with_geometry(data, geometry))
    }

    fn payload_path(header_path: &Path, name: &Path) -> PathBuf {
        match header_path.parent() {
            Some(dir) if name.is_relative() => dir.join(name),
            _ => name.to_path_buf(),
        }
    }

    /// Strip `HeaderSize` bytes and inflate compressed payloads.
    fn unpack_payload(header: &MetaHeader, raw: &[u8]) -> Result<Vec<u8>, VolumeLoaderError> {
        let raw = raw.get(header.header_size..).ok_or_else(|| VolumeLoaderError::MalformedHeader {
            field: "HeaderSize".to_string(),
            reason: format!("{} exceeds payload length {}", header.header_size, raw.len()),
        })?;
        if !header.compressed {
            return Ok(raw.to_vec());
        }
        // One byte past the declared size is enough to report a mismatch.
        let limit = header
            .element_count()?
            .checked_mul(header.element_type.size())
            .ok_or_else(|| VolumeLoaderError::MalformedHeader {
                field: "DimSize".to_string(),
                reason: "payload size overflows".to_string(),
            })?;
        let mut inflated = Vec::with_capacity(limit);
        ZlibDecoder::new(raw)
            .take(limit as u64 + 1)
            .read_to_end(&mut inflated)?;
        Ok(inflated)
    }

    fn decode_payload(header: &MetaHeader, bytes: &[u8]) -> Result<VoxelData, VolumeLoaderError> {
        let expected = header.element_count()?;
        let element_size = header.element_type.size();
        let fits = expected
            .checked_mul(element_size)
            .is_some_and(|needed| needed == bytes.len());
        if !fits {
            return Err(VolumeLoaderError::PayloadSizeMismatch {
                expected,
                found: bytes.len() / element_size,
                bytes: bytes.len(),
            });
        }

        // X fastest, then Y, then Z: C order for a (Z, Y, X) array.
        let shape = header.shape();
        let big_endian = header.big_endian;

        macro_rules! decode {
            ($ty:ty, $read:ident) => {{
                let mut values = vec![<$ty>::default(); expected];
                if big_endian {
                    BigEndian::$read(bytes, &mut values);
                } else {
                    LittleEndian::$read(bytes, &mut values);
                }
                Self::build_volume_array(shape, values)?.into()
            }};
        }

        let data: VoxelData = match header.element_type {
            ElementType::I8 => {
                let values: Vec<i8> = bytes.iter().map(|&b| b as i8).collect();
                Self::build_volume_array(shape, values)?.into()
            }
            ElementType::U8 => Self::build_volume_array(shape, bytes.to_vec())?.into(),
            ElementType::I16 => decode!(i16, read_i16_into),
            ElementType::U16 => decode!(u16, read_u16_into),
            ElementType::I32 => decode!(i32, read_i32_into),
            ElementType::U32 => decode!(u32, read_u32_into),
            ElementType::F32 => decode!(f32, read_f32_into),
            ElementType::F64 => decode!(f64, read_f64_into),
        };
        Ok(data)
    }

    fn build_volume_array<T>(
        shape: (usize, usize, usize),
        values: Vec<T>,
    ) -> Result<Array3<T>, VolumeLoaderError> {
        let found = values.len();
        Array3::from_shape_vec(shape, values).map_err(|_| VolumeLoaderError::PayloadSizeMismatch {
            expected: shape.0 * shape.1 * shape.2,
            found,
            bytes: found * std::mem::size_of::<T>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::VoxelCoordinate;

    fn header(text_dims: &str, element_type: &str) -> MetaHeader {
        MetaHeader::parse(&format!(
            "ObjectType = Image\nNDims = 3\nDimSize = {text_dims}\nElementSpacing = 1 2 3\nOffset = 10 20 30\nElementType = {element_type}\nElementDataFile = LOCAL\n"
        ))
        .unwrap()
    }

    #[test]
    fn test_decode_little_endian_i16() {
        let header = header("3 2 1", "MET_SHORT");
        let values: [i16; 6] = [-1024, -1000, 0, 1, 400, 3071];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();

        let volume = VolumeLoader::load_from_parts(&header, &bytes).unwrap();
        assert_eq!(volume.dim(), (1, 2, 3));
        assert_eq!(volume.spacing(), [3.0, 2.0, 1.0]);
        assert_eq!(volume.origin(), [30.0, 20.0, 10.0]);
        let data = volume.data().as_i16().unwrap();
        // (x=2, y=1, z=0) is the last element.
        assert_eq!(data[[0, 1, 2]], 3071);
        assert_eq!(data[[0, 1, 0]], 1);
    }

    #[test]
    fn test_decode_big_endian_f32() {
        let mut header = header("2 1 1", "MET_FLOAT");
        header.big_endian = true;
        let bytes: Vec<u8> = [1.5f32, -2.25].iter().flat_map(|v| v.to_be_bytes()).collect();
        let volume = VolumeLoader::load_from_parts(&header, &bytes).unwrap();
        assert_eq!(volume.data(), &VoxelData::F32(Array3::from_shape_vec((1, 1, 2), vec![1.5, -2.25]).unwrap()));
    }

    #[test]
    fn test_payload_size_mismatch() {
        let header = header("2 2 2", "MET_SHORT");
        match VolumeLoader::load_from_parts(&header, &[0u8; 14]) {
            Err(VolumeLoaderError::PayloadSizeMismatch { expected, found, bytes }) => {
                assert_eq!((expected, found, bytes), (8, 7, 14));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(VolumeLoader::load_from_parts(&header, &[0u8; 17]).is_err());
    }

    #[test]
    fn test_oversized_compressed_payload() {
        use flate2::{Compression, write::ZlibEncoder};
        use std::io::Write;

        let mut header = header("2 2 2", "MET_UCHAR");
        header.compressed = true;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&vec![0u8; 1 << 20]).unwrap();
        let raw = encoder.finish().unwrap();

        let inflated = VolumeLoader::unpack_payload(&header, &raw).unwrap();
        assert_eq!(inflated.len(), 9);
        match VolumeLoader::load_from_parts(&header, &inflated) {
            Err(VolumeLoaderError::PayloadSizeMismatch { expected, found, bytes }) => {
                assert_eq!((expected, found, bytes), (8, 9, 9));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_decode_big_endian_integer_types() {
        let mut ushort = header("2 1 1", "MET_USHORT");
        ushort.big_endian = true;
        let volume = VolumeLoader::load_from_parts(&ushort, &[0x01, 0x02, 0xff, 0xfe]).unwrap();
        assert_eq!(volume.get(&VoxelCoordinate::new(0, 0, 0)), Some(258.0));
        assert_eq!(volume.get(&VoxelCoordinate::new(0, 0, 1)), Some(65534.0));

        let mut int = header("1 1 1", "MET_INT");
        int.big_endian = true;
        let volume = VolumeLoader::load_from_parts(&int, &(-70000i32).to_be_bytes()).unwrap();
        assert_eq!(volume.element_type(), ElementType::I32);
        assert_eq!(volume.get(&VoxelCoordinate::new(0, 0, 0)), Some(-70000.0));

        let mut double = header("2 1 1", "MET_DOUBLE");
        double.big_endian = true;
        let bytes: Vec<u8> = [-1024.5f64, 3071.25].iter().flat_map(|v| v.to_be_bytes()).collect();
        let volume = VolumeLoader::load_from_parts(&double, &bytes).unwrap();
        assert_eq!(volume.get(&VoxelCoordinate::new(0, 0, 1)), Some(3071.25));

        // Single-byte types ignore byte order.
        let mut signed_byte = header("2 1 1", "MET_CHAR");
        signed_byte.big_endian = true;
        let volume = VolumeLoader::load_from_parts(&signed_byte, &[0xff, 0x7f]).unwrap();
        assert_eq!(volume.get(&VoxelCoordinate::new(0, 0, 0)), Some(-1.0));
        assert_eq!(volume.get(&VoxelCoordinate::new(0, 0, 1)), Some(127.0));
    }

    #[test]
    fn test_invalid_spacing_in_header() {
        let mut header = header("1 1 1", "MET_UCHAR");
        header.element_spacing = [1.0, -1.0, 1.0];
        assert!(matches!(
            VolumeLoader::load_from_parts(&header, &[0]),
            Err(VolumeLoaderError::InvalidSpacing(GeometryError::InvalidSpacing { axis: 1, .. }))
        ));
    }

    #[test]
    fn test_payload_path_resolution() {
        assert_eq!(
            VolumeLoader::payload_path(Path::new("/data/subset0/a.mhd"), Path::new("a.raw")),
            PathBuf::from("/data/subset0/a.raw")
        );
        assert_eq!(
            VolumeLoader::payload_path(Path::new("/data/a.mhd"), Path::new("/elsewhere/a.raw")),
            PathBuf::from("/elsewhere/a.raw")
        );
    }
}
