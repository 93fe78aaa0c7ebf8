use flate2::{Compression, write::ZlibEncoder};
use luna_volume::{
    ElementType, HuWindow, VolumeLoader, VolumeLoaderError, VoxelCoordinate, VoxelData,
};
use std::{fs, io::Write, path::Path};
use tempfile::tempdir;

fn write_scan(dir: &Path, name: &str, header_lines: &str, payload: &[u8]) -> std::path::PathBuf {
    let header_path = dir.join(format!("{name}.mhd"));
    fs::write(
        &header_path,
        format!("{header_lines}ElementDataFile = {name}.raw\n"),
    )
    .unwrap();
    fs::write(dir.join(format!("{name}.raw")), payload).unwrap();
    header_path
}

fn i16_le(values: &[i16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

const SMALL_HEADER: &str = "ObjectType = Image
NDims = 3
BinaryData = True
BinaryDataByteOrderMSB = False
CompressedData = False
TransformMatrix = 1 0 0 0 1 0 0 0 1
Offset = -200 -190 -150
ElementSpacing = 0.7 0.8 2.5
DimSize = 4 3 2
ElementType = MET_SHORT
";

fn ramp() -> Vec<i16> {
    // value = 100 * z + 10 * y + x, written X fastest
    let mut values = Vec::new();
    for z in 0..2 {
        for y in 0..3 {
            for x in 0..4 {
                values.push(100 * z + 10 * y + x);
            }
        }
    }
    values
}

#[test]
fn test_load_reverses_axis_order() {
    let dir = tempdir().unwrap();
    let path = write_scan(dir.path(), "small", SMALL_HEADER, &i16_le(&ramp()));

    let volume = VolumeLoader::load(&path).unwrap();
    assert_eq!(volume.dim(), (2, 3, 4));
    assert_eq!(volume.spacing(), [2.5, 0.8, 0.7]);
    assert_eq!(volume.origin(), [-150.0, -190.0, -200.0]);
    assert_eq!(volume.element_type(), ElementType::I16);

    // (z=1, y=2, x=3) in the header's order is [1, 2, 3] in the grid.
    assert_eq!(volume.get(&VoxelCoordinate::new(1, 2, 3)), Some(123.0));
    assert_eq!(volume.get(&VoxelCoordinate::new(0, 1, 2)), Some(12.0));
    assert_eq!(volume.voxel_to_world(&VoxelCoordinate::new(1, 0, 0)), [-147.5, -190.0, -200.0]);
}

#[test]
fn test_luna_dimensions() {
    let dir = tempdir().unwrap();
    let header = "ObjectType = Image
NDims = 3
Offset = -200 -200 -150
ElementSpacing = 0.703125 0.703125 2.5
DimSize = 512 512 133
ElementType = MET_UCHAR
CompressedData = True
";
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(&vec![0u8; 512 * 512 * 133]).unwrap();
    let path = write_scan(dir.path(), "luna", header, &encoder.finish().unwrap());

    let volume = VolumeLoader::load(&path).unwrap();
    assert_eq!(volume.dim(), (133, 512, 512));
    assert_eq!(volume.spacing(), [2.5, 0.703125, 0.703125]);
    assert_eq!(volume.origin(), [-150.0, -200.0, -200.0]);

    let nodule = volume.world_to_voxel(&[-298.387, -175.319, -128.699]);
    assert_eq!(nodule, VoxelCoordinate::new(-59, 35, 101));
    assert!(!volume.contains(&nodule));
    assert_eq!(volume.get(&nodule), None);
}

#[test]
fn test_ndims_two_is_malformed() {
    let dir = tempdir().unwrap();
    let header = SMALL_HEADER.replace("NDims = 3", "NDims = 2");
    let path = write_scan(dir.path(), "flat", &header, &i16_le(&ramp()));
    assert!(matches!(
        VolumeLoader::load(&path),
        Err(VolumeLoaderError::MalformedHeader { field, .. }) if field == "NDims"
    ));
}

#[test]
fn test_short_payload() {
    let dir = tempdir().unwrap();
    let values = ramp();
    let path = write_scan(dir.path(), "short", SMALL_HEADER, &i16_le(&values[..20]));
    match VolumeLoader::load(&path) {
        Err(VolumeLoaderError::PayloadSizeMismatch { expected, found, .. }) => {
            assert_eq!(expected, 24);
            assert_eq!(found, 20);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_zero_spacing() {
    let dir = tempdir().unwrap();
    let header = SMALL_HEADER.replace("ElementSpacing = 0.7 0.8 2.5", "ElementSpacing = 0.7 0 2.5");
    let path = write_scan(dir.path(), "zero", &header, &i16_le(&ramp()));
    assert!(matches!(
        VolumeLoader::load(&path),
        Err(VolumeLoaderError::InvalidSpacing(_))
    ));
}

#[test]
fn test_nan_offset_is_malformed() {
    let dir = tempdir().unwrap();
    let header = SMALL_HEADER.replace("Offset = -200 -190 -150", "Offset = nan 0 0");
    let path = write_scan(dir.path(), "nan", &header, &i16_le(&ramp()));
    assert!(matches!(
        VolumeLoader::load(&path),
        Err(VolumeLoaderError::MalformedHeader { field, .. }) if field == "Offset"
    ));
}

#[test]
fn test_oversized_compressed_payload() {
    let dir = tempdir().unwrap();
    let header = SMALL_HEADER.replace("CompressedData = False", "CompressedData = True");
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(&vec![0u8; 64 << 20]).unwrap();
    let path = write_scan(dir.path(), "bomb", &header, &encoder.finish().unwrap());
    match VolumeLoader::load(&path) {
        Err(VolumeLoaderError::PayloadSizeMismatch { expected, bytes, .. }) => {
            assert_eq!(expected, 24);
            assert_eq!(bytes, 49);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_unsupported_element_type() {
    let dir = tempdir().unwrap();
    let header = SMALL_HEADER.replace("MET_SHORT", "MET_FLOAT_ARRAY");
    let path = write_scan(dir.path(), "odd", &header, &[]);
    assert!(matches!(
        VolumeLoader::load(&path),
        Err(VolumeLoaderError::UnsupportedElementType(name)) if name == "MET_FLOAT_ARRAY"
    ));
}

#[test]
fn test_missing_payload_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("orphan.mhd");
    fs::write(&path, format!("{SMALL_HEADER}ElementDataFile = orphan.raw\n")).unwrap();
    assert!(matches!(VolumeLoader::load(&path), Err(VolumeLoaderError::Io(_))));
}

#[test]
fn test_local_payload_with_header_size() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("local.mhd");
    let mut bytes = format!("HeaderSize = 3\n{SMALL_HEADER}ElementDataFile = LOCAL\n").into_bytes();
    bytes.extend_from_slice(b"pad");
    bytes.extend_from_slice(&i16_le(&ramp()));
    fs::write(&path, bytes).unwrap();

    let volume = VolumeLoader::load(&path).unwrap();
    assert_eq!(volume.get(&VoxelCoordinate::new(1, 2, 3)), Some(123.0));
}

#[test]
fn test_big_endian_payload() {
    let dir = tempdir().unwrap();
    let header = SMALL_HEADER.replace("BinaryDataByteOrderMSB = False", "BinaryDataByteOrderMSB = True");
    let payload: Vec<u8> = ramp().iter().flat_map(|v| v.to_be_bytes()).collect();
    let path = write_scan(dir.path(), "msb", &header, &payload);

    let volume = VolumeLoader::load(&path).unwrap();
    assert_eq!(volume.get(&VoxelCoordinate::new(1, 1, 1)), Some(111.0));
}

#[test]
fn test_load_many_keeps_order() {
    let dir = tempdir().unwrap();
    let good = write_scan(dir.path(), "good", SMALL_HEADER, &i16_le(&ramp()));
    let bad = write_scan(dir.path(), "bad", SMALL_HEADER, &[0u8; 3]);

    let results = VolumeLoader::load_many(&[good.clone(), bad, good]);
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(VolumeLoaderError::PayloadSizeMismatch { .. })));
    assert!(results[2].is_ok());
}

#[test]
fn test_normalization_leaves_raw_values() {
    let dir = tempdir().unwrap();
    let values: Vec<i16> = vec![-2000, -1000, -300, 400, 1000, 0];
    let header = SMALL_HEADER.replace("DimSize = 4 3 2", "DimSize = 3 2 1");
    let path = write_scan(dir.path(), "hu", &header, &i16_le(&values));

    let volume = VolumeLoader::load(&path).unwrap();
    let normalized = volume.normalized(&HuWindow::LUNG);
    assert_eq!(normalized.dim(), (1, 2, 3));
    assert_eq!(normalized[[0, 0, 0]], 0.0);
    assert_eq!(normalized[[0, 0, 1]], 0.0);
    assert_eq!(normalized[[0, 0, 2]], 0.5);
    assert_eq!(normalized[[0, 1, 0]], 1.0);
    assert_eq!(normalized[[0, 1, 1]], 1.0);

    match volume.data() {
        VoxelData::I16(raw) => assert_eq!(raw.as_slice().unwrap(), values.as_slice()),
        other => panic!("unexpected element type {:?}", other.element_type()),
    }
}
