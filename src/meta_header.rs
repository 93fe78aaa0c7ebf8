//! MetaImage (`.mhd`) header parsing.
//!
//! A header is a list of `Key = Value` lines. Vectors in the header are
//! written X first (width-fastest); [`MetaHeader`] keeps them in that native
//! order and offers `*_zyx` accessors for the depth-first grid convention.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{trace, warn};

use crate::enums::ElementType;
use crate::volume_loader::VolumeLoaderError;

const IDENTITY: [f64; 9] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];

/// Where the voxel payload lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFile {
    /// Payload follows the header in the same file.
    Local,
    /// Path relative to the header's directory.
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetaHeader {
    /// X, Y, Z
    pub dim_size: [usize; 3],
    /// X, Y, Z
    pub element_spacing: [f64; 3],
    /// X, Y, Z
    pub offset: [f64; 3],
    pub element_type: ElementType,
    pub data_file: DataFile,
    pub big_endian: bool,
    pub compressed: bool,
    /// Bytes to skip at the start of the payload.
    pub header_size: usize,
    /// Row-major direction cosines, if the header carries them.
    pub transform_matrix: Option<[f64; 9]>,
}

impl MetaHeader {
    /// Parse a header from text.
    pub fn parse(text: &str) -> Result<Self, VolumeLoaderError> {
        Self::parse_bytes(text.as_bytes()).map(|(header, _)| header)
    }

    /// Parse a header from the start of `bytes`, returning it together with
    /// the byte offset right after the `ElementDataFile` line. For
    /// `ElementDataFile = LOCAL` the payload starts at that offset.
    pub fn parse_bytes(bytes: &[u8]) -> Result<(Self, usize), VolumeLoaderError> {
        let mut fields: HashMap<String, String> = HashMap::new();
        let mut position = 0;
        let mut header_end = None;

        while position < bytes.len() {
            let line_end = bytes[position..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |i| position + i);
            let line = String::from_utf8_lossy(&bytes[position..line_end]);
            position = (line_end + 1).min(bytes.len());

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(malformed("header", format!("line without '=': {line}")));
            };
            let key = key.trim();
            fields.insert(key.to_string(), value.trim().to_string());

            // ElementDataFile terminates a MetaImage header.
            if key == "ElementDataFile" {
                header_end = Some(position);
                break;
            }
        }

        let header_end = header_end.ok_or_else(|| malformed("ElementDataFile", "missing"))?;
        let header = Self::from_fields(&fields)?;
        Ok((header, header_end))
    }

    fn from_fields(fields: &HashMap<String, String>) -> Result<Self, VolumeLoaderError> {
        let object_type = required(fields, "ObjectType")?;
        if object_type != "Image" {
            return Err(malformed(
                "ObjectType",
                format!("expected `Image`, found `{object_type}`"),
            ));
        }

        let ndims: usize = parse_scalar("NDims", required(fields, "NDims")?)?;
        if ndims != 3 {
            return Err(malformed("NDims", format!("expected 3, found {ndims}")));
        }

        if let Some(channels) = fields.get("ElementNumberOfChannels") {
            let channels: usize = parse_scalar("ElementNumberOfChannels", channels)?;
            if channels != 1 {
                return Err(malformed(
                    "ElementNumberOfChannels",
                    format!("expected 1, found {channels}"),
                ));
            }
        }

        let dim_size: [usize; 3] = parse_vec3("DimSize", required(fields, "DimSize")?)?;
        if dim_size.contains(&0) {
            return Err(malformed("DimSize", "dimensions must be positive"));
        }

        let element_spacing = parse_vec3("ElementSpacing", required(fields, "ElementSpacing")?)?;

        let offset = match ["Offset", "Origin", "Position"]
            .iter()
            .find_map(|key| fields.get(*key).map(|value| (*key, value)))
        {
            Some((key, value)) => {
                let offset: [f64; 3] = parse_vec3(key, value)?;
                if offset.iter().any(|v| !v.is_finite()) {
                    return Err(malformed(key, format!("non-finite value in `{value}`")));
                }
                offset
            }
            None => {
                trace!("header has no Offset, origin defaults to zero");
                [0.0; 3]
            }
        };

        let element_type_name = required(fields, "ElementType")?;
        let element_type = ElementType::from_met(element_type_name)
            .ok_or_else(|| VolumeLoaderError::UnsupportedElementType(element_type_name.to_string()))?;

        let data_file = match required(fields, "ElementDataFile")? {
            "LOCAL" | "Local" | "local" => DataFile::Local,
            "LIST" => return Err(malformed("ElementDataFile", "multi-file payloads are not supported")),
            name if name.contains('%') => {
                return Err(malformed("ElementDataFile", "file patterns are not supported"));
            }
            name => DataFile::Path(PathBuf::from(name)),
        };

        let big_endian = match fields
            .get("ElementByteOrderMSB")
            .map(|v| ("ElementByteOrderMSB", v))
            .or_else(|| fields.get("BinaryDataByteOrderMSB").map(|v| ("BinaryDataByteOrderMSB", v)))
        {
            Some((key, value)) => parse_bool(key, value)?,
            None => false,
        };

        let compressed = match fields.get("CompressedData") {
            Some(value) => parse_bool("CompressedData", value)?,
            None => false,
        };

        let header_size = match fields.get("HeaderSize") {
            Some(value) => {
                let size: i64 = parse_scalar("HeaderSize", value)?;
                usize::try_from(size)
                    .map_err(|_| malformed("HeaderSize", format!("unsupported value {size}")))?
            }
            None => 0,
        };

        let transform_matrix = match fields.get("TransformMatrix") {
            Some(value) => {
                let m = parse_values::<f64>("TransformMatrix", value)?;
                let m: [f64; 9] = m
                    .try_into()
                    .map_err(|m: Vec<f64>| malformed("TransformMatrix", format!("expected 9 values, found {}", m.len())))?;
                if m.iter().zip(IDENTITY.iter()).any(|(a, b)| (a - b).abs() > 1e-6) {
                    warn!(
                        matrix = ?m,
                        "TransformMatrix is not identity; voxel mapping ignores direction cosines"
                    );
                }
                Some(m)
            }
            None => None,
        };

        Ok(Self {
            dim_size,
            element_spacing,
            offset,
            element_type,
            data_file,
            big_endian,
            compressed,
            header_size,
            transform_matrix,
        })
    }

    /// Grid shape as (depth, height, width).
    pub fn shape(&self) -> (usize, usize, usize) {
        let [x, y, z] = self.dim_size;
        (z, y, x)
    }

    pub fn spacing_zyx(&self) -> [f64; 3] {
        reversed(self.element_spacing)
    }

    pub fn origin_zyx(&self) -> [f64; 3] {
        reversed(self.offset)
    }

    /// Product of the declared dimensions.
    pub fn element_count(&self) -> Result<usize, VolumeLoaderError> {
        self.dim_size
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| malformed("DimSize", "element count overflows"))
    }
}

/// Swap between header (X, Y, Z) and grid (Z, Y, X) order.
#[inline]
pub fn reversed<T: Copy>(v: [T; 3]) -> [T; 3] {
    [v[2], v[1], v[0]]
}

fn malformed(field: &str, reason: impl Into<String>) -> VolumeLoaderError {
    VolumeLoaderError::MalformedHeader {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn required<'a>(fields: &'a HashMap<String, String>, key: &str) -> Result<&'a str, VolumeLoaderError> {
    fields
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| malformed(key, "missing"))
}

fn parse_scalar<T: FromStr>(key: &str, value: &str) -> Result<T, VolumeLoaderError> {
    value
        .parse()
        .map_err(|_| malformed(key, format!("cannot parse `{value}`")))
}

fn parse_values<T: FromStr>(key: &str, value: &str) -> Result<Vec<T>, VolumeLoaderError> {
    value
        .split_whitespace()
        .map(|token| parse_scalar(key, token))
        .collect()
}

fn parse_vec3<T: FromStr + Copy>(key: &str, value: &str) -> Result<[T; 3], VolumeLoaderError> {
    let values = parse_values::<T>(key, value)?;
    <[T; 3]>::try_from(values.as_slice())
        .map_err(|_| malformed(key, format!("expected 3 values, found {}", values.len())))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, VolumeLoaderError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(malformed(key, format!("expected True or False, found `{value}`")))
    }
}
