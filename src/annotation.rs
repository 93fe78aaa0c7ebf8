//! Nodule annotations in the LUNA16 `annotations.csv` layout.
//!
//! The table stores centers in X, Y, Z order (the header-native order), while
//! every transform in this crate expects depth-first points. Conversion goes
//! through [`Annotation::center_zyx`] so the reordering is visible at the call
//! site.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::geometry::{Geometry, PhysicalPoint, VoxelCoordinate};
use crate::meta_header::reversed;

const COLUMNS: [&str; 5] = ["seriesuid", "coordX", "coordY", "coordZ", "diameter_mm"];

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("annotation table has no `{0}` column")]
    MissingColumn(String),

    #[error("line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Annotation {
    pub seriesuid: String,
    /// Center in millimeters, X, Y, Z order.
    pub coord_xyz: [f64; 3],
    pub diameter_mm: f64,
}

impl Annotation {
    /// Center in millimeters, (depth, height, width) order.
    pub fn center_zyx(&self) -> PhysicalPoint {
        reversed(self.coord_xyz)
    }

    /// Nearest voxel to the center. May lie outside the scanned grid.
    pub fn voxel_center(&self, geometry: &Geometry) -> VoxelCoordinate {
        geometry.to_voxel(&self.center_zyx())
    }

    pub fn radius_mm(&self) -> f64 {
        self.diameter_mm / 2.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationTable {
    rows: Vec<Annotation>,
}

impl AnnotationTable {
    pub fn new(rows: Vec<Annotation>) -> Self {
        Self { rows }
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, AnnotationError> {
        let file = File::open(path.as_ref())?;
        let table = Self::from_reader(BufReader::new(file))?;
        debug!(path = %path.as_ref().display(), rows = table.len(), "loaded annotations");
        Ok(table)
    }

    /// Read comma separated rows. The first non-empty line names the
    /// columns; extra columns are ignored.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, AnnotationError> {
        let mut lines = reader.lines().enumerate();

        let columns = loop {
            match lines.next() {
                Some((_, line)) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break Self::column_positions(&line)?;
                    }
                }
                None => return Err(AnnotationError::MissingColumn(COLUMNS[0].to_string())),
            }
        };

        let mut rows = Vec::new();
        for (index, line) in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            rows.push(Self::parse_row(index + 1, &line, &columns)?);
        }
        Ok(Self { rows })
    }

    fn column_positions(header: &str) -> Result<[usize; 5], AnnotationError> {
        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        let mut positions = [0usize; 5];
        for (slot, column) in positions.iter_mut().zip(COLUMNS) {
            *slot = names
                .iter()
                .position(|name| *name == column)
                .ok_or_else(|| AnnotationError::MissingColumn(column.to_string()))?;
        }
        Ok(positions)
    }

    fn parse_row(line_no: usize, line: &str, columns: &[usize; 5]) -> Result<Annotation, AnnotationError> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let field = |i: usize| {
            fields.get(columns[i]).copied().ok_or_else(|| AnnotationError::MalformedRow {
                line: line_no,
                reason: format!("missing `{}`", COLUMNS[i]),
            })
        };
        let number = |i: usize| -> Result<f64, AnnotationError> {
            let raw = field(i)?;
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| AnnotationError::MalformedRow {
                    line: line_no,
                    reason: format!("`{}` is not a number: `{raw}`", COLUMNS[i]),
                })
        };

        let seriesuid = field(0)?;
        if seriesuid.is_empty() {
            return Err(AnnotationError::MalformedRow {
                line: line_no,
                reason: "empty seriesuid".to_string(),
            });
        }
        let diameter_mm = number(4)?;
        if diameter_mm < 0.0 {
            return Err(AnnotationError::MalformedRow {
                line: line_no,
                reason: format!("negative diameter {diameter_mm}"),
            });
        }

        Ok(Annotation {
            seriesuid: seriesuid.to_string(),
            coord_xyz: [number(1)?, number(2)?, number(3)?],
            diameter_mm,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.rows.iter()
    }

    /// Annotations of a single scan, in table order.
    pub fn for_series<'a>(&'a self, seriesuid: &'a str) -> impl Iterator<Item = &'a Annotation> + 'a {
        self.rows.iter().filter(move |a| a.seriesuid == seriesuid)
    }
}
