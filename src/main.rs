use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use luna_volume::{AnnotationTable, HuWindow, VolumeLoader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "luna-volume")]
#[command(about = "Load a LUNA16 scan and locate its annotated nodules")]
struct Args {
    /// MetaImage header of the scan (`<seriesuid>.mhd`)
    scan: PathBuf,

    /// LUNA16 `annotations.csv`
    annotations: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let header = &args.scan;

    let volume = match VolumeLoader::load(header) {
        Ok(volume) => volume,
        Err(err) => {
            error!("failed to load {}: {err}", header.display());
            return ExitCode::FAILURE;
        }
    };
    info!(
        shape = ?volume.dim(),
        origin = ?volume.origin(),
        spacing = ?volume.spacing(),
        element_type = volume.element_type().met_name(),
        "loaded volume"
    );

    let Some(csv) = &args.annotations else {
        return ExitCode::SUCCESS;
    };
    let table = match AnnotationTable::from_csv_path(csv) {
        Ok(table) => table,
        Err(err) => {
            error!("failed to read {}: {err}", csv.display());
            return ExitCode::FAILURE;
        }
    };

    // LUNA16 names each scan after its series UID.
    let seriesuid = header
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let normalized = volume.normalized(&HuWindow::LUNG);
    for nodule in table.for_series(seriesuid) {
        let voxel = nodule.voxel_center(volume.geometry());
        match voxel.to_index(volume.dim()) {
            Some(index) => info!(
                voxel = ?voxel.0,
                diameter_mm = nodule.diameter_mm,
                hu = ?volume.get(&voxel),
                normalized = normalized[index],
                "nodule"
            ),
            None => warn!(voxel = ?voxel.0, "nodule center outside the scan, skipped"),
        }
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let args = Args::try_parse_from(["luna-volume", "subset0/1.3.6.mhd", "annotations.csv"]).unwrap();
        assert_eq!(args.scan, PathBuf::from("subset0/1.3.6.mhd"));
        assert_eq!(args.annotations, Some(PathBuf::from("annotations.csv")));

        let args = Args::try_parse_from(["luna-volume", "scan.mhd"]).unwrap();
        assert_eq!(args.annotations, None);

        assert!(Args::try_parse_from(["luna-volume"]).is_err());
    }
}
