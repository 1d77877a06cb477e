use std::fs;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use regex::Regex;

use crate::domain::{IndexKind, Scene};
use crate::error::{EoError, Stage, TileError};
use crate::fs_util;
use crate::raster::{Raster, SampleType};

pub const REFLECTANCE_SCALE: f64 = 10_000.0;

static RED_BAND: LazyLock<Regex> = LazyLock::new(|| band_pattern("B04", "tiff?"));
static NIR_BAND: LazyLock<Regex> = LazyLock::new(|| band_pattern("B08", "tiff?"));
static RED_JP2: LazyLock<Regex> = LazyLock::new(|| band_pattern("B04", "jp2"));
static NIR_JP2: LazyLock<Regex> = LazyLock::new(|| band_pattern("B08", "jp2"));

fn band_pattern(band: &str, ext: &str) -> Regex {
    // `T32TQM_20240510T101559_B04.jp2`, `..._B04_10m.jp2`
    Regex::new(&format!(r"(?i)(^|_){band}(_\d+m)?\.{ext}$")).expect("band pattern is a valid regex")
}

pub fn ndvi(nir: f64, red: f64) -> f64 {
    let sum = nir + red;
    if sum == 0.0 {
        return f64::NAN;
    }
    (nir - red) / sum
}

pub fn bai(red: f64, nir: f64) -> f64 {
    let denom = (0.1 - red).powi(2) + (0.06 - nir).powi(2);
    if denom == 0.0 {
        return f64::NAN;
    }
    1.0 / denom
}

pub fn compute_raster(kind: IndexKind, red: &Raster, nir: &Raster) -> Result<Raster, EoError> {
    if red.shape() != nir.shape() {
        return Err(EoError::BandMismatch {
            red_rows: red.rows(),
            red_cols: red.cols(),
            nir_rows: nir.rows(),
            nir_cols: nir.cols(),
        });
    }
    let pixel: fn(f64, f64) -> f64 = match kind {
        IndexKind::Ndvi => |red: f64, nir: f64| ndvi(nir, red),
        IndexKind::Bai => |red: f64, nir: f64| bai(red, nir),
    };
    let data: Vec<f64> = red
        .data()
        .par_iter()
        .zip(nir.data().par_iter())
        .map(|(&r, &n)| {
            if r.is_nan() || n.is_nan() {
                f64::NAN
            } else {
                pixel(r, n)
            }
        })
        .collect();

    Ok(Raster::new(red.rows(), red.cols(), data)?.with_transform(red.transform()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandPaths {
    pub red: Utf8PathBuf,
    pub nir: Utf8PathBuf,
}

pub fn locate_bands(resource: &Utf8Path) -> Result<BandPaths, EoError> {
    if !resource.as_std_path().is_dir() {
        return Err(EoError::MissingBand(format!(
            "{resource} (not a directory)"
        )));
    }
    Ok(BandPaths {
        red: locate_band(resource, &RED_BAND, &RED_JP2, "B04")?,
        nir: locate_band(resource, &NIR_BAND, &NIR_JP2, "B08")?,
    })
}

fn locate_band(
    resource: &Utf8Path,
    pattern: &Regex,
    jp2: &Regex,
    name: &str,
) -> Result<Utf8PathBuf, EoError> {
    let found = fs_util::find_matching(resource.as_std_path(), pattern)
        .into_iter()
        .next()
        .or_else(|| {
            fs_util::find_matching(resource.as_std_path(), jp2)
                .into_iter()
                .next()
        });
    match found {
        Some(path) => Utf8PathBuf::from_path_buf(path)
            .map_err(|_| EoError::Filesystem("non-utf8 band path".to_string())),
        None => Err(EoError::MissingBand(format!("{name} under {resource}"))),
    }
}

fn read_reflectance(path: &Utf8Path) -> Result<Raster, EoError> {
    let decoded = Raster::read_band(path.as_std_path())?;
    match decoded.sample {
        SampleType::Float => Ok(decoded.raster),
        SampleType::Integer => {
            let raster = decoded.raster;
            let scaled = raster
                .data()
                .iter()
                .map(|&dn| dn / REFLECTANCE_SCALE)
                .collect();
            Ok(Raster::new(raster.rows(), raster.cols(), scaled)?
                .with_transform(raster.transform()))
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexResult<'s> {
    pub scene: &'s Scene,
    pub kind: IndexKind,
    pub raster_path: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct IndexCalculator {
    output_dir: Utf8PathBuf,
}

impl IndexCalculator {
    pub fn new(output_dir: Utf8PathBuf) -> Self {
        Self { output_dir }
    }

    pub fn raster_path(&self, scene: &Scene, kind: IndexKind) -> Utf8PathBuf {
        self.output_dir
            .join(format!("{}_{kind}.tif", scene.identifier))
    }

    pub fn compute<'s>(
        &self,
        scene: &'s Scene,
        resource: &Utf8Path,
        kind: IndexKind,
    ) -> Result<IndexResult<'s>, TileError> {
        self.compute_inner(scene, resource, kind)
            .map_err(|err| TileError::new(&scene.id, Stage::Compute, &err))
    }

    fn compute_inner<'s>(
        &self,
        scene: &'s Scene,
        resource: &Utf8Path,
        kind: IndexKind,
    ) -> Result<IndexResult<'s>, EoError> {
        let bands = locate_bands(resource)?;
        tracing::debug!(scene = %scene.id, red = %bands.red, nir = %bands.nir, "bands located");
        let red = read_reflectance(&bands.red)?;
        let nir = read_reflectance(&bands.nir)?;
        let index = compute_raster(kind, &red, &nir)?;

        fs::create_dir_all(self.output_dir.as_std_path())
            .map_err(|err| EoError::Filesystem(err.to_string()))?;
        let raster_path = self.raster_path(scene, kind);
        index.write_geotiff(raster_path.as_std_path())?;

        Ok(IndexResult {
            scene,
            kind,
            raster_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_patterns_follow_sentinel_naming() {
        assert!(RED_BAND.is_match("T32TQM_20240510T101559_B04.tif"));
        assert!(RED_BAND.is_match("T32TQM_20240510T101559_B04_10m.TIF"));
        assert!(RED_BAND.is_match("B04.tiff"));
        assert!(!RED_BAND.is_match("T32TQM_20240510T101559_B8A.tif"));
        assert!(!NIR_BAND.is_match("T32TQM_20240510T101559_B08.jp2"));
        assert!(NIR_JP2.is_match("T32TQM_20240510T101559_B08.jp2"));
        assert!(RED_JP2.is_match("T32TQM_20240510T101559_B04_10m.jp2"));
        assert!(!RED_JP2.is_match("T32TQM_20240510T101559_TCI_10m.jp2"));
    }

    #[test]
    fn ndvi_is_nan_only_for_an_exact_zero_sum() {
        assert!(ndvi(0.0, 0.0).is_nan());
        assert!(ndvi(-0.25, 0.25).is_nan());
        let tiny = ndvi(1e-12, 1e-12);
        assert_eq!(tiny, 0.0);
        assert!((ndvi(3e-12, 1e-12) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn mismatched_bands_are_rejected() {
        let red = Raster::new(1, 2, vec![0.1, 0.2]).unwrap();
        let nir = Raster::new(2, 1, vec![0.1, 0.2]).unwrap();
        assert!(matches!(
            compute_raster(IndexKind::Ndvi, &red, &nir),
            Err(EoError::BandMismatch { .. })
        ));
    }
}
