use std::path::Path;

use gdal::Dataset;

use crate::error::EoError;
use crate::raster::{DecodedRaster, GeoTransform, Raster, SampleType};

pub fn read_band(path: &Path) -> Result<DecodedRaster, EoError> {
    let dataset = Dataset::open(path)
        .map_err(|err| EoError::Raster(format!("open {}: {err}", path.display())))?;
    let band = dataset
        .rasterband(1)
        .map_err(|err| EoError::Raster(format!("{}: band 1: {err}", path.display())))?;
    let sample = if band.band_type().is_integer() {
        SampleType::Integer
    } else {
        SampleType::Float
    };

    let (cols, rows) = dataset.raster_size();
    let buffer = band
        .read_as::<f64>((0, 0), (cols, rows), (cols, rows), None)
        .map_err(|err| EoError::Raster(format!("{}: read: {err}", path.display())))?;
    let (_, data) = buffer.into_shape_and_vec();

    let transform = dataset.geo_transform().ok().map(|gt| GeoTransform {
        origin_x: gt[0],
        pixel_width: gt[1],
        origin_y: gt[3],
        pixel_height: gt[5],
    });
    let raster = Raster::new(rows, cols, data)?.with_transform(transform);
    Ok(DecodedRaster { raster, sample })
}

#[cfg(test)]
mod tests {
    use gdal::DriverManager;
    use gdal::raster::{Buffer, RasterCreationOptions};

    use super::*;

    #[test]
    fn jp2_band_keeps_integer_samples_and_transform() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("T32TQM_B04_10m.jp2");
        let values: Vec<u16> = (0..256).map(|i| i * 10).collect();

        let mem = DriverManager::get_driver_by_name("MEM").unwrap();
        let mut source = mem.create_with_band_type::<u16, _>("", 16, 16, 1).unwrap();
        source
            .set_geo_transform(&[600000.0, 10.0, 0.0, 5100000.0, 0.0, -10.0])
            .unwrap();
        source
            .rasterband(1)
            .unwrap()
            .write((0, 0), (16, 16), &mut Buffer::new((16, 16), values.clone()))
            .unwrap();
        let jp2 = DriverManager::get_driver_by_name("JP2OpenJPEG").unwrap();
        let options = RasterCreationOptions::from_iter(["REVERSIBLE=YES", "QUALITY=100"]);
        source.create_copy(&jp2, &path, &options).unwrap();

        let decoded = read_band(&path).unwrap();
        assert_eq!(decoded.sample, SampleType::Integer);
        assert_eq!(decoded.raster.shape(), (16, 16));
        assert_eq!(decoded.raster.get(1, 2), Some(180.0));
        assert_eq!(
            decoded.raster.transform().map(|gt| gt.pixel_width),
            Some(10.0)
        );
    }
}
