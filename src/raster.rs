use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use serde::Serialize;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::TiffEncoder;
use tiff::encoder::colortype::Gray32Float;
use tiff::tags::Tag;

use crate::error::EoError;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;

// A 10980x10980 float64 band is just under 1 GiB.
const MAX_DECODE_BYTES: usize = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
    transform: Option<GeoTransform>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    Integer,
    Float,
}

#[derive(Debug, Clone)]
pub struct DecodedRaster {
    pub raster: Raster,
    pub sample: SampleType,
}

impl Raster {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, EoError> {
        if data.len() != rows * cols {
            return Err(EoError::Raster(format!(
                "expected {} samples for {rows}x{cols}, got {}",
                rows * cols,
                data.len()
            )));
        }
        Ok(Self {
            rows,
            cols,
            data,
            transform: None,
        })
    }

    pub fn with_transform(mut self, transform: Option<GeoTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn transform(&self) -> Option<GeoTransform> {
        self.transform
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.data.get(row * self.cols + col).copied()
    }

    pub fn finite_range(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    pub fn read_band(path: &Path) -> Result<DecodedRaster, EoError> {
        let is_jp2 = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("jp2"));
        if is_jp2 {
            read_jp2(path)
        } else {
            Self::read_geotiff(path)
        }
    }

    pub fn read_geotiff(path: &Path) -> Result<DecodedRaster, EoError> {
        let file = File::open(path)
            .map_err(|err| EoError::Raster(format!("open {}: {err}", path.display())))?;
        decode(file)
    }

    pub fn write_geotiff(&self, path: &Path) -> Result<(), EoError> {
        let file = File::create(path)
            .map_err(|err| EoError::Raster(format!("create {}: {err}", path.display())))?;
        let mut writer = BufWriter::new(file);
        encode(self, &mut writer)?;
        writer
            .flush()
            .map_err(|err| EoError::Raster(err.to_string()))
    }
}

#[cfg(feature = "gdal")]
fn read_jp2(path: &Path) -> Result<DecodedRaster, EoError> {
    crate::gdal_io::read_band(path)
}

#[cfg(not(feature = "gdal"))]
fn read_jp2(path: &Path) -> Result<DecodedRaster, EoError> {
    Err(EoError::Raster(format!(
        "{}: JPEG 2000 bands require building with the `gdal` feature",
        path.display()
    )))
}

fn decode<R: Read + Seek>(reader: R) -> Result<DecodedRaster, EoError> {
    let mut limits = Limits::default();
    limits.decoding_buffer_size = MAX_DECODE_BYTES;
    let mut decoder = Decoder::new(reader)
        .map_err(|err| EoError::Raster(format!("TIFF decode error: {err}")))?
        .with_limits(limits);

    let (width, height) = decoder
        .dimensions()
        .map_err(|err| EoError::Raster(format!("cannot read dimensions: {err}")))?;
    let (rows, cols) = (height as usize, width as usize);

    let (data, sample): (Vec<f64>, SampleType) = match decoder
        .read_image()
        .map_err(|err| EoError::Raster(format!("cannot read image data: {err}")))?
    {
        DecodingResult::U8(buf) => (buf.into_iter().map(f64::from).collect(), SampleType::Integer),
        DecodingResult::U16(buf) => (buf.into_iter().map(f64::from).collect(), SampleType::Integer),
        DecodingResult::U32(buf) => (buf.into_iter().map(f64::from).collect(), SampleType::Integer),
        DecodingResult::I8(buf) => (buf.into_iter().map(f64::from).collect(), SampleType::Integer),
        DecodingResult::I16(buf) => (buf.into_iter().map(f64::from).collect(), SampleType::Integer),
        DecodingResult::I32(buf) => (buf.into_iter().map(f64::from).collect(), SampleType::Integer),
        DecodingResult::F32(buf) => (buf.into_iter().map(f64::from).collect(), SampleType::Float),
        DecodingResult::F64(buf) => (buf, SampleType::Float),
        _ => {
            return Err(EoError::Raster("unsupported TIFF sample format".to_string()));
        }
    };

    let transform = read_transform(&mut decoder);
    let raster = Raster::new(rows, cols, data)?.with_transform(transform);
    Ok(DecodedRaster { raster, sample })
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))
        .ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT)).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    Some(GeoTransform {
        origin_x: tiepoint[3] - tiepoint[0] * scale[0],
        origin_y: tiepoint[4] + tiepoint[1] * scale[1],
        pixel_width: scale[0],
        pixel_height: -scale[1],
    })
}

fn encode<W: Write + Seek>(raster: &Raster, writer: W) -> Result<(), EoError> {
    let mut encoder =
        TiffEncoder::new(writer).map_err(|err| EoError::Raster(format!("TIFF encoder: {err}")))?;
    let data: Vec<f32> = raster.data.iter().map(|&v| v as f32).collect();

    let mut image = encoder
        .new_image::<Gray32Float>(raster.cols as u32, raster.rows as u32)
        .map_err(|err| EoError::Raster(format!("cannot create TIFF image: {err}")))?;

    if let Some(gt) = raster.transform {
        let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
        image
            .encoder()
            .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])
            .map_err(|err| EoError::Raster(format!("cannot write scale tag: {err}")))?;
        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        image
            .encoder()
            .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
            .map_err(|err| EoError::Raster(format!("cannot write tiepoint tag: {err}")))?;
        let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 1, 1025, 0, 1, 1];
        image
            .encoder()
            .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geokeys[..])
            .map_err(|err| EoError::Raster(format!("cannot write geokey tag: {err}")))?;
    }

    image
        .write_data(&data)
        .map_err(|err| EoError::Raster(format!("cannot write image data: {err}")))
}
