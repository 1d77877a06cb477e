use camino::Utf8PathBuf;
use image::{DynamicImage, RgbaImage};

use crate::domain::{ImageFormat, IndexKind};
use crate::error::{EoError, Stage, TileError};
use crate::index::IndexResult;
use crate::raster::Raster;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColorStop {
    pub t: f64,
    pub color: Rgb,
}

impl ColorStop {
    pub const fn new(t: f64, r: u8, g: u8, b: u8) -> Self {
        Self {
            t,
            color: Rgb::new(r, g, b),
        }
    }
}

const NDVI_STOPS: &[ColorStop] = &[
    ColorStop::new(0.0, 120, 70, 20),
    ColorStop::new(0.3, 200, 170, 60),
    ColorStop::new(0.5, 240, 230, 100),
    ColorStop::new(0.7, 100, 180, 50),
    ColorStop::new(1.0, 10, 100, 20),
];

const BURN_STOPS: &[ColorStop] = &[
    ColorStop::new(0.00, 255, 255, 204),
    ColorStop::new(0.25, 254, 178, 76),
    ColorStop::new(0.50, 240, 59, 32),
    ColorStop::new(0.75, 150, 0, 38),
    ColorStop::new(1.00, 40, 20, 20),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Stretch {
    Fixed(f64, f64),
    Auto,
}

#[derive(Debug, Clone, Copy)]
pub struct ColorScheme {
    pub name: &'static str,
    pub stops: &'static [ColorStop],
    pub stretch: Stretch,
}

pub fn color_scheme(kind: IndexKind) -> ColorScheme {
    match kind {
        IndexKind::Ndvi => ColorScheme {
            name: "ndvi",
            stops: NDVI_STOPS,
            stretch: Stretch::Fixed(-1.0, 1.0),
        },
        IndexKind::Bai => ColorScheme {
            name: "burn",
            stops: BURN_STOPS,
            stretch: Stretch::Auto,
        },
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

fn multi_stop(stops: &[ColorStop], t: f64) -> Rgb {
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return Rgb::new(0, 0, 0);
    };
    if t <= first.t {
        return first.color;
    }
    if t >= last.t {
        return last.color;
    }
    for pair in stops.windows(2) {
        let (lo, hi) = (pair[0], pair[1]);
        if t <= hi.t {
            let ratio = (t - lo.t) / (hi.t - lo.t);
            return lerp_color(lo.color, hi.color, ratio);
        }
    }
    last.color
}

impl ColorScheme {
    pub fn evaluate(&self, t: f64) -> Rgb {
        multi_stop(self.stops, t)
    }

    pub fn colorize(&self, raster: &Raster) -> Vec<u8> {
        let (lo, hi) = match self.stretch {
            Stretch::Fixed(lo, hi) => (lo, hi),
            Stretch::Auto => raster.finite_range().unwrap_or((0.0, 1.0)),
        };
        let span = hi - lo;
        let mut out = Vec::with_capacity(raster.data().len() * 4);
        for &value in raster.data() {
            if !value.is_finite() {
                out.extend_from_slice(&[0, 0, 0, 0]);
                continue;
            }
            let t = if span > 0.0 { (value - lo) / span } else { 0.5 };
            let c = self.evaluate(t);
            out.extend_from_slice(&[c.r, c.g, c.b, 255]);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct RenderResult<'s> {
    pub index: IndexResult<'s>,
    pub image_path: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct Renderer {
    output_dir: Utf8PathBuf,
}

impl Renderer {
    pub fn new(output_dir: Utf8PathBuf) -> Self {
        Self { output_dir }
    }

    pub fn image_path(&self, index: &IndexResult<'_>, format: ImageFormat) -> Utf8PathBuf {
        self.output_dir.join(format!(
            "{}_{}.{}",
            index.scene.identifier,
            index.kind,
            format.extension()
        ))
    }

    pub fn render<'s>(
        &self,
        index: IndexResult<'s>,
        format: ImageFormat,
    ) -> Result<RenderResult<'s>, TileError> {
        match self.render_inner(&index, format) {
            Ok(image_path) => Ok(RenderResult { index, image_path }),
            Err(err) => Err(TileError::new(&index.scene.id, Stage::Render, &err)),
        }
    }

    fn render_inner(
        &self,
        index: &IndexResult<'_>,
        format: ImageFormat,
    ) -> Result<Utf8PathBuf, EoError> {
        let decoded = Raster::read_geotiff(index.raster_path.as_std_path())?;
        let raster = decoded.raster;
        let scheme = color_scheme(index.kind);
        let pixels = scheme.colorize(&raster);

        let width = u32::try_from(raster.cols())
            .map_err(|_| EoError::Render("raster too wide".to_string()))?;
        let height = u32::try_from(raster.rows())
            .map_err(|_| EoError::Render("raster too tall".to_string()))?;
        let rgba = RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| EoError::Render("pixel buffer does not match raster".to_string()))?;

        std::fs::create_dir_all(self.output_dir.as_std_path())
            .map_err(|err| EoError::Filesystem(err.to_string()))?;
        let image_path = self.image_path(index, format);
        let result = match format {
            ImageFormat::Png => rgba.save_with_format(image_path.as_std_path(), image::ImageFormat::Png),
            ImageFormat::Jpeg => DynamicImage::ImageRgba8(rgba)
                .to_rgb8()
                .save_with_format(image_path.as_std_path(), image::ImageFormat::Jpeg),
        };
        result.map_err(|err| EoError::Render(format!("{image_path}: {err}")))?;

        tracing::debug!(scene = %index.scene.id, scheme = scheme.name, path = %image_path, "rendered");
        Ok(image_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_endpoints_and_midpoints() {
        let scheme = color_scheme(IndexKind::Ndvi);
        assert_eq!(scheme.evaluate(-0.5), Rgb::new(120, 70, 20));
        assert_eq!(scheme.evaluate(1.5), Rgb::new(10, 100, 20));
        assert_eq!(scheme.evaluate(0.5), Rgb::new(240, 230, 100));
    }

    #[test]
    fn nan_pixels_are_transparent() {
        let raster = Raster::new(1, 2, vec![f64::NAN, 1.0]).unwrap();
        let pixels = color_scheme(IndexKind::Ndvi).colorize(&raster);
        assert_eq!(&pixels[..4], &[0, 0, 0, 0]);
        assert_eq!(&pixels[4..], &[10, 100, 20, 255]);
    }

    #[test]
    fn bai_stretches_over_finite_range() {
        let raster = Raster::new(1, 3, vec![2.0, f64::INFINITY, 4.0]).unwrap();
        let pixels = color_scheme(IndexKind::Bai).colorize(&raster);
        assert_eq!(&pixels[..4], &[255, 255, 204, 255]);
        assert_eq!(&pixels[4..8], &[0, 0, 0, 0]);
        assert_eq!(&pixels[8..], &[40, 20, 20, 255]);
    }
}
