#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Mutex;

use camino::Utf8PathBuf;
use tiff::encoder::TiffEncoder;
use tiff::encoder::colortype::Gray16;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use eo_indices::catalog::{CatalogClient, QueryRequest, Session};
use eo_indices::domain::{Credentials, Scene};
use eo_indices::error::EoError;

pub fn utf8(path: &Path) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path.to_path_buf()).unwrap()
}

pub fn band_tiff(cols: u32, rows: u32, values: &[u16]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    TiffEncoder::new(&mut cursor)
        .unwrap()
        .write_image::<Gray16>(cols, rows, values)
        .unwrap();
    cursor.into_inner()
}

pub fn write_band(path: &Path, cols: u32, rows: u32, values: &[u16]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, band_tiff(cols, rows, values)).unwrap();
}

#[cfg(feature = "gdal")]
pub fn write_jp2_band(path: &Path, cols: usize, rows: usize, values: &[u16]) {
    use gdal::DriverManager;
    use gdal::raster::{Buffer, RasterCreationOptions};

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mem = DriverManager::get_driver_by_name("MEM").unwrap();
    let source = mem.create_with_band_type::<u16, _>("", cols, rows, 1).unwrap();
    source
        .rasterband(1)
        .unwrap()
        .write((0, 0), (cols, rows), &mut Buffer::new((cols, rows), values.to_vec()))
        .unwrap();
    let jp2 = DriverManager::get_driver_by_name("JP2OpenJPEG").unwrap();
    let options = RasterCreationOptions::from_iter(["REVERSIBLE=YES", "QUALITY=100"]);
    source.create_copy(&jp2, path, &options).unwrap();
}

pub fn safe_zip(filename: &str, red: &[u16], nir: &[u16]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default();
        let img = format!("{filename}/GRANULE/L1C_T32TQM/IMG_DATA");
        zip.start_file(format!("{img}/T32TQM_20240510_B04.tif"), options)
            .unwrap();
        zip.write_all(&band_tiff(2, 2, red)).unwrap();
        zip.start_file(format!("{img}/T32TQM_20240510_B08.tif"), options)
            .unwrap();
        zip.write_all(&band_tiff(2, 2, nir)).unwrap();
        zip.start_file(format!("{filename}/manifest.safe"), options)
            .unwrap();
        zip.write_all(b"<xfdu/>").unwrap();
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

pub fn scene(id: &str) -> Scene {
    let identifier = format!("S2A_MSIL1C_{id}");
    let filename = format!("{identifier}.SAFE");
    Scene::new(id, identifier, filename)
}

pub fn credentials() -> Credentials {
    Credentials {
        username: "user".to_string(),
        password: "secret".to_string(),
    }
}

#[derive(Default)]
pub struct MockCatalog {
    pub scenes: Vec<Scene>,
    pub archives: HashMap<String, Vec<u8>>,
    pub failing_downloads: HashSet<String>,
    pub reject_auth: bool,
    pub auth_calls: Mutex<usize>,
    pub query_calls: Mutex<usize>,
    pub download_calls: Mutex<usize>,
}

impl MockCatalog {
    pub fn with_scenes(ids: &[&str]) -> Self {
        let mut mock = Self::default();
        for id in ids {
            let scene = scene(id);
            mock.archives.insert(
                scene.id.clone(),
                safe_zip(&scene.filename, &[1000, 2000, 0, 500], &[3000, 2000, 0, 1500]),
            );
            mock.scenes.push(scene);
        }
        mock
    }

    pub fn downloads(&self) -> usize {
        *self.download_calls.lock().unwrap()
    }

    pub fn queries(&self) -> usize {
        *self.query_calls.lock().unwrap()
    }
}

impl CatalogClient for MockCatalog {
    fn authenticate(&self, credentials: &Credentials) -> Result<Session, EoError> {
        *self.auth_calls.lock().unwrap() += 1;
        if self.reject_auth {
            return Err(EoError::Auth("invalid_grant".to_string()));
        }
        Ok(Session {
            username: credentials.username.clone(),
            access_token: "token".to_string(),
        })
    }

    fn query(
        &self,
        _session: &Session,
        _request: &QueryRequest,
    ) -> Result<std::collections::BTreeMap<String, Scene>, EoError> {
        *self.query_calls.lock().unwrap() += 1;
        Ok(self
            .scenes
            .iter()
            .map(|scene| (scene.id.clone(), scene.clone()))
            .collect())
    }

    fn download(
        &self,
        _session: &Session,
        scene: &Scene,
        destination: &Path,
    ) -> Result<(), EoError> {
        *self.download_calls.lock().unwrap() += 1;
        if self.failing_downloads.contains(&scene.id) {
            return Err(EoError::Download("connection reset".to_string()));
        }
        let bytes = self
            .archives
            .get(&scene.id)
            .ok_or_else(|| EoError::Download(format!("no archive for {}", scene.id)))?;
        std::fs::write(destination, bytes).map_err(|err| EoError::Download(err.to_string()))
    }
}
