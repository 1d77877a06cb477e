use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum EoError {
    #[error("invalid bounding box: {0}")]
    InvalidBbox(String),

    #[error("invalid cloud cover (expected one of 0,10,...,100): {0}")]
    InvalidCloudCover(String),

    #[error("invalid index kind: {0}")]
    InvalidIndex(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("invalid image format: {0}")]
    InvalidImageFormat(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("catalog rejected credentials: {0}")]
    #[diagnostic(help("check the catalog username and password"))]
    Auth(String),

    #[error("catalog query failed: {0}")]
    Query(String),

    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("download failed: {0}")]
    Download(String),

    #[error("extraction failed: {0}")]
    Extract(String),

    #[error("band not found in {0}")]
    MissingBand(String),

    #[error("band size mismatch: red {red_rows}x{red_cols}, nir {nir_rows}x{nir_cols}")]
    BandMismatch {
        red_rows: usize,
        red_cols: usize,
        nir_rows: usize,
        nir_cols: usize,
    },

    #[error("raster error: {0}")]
    Raster(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("archive failed: {0}")]
    Archive(String),

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Download,
    Extract,
    Compute,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Download => write!(f, "download"),
            Stage::Extract => write!(f, "extract"),
            Stage::Compute => write!(f, "compute"),
            Stage::Render => write!(f, "render"),
        }
    }
}

#[derive(Debug, Clone, Error, Serialize)]
#[error("{stage} failed for scene {scene_id}: {detail}")]
pub struct TileError {
    pub scene_id: String,
    pub stage: Stage,
    pub detail: String,
}

impl TileError {
    pub fn new(scene_id: impl Into<String>, stage: Stage, source: &EoError) -> Self {
        Self {
            scene_id: scene_id.into(),
            stage,
            detail: source.to_string(),
        }
    }
}
