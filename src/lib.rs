pub mod archive;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod fs_util;
#[cfg(feature = "gdal")]
pub mod gdal_io;
pub mod index;
pub mod lifecycle;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod raster;
pub mod render;
pub mod runlog;
pub mod store;
pub mod tui;
