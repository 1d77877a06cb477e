use std::fs::{self, File};
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::EoError;
use crate::runlog::RunLog;

pub const PLACEHOLDER_PREVIEW: &str = "dummy.png";

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
    pub path: Utf8PathBuf,
    pub members: Vec<String>,
    pub skipped: Vec<String>,
}

pub fn bundle(
    paths: &[Utf8PathBuf],
    destination: &Utf8Path,
    log: &RunLog,
) -> Result<ArchiveSummary, EoError> {
    let parent = destination
        .parent()
        .ok_or_else(|| EoError::Archive(format!("invalid destination {destination}")))?;
    fs::create_dir_all(parent.as_std_path()).map_err(|err| EoError::Archive(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix(".eo-archive")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| EoError::Archive(err.to_string()))?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(temp.as_file());
    let mut members = Vec::new();
    let mut skipped = Vec::new();

    for path in paths {
        let Some(name) = path.file_name() else {
            log.warn(&format!("archive: skipping {path} (no file name)"));
            skipped.push(path.to_string());
            continue;
        };
        if members.iter().any(|member| member == name) {
            log.warn(&format!("archive: skipping duplicate member {name}"));
            skipped.push(path.to_string());
            continue;
        }
        let mut source = match File::open(path.as_std_path()) {
            Ok(file) => file,
            Err(err) => {
                log.warn(&format!("archive: skipping {path}: {err}"));
                skipped.push(path.to_string());
                continue;
            }
        };
        zip.start_file(name, options)
            .map_err(|err| EoError::Archive(err.to_string()))?;
        io::copy(&mut source, &mut zip).map_err(|err| EoError::Archive(err.to_string()))?;
        members.push(name.to_string());
    }

    zip.finish()
        .map_err(|err| EoError::Archive(err.to_string()))?;
    temp.persist(destination.as_std_path())
        .map_err(|err| EoError::Archive(err.to_string()))?;

    log.info(&format!(
        "archive {destination}: {} member(s), {} skipped",
        members.len(),
        skipped.len()
    ));
    Ok(ArchiveSummary {
        path: destination.to_path_buf(),
        members,
        skipped,
    })
}

pub fn select_preview(paths: &[Utf8PathBuf]) -> Utf8PathBuf {
    paths
        .iter()
        .find(|path| !path.as_str().is_empty())
        .cloned()
        .unwrap_or_else(|| Utf8PathBuf::from(PLACEHOLDER_PREVIEW))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_skips_empty_paths() {
        let paths = vec![Utf8PathBuf::new(), Utf8PathBuf::from("out/A_NDVI.png")];
        assert_eq!(select_preview(&paths), Utf8PathBuf::from("out/A_NDVI.png"));
        assert_eq!(select_preview(&[]), Utf8PathBuf::from(PLACEHOLDER_PREVIEW));
    }
}
