use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use zip::ZipArchive;

use crate::error::EoError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZipStats {
    pub files: usize,
    pub bytes: u64,
}

fn open_archive(zip_path: &Path) -> Result<ZipArchive<File>, EoError> {
    let file = File::open(zip_path)
        .map_err(|err| EoError::Extract(format!("open zip {}: {err}", zip_path.display())))?;
    ZipArchive::new(file)
        .map_err(|err| EoError::Extract(format!("{}: {err}", zip_path.display())))
}

fn for_each_file<F>(zip_path: &Path, mut visit: F) -> Result<ZipStats, EoError>
where
    F: FnMut(&str, Option<PathBuf>, &mut dyn io::Read) -> Result<u64, EoError>,
{
    let mut archive = open_archive(zip_path)?;
    let mut stats = ZipStats::default();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| EoError::Extract(format!("entry {i}: {err}")))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let enclosed = entry.enclosed_name().map(|path| path.to_path_buf());
        stats.bytes += visit(&name, enclosed, &mut entry)?;
        stats.files += 1;
    }
    if stats.files == 0 {
        return Err(EoError::Extract(format!(
            "{} contains no files",
            zip_path.display()
        )));
    }
    Ok(stats)
}

pub fn validate_zip(zip_path: &Path) -> Result<ZipStats, EoError> {
    for_each_file(zip_path, |name, _, reader| {
        io::copy(reader, &mut io::sink()).map_err(|err| EoError::Extract(format!("{name}: {err}")))
    })
}

pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<ZipStats, EoError> {
    for_each_file(zip_path, |name, enclosed, reader| {
        let relative = enclosed.ok_or_else(|| {
            EoError::Extract(format!("entry {name} escapes the target directory"))
        })?;
        let entry_path = target_dir.join(relative);
        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| EoError::Extract(err.to_string()))?;
        }
        let mut outfile =
            File::create(&entry_path).map_err(|err| EoError::Extract(err.to_string()))?;
        io::copy(reader, &mut outfile).map_err(|err| EoError::Extract(err.to_string()))
    })
}

pub fn find_matching(root: &Path, pattern: &Regex) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let Ok(entries) = fs::read_dir(&path) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.is_match(name))
            {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}
