use std::fs::{self, File};
use std::io::Write;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{EoError, TileError};

#[derive(Debug)]
pub struct RunLog {
    run_id: String,
    path: Utf8PathBuf,
    file: Mutex<File>,
}

impl RunLog {
    pub fn create(path: &Utf8Path, run_id: impl Into<String>) -> Result<Self, EoError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| EoError::Filesystem(err.to_string()))?;
        }
        let file =
            File::create(path.as_std_path()).map_err(|err| EoError::Filesystem(err.to_string()))?;
        Ok(Self {
            run_id: run_id.into(),
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn debug(&self, message: &str) {
        tracing::debug!(run_id = %self.run_id, "{message}");
        self.append("DEBUG", message);
    }

    pub fn info(&self, message: &str) {
        tracing::info!(run_id = %self.run_id, "{message}");
        self.append("INFO", message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(run_id = %self.run_id, "{message}");
        self.append("WARN", message);
    }

    pub fn error(&self, message: &str) {
        tracing::error!(run_id = %self.run_id, "{message}");
        self.append("ERROR", message);
    }

    pub fn scene(&self, scene_id: &str, message: &str) {
        tracing::debug!(run_id = %self.run_id, scene = %scene_id, "{message}");
        self.append("DEBUG", &format!("scene={scene_id} {message}"));
    }

    pub fn tile_error(&self, err: &TileError) {
        tracing::warn!(
            run_id = %self.run_id,
            scene = %err.scene_id,
            stage = %err.stage,
            "{}",
            err.detail
        );
        self.append(
            "WARN",
            &format!(
                "scene={} stage={} {}",
                err.scene_id, err.stage, err.detail
            ),
        );
    }

    fn append(&self, level: &str, message: &str) {
        let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{stamp} {level:<5} {message}");
        }
    }
}
