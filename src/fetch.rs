use camino::{Utf8Path, Utf8PathBuf};

use crate::catalog::{CatalogClient, Session};
use crate::domain::Scene;
use crate::error::{EoError, Stage, TileError};
use crate::fs_util::{ZipStats, extract_zip, validate_zip};
use crate::lifecycle::{SceneLifecycle, SceneState};
use crate::runlog::RunLog;
use crate::store::{CacheStore, TEMP_PREFIX, atomic_rename_dir};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub resource: Utf8PathBuf,
    pub downloaded: bool,
    pub extracted: bool,
}

pub struct Fetcher<'a, C: CatalogClient + ?Sized> {
    store: &'a CacheStore,
    client: &'a C,
    session: &'a Session,
}

impl<'a, C: CatalogClient + ?Sized> Fetcher<'a, C> {
    pub fn new(store: &'a CacheStore, client: &'a C, session: &'a Session) -> Self {
        Self {
            store,
            client,
            session,
        }
    }

    pub fn fetch(
        &self,
        scene: &Scene,
        lifecycle: &mut SceneLifecycle,
        log: &RunLog,
    ) -> Result<FetchResult, TileError> {
        let locks = self.store.scene_locks(scene);
        let _guard = locks.acquire();

        let entry = self.store.entry(scene);
        let archive_cached = self.store.archive_exists(scene);
        let extracted_cached = self.store.extracted_exists(scene);

        let downloaded = if archive_cached {
            lifecycle.advance(SceneState::Cached);
            log.scene(&scene.id, &format!("archive cached at {}", entry.archive_path));
            false
        } else {
            lifecycle.advance(SceneState::Downloading);
            if let Err(err) = self.download(scene, &entry.archive_path) {
                lifecycle.fail(Stage::Download);
                return Err(TileError::new(&scene.id, Stage::Download, &err));
            }
            lifecycle.advance(SceneState::Downloaded);
            log.scene(&scene.id, &format!("downloaded to {}", entry.archive_path));
            true
        };

        let extracted = if extracted_cached {
            lifecycle.advance(SceneState::Extracted);
            log.scene(&scene.id, &format!("extracted directory cached at {}", entry.extracted_dir));
            false
        } else {
            lifecycle.advance(SceneState::Extracting);
            let stats = match self.extract(&entry.archive_path, &entry.extracted_dir, scene) {
                Ok(stats) => stats,
                Err(err) => {
                    lifecycle.fail(Stage::Extract);
                    return Err(TileError::new(&scene.id, Stage::Extract, &err));
                }
            };
            lifecycle.advance(SceneState::Extracted);
            log.scene(
                &scene.id,
                &format!(
                    "extracted {} file(s), {} bytes to {}",
                    stats.files, stats.bytes, entry.extracted_dir
                ),
            );
            true
        };

        Ok(FetchResult {
            resource: entry.extracted_dir,
            downloaded,
            extracted,
        })
    }

    fn download(&self, scene: &Scene, archive_path: &Utf8Path) -> Result<(), EoError> {
        self.store.ensure_namespace()?;
        let namespace = self.store.namespace_dir();
        let temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".zip")
            .tempfile_in(namespace.as_std_path())
            .map_err(|err| EoError::Download(err.to_string()))?;
        self.client.download(self.session, scene, temp.path())?;
        temp.persist(archive_path.as_std_path())
            .map_err(|err| EoError::Download(err.to_string()))?;
        Ok(())
    }

    fn extract(
        &self,
        archive_path: &Utf8Path,
        extracted_dir: &Utf8Path,
        scene: &Scene,
    ) -> Result<ZipStats, EoError> {
        self.store.ensure_namespace()?;
        validate_zip(archive_path.as_std_path())?;
        let namespace = self.store.namespace_dir();
        let temp_dir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(namespace.as_std_path())
            .map_err(|err| EoError::Extract(err.to_string()))?;
        let stats = extract_zip(archive_path.as_std_path(), temp_dir.path())?;

        let nested = temp_dir.path().join(&scene.filename);
        let source = if nested.is_dir() {
            nested
        } else {
            temp_dir.path().to_path_buf()
        };
        atomic_rename_dir(&source, extracted_dir.as_std_path())
            .map_err(|err| EoError::Extract(err.to_string()))?;
        Ok(stats)
    }
}
