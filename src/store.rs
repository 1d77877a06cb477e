use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use dashmap::DashMap;
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::Scene;
use crate::error::EoError;

pub const TEMP_PREFIX: &str = ".eo-tmp";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub archive_path: Utf8PathBuf,
    pub extracted_dir: Utf8PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CachedKind {
    Archive,
    Extracted,
}

#[derive(Debug, Clone, Serialize)]
pub struct CachedItem {
    pub name: String,
    pub kind: CachedKind,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct CacheStore {
    cache_root: Utf8PathBuf,
    namespace: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl CacheStore {
    pub fn new(cache_root: Utf8PathBuf, namespace: impl Into<String>) -> Self {
        Self {
            cache_root,
            namespace: namespace.into(),
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(config.cache_root.clone(), config.provider_namespace.clone())
    }

    pub fn cache_root(&self) -> &Utf8Path {
        &self.cache_root
    }

    pub fn namespace_dir(&self) -> Utf8PathBuf {
        self.cache_root.join(&self.namespace)
    }

    pub fn archive_path(&self, scene: &Scene) -> Utf8PathBuf {
        self.namespace_dir()
            .join(format!("{}.zip", scene.identifier))
    }

    pub fn extracted_dir(&self, scene: &Scene) -> Utf8PathBuf {
        self.namespace_dir().join(&scene.filename)
    }

    pub fn entry(&self, scene: &Scene) -> CacheEntry {
        CacheEntry {
            archive_path: self.archive_path(scene),
            extracted_dir: self.extracted_dir(scene),
        }
    }

    pub fn archive_exists(&self, scene: &Scene) -> bool {
        self.archive_path(scene).as_std_path().is_file()
    }

    pub fn extracted_exists(&self, scene: &Scene) -> bool {
        self.extracted_dir(scene).as_std_path().is_dir()
    }

    pub fn ensure_namespace(&self) -> Result<(), EoError> {
        fs::create_dir_all(self.namespace_dir().as_std_path())
            .map_err(|err| EoError::Filesystem(err.to_string()))
    }

    pub fn scene_locks(&self, scene: &Scene) -> SceneLocks {
        let entry = self.entry(scene);
        let mut keys = vec![
            entry.archive_path.into_string(),
            entry.extracted_dir.into_string(),
        ];
        keys.sort();
        keys.dedup();
        SceneLocks(
            keys.into_iter()
                .map(|key| {
                    self.locks
                        .entry(key)
                        .or_insert_with(|| Arc::new(Mutex::new(())))
                        .clone()
                })
                .collect(),
        )
    }

    pub fn list_entries(&self) -> Result<Vec<CachedItem>, EoError> {
        let root = self.namespace_dir();
        if !root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut items = Vec::new();
        let entries =
            fs::read_dir(root.as_std_path()).map_err(|err| EoError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| EoError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::try_from(entry.path()) else {
                continue;
            };
            let Some(name) = path.file_name().map(str::to_string) else {
                continue;
            };
            if name.starts_with(TEMP_PREFIX) {
                continue;
            }
            let kind = if path.as_std_path().is_dir() {
                CachedKind::Extracted
            } else if path.extension() == Some("zip") {
                CachedKind::Archive
            } else {
                continue;
            };
            items.push(CachedItem {
                name,
                kind,
                path: path.to_string(),
            });
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }
}

pub struct SceneLocks(Vec<Arc<Mutex<()>>>);

pub struct SceneGuard<'a> {
    _guards: Vec<MutexGuard<'a, ()>>,
}

impl SceneLocks {
    // Keys are sorted, so every worker takes them in the same order.
    pub fn acquire(&self) -> SceneGuard<'_> {
        SceneGuard {
            _guards: self
                .0
                .iter()
                .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner))
                .collect(),
        }
    }

    #[cfg(test)]
    fn shares_with(&self, other: &SceneLocks) -> bool {
        self.0
            .iter()
            .any(|lock| other.0.iter().any(|theirs| Arc::ptr_eq(lock, theirs)))
    }
}

pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    fs::rename(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = CacheStore::new(Utf8PathBuf::from("/cache"), "scihub.copernicus");
        let scene = Scene::new("a1", "S2A_MSIL1C_T32", "S2A_MSIL1C_T32.SAFE");

        assert_eq!(
            store.archive_path(&scene),
            Utf8PathBuf::from("/cache/scihub.copernicus/S2A_MSIL1C_T32.zip")
        );
        assert_eq!(
            store.extracted_dir(&scene),
            Utf8PathBuf::from("/cache/scihub.copernicus/S2A_MSIL1C_T32.SAFE")
        );
    }

    #[test]
    fn scene_locks_cover_archive_and_extracted_dir() {
        let store = CacheStore::new(Utf8PathBuf::from("/cache"), "ns");
        let a = Scene::new("1", "SAME", "SAME.SAFE");
        let b = Scene::new("2", "SAME", "OTHER.SAFE");
        let c = Scene::new("3", "ELSE", "SAME.SAFE");
        let d = Scene::new("4", "OTHER", "OTHER2.SAFE");

        let locks = store.scene_locks(&a);
        assert!(locks.shares_with(&store.scene_locks(&b)));
        assert!(locks.shares_with(&store.scene_locks(&c)));
        assert!(!locks.shares_with(&store.scene_locks(&d)));
    }

    #[test]
    fn colliding_paths_take_one_lock() {
        let store = CacheStore::new(Utf8PathBuf::from("/cache"), "ns");
        let odd = Scene::new("1", "X", "X.zip");
        let locks = store.scene_locks(&odd);
        assert_eq!(locks.0.len(), 1);
        drop(locks.acquire());
    }

    #[test]
    fn held_scene_lock_blocks_a_scene_sharing_the_extracted_dir() {
        let store = CacheStore::new(Utf8PathBuf::from("/cache"), "ns");
        let a = store.scene_locks(&Scene::new("1", "A", "SAME.SAFE"));
        let c = store.scene_locks(&Scene::new("2", "C", "SAME.SAFE"));

        let _held = a.acquire();
        assert!(c.0.iter().any(|lock| lock.try_lock().is_err()));
    }
}
