use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::ImageFormat;
use crate::error::EoError;

pub const DEFAULT_CONFIG_FILE: &str = "eo-indices.json";
pub const DEFAULT_NAMESPACE: &str = "scihub.copernicus";
pub const DEFAULT_PLATFORM: &str = "SENTINEL-2";
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub cache_root: Option<String>,
    #[serde(default)]
    pub output_root: Option<String>,
    #[serde(default)]
    pub provider_namespace: Option<String>,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub image_format: Option<ImageFormat>,
    #[serde(default)]
    pub catalog: Option<CatalogEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub search_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSettings {
    pub search_url: String,
    pub token_url: String,
    pub download_url: String,
    pub client_id: String,
    pub timeout_secs: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            search_url: "https://catalogue.dataspace.copernicus.eu/odata/v1".to_string(),
            token_url: "https://identity.dataspace.copernicus.eu/auth/realms/CDSE/protocol/openid-connect/token".to_string(),
            download_url: "https://zipper.dataspace.copernicus.eu/odata/v1".to_string(),
            client_id: "cdse-public".to_string(),
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub cache_root: Utf8PathBuf,
    pub output_root: Utf8PathBuf,
    pub provider_namespace: String,
    pub workers: usize,
    pub platform: String,
    pub image_format: ImageFormat,
    pub catalog: CatalogSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, EoError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| EoError::ConfigRead(config_path.clone()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|err| EoError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, EoError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let cache_root = match config.cache_root {
            Some(root) => Utf8PathBuf::from(root),
            None => default_cache_root()?,
        };
        let output_root = config
            .output_root
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| Utf8PathBuf::from("eo-output"));

        let workers = config.workers.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            return Err(EoError::ConfigParse(
                "workers must be at least 1".to_string(),
            ));
        }

        let defaults = CatalogSettings::default();
        let catalog = match config.catalog {
            Some(entry) => CatalogSettings {
                search_url: entry.search_url.unwrap_or(defaults.search_url),
                token_url: entry.token_url.unwrap_or(defaults.token_url),
                download_url: entry.download_url.unwrap_or(defaults.download_url),
                client_id: entry.client_id.unwrap_or(defaults.client_id),
                timeout_secs: entry.timeout_secs.unwrap_or(defaults.timeout_secs),
            },
            None => defaults,
        };

        Ok(ResolvedConfig {
            schema_version,
            cache_root,
            output_root,
            provider_namespace: config
                .provider_namespace
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            workers,
            platform: config
                .platform
                .unwrap_or_else(|| DEFAULT_PLATFORM.to_string()),
            image_format: config.image_format.unwrap_or_default(),
            catalog,
        })
    }
}

pub fn default_cache_root() -> Result<Utf8PathBuf, EoError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("eo-indices")).ok()
        })
        .ok_or_else(|| EoError::Filesystem("unable to resolve cache directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_overrides_are_partial() {
        let config = Config {
            cache_root: Some("/tmp/eo-cache".to_string()),
            catalog: Some(CatalogEntry {
                search_url: Some("http://localhost:8080/odata/v1".to_string()),
                ..CatalogEntry::default()
            }),
            ..Config::default()
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.catalog.search_url, "http://localhost:8080/odata/v1");
        assert_eq!(resolved.catalog.client_id, "cdse-public");
        assert_eq!(resolved.provider_namespace, DEFAULT_NAMESPACE);
    }
}
