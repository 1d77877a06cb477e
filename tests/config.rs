use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use eo_indices::config::{
    CatalogSettings, Config, ConfigLoader, DEFAULT_NAMESPACE, DEFAULT_PLATFORM, DEFAULT_WORKERS,
};
use eo_indices::domain::ImageFormat;
use eo_indices::error::EoError;

#[test]
fn defaults_fill_missing_keys() {
    let config = Config {
        cache_root: Some("/tmp/eo-cache".to_string()),
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.schema_version, 1);
    assert_eq!(resolved.cache_root, Utf8PathBuf::from("/tmp/eo-cache"));
    assert_eq!(resolved.output_root, Utf8PathBuf::from("eo-output"));
    assert_eq!(resolved.provider_namespace, DEFAULT_NAMESPACE);
    assert_eq!(resolved.platform, DEFAULT_PLATFORM);
    assert_eq!(resolved.workers, DEFAULT_WORKERS);
    assert_eq!(resolved.image_format, ImageFormat::Png);
    assert_eq!(resolved.catalog, CatalogSettings::default());
}

#[test]
fn reads_json_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("eo-indices.json");
    std::fs::write(
        &path,
        r#"{
            "cache_root": "/data/cache",
            "provider_namespace": "cdse",
            "workers": 2,
            "image_format": "jpeg",
            "catalog": { "timeout_secs": 30 }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.provider_namespace, "cdse");
    assert_eq!(resolved.workers, 2);
    assert_eq!(resolved.image_format, ImageFormat::Jpeg);
    assert_eq!(resolved.catalog.timeout_secs, 30);
    assert_eq!(resolved.catalog.client_id, "cdse-public");
}

#[test]
fn explicit_missing_file_is_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(EoError::ConfigRead(_))
    );
}

#[test]
fn invalid_json_and_zero_workers_are_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("bad.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(EoError::ConfigParse(_))
    );

    let config = Config {
        cache_root: Some("/tmp/eo-cache".to_string()),
        workers: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(EoError::ConfigParse(_))
    );
}
