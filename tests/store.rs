use camino::Utf8PathBuf;

use eo_indices::domain::Scene;
use eo_indices::store::{CacheStore, CachedKind, TEMP_PREFIX};

fn store_in(temp: &tempfile::TempDir) -> CacheStore {
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    CacheStore::new(root, "scihub.copernicus")
}

#[test]
fn presence_checks_are_independent() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(&temp);
    let scene = Scene::new("id-1", "S2A_T32TQM", "S2A_T32TQM.SAFE");

    assert!(!store.archive_exists(&scene));
    assert!(!store.extracted_exists(&scene));

    store.ensure_namespace().unwrap();
    std::fs::create_dir_all(store.extracted_dir(&scene).as_std_path()).unwrap();
    assert!(!store.archive_exists(&scene));
    assert!(store.extracted_exists(&scene));

    std::fs::write(store.archive_path(&scene).as_std_path(), b"zip").unwrap();
    assert!(store.archive_exists(&scene));
}

#[test]
fn archive_path_that_is_a_directory_is_not_an_archive() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(&temp);
    let scene = Scene::new("id-1", "S2A_T32TQM", "S2A_T32TQM.SAFE");
    std::fs::create_dir_all(store.archive_path(&scene).as_std_path()).unwrap();
    assert!(!store.archive_exists(&scene));
}

#[test]
fn list_entries_skips_temporaries() {
    let temp = tempfile::tempdir().unwrap();
    let store = store_in(&temp);
    assert!(store.list_entries().unwrap().is_empty());

    let a = Scene::new("1", "A", "A.SAFE");
    let b = Scene::new("2", "B", "B.SAFE");
    store.ensure_namespace().unwrap();
    std::fs::write(store.archive_path(&a).as_std_path(), b"zip").unwrap();
    std::fs::create_dir_all(store.extracted_dir(&b).as_std_path()).unwrap();
    std::fs::write(
        store
            .namespace_dir()
            .join(format!("{TEMP_PREFIX}abc.zip"))
            .as_std_path(),
        b"partial",
    )
    .unwrap();

    let items = store.list_entries().unwrap();
    let summary: Vec<(&str, CachedKind)> = items
        .iter()
        .map(|item| (item.name.as_str(), item.kind))
        .collect();
    assert_eq!(
        summary,
        vec![("A.zip", CachedKind::Archive), ("B.SAFE", CachedKind::Extracted)]
    );
}
