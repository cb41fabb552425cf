//! Manifest persistence against real files (host temp directories).

use std::fs;
use std::sync::Arc;
use std::thread;

use cloudsync::adapters::storage::{DiskVolume, MountTable};
use cloudsync::sync::manifest::{Domain, ManifestError, ManifestStore};
use cloudsync::sync::packet::FileInfo;

fn info(name: &str, size: u64) -> FileInfo {
    FileInfo {
        name: name.into(),
        size,
        md5: Some(format!("md5-{name}")),
        create_time: 1_700_000_000,
    }
}

fn store(dir: &tempfile::TempDir) -> ManifestStore<MountTable> {
    let fs = MountTable::new().mount("/flash", DiskVolume::new(dir.path()));
    ManifestStore::new(Arc::new(fs), "/flash/.sync_manifest.json")
}

#[test]
fn persisted_document_uses_wire_field_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    store.upsert_single(&info("main.py", 12), "/flash/main.py").unwrap();

    let raw = fs::read(dir.path().join(".sync_manifest.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(doc["totalSize"], 12);
    assert_eq!(doc["time"], 1_700_000_000i64);
    assert_eq!(doc["cache"], false);
    assert_eq!(doc["fileList"][0]["devicePath"], "/flash/main.py");
    assert_eq!(doc["fileList"][0]["domain"], "user");
    assert_eq!(doc["fileList"][0]["md5"], "md5-main.py");

    assert!(!dir.path().join(".sync_manifest.json.tmp").exists());
}

#[test]
fn absent_and_empty_files_load_as_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    assert!(store.load().unwrap().file_list.is_empty());

    fs::write(dir.path().join(".sync_manifest.json"), b"").unwrap();
    assert!(store.load().unwrap().file_list.is_empty());
}

#[test]
fn corrupt_document_is_left_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".sync_manifest.json");
    fs::write(&path, b"{\"fileList\": [").unwrap();
    let store = store(&dir);

    assert_eq!(store.load(), Err(ManifestError::Corrupt));
    assert_eq!(
        store.upsert_single(&info("a.py", 1), "/flash/a.py"),
        Err(ManifestError::Corrupt)
    );
    assert_eq!(fs::read(&path).unwrap(), b"{\"fileList\": [");
}

#[test]
fn stale_total_is_corrected_on_load() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(".sync_manifest.json"),
        br#"{"time":1,"cache":false,"totalSize":999,"fileList":[
            {"name":"a.py","devicePath":"/flash/a.py","domain":"project","size":4,"md5":null}]}"#,
    )
    .unwrap();
    let manifest = store(&dir).load().unwrap();
    assert_eq!(manifest.total_size, 4);
    assert_eq!(manifest.file_list[0].domain, Domain::Project);
}

#[test]
fn overflowing_stored_sizes_are_corrupt() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".sync_manifest.json");
    let doc = br#"{"time":1,"cache":false,"totalSize":0,"fileList":[
        {"name":"a","devicePath":"/flash/a","domain":"user","size":18446744073709551615,"md5":null},
        {"name":"b","devicePath":"/flash/b","domain":"user","size":1,"md5":null}]}"#;
    fs::write(&path, doc).unwrap();

    let store = store(&dir);
    assert_eq!(store.load(), Err(ManifestError::Corrupt));
    assert_eq!(store.remove("/flash/a"), Err(ManifestError::Corrupt));
    assert_eq!(fs::read(&path).unwrap(), doc);
}

#[test]
fn overflowing_replace_leaves_document_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    store.upsert_single(&info("keep.py", 3), "/flash/keep.py").unwrap();
    let before = fs::read(dir.path().join(".sync_manifest.json")).unwrap();

    assert_eq!(
        store.replace_domain(Domain::Project, "/flash/p", &[info("a", u64::MAX), info("b", 1)], 2),
        Err(ManifestError::SizeOverflow)
    );
    assert_eq!(fs::read(dir.path().join(".sync_manifest.json")).unwrap(), before);
    assert_eq!(store.load().unwrap().total_size, 3);
}

#[test]
fn project_replace_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let first = store(&dir);
    first.upsert_single(&info("keep.py", 3), "/flash/keep.py").unwrap();
    first
        .replace_domain(Domain::Project, "/flash/proj", &[info("a.py", 10), info("b.py", 20)], 7)
        .unwrap();

    let reopened = store(&dir).load().unwrap();
    assert_eq!(reopened.file_list.len(), 3);
    assert_eq!(reopened.total_size, 33);
    assert_eq!(reopened.time, 7);
    assert!(reopened.find("/flash/proj/b.py").is_some());
}

#[test]
fn concurrent_updates_are_serialised() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store(&dir));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let name = format!("f{i}.py");
                store.upsert_single(&info(&name, 1), &format!("/flash/{name}")).unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let manifest = store.load().unwrap();
    assert_eq!(manifest.file_list.len(), 8);
    assert_eq!(manifest.total_size, 8);
}
