//! Fuzz target: persisted manifest documents
//!
//! Loads arbitrary bytes as the manifest file through a RAM volume. A load
//! either fails as corrupt or yields a manifest whose `totalSize` matches
//! its entries, and a failed update never rewrites the stored bytes.
//!
//! cargo fuzz run fuzz_manifest_parse

#![no_main]

use std::sync::Arc;

use cloudsync::adapters::storage::RamVolume;
use cloudsync::app::ports::{FileHandle, FilePort, OpenMode};
use cloudsync::sync::manifest::{Domain, ManifestStore};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let ram = RamVolume::new();
    let Ok(mut file) = ram.open("/m.json", OpenMode::Truncate) else {
        return;
    };
    if file.write(data).is_err() || file.close().is_err() {
        return;
    }

    let store = ManifestStore::new(Arc::new(ram.clone()), "/m.json");
    match store.load() {
        Ok(m) => assert_eq!(Some(m.total_size), m.computed_size()),
        Err(_) => {
            let _ = store.replace_domain(Domain::Project, "/flash", &[], 0);
            assert_eq!(ram.contents("/m.json").as_deref(), Some(data));
        }
    }
});
