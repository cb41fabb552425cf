//! Persisted manifest of synced files.
//!
//! One JSON document records every file the device believes it holds:
//!
//! ```json
//! {"time":1700000000,"cache":false,"totalSize":42,
//!  "fileList":[{"name":"main.py","devicePath":"/flash/main.py",
//!               "domain":"user","size":42,"md5":"…"}]}
//! ```
//!
//! Two domains share the list: `user` entries come from single-file pushes
//! and are upserted by `devicePath`; `project` entries are replaced as a
//! whole by each multi-file push. `totalSize` is recomputed from the list
//! after every mutation, so it always equals the sum of entry sizes.
//!
//! [`ManifestStore`] serialises every load → mutate → persist sequence
//! behind one lock. Persisting writes the full document to a sibling
//! `.tmp` file and renames it over the original, and nothing is written
//! unless serialisation succeeded first.

use core::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::packet::{FileInfo, ListEntry};
use crate::app::ports::{FileError, FileHandle, FilePort, OpenMode};
use crate::error::ErrorCode;

// ── Document model ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    User,
    Project,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(rename = "devicePath")]
    pub device_path: String,
    pub domain: Domain,
    pub size: u64,
    #[serde(default)]
    pub md5: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub cache: bool,
    #[serde(rename = "totalSize", default)]
    pub total_size: u64,
    #[serde(rename = "fileList", default)]
    pub file_list: Vec<ManifestEntry>,
}

/// Join a directory and an entry name with exactly one `/` between them.
pub fn join_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    format!("{dir}/{name}")
}

/// Sum of `size` over `entries`, or `None` if it does not fit a `u64`.
fn checked_total(entries: &[ManifestEntry]) -> Option<u64> {
    entries.iter().try_fold(0u64, |sum, e| sum.checked_add(e.size))
}

impl Manifest {
    /// Sum of every entry's size; `None` when the sizes overflow.
    pub fn computed_size(&self) -> Option<u64> {
        checked_total(&self.file_list)
    }

    /// Install `list` as the entry list. The manifest is unchanged when
    /// the sizes overflow.
    fn commit(&mut self, list: Vec<ManifestEntry>) -> Result<(), ManifestError> {
        let total = checked_total(&list).ok_or_else(|| {
            warn!("manifest: entry sizes overflow, update rejected");
            ManifestError::SizeOverflow
        })?;
        self.file_list = list;
        self.total_size = total;
        Ok(())
    }

    pub fn find(&self, device_path: &str) -> Option<&ManifestEntry> {
        self.file_list.iter().find(|e| e.device_path == device_path)
    }

    /// Replace the entry at `device_path` in place, or append it. The
    /// entry joins the `user` domain.
    pub fn upsert_single(&mut self, info: &FileInfo, device_path: &str) -> Result<(), ManifestError> {
        let entry = ManifestEntry {
            name: info.name.clone(),
            device_path: device_path.to_owned(),
            domain: Domain::User,
            size: info.size,
            md5: info.md5.clone(),
        };
        let mut list = self.file_list.clone();
        match list.iter_mut().find(|e| e.device_path == device_path) {
            Some(existing) => *existing = entry,
            None => list.push(entry),
        }
        self.commit(list)?;
        self.time = info.create_time;
        Ok(())
    }

    /// Make `entries` (resolved under `dir`) the complete set of `domain`
    /// entries. Entries of other domains at a colliding path are dropped,
    /// and duplicate names keep the last occurrence. Applying the same
    /// set twice leaves the list unchanged.
    pub fn replace_domain(
        &mut self,
        domain: Domain,
        dir: &str,
        entries: &[FileInfo],
        time: i64,
    ) -> Result<(), ManifestError> {
        let mut incoming: Vec<ManifestEntry> = Vec::with_capacity(entries.len());
        for info in entries {
            let device_path = join_path(dir, &info.name);
            incoming.retain(|e| e.device_path != device_path);
            incoming.push(ManifestEntry {
                name: info.name.clone(),
                device_path,
                domain,
                size: info.size,
                md5: info.md5.clone(),
            });
        }

        let mut list: Vec<ManifestEntry> = self
            .file_list
            .iter()
            .filter(|e| e.domain != domain && !incoming.iter().any(|n| n.device_path == e.device_path))
            .cloned()
            .collect();
        debug!(
            "manifest: {:?} replace dropped {} entries, adding {}",
            domain,
            self.file_list.len() - list.len(),
            incoming.len()
        );
        list.extend(incoming);
        self.commit(list)?;
        self.time = time;
        Ok(())
    }

    /// Drop the entry at `device_path`. Returns whether one existed.
    pub fn remove(&mut self, device_path: &str) -> Result<bool, ManifestError> {
        let before = self.file_list.len();
        let list: Vec<ManifestEntry> = self
            .file_list
            .iter()
            .filter(|e| e.device_path != device_path)
            .cloned()
            .collect();
        let removed = list.len() != before;
        self.commit(list)?;
        Ok(removed)
    }

    /// Fill in `md5` on listing entries that the manifest knows under `dir`.
    pub fn overlay_md5(&self, dir: &str, listing: &mut [ListEntry]) {
        for item in listing.iter_mut() {
            let path = join_path(dir, &item.name);
            if let Some(entry) = self.find(&path) {
                item.md5.clone_from(&entry.md5);
            }
        }
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestError {
    /// The stored document is not a valid manifest; left untouched.
    Corrupt,
    /// The in-memory document could not be serialised; nothing written.
    Serialize,
    /// Entry sizes add up past `u64::MAX`; nothing written.
    SizeOverflow,
    Storage(FileError),
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt => write!(f, "stored manifest is corrupt"),
            Self::Serialize => write!(f, "manifest serialisation failed"),
            Self::SizeOverflow => write!(f, "manifest sizes overflow"),
            Self::Storage(e) => write!(f, "manifest storage: {e}"),
        }
    }
}

impl From<FileError> for ManifestError {
    fn from(e: FileError) -> Self {
        Self::Storage(e)
    }
}

impl From<ManifestError> for ErrorCode {
    fn from(e: ManifestError) -> Self {
        match e {
            ManifestError::Corrupt | ManifestError::Serialize | ManifestError::SizeOverflow => {
                Self::ParseError
            }
            ManifestError::Storage(f) => f.into(),
        }
    }
}

// ── Store ─────────────────────────────────────────────────────

/// Lock-guarded access to the manifest file on a [`FilePort`].
pub struct ManifestStore<F: FilePort> {
    fs: Arc<F>,
    path: String,
    lock: Mutex<()>,
}

impl<F: FilePort> ManifestStore<F> {
    pub fn new(fs: Arc<F>, path: impl Into<String>) -> Self {
        Self {
            fs,
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Current manifest. Absent or empty file yields a fresh manifest.
    pub fn load(&self) -> Result<Manifest, ManifestError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.read_document()
    }

    /// Run `mutate` on the current manifest and persist the result, holding
    /// the lock for the whole sequence. Nothing is written if `mutate` fails.
    pub fn update<R>(
        &self,
        mutate: impl FnOnce(&mut Manifest) -> Result<R, ManifestError>,
    ) -> Result<R, ManifestError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut manifest = self.read_document()?;
        let out = mutate(&mut manifest)?;
        self.persist(&manifest)?;
        Ok(out)
    }

    pub fn upsert_single(&self, info: &FileInfo, device_path: &str) -> Result<(), ManifestError> {
        self.update(|m| m.upsert_single(info, device_path))?;
        info!("manifest: upserted {device_path} ({} bytes)", info.size);
        Ok(())
    }

    pub fn replace_domain(
        &self,
        domain: Domain,
        dir: &str,
        entries: &[FileInfo],
        time: i64,
    ) -> Result<(), ManifestError> {
        self.update(|m| m.replace_domain(domain, dir, entries, time))?;
        info!("manifest: {:?} domain now {} entries under {dir}", domain, entries.len());
        Ok(())
    }

    /// Remove `device_path` from the manifest. A path the manifest does not
    /// know is not an error.
    pub fn remove(&self, device_path: &str) -> Result<bool, ManifestError> {
        let removed = self.update(|m| m.remove(device_path))?;
        if !removed {
            debug!("manifest: {device_path} not tracked");
        }
        Ok(removed)
    }

    fn read_document(&self) -> Result<Manifest, ManifestError> {
        if !self.fs.exists(&self.path) {
            debug!("manifest: {} absent, starting fresh", self.path);
            return Ok(Manifest::default());
        }

        let mut file = self.fs.open(&self.path, OpenMode::Read)?;
        let mut bytes = Vec::new();
        let mut buf = [0u8; 512];
        let read = loop {
            match file.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => bytes.extend_from_slice(&buf[..n]),
                Err(e) => break Err(e),
            }
        };
        let closed = file.close();
        read?;
        closed?;

        if bytes.is_empty() {
            return Ok(Manifest::default());
        }

        let mut manifest: Manifest = serde_json::from_slice(&bytes).map_err(|e| {
            warn!("manifest: {} unreadable: {e}", self.path);
            ManifestError::Corrupt
        })?;

        let Some(computed) = manifest.computed_size() else {
            warn!("manifest: {} entry sizes overflow", self.path);
            return Err(ManifestError::Corrupt);
        };
        if manifest.total_size != computed {
            warn!(
                "manifest: totalSize {} disagrees with entries ({computed}), correcting",
                manifest.total_size
            );
            manifest.total_size = computed;
        }
        Ok(manifest)
    }

    fn persist(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let bytes = serde_json::to_vec(manifest).map_err(|_| ManifestError::Serialize)?;

        let tmp = format!("{}.tmp", self.path);
        let mut file = self.fs.open(&tmp, OpenMode::Truncate)?;
        if let Err(e) = file.write(&bytes) {
            let _ = file.close();
            let _ = self.fs.remove(&tmp);
            return Err(e.into());
        }
        file.close()?;
        self.fs.rename(&tmp, &self.path)?;
        debug!("manifest: persisted {} bytes", bytes.len());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────
