//! File storage adapter: mounted volumes behind one [`FilePort`].
//!
//! ```text
//!   "/flash/app/main.py" ──▶ MountTable ──▶ ("/flash", Disk) + "app/main.py"
//!   "/ram/tmp.bin"       ──▶ MountTable ──▶ ("/ram",   Ram)  + "tmp.bin"
//! ```
//!
//! - [`DiskVolume`]: `std::fs` rooted at a directory. On ESP-IDF this is a
//!   VFS mount point (SPIFFS/FAT); on the host, any directory.
//! - [`RamVolume`]: in-memory files in a shared map. Contents of a handle
//!   become visible to other handles on `close`.
//!
//! A device path resolves to exactly one volume, once, at open time, by
//! the longest mount prefix ending on a path-component boundary. Paths
//! with a `..` component never resolve.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use crate::app::ports::{DirEntry, FileError, FileHandle, FilePort, OpenMode};

// ── Disk volume ───────────────────────────────────────────────

/// Volume backed by the host or VFS filesystem.
#[derive(Debug, Clone)]
pub struct DiskVolume {
    root: PathBuf,
}

impl DiskVolume {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full(&self, rel: &str) -> Result<PathBuf, FileError> {
        if climbs_out(rel) {
            return Err(FileError::NotFound);
        }
        let rel = rel.trim_start_matches('/');
        if rel.is_empty() {
            Ok(self.root.clone())
        } else {
            Ok(self.root.join(rel))
        }
    }
}

/// Whether `path` has a `..` component.
fn climbs_out(path: &str) -> bool {
    path.split(['/', '\\']).any(|c| c == "..")
}

fn io_error(e: &io::Error, otherwise: FileError) -> FileError {
    if e.kind() == io::ErrorKind::NotFound {
        FileError::NotFound
    } else {
        otherwise
    }
}

impl FilePort for DiskVolume {
    type File = fs::File;

    fn open(&self, path: &str, mode: OpenMode) -> Result<fs::File, FileError> {
        let full = self.full(path)?;
        if mode != OpenMode::Read {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).map_err(|_| FileError::OpenFailed)?;
            }
        }
        let mut opts = fs::OpenOptions::new();
        match mode {
            OpenMode::Read => opts.read(true),
            OpenMode::Truncate => opts.write(true).create(true).truncate(true),
            OpenMode::Append => opts.append(true).create(true),
        };
        opts.open(&full).map_err(|e| io_error(&e, FileError::OpenFailed))
    }

    fn size(&self, path: &str) -> Result<u64, FileError> {
        let meta = fs::metadata(self.full(path)?).map_err(|e| io_error(&e, FileError::ReadFailed))?;
        if meta.is_file() {
            Ok(meta.len())
        } else {
            Err(FileError::OpenFailed)
        }
    }

    fn exists(&self, path: &str) -> bool {
        self.full(path).is_ok_and(|p| p.exists())
    }

    fn remove(&self, path: &str) -> Result<(), FileError> {
        fs::remove_file(self.full(path)?).map_err(|e| io_error(&e, FileError::RemoveFailed))
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FileError> {
        let (from, to) = (self.full(from)?, self.full(to)?);
        if fs::rename(&from, &to).is_ok() {
            return Ok(());
        }
        // FAT refuses to rename over an existing file.
        if to.exists() {
            fs::remove_file(&to).map_err(|_| FileError::WriteFailed)?;
        }
        fs::rename(&from, &to).map_err(|e| io_error(&e, FileError::WriteFailed))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FileError> {
        let iter = fs::read_dir(self.full(path)?).map_err(|e| io_error(&e, FileError::ListFailed))?;
        let mut out = Vec::new();
        for item in iter {
            let item = item.map_err(|_| FileError::ListFailed)?;
            let meta = item.metadata().map_err(|_| FileError::ListFailed)?;
            out.push(DirEntry {
                name: item.file_name().to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
            });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

impl FileHandle for fs::File {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        Read::read(self, buf).map_err(|_| FileError::ReadFailed)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), FileError> {
        self.write_all(data).map_err(|_| FileError::WriteFailed)
    }

    fn seek(&mut self, pos: u64) -> Result<u64, FileError> {
        Seek::seek(self, SeekFrom::Start(pos)).map_err(|_| FileError::ReadFailed)
    }

    fn close(self) -> Result<(), FileError> {
        self.sync_all().map_err(|_| FileError::CloseFailed)
    }
}

// ── RAM volume ────────────────────────────────────────────────

type RamFiles = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

fn lock(files: &RamFiles) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
    files.lock().unwrap_or_else(PoisonError::into_inner)
}

fn ram_key(path: &str) -> String {
    path.trim_matches('/').to_owned()
}

/// In-memory volume. Clones share the same files.
#[derive(Debug, Clone, Default)]
pub struct RamVolume {
    files: RamFiles,
}

impl RamVolume {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full contents of a file, if present.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        lock(&self.files).get(&ram_key(path)).cloned()
    }
}

/// Open handle on a [`RamVolume`] file.
#[derive(Debug)]
pub struct RamFile {
    files: RamFiles,
    key: String,
    data: Vec<u8>,
    pos: usize,
    writable: bool,
}

impl FilePort for RamVolume {
    type File = RamFile;

    fn open(&self, path: &str, mode: OpenMode) -> Result<RamFile, FileError> {
        let key = ram_key(path);
        if key.is_empty() {
            return Err(FileError::OpenFailed);
        }
        let files = lock(&self.files);
        let (data, pos) = match mode {
            OpenMode::Read => (files.get(&key).cloned().ok_or(FileError::NotFound)?, 0),
            OpenMode::Truncate => (Vec::new(), 0),
            OpenMode::Append => {
                let data = files.get(&key).cloned().unwrap_or_default();
                let len = data.len();
                (data, len)
            }
        };
        drop(files);
        Ok(RamFile {
            files: Arc::clone(&self.files),
            key,
            data,
            pos,
            writable: mode != OpenMode::Read,
        })
    }

    fn size(&self, path: &str) -> Result<u64, FileError> {
        lock(&self.files)
            .get(&ram_key(path))
            .map(|d| d.len() as u64)
            .ok_or(FileError::NotFound)
    }

    fn exists(&self, path: &str) -> bool {
        let key = ram_key(path);
        let files = lock(&self.files);
        if key.is_empty() || files.contains_key(&key) {
            return true;
        }
        let prefix = format!("{key}/");
        files.keys().any(|k| k.starts_with(&prefix))
    }

    fn remove(&self, path: &str) -> Result<(), FileError> {
        lock(&self.files)
            .remove(&ram_key(path))
            .map(|_| ())
            .ok_or(FileError::NotFound)
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FileError> {
        let mut files = lock(&self.files);
        let data = files.remove(&ram_key(from)).ok_or(FileError::NotFound)?;
        files.insert(ram_key(to), data);
        Ok(())
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FileError> {
        let key = ram_key(path);
        let files = lock(&self.files);
        if files.contains_key(&key) {
            return Err(FileError::ListFailed);
        }
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{key}/")
        };

        let mut out: Vec<DirEntry> = Vec::new();
        let mut matched = false;
        for (k, data) in files.range(prefix.clone()..) {
            let Some(rest) = k.strip_prefix(&prefix) else {
                break;
            };
            matched = true;
            match rest.split_once('/') {
                Some((dir, _)) => {
                    if out.last().is_none_or(|e| e.name != dir) {
                        out.push(DirEntry {
                            name: dir.to_owned(),
                            is_dir: true,
                            size: 0,
                        });
                    }
                }
                None => out.push(DirEntry {
                    name: rest.to_owned(),
                    is_dir: false,
                    size: data.len() as u64,
                }),
            }
        }

        if !matched && !key.is_empty() {
            return Err(FileError::NotFound);
        }
        Ok(out)
    }
}

impl FileHandle for RamFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        let available = self.data.len().saturating_sub(self.pos);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), FileError> {
        if !self.writable {
            return Err(FileError::WriteFailed);
        }
        let end = self.pos + data.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> Result<u64, FileError> {
        self.pos = usize::try_from(pos).map_err(|_| FileError::ReadFailed)?;
        Ok(pos)
    }

    fn close(self) -> Result<(), FileError> {
        if self.writable {
            lock(&self.files).insert(self.key, self.data);
        }
        Ok(())
    }
}

// ── Volume variants ───────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Volume {
    Disk(DiskVolume),
    Ram(RamVolume),
}

impl From<DiskVolume> for Volume {
    fn from(v: DiskVolume) -> Self {
        Self::Disk(v)
    }
}

impl From<RamVolume> for Volume {
    fn from(v: RamVolume) -> Self {
        Self::Ram(v)
    }
}

/// Handle on whichever volume a path resolved to.
#[derive(Debug)]
pub enum VolumeFile {
    Disk(fs::File),
    Ram(RamFile),
}

impl FileHandle for VolumeFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        match self {
            Self::Disk(f) => FileHandle::read(f, buf),
            Self::Ram(f) => f.read(buf),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), FileError> {
        match self {
            Self::Disk(f) => FileHandle::write(f, data),
            Self::Ram(f) => f.write(data),
        }
    }

    fn seek(&mut self, pos: u64) -> Result<u64, FileError> {
        match self {
            Self::Disk(f) => FileHandle::seek(f, pos),
            Self::Ram(f) => f.seek(pos),
        }
    }

    fn close(self) -> Result<(), FileError> {
        match self {
            Self::Disk(f) => FileHandle::close(f),
            Self::Ram(f) => f.close(),
        }
    }
}

impl FilePort for Volume {
    type File = VolumeFile;

    fn open(&self, path: &str, mode: OpenMode) -> Result<VolumeFile, FileError> {
        match self {
            Self::Disk(v) => v.open(path, mode).map(VolumeFile::Disk),
            Self::Ram(v) => v.open(path, mode).map(VolumeFile::Ram),
        }
    }

    fn size(&self, path: &str) -> Result<u64, FileError> {
        match self {
            Self::Disk(v) => v.size(path),
            Self::Ram(v) => v.size(path),
        }
    }

    fn exists(&self, path: &str) -> bool {
        match self {
            Self::Disk(v) => v.exists(path),
            Self::Ram(v) => v.exists(path),
        }
    }

    fn remove(&self, path: &str) -> Result<(), FileError> {
        match self {
            Self::Disk(v) => v.remove(path),
            Self::Ram(v) => v.remove(path),
        }
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FileError> {
        match self {
            Self::Disk(v) => v.rename(from, to),
            Self::Ram(v) => v.rename(from, to),
        }
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FileError> {
        match self {
            Self::Disk(v) => v.read_dir(path),
            Self::Ram(v) => v.read_dir(path),
        }
    }
}

// ── Mount table ───────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Mount {
    prefix: String,
    volume: Volume,
}

/// Device path namespace assembled from mounted volumes.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    mounts: Vec<Mount>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `volume` at `prefix` (e.g. `"/flash"`; `"/"` mounts a root).
    pub fn mount(mut self, prefix: &str, volume: impl Into<Volume>) -> Self {
        let prefix = prefix.trim_end_matches('/').to_owned();
        info!("storage: mounted {}", if prefix.is_empty() { "/" } else { prefix.as_str() });
        self.mounts.retain(|m| m.prefix != prefix);
        self.mounts.push(Mount {
            prefix,
            volume: volume.into(),
        });
        self.mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        self
    }

    /// Resolve a device path to `(mount index, volume, volume-relative path)`.
    fn resolve<'p>(&self, path: &'p str) -> Result<(usize, &Volume, &'p str), FileError> {
        if !path.starts_with('/') || climbs_out(path) {
            debug!("storage: rejected {path}");
            return Err(FileError::NotFound);
        }
        for (i, m) in self.mounts.iter().enumerate() {
            let Some(rest) = path.strip_prefix(m.prefix.as_str()) else {
                continue;
            };
            if rest.is_empty() || rest.starts_with('/') {
                return Ok((i, &m.volume, rest.trim_start_matches('/')));
            }
        }
        debug!("storage: no mount for {path}");
        Err(FileError::NotFound)
    }
}

impl FilePort for MountTable {
    type File = VolumeFile;

    fn open(&self, path: &str, mode: OpenMode) -> Result<VolumeFile, FileError> {
        let (_, volume, rel) = self.resolve(path)?;
        volume.open(rel, mode)
    }

    fn size(&self, path: &str) -> Result<u64, FileError> {
        let (_, volume, rel) = self.resolve(path)?;
        volume.size(rel)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path)
            .is_ok_and(|(_, volume, rel)| volume.exists(rel))
    }

    fn remove(&self, path: &str) -> Result<(), FileError> {
        let (_, volume, rel) = self.resolve(path)?;
        volume.remove(rel)
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), FileError> {
        let (a, volume, from_rel) = self.resolve(from)?;
        let (b, _, to_rel) = self.resolve(to)?;
        if a != b {
            return Err(FileError::WriteFailed);
        }
        volume.rename(from_rel, to_rel)
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FileError> {
        let (_, volume, rel) = self.resolve(path)?;
        volume.read_dir(rel)
    }
}

// ── Tests ────────────────────────────────────────────────────
