//! Topic dispatcher: routes one inbound message to its handler and collects
//! the acknowledgements, events and restart decision it produced.
//!
//! Every handler boundary yields exactly one [`ErrorCode`] (or success),
//! which is written into the ack's `err_code`. Handlers never publish or
//! restart themselves; the worker applies the [`DispatchOutcome`] so that
//! an OTA restart always happens after its ack went out.
//!
//! | topic      | handler           | reply topic    |
//! |------------|-------------------|----------------|
//! | `ping`     | identity handshake| `ping/up`      |
//! | `exec`     | [`ExecStream`]    | `exec/up`      |
//! | `file`     | `file_op` 0..=6   | `file/up`      |
//! | `paircode` | pairing update    | `paircode/up`  |
//!
//! The manifest file and its temporary sibling are owned by
//! [`ManifestStore`]: file-topic requests never read, write or remove them
//! and listings leave them out.

use std::sync::Arc;

use log::{debug, info, warn};

use super::exec::ExecStream;
use super::files::{self, FileWriter};
use super::manifest::{self, Domain, ManifestStore};
use super::ota;
use super::packet::{
    self, Ack, ChunkFields, FileAck, FileRequest, ListResponse, PairRequest, PingRequest,
    to_payload,
};
use super::session::{self, DeviceIdentity, SharedSession};
use super::topics::{Route, Topics};
use super::transfer::{ReadJob, ReadScheduler};
use crate::adapters::device_id::MacAddress;
use crate::app::events::SyncEvent;
use crate::app::ports::{ExecPort, FilePort, StoragePort};
use crate::config::SyncConfig;
use crate::error::{ErrorCode, Result};

/// A payload to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Everything one inbound message produced.
#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub outbound: Vec<Outbound>,
    pub events: Vec<SyncEvent>,
    /// Restart once `outbound` has been published.
    pub restart: bool,
}

/// Collaborators a handler may touch.
pub struct HandlerPorts<'a> {
    pub settings: &'a mut dyn StoragePort,
    pub exec: &'a mut dyn ExecPort,
    pub reads: &'a dyn ReadScheduler,
}

/// `file_op` values on the `file` topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileOp {
    Write = 0,
    Read = 1,
    List = 2,
    Remove = 3,
    WriteV2 = 4,
    MultiWrite = 5,
    ListV2 = 6,
}

impl FileOp {
    pub fn from_wire(op: u8) -> Option<Self> {
        Some(match op {
            0 => Self::Write,
            1 => Self::Read,
            2 => Self::List,
            3 => Self::Remove,
            4 => Self::WriteV2,
            5 => Self::MultiWrite,
            6 => Self::ListV2,
            _ => return None,
        })
    }
}

pub struct Dispatcher<F: FilePort> {
    topics: Topics,
    mac: MacAddress,
    ota_filename: String,
    fs: Arc<F>,
    manifest: ManifestStore<F>,
    exec: ExecStream,
    writer: FileWriter,
    session: SharedSession,
}

impl<F: FilePort> Dispatcher<F> {
    pub fn new(mac: MacAddress, config: &SyncConfig, fs: Arc<F>, session: SharedSession) -> Self {
        let max_payload = config.max_packet_bytes as usize;
        Self {
            topics: Topics::for_mac(&mac),
            mac,
            ota_filename: config.ota_filename.clone(),
            manifest: ManifestStore::new(Arc::clone(&fs), config.manifest_path.clone()),
            fs,
            exec: ExecStream::new(max_payload),
            writer: FileWriter::new(max_payload),
            session,
        }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn manifest(&self) -> &ManifestStore<F> {
        &self.manifest
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    /// Handle one inbound message. Unknown topics produce nothing.
    pub fn dispatch(&mut self, topic: &str, payload: &[u8], ports: &mut HandlerPorts<'_>) -> DispatchOutcome {
        let mut out = DispatchOutcome::default();
        let Some(route) = self.topics.route(topic) else {
            debug!("sync: ignoring message on {topic}");
            return out;
        };

        match route {
            Route::Ping => self.on_ping(payload, &mut out),
            Route::Exec => self.on_exec(payload, ports.exec, &mut out),
            Route::File => self.on_file(payload, ports, &mut out),
            Route::PairCode => self.on_paircode(payload, &mut out),
        }
        out
    }

    fn reply<T: serde::Serialize>(&self, route: Route, body: &T, out: &mut DispatchOutcome) {
        out.outbound.push(Outbound {
            topic: self.topics.up(route).to_owned(),
            payload: to_payload(body),
        });
    }

    // ── ping ──────────────────────────────────────────────────

    fn on_ping(&mut self, payload: &[u8], out: &mut DispatchOutcome) {
        let (pkg_sn, result) = match packet::parse::<PingRequest>(payload) {
            Ok(req) => (req.pkg_sn.unwrap_or(0), self.adopt(req)),
            Err(e) => (packet::sniff_ids(payload).0, Err(e)),
        };
        let ack = Ack {
            pkg_sn,
            pkg_idx: 0,
            err_code: ErrorCode::of(&result),
        };
        self.reply(Route::Ping, &ack, out);
    }

    fn adopt(&mut self, req: PingRequest) -> Result<()> {
        req.pkg_sn.ok_or(ErrorCode::ParseError)?;
        let identity = DeviceIdentity {
            mac: self.mac,
            category: req.category.unwrap_or(0),
            account_id: req.account_id.ok_or(ErrorCode::ParseError)?,
            name: req.name.unwrap_or_default(),
            avatar: req.avatar.unwrap_or_default(),
            token: req.token.unwrap_or_default(),
        };
        session::lock(&self.session).adopt_identity(identity);
        Ok(())
    }

    // ── exec ──────────────────────────────────────────────────

    fn on_exec(&mut self, payload: &[u8], exec: &mut dyn ExecPort, out: &mut DispatchOutcome) {
        let (pkg_sn, pkg_idx) = packet::sniff_ids(payload);
        let result = packet::parse::<ChunkFields>(payload)
            .and_then(ChunkFields::into_chunk)
            .and_then(|chunk| self.exec.handle(&chunk, exec).map(|done| (chunk.sequence_id, done)));

        if let Ok((sequence_id, Some(bytes))) = result {
            out.events.push(SyncEvent::TransferCompleted { sequence_id, bytes });
        }
        let ack = Ack {
            pkg_sn,
            pkg_idx,
            err_code: ErrorCode::of(&result),
        };
        self.reply(Route::Exec, &ack, out);
    }

    // ── file ──────────────────────────────────────────────────

    fn on_file(&mut self, payload: &[u8], ports: &mut HandlerPorts<'_>, out: &mut DispatchOutcome) {
        let mut req = match packet::parse::<FileRequest>(payload) {
            Ok(req) => req,
            Err(e) => {
                let (pkg_sn, pkg_idx) = packet::sniff_ids(payload);
                self.file_ack(0, pkg_sn, pkg_idx, Err(e), out);
                return;
            }
        };
        let pkg_sn = req.pkg_sn.unwrap_or(0);
        let Some(op) = req.file_op.and_then(FileOp::from_wire) else {
            warn!("file: sn={pkg_sn} unknown file_op {:?}", req.file_op);
            self.file_ack(req.file_op.unwrap_or(0), pkg_sn, 0, Err(ErrorCode::ParseError), out);
            return;
        };

        match op {
            FileOp::Write | FileOp::WriteV2 => {
                let pkg_idx = req.pkg_idx.map_or(0, i64::from);
                let result = self.write(op, &mut req, ports.settings, out);
                self.file_ack(op as u8, pkg_sn, pkg_idx, result, out);
            }
            FileOp::Read => {
                let result = req.path().and_then(|path| {
                    self.check_unreserved(path, ErrorCode::FileOpenError)?;
                    let sequence_id = req.pkg_sn.ok_or(ErrorCode::ParseError)?;
                    ports.reads.schedule(ReadJob {
                        sequence_id,
                        path: path.to_owned(),
                    })
                });
                // success is answered by the read worker's packets
                if result.is_err() {
                    self.file_ack(op as u8, pkg_sn, 0, result, out);
                }
            }
            FileOp::List | FileOp::ListV2 => self.list(op, &req, pkg_sn, out),
            FileOp::Remove => {
                let result = req
                    .path()
                    .and_then(|path| self.check_unreserved(path, ErrorCode::FileRemoveError).map(|()| path))
                    .and_then(|path| self.remove(path));
                self.file_ack(op as u8, pkg_sn, 0, result, out);
            }
            FileOp::MultiWrite => {
                let result = self.multi_write(&req);
                self.file_ack(op as u8, pkg_sn, 0, result, out);
            }
        }
    }

    fn file_ack(&self, file_op: u8, pkg_sn: i64, pkg_idx: i64, result: Result<()>, out: &mut DispatchOutcome) {
        let ack = FileAck {
            file_op,
            pkg_sn,
            pkg_idx,
            err_code: ErrorCode::of(&result),
        };
        self.reply(Route::File, &ack, out);
    }

    /// Whether `path` names the manifest or its temporary sibling.
    fn is_reserved(&self, path: &str) -> bool {
        let manifest = self.manifest.path();
        same_path(path, manifest) || same_path(path, &format!("{manifest}.tmp"))
    }

    fn check_unreserved(&self, path: &str, code: ErrorCode) -> Result<()> {
        if self.is_reserved(path) {
            warn!("file: {path} is reserved for the manifest");
            return Err(code);
        }
        Ok(())
    }

    fn write(
        &mut self,
        op: FileOp,
        req: &mut FileRequest,
        settings: &mut dyn StoragePort,
        out: &mut DispatchOutcome,
    ) -> Result<()> {
        let chunk = req.take_chunk_fields().into_chunk()?;
        let path = req.path()?.to_owned();
        self.check_unreserved(&path, ErrorCode::FileOpenError)?;
        let progress = self.writer.handle(self.fs.as_ref(), &path, &chunk)?;
        if !progress.completed {
            return Ok(());
        }

        if op == FileOp::WriteV2 {
            let info = req.file_info.as_ref().ok_or(ErrorCode::ParseError)?;
            self.manifest.upsert_single(info, &path)?;
        }
        out.events.push(SyncEvent::TransferCompleted {
            sequence_id: chunk.sequence_id,
            bytes: progress.bytes,
        });

        if ota::is_ota_trigger(&path, &self.ota_filename) {
            info!("file: {path} is an update image, restarting into network boot");
            // restart even when the flag could not be stored
            if let Err(e) = ota::request_network_boot(settings) {
                warn!("file: sn={} boot flag not stored ({e}), restarting anyway", chunk.sequence_id);
            }
            out.restart = true;
            out.events.push(SyncEvent::RestartScheduled);
        }
        Ok(())
    }

    fn list(&self, op: FileOp, req: &FileRequest, pkg_sn: i64, out: &mut DispatchOutcome) {
        let fs_path = req.fs_path.as_deref().unwrap_or_default();
        let result = req.path().and_then(|dir| {
            let mut listing = files::list_dir(self.fs.as_ref(), dir)?;
            listing.retain(|e| !self.is_reserved(&manifest::join_path(dir, &e.name)));
            if op == FileOp::ListV2 {
                self.manifest.load()?.overlay_md5(dir, &mut listing);
            }
            Ok(listing)
        });

        let response = ListResponse {
            file_op: FileOp::List as u8,
            fs_path,
            file_list: result.as_deref().unwrap_or(&[]),
            pkg_sn,
            err_code: ErrorCode::of(&result),
        };
        self.reply(Route::File, &response, out);
    }

    fn remove(&self, path: &str) -> Result<()> {
        let removed = files::remove_file(self.fs.as_ref(), path);
        let untracked = self.manifest.remove(path).map(|_| ()).map_err(ErrorCode::from);
        removed.and(untracked)
    }

    fn multi_write(&self, req: &FileRequest) -> Result<()> {
        let dir = req.path()?;
        let entries = req.file_list.as_deref().ok_or(ErrorCode::ParseError)?;
        let time = req.create_time.unwrap_or(0);
        self.manifest.replace_domain(Domain::Project, dir, entries, time)?;
        Ok(())
    }

    // ── paircode ──────────────────────────────────────────────

    fn on_paircode(&mut self, payload: &[u8], out: &mut DispatchOutcome) {
        let (pkg_sn, result) = match packet::parse::<PairRequest>(payload) {
            Ok(req) => (req.pkg_sn.unwrap_or(0), self.pair(req, out)),
            Err(e) => (packet::sniff_ids(payload).0, Err(e)),
        };
        let ack = Ack {
            pkg_sn,
            pkg_idx: 0,
            err_code: ErrorCode::of(&result),
        };
        self.reply(Route::PairCode, &ack, out);
    }

    fn pair(&mut self, req: PairRequest, out: &mut DispatchOutcome) -> Result<()> {
        let pair_code = req.pair_code.ok_or(ErrorCode::ParseError)?;
        let alias = req.alias_name.unwrap_or_default();
        if session::lock(&self.session).update_pairing(&pair_code, &alias) {
            out.events.push(SyncEvent::PairingUpdated { pair_code });
        }
        Ok(())
    }
}

/// Compare two device paths ignoring empty and `.` components.
fn same_path(a: &str, b: &str) -> bool {
    let parts = |p: &str| {
        p.split('/')
            .filter(|c| !c.is_empty() && *c != ".")
            .map(str::to_owned)
            .collect::<Vec<_>>()
    };
    a.starts_with('/') == b.starts_with('/') && parts(a) == parts(b)
}

// ── Tests ────────────────────────────────────────────────────
