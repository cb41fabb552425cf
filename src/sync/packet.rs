//! JSON wire shapes for the four device topics.
//!
//! Inbound requests are deserialised into structs whose protocol fields are
//! all `Option`: a missing key and an explicit `null` are both reported as
//! [`ErrorCode::ParseError`] by the accessor that needs the field, so a
//! handler can still echo `pkg_sn` in the ack when some other field is bad.
//!
//! Outbound shapes serialise with field order fixed by declaration order.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, Result};

// ── Inbound ───────────────────────────────────────────────────

/// Framing fields shared by every chunked transfer.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ChunkFields {
    pub pkg_sn: Option<i64>,
    pub pkg_tot: Option<u32>,
    pub pkg_idx: Option<u32>,
    pub pkg_len: Option<u32>,
    pub pkg_ctx: Option<String>,
}

/// One validated chunk header with its still-encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub sequence_id: i64,
    pub total: u32,
    pub index: u32,
    pub declared_len: usize,
    pub encoded: String,
}

impl Chunk {
    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    pub fn is_last(&self) -> bool {
        self.index.checked_add(1) == Some(self.total)
    }
}

impl ChunkFields {
    /// Require every framing field to be present.
    pub fn into_chunk(self) -> Result<Chunk> {
        Ok(Chunk {
            sequence_id: self.pkg_sn.ok_or(ErrorCode::ParseError)?,
            total: self.pkg_tot.ok_or(ErrorCode::ParseError)?,
            index: self.pkg_idx.ok_or(ErrorCode::ParseError)?,
            declared_len: self.pkg_len.ok_or(ErrorCode::ParseError)? as usize,
            encoded: self.pkg_ctx.ok_or(ErrorCode::ParseError)?,
        })
    }
}

/// Descriptor of a synced file as sent by the cloud.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub create_time: i64,
}

/// Request on the `file` topic. Which fields matter depends on `file_op`.
#[derive(Debug, Default, Deserialize)]
pub struct FileRequest {
    pub file_op: Option<u8>,
    pub pkg_sn: Option<i64>,
    pub pkg_tot: Option<u32>,
    pub pkg_idx: Option<u32>,
    pub pkg_len: Option<u32>,
    pub pkg_ctx: Option<String>,
    pub fs_path: Option<String>,
    pub file_info: Option<FileInfo>,
    pub file_list: Option<Vec<FileInfo>>,
    pub create_time: Option<i64>,
}

impl FileRequest {
    /// Split off the framing fields (moves the payload string out).
    pub fn take_chunk_fields(&mut self) -> ChunkFields {
        ChunkFields {
            pkg_sn: self.pkg_sn,
            pkg_tot: self.pkg_tot,
            pkg_idx: self.pkg_idx,
            pkg_len: self.pkg_len,
            pkg_ctx: self.pkg_ctx.take(),
        }
    }

    pub fn path(&self) -> Result<&str> {
        self.fs_path.as_deref().ok_or(ErrorCode::ParseError)
    }
}

/// Handshake on the `ping` topic.
#[derive(Debug, Default, Deserialize)]
pub struct PingRequest {
    pub pkg_sn: Option<i64>,
    pub category: Option<i64>,
    pub account_id: Option<String>,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub token: Option<String>,
}

/// Pairing code push on the `paircode` topic.
#[derive(Debug, Default, Deserialize)]
pub struct PairRequest {
    pub pkg_sn: Option<i64>,
    pub pair_code: Option<String>,
    pub alias_name: Option<String>,
}

/// Parse a request body. Invalid JSON or a type mismatch is a `ParseError`.
pub fn parse<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|_| ErrorCode::ParseError)
}

/// Best-effort `(pkg_sn, pkg_idx)` for acking a payload that failed to parse.
pub fn sniff_ids(payload: &[u8]) -> (i64, i64) {
    #[derive(Deserialize)]
    struct Ids {
        pkg_sn: Option<serde_json::Value>,
        pkg_idx: Option<serde_json::Value>,
    }
    match serde_json::from_slice::<Ids>(payload) {
        Ok(ids) => (
            ids.pkg_sn.and_then(|v| v.as_i64()).unwrap_or(0),
            ids.pkg_idx.and_then(|v| v.as_i64()).unwrap_or(0),
        ),
        Err(_) => (0, 0),
    }
}

// ── Outbound ──────────────────────────────────────────────────

/// Generic acknowledgement: `{"pkg_sn","pkg_idx","err_code"}`.
#[derive(Debug, Serialize)]
pub struct Ack {
    pub pkg_sn: i64,
    pub pkg_idx: i64,
    pub err_code: i32,
}

/// File operation acknowledgement: `{"file_op","pkg_sn","pkg_idx","err_code"}`.
#[derive(Debug, Serialize)]
pub struct FileAck {
    pub file_op: u8,
    pub pkg_sn: i64,
    pub pkg_idx: i64,
    pub err_code: i32,
}

/// One chunk of an outbound file read.
#[derive(Debug, Serialize)]
pub struct ReadPacket<'a> {
    pub file_op: u8,
    pub pkg_sn: i64,
    pub pkg_idx: u32,
    pub pkg_tot: u32,
    pub pkg_len: usize,
    pub pkg_ctx: &'a str,
    pub err_code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub md5: Option<String>,
}

/// Directory listing response (always `file_op` 2 on the wire).
#[derive(Debug, Serialize)]
pub struct ListResponse<'a> {
    pub file_op: u8,
    pub fs_path: &'a str,
    pub file_list: &'a [ListEntry],
    pub pkg_sn: i64,
    pub err_code: i32,
}

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub free_heap: u32,
}

/// Unsolicited liveness report on the ping "up" topic.
#[derive(Debug, Serialize)]
pub struct LivenessReport<'a> {
    pub status: &'static str,
    pub system: SystemInfo,
    pub board_type: u8,
    pub board: &'a str,
    pub version: &'static str,
}

impl<'a> LivenessReport<'a> {
    pub fn online(free_heap: u32, board_type: u8, board: &'a str) -> Self {
        Self {
            status: "online",
            system: SystemInfo { free_heap },
            board_type,
            board,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Serialise an outbound shape. These structs hold only strings and
/// integers, so serialisation cannot fail in practice; an empty body is
/// published if it ever does.
pub fn to_payload<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

// ── Tests ────────────────────────────────────────────────────
