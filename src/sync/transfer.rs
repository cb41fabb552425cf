//! Outbound file reads (`file_op` 1).
//!
//! The dispatcher only queues a [`ReadJob`]; a dedicated read worker
//! thread streams the file so the session loop never blocks on multi-chunk
//! I/O. A file of `size` bytes goes out as `max(1, ceil(size / chunk))`
//! packets, each one base64 chunk, with a short pause between publishes:
//!
//! ```json
//! {"file_op":1,"pkg_sn":7,"pkg_idx":0,"pkg_tot":3,"pkg_len":2048,"pkg_ctx":"…","err_code":0}
//! ```
//!
//! A storage failure mid-stream is reported as a file ack carrying the
//! failing index and code; a transport failure just ends the stream.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use log::{info, warn};

use super::channels::ReadJobChannel;
use super::codec;
use super::packet::{FileAck, ReadPacket, to_payload};
use crate::app::ports::{FileHandle, FilePort, Publisher, TransportError};
use crate::drivers::task_pin::{self, Core};
use crate::error::{ErrorCode, Result};

pub const FILE_OP_READ: u8 = 1;

/// A queued outbound file read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadJob {
    pub sequence_id: i64,
    pub path: String,
}

/// Accepts read jobs from the dispatcher.
pub trait ReadScheduler {
    /// Queue `job`. A full queue is `NoMemoryAvailable`.
    fn schedule(&self, job: ReadJob) -> Result<()>;
}

/// [`ReadScheduler`] backed by a read-job channel.
pub struct ReadQueue<'a> {
    jobs: &'a ReadJobChannel,
}

impl<'a> ReadQueue<'a> {
    pub fn new(jobs: &'a ReadJobChannel) -> Self {
        Self { jobs }
    }
}

impl ReadScheduler for ReadQueue<'_> {
    fn schedule(&self, job: ReadJob) -> Result<()> {
        self.jobs.try_send(job).map_err(|_| {
            warn!("xfer: read queue full");
            ErrorCode::NoMemoryAvailable
        })
    }
}

/// Packets needed for a file of `size` bytes. An empty file still sends one.
pub fn packet_count(size: u64, chunk_bytes: usize) -> u32 {
    let chunk = chunk_bytes.max(1) as u64;
    size.div_ceil(chunk).max(1) as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    Storage { index: u32, code: ErrorCode },
    Transport(TransportError),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { index, code } => write!(f, "storage error at packet {index}: {code}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
        }
    }
}

/// Streams files from a [`FilePort`] to a [`Publisher`].
pub struct ReadWorker<F, P: ?Sized> {
    fs: Arc<F>,
    publisher: Arc<P>,
    topic: String,
    chunk_bytes: usize,
    gap: Duration,
}

impl<F: FilePort, P: Publisher + ?Sized> ReadWorker<F, P> {
    pub fn new(fs: Arc<F>, publisher: Arc<P>, topic: impl Into<String>, chunk_bytes: usize, gap: Duration) -> Self {
        Self {
            fs,
            publisher,
            topic: topic.into(),
            chunk_bytes: chunk_bytes.max(1),
            gap,
        }
    }

    /// Stream one file. Returns the number of packets published.
    pub fn run_job(&self, job: &ReadJob) -> core::result::Result<u32, StreamError> {
        let result = self.stream(job);
        match &result {
            Ok(sent) => info!("xfer: sn={} sent {} ({} packets)", job.sequence_id, job.path, sent),
            Err(e) => {
                warn!("xfer: sn={} {}: {e}", job.sequence_id, job.path);
                if let StreamError::Storage { index, code } = *e {
                    let ack = FileAck {
                        file_op: FILE_OP_READ,
                        pkg_sn: job.sequence_id,
                        pkg_idx: i64::from(index),
                        err_code: code.code(),
                    };
                    let _ = self.publisher.publish(&self.topic, &to_payload(&ack));
                }
            }
        }
        result
    }

    /// Process every queued job without blocking. Returns how many ran.
    pub fn drain(&self, jobs: &ReadJobChannel) -> usize {
        let mut ran = 0;
        while let Ok(job) = jobs.try_receive() {
            let _ = self.run_job(&job);
            ran += 1;
        }
        ran
    }

    fn stream(&self, job: &ReadJob) -> core::result::Result<u32, StreamError> {
        let storage = |index: u32| move |code: ErrorCode| StreamError::Storage { index, code };

        let size = self
            .fs
            .size(&job.path)
            .map_err(|e| storage(0)(e.into()))?;
        let total = packet_count(size, self.chunk_bytes);
        let mut file = self
            .fs
            .open(&job.path, crate::app::ports::OpenMode::Read)
            .map_err(|e| storage(0)(e.into()))?;

        let mut buf = vec![0u8; self.chunk_bytes];
        let mut remaining = size;
        for index in 0..total {
            let want = remaining.min(self.chunk_bytes as u64) as usize;
            if let Err(code) = read_exact(&mut file, &mut buf[..want]) {
                let _ = file.close();
                return Err(storage(index)(code));
            }
            remaining -= want as u64;

            let encoded = codec::encode(&buf[..want]);
            let packet = ReadPacket {
                file_op: FILE_OP_READ,
                pkg_sn: job.sequence_id,
                pkg_idx: index,
                pkg_tot: total,
                pkg_len: want,
                pkg_ctx: &encoded,
                err_code: crate::error::SUCCESS,
            };
            if let Err(e) = self.publisher.publish(&self.topic, &to_payload(&packet)) {
                let _ = file.close();
                return Err(StreamError::Transport(e));
            }

            if index + 1 < total && !self.gap.is_zero() {
                std::thread::sleep(self.gap);
            }
        }

        if let Err(e) = file.close() {
            warn!("xfer: close {}: {e}", job.path);
        }
        Ok(total)
    }
}

fn read_exact<H: FileHandle>(file: &mut H, mut buf: &mut [u8]) -> Result<()> {
    while !buf.is_empty() {
        match file.read(buf) {
            Ok(0) => return Err(ErrorCode::FileReadError),
            Ok(n) => buf = &mut buf[n..],
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

impl<F, P> ReadWorker<F, P>
where
    F: FilePort + Send + Sync + 'static,
    P: Publisher + Send + Sync + ?Sized + 'static,
{
    /// Run on a dedicated thread, streaming jobs from `jobs` forever.
    pub fn spawn(self, jobs: &'static ReadJobChannel) -> std::thread::JoinHandle<()> {
        task_pin::spawn_on_core(Core::App, 5, 8, "sync-read\0", move || {
            info!("xfer: read worker started");
            loop {
                let job = futures_lite::future::block_on(jobs.receive());
                let _ = self.run_job(&job);
            }
        })
    }
}

// ── Tests ────────────────────────────────────────────────────
