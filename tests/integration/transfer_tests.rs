//! Outbound file reads: chunking, packet shape and failure acks.

use core::time::Duration;
use std::sync::Arc;

use cloudsync::adapters::storage::{MountTable, RamVolume};
use cloudsync::app::ports::{FileHandle, FilePort, OpenMode, TransportError};
use cloudsync::error::ErrorCode;
use cloudsync::sync::channels::ReadJobChannel;
use cloudsync::sync::codec;
use cloudsync::sync::transfer::{ReadJob, ReadQueue, ReadScheduler, ReadWorker, StreamError};

use crate::mock_ports::RecordingPublisher;

const TOPIC: &str = "/v1/device/240ac4123456/file/up";

fn volume_with(name: &str, data: &[u8]) -> Arc<MountTable> {
    let ram = RamVolume::new();
    let fs = MountTable::new().mount("/flash", ram);
    let mut file = fs.open(&format!("/flash/{name}"), OpenMode::Truncate).unwrap();
    file.write(data).unwrap();
    file.close().unwrap();
    Arc::new(fs)
}

fn worker(fs: Arc<MountTable>, publisher: Arc<RecordingPublisher>, chunk: usize) -> ReadWorker<MountTable, RecordingPublisher> {
    ReadWorker::new(fs, publisher, TOPIC, chunk, Duration::ZERO)
}

fn job(sn: i64, path: &str) -> ReadJob {
    ReadJob {
        sequence_id: sn,
        path: path.into(),
    }
}

/// Reassemble the payloads of every published packet.
fn reassemble(publisher: &RecordingPublisher) -> Vec<u8> {
    publisher
        .messages()
        .iter()
        .flat_map(|(_, p)| codec::decode(p["pkg_ctx"].as_str().unwrap().as_bytes()).unwrap())
        .collect()
}

#[test]
fn exact_multiple_of_chunk_size() {
    let fs = volume_with("a.bin", b"01234567");
    let publisher = Arc::new(RecordingPublisher::default());
    assert_eq!(worker(fs, Arc::clone(&publisher), 4).run_job(&job(1, "/flash/a.bin")), Ok(2));

    let msgs = publisher.messages();
    assert_eq!(msgs.len(), 2);
    for (i, (topic, p)) in msgs.iter().enumerate() {
        assert_eq!(topic, TOPIC);
        assert_eq!(p["file_op"], 1);
        assert_eq!(p["pkg_sn"], 1);
        assert_eq!(p["pkg_idx"], i as u64);
        assert_eq!(p["pkg_tot"], 2);
        assert_eq!(p["pkg_len"], 4);
        assert_eq!(p["err_code"], 0);
    }
    assert_eq!(reassemble(&publisher), b"01234567");
}

#[test]
fn remainder_goes_in_a_short_last_packet() {
    let data: Vec<u8> = (0u8..10).collect();
    let fs = volume_with("b.bin", &data);
    let publisher = Arc::new(RecordingPublisher::default());
    assert_eq!(worker(fs, Arc::clone(&publisher), 4).run_job(&job(2, "/flash/b.bin")), Ok(3));

    let msgs = publisher.messages();
    let lens: Vec<_> = msgs.iter().map(|(_, p)| p["pkg_len"].as_u64().unwrap()).collect();
    assert_eq!(lens, vec![4, 4, 2]);
    assert_eq!(reassemble(&publisher), data);
}

#[test]
fn empty_file_sends_one_empty_packet() {
    let fs = volume_with("empty.bin", b"");
    let publisher = Arc::new(RecordingPublisher::default());
    assert_eq!(worker(fs, Arc::clone(&publisher), 4).run_job(&job(3, "/flash/empty.bin")), Ok(1));

    let msgs = publisher.messages();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].1["pkg_tot"], 1);
    assert_eq!(msgs[0].1["pkg_len"], 0);
    assert_eq!(msgs[0].1["pkg_ctx"], "");
}

#[test]
fn missing_file_is_acked_with_storage_error() {
    let fs = volume_with("a.bin", b"x");
    let publisher = Arc::new(RecordingPublisher::default());
    let result = worker(fs, Arc::clone(&publisher), 4).run_job(&job(4, "/flash/missing.bin"));
    assert_eq!(
        result,
        Err(StreamError::Storage {
            index: 0,
            code: ErrorCode::NoSuchFileOrDirectory
        })
    );

    let msgs = publisher.messages();
    assert_eq!(msgs.len(), 1);
    let ack = &msgs[0].1;
    assert_eq!(ack["file_op"], 1);
    assert_eq!(ack["pkg_sn"], 4);
    assert_eq!(ack["pkg_idx"], 0);
    assert_eq!(ack["err_code"], ErrorCode::NoSuchFileOrDirectory.code());
}

#[test]
fn transport_failure_stops_the_stream() {
    let fs = volume_with("c.bin", &[7u8; 12]);
    let publisher = Arc::new(RecordingPublisher::failing_after(1));
    let result = worker(fs, Arc::clone(&publisher), 4).run_job(&job(5, "/flash/c.bin"));
    assert_eq!(result, Err(StreamError::Transport(TransportError::PublishFailed)));
    assert_eq!(publisher.messages().len(), 1);
}

#[test]
fn queued_jobs_are_drained_in_order() {
    let fs = volume_with("d.bin", b"abcdef");
    let publisher = Arc::new(RecordingPublisher::default());
    let channel = ReadJobChannel::new();
    let queue = ReadQueue::new(&channel);
    queue.schedule(job(10, "/flash/d.bin")).unwrap();
    queue.schedule(job(11, "/flash/d.bin")).unwrap();

    assert_eq!(worker(fs, Arc::clone(&publisher), 8).drain(&channel), 2);
    let sns: Vec<_> = publisher
        .messages()
        .iter()
        .map(|(_, p)| p["pkg_sn"].as_i64().unwrap())
        .collect();
    assert_eq!(sns, vec![10, 11]);
}
