//! Dispatcher scenarios: one inbound message in, acks/events/restart out.
//!
//! Storage is a RAM volume mounted at `/flash`; settings are the host NVS
//! backend, so the boot flag written by an update is observable.

use std::sync::Arc;

use serde_json::{Value, json};

use cloudsync::adapters::nvs::NvsAdapter;
use cloudsync::adapters::storage::{MountTable, RamVolume};
use cloudsync::app::ports::{FileHandle, FilePort, OpenMode, StorageError, StoragePort};
use cloudsync::app::events::SyncEvent;
use cloudsync::config::SyncConfig;
use cloudsync::error::ErrorCode;
use cloudsync::sync::codec;
use cloudsync::sync::dispatcher::{DispatchOutcome, Dispatcher, HandlerPorts};
use cloudsync::sync::manifest::Domain;
use cloudsync::sync::ota::{self, BootMode};
use cloudsync::sync::session;
use cloudsync::sync::topics::Route;

use crate::mock_ports::{Console, ConsoleCall, JobLog, TEST_MAC, json as parse_json};

struct Rig {
    dispatcher: Dispatcher<MountTable>,
    flash: RamVolume,
    settings: NvsAdapter,
    console: Console,
    reads: JobLog,
}

impl Rig {
    fn new() -> Self {
        let flash = RamVolume::new();
        let fs = Arc::new(MountTable::new().mount("/flash", flash.clone()));
        Self {
            dispatcher: Dispatcher::new(TEST_MAC, &SyncConfig::default(), fs, session::shared()),
            flash,
            settings: NvsAdapter::new().unwrap(),
            console: Console::default(),
            reads: JobLog::default(),
        }
    }

    fn send(&mut self, route: Route, body: &Value) -> DispatchOutcome {
        let topic = self.dispatcher.topics().down(route).to_owned();
        self.send_raw(&topic, &serde_json::to_vec(body).unwrap())
    }

    fn send_raw(&mut self, topic: &str, payload: &[u8]) -> DispatchOutcome {
        let mut ports = HandlerPorts {
            settings: &mut self.settings,
            exec: &mut self.console,
            reads: &self.reads,
        };
        self.dispatcher.dispatch(topic, payload, &mut ports)
    }

    /// Place a file on flash without going through the file topic.
    fn plant(&self, path: &str, data: &[u8]) {
        let mut file = self.flash.open(path, OpenMode::Truncate).unwrap();
        file.write(data).unwrap();
        file.close().unwrap();
    }

    fn manifest_paths(&self) -> Vec<(String, Domain)> {
        self.dispatcher
            .manifest()
            .load()
            .unwrap()
            .file_list
            .into_iter()
            .map(|e| (e.device_path, e.domain))
            .collect()
    }
}

/// The single reply of an outcome, decoded.
fn reply(outcome: &DispatchOutcome) -> Value {
    assert_eq!(outcome.outbound.len(), 1, "expected exactly one reply");
    parse_json(&outcome.outbound[0].payload)
}

fn write_chunk(op: u8, sn: i64, tot: u32, idx: u32, path: &str, data: &[u8]) -> Value {
    json!({
        "file_op": op,
        "pkg_sn": sn,
        "pkg_tot": tot,
        "pkg_idx": idx,
        "pkg_len": data.len(),
        "pkg_ctx": codec::encode(data),
        "fs_path": path,
    })
}

// ── Updates ───────────────────────────────────────────────────

#[test]
fn update_image_restarts_only_after_last_chunk() {
    let mut rig = Rig::new();
    let path = "/flash/ota_update.bin";
    let parts: [&[u8]; 3] = [b"AAAA", b"BBBB", b"CC"];

    for (idx, part) in parts.iter().enumerate() {
        let out = rig.send(Route::File, &write_chunk(0, 77, 3, idx as u32, path, part));
        let ack = reply(&out);
        assert_eq!(ack["err_code"], 0);
        assert_eq!(ack["pkg_idx"], idx as i64);
        assert_eq!(out.outbound[0].topic, rig.dispatcher.topics().up(Route::File));

        let last = idx == 2;
        assert_eq!(out.restart, last, "restart flag on chunk {idx}");
        assert_eq!(out.events.contains(&SyncEvent::RestartScheduled), last);
    }

    assert_eq!(rig.flash.contents("ota_update.bin").unwrap(), b"AAAABBBBCC");
    assert_eq!(ota::boot_mode(&rig.settings), BootMode::Network);
}

/// Settings store whose writes always fail.
struct FullSettings;

impl StoragePort for FullSettings {
    fn read(&self, _: &str, _: &str, _: &mut [u8]) -> Result<usize, StorageError> {
        Err(StorageError::NotFound)
    }

    fn write(&mut self, _: &str, _: &str, _: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Full)
    }

    fn delete(&mut self, _: &str, _: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn exists(&self, _: &str, _: &str) -> bool {
        false
    }
}

#[test]
fn update_image_restarts_even_if_boot_flag_is_lost() {
    let mut rig = Rig::new();
    let body = write_chunk(0, 78, 1, 0, "/flash/ota_update.bin", b"IMG");
    let mut settings = FullSettings;
    let mut ports = HandlerPorts {
        settings: &mut settings,
        exec: &mut rig.console,
        reads: &rig.reads,
    };
    let topic = rig.dispatcher.topics().down(Route::File).to_owned();
    let out = rig
        .dispatcher
        .dispatch(&topic, &serde_json::to_vec(&body).unwrap(), &mut ports);

    assert_eq!(reply(&out)["err_code"], 0);
    assert!(out.restart);
    assert!(out.events.contains(&SyncEvent::RestartScheduled));
    assert_eq!(rig.flash.contents("ota_update.bin").unwrap(), b"IMG");
}

#[test]
fn switching_path_mid_transfer_never_completes_an_update() {
    let mut rig = Rig::new();
    let other = "/flash/other.bin";
    assert_eq!(reply(&rig.send(Route::File, &write_chunk(0, 9, 3, 0, other, b"AAAA")))["err_code"], 0);
    assert_eq!(reply(&rig.send(Route::File, &write_chunk(0, 9, 3, 1, other, b"BBBB")))["err_code"], 0);

    let out = rig.send(Route::File, &write_chunk(0, 9, 3, 2, "/flash/ota_update.bin", b"CCCC"));
    assert_eq!(reply(&out)["err_code"], ErrorCode::IndexError.code());
    assert!(!out.restart);
    assert!(out.events.is_empty());
    assert!(rig.flash.contents("ota_update.bin").is_none());
    assert_eq!(ota::boot_mode(&rig.settings), BootMode::Normal);

    // the abandoned transfer cannot be resumed on the original path either
    let resumed = rig.send(Route::File, &write_chunk(0, 9, 3, 2, other, b"CCCC"));
    assert_eq!(reply(&resumed)["err_code"], ErrorCode::IndexError.code());
    assert_eq!(rig.flash.contents("other.bin").unwrap(), b"AAAABBBB");
}

#[test]
fn ordinary_file_does_not_restart() {
    let mut rig = Rig::new();
    let out = rig.send(Route::File, &write_chunk(0, 1, 1, 0, "/flash/main.py", b"x = 1\n"));
    assert!(!out.restart);
    assert_eq!(
        out.events,
        vec![SyncEvent::TransferCompleted { sequence_id: 1, bytes: 6 }]
    );
    assert_eq!(ota::boot_mode(&rig.settings), BootMode::Normal);
}

// ── Chunk validation ──────────────────────────────────────────

#[test]
fn length_mismatch_rejects_chunk_but_keeps_transfer() {
    let mut rig = Rig::new();
    let path = "/flash/data.bin";

    assert_eq!(reply(&rig.send(Route::File, &write_chunk(0, 5, 2, 0, path, b"head")))["err_code"], 0);

    let mut bad = write_chunk(0, 5, 2, 1, path, b"tail");
    bad["pkg_len"] = json!(9);
    let ack = reply(&rig.send(Route::File, &bad));
    assert_eq!(ack["err_code"], ErrorCode::LengthError.code());
    assert_eq!(rig.flash.contents("data.bin").unwrap(), b"head");

    let ack = reply(&rig.send(Route::File, &write_chunk(0, 5, 2, 1, path, b"tail")));
    assert_eq!(ack["err_code"], 0);
    assert_eq!(rig.flash.contents("data.bin").unwrap(), b"headtail");
}

#[test]
fn length_mismatch_on_first_chunk_writes_nothing() {
    let mut rig = Rig::new();
    let mut bad = write_chunk(0, 6, 1, 0, "/flash/new.bin", b"abc");
    bad["pkg_len"] = json!(4);
    assert_eq!(reply(&rig.send(Route::File, &bad))["err_code"], ErrorCode::LengthError.code());
    assert!(rig.flash.contents("new.bin").is_none());
}

#[test]
fn index_gap_discards_transfer_until_fresh_start() {
    let mut rig = Rig::new();
    let path = "/flash/seq.bin";

    assert_eq!(reply(&rig.send(Route::File, &write_chunk(0, 9, 3, 0, path, b"0")))["err_code"], 0);
    let skipped = rig.send(Route::File, &write_chunk(0, 9, 3, 2, path, b"2"));
    assert_eq!(reply(&skipped)["err_code"], ErrorCode::IndexError.code());

    // the transfer is gone, so even the expected index is now out of sequence
    let late = rig.send(Route::File, &write_chunk(0, 9, 3, 1, path, b"1"));
    assert_eq!(reply(&late)["err_code"], ErrorCode::IndexError.code());

    for (idx, part) in [b"a", b"b", b"c"].iter().enumerate() {
        let out = rig.send(Route::File, &write_chunk(0, 10, 3, idx as u32, path, *part));
        assert_eq!(reply(&out)["err_code"], 0);
    }
    assert_eq!(rig.flash.contents("seq.bin").unwrap(), b"abc");
}

#[test]
fn oversized_chunk_is_rejected() {
    let mut rig = Rig::new();
    let big = vec![0x55u8; SyncConfig::default().max_packet_bytes as usize + 1];
    let out = rig.send(Route::File, &write_chunk(0, 3, 1, 0, "/flash/big.bin", &big));
    assert_eq!(reply(&out)["err_code"], ErrorCode::PayloadTooLarge.code());
    assert!(rig.flash.contents("big.bin").is_none());
}

#[test]
fn undecodable_payload_is_no_memory() {
    let mut rig = Rig::new();
    let mut body = write_chunk(0, 3, 1, 0, "/flash/x.bin", b"abc");
    body["pkg_ctx"] = json!("YWJj====");
    let out = rig.send(Route::File, &body);
    assert_eq!(reply(&out)["err_code"], ErrorCode::NoMemoryAvailable.code());
}

// ── Requests that fail to parse ───────────────────────────────

#[test]
fn unknown_file_op_is_parse_error() {
    let mut rig = Rig::new();
    let ack = reply(&rig.send(Route::File, &json!({"file_op": 9, "pkg_sn": 12})));
    assert_eq!(ack["file_op"], 9);
    assert_eq!(ack["pkg_sn"], 12);
    assert_eq!(ack["err_code"], ErrorCode::ParseError.code());
}

#[test]
fn mistyped_request_echoes_sequence_id() {
    let mut rig = Rig::new();
    let topic = rig.dispatcher.topics().down(Route::File).to_owned();
    let ack = reply(&rig.send_raw(&topic, br#"{"file_op":"zero","pkg_sn":4,"pkg_idx":2}"#));
    assert_eq!(ack["file_op"], 0);
    assert_eq!(ack["pkg_sn"], 4);
    assert_eq!(ack["pkg_idx"], 2);
    assert_eq!(ack["err_code"], ErrorCode::ParseError.code());
}

#[test]
fn unknown_topic_produces_nothing() {
    let mut rig = Rig::new();
    let out = rig.send_raw("/v1/device/000000000000/file/down", b"{}");
    assert!(out.outbound.is_empty());
    assert!(out.events.is_empty());
    assert!(!out.restart);
}

// ── Manifest-backed operations ────────────────────────────────

#[test]
fn write_v2_records_user_entry() {
    let mut rig = Rig::new();
    let mut body = write_chunk(4, 20, 1, 0, "/flash/lib/util.py", b"def f(): pass\n");
    body["file_info"] = json!({"name": "util.py", "size": 14, "md5": "d41d8c", "create_time": 1_700_000_000});
    let out = rig.send(Route::File, &body);
    let ack = reply(&out);
    assert_eq!(ack["file_op"], 4);
    assert_eq!(ack["err_code"], 0);

    let manifest = rig.dispatcher.manifest().load().unwrap();
    let entry = manifest.find("/flash/lib/util.py").unwrap();
    assert_eq!(entry.domain, Domain::User);
    assert_eq!(entry.md5.as_deref(), Some("d41d8c"));
    assert_eq!(manifest.total_size, 14);
    assert_eq!(manifest.time, 1_700_000_000);
}

#[test]
fn write_v2_without_file_info_fails_after_write() {
    let mut rig = Rig::new();
    let out = rig.send(Route::File, &write_chunk(4, 21, 1, 0, "/flash/a.py", b"a"));
    assert_eq!(reply(&out)["err_code"], ErrorCode::ParseError.code());
    assert!(rig.manifest_paths().is_empty());
}

#[test]
fn multi_write_replaces_project_domain() {
    let mut rig = Rig::new();
    let mut single = write_chunk(4, 30, 1, 0, "/flash/user.py", b"u");
    single["file_info"] = json!({"name": "user.py", "size": 1});
    rig.send(Route::File, &single);

    let project = json!({
        "file_op": 5,
        "pkg_sn": 31,
        "fs_path": "/flash/proj",
        "create_time": 42,
        "file_list": [
            {"name": "main.py", "size": 10, "md5": "m1"},
            {"name": "lib.py", "size": 20, "md5": "l1"}
        ]
    });
    let ack = reply(&rig.send(Route::File, &project));
    assert_eq!(ack["file_op"], 5);
    assert_eq!(ack["err_code"], 0);
    assert_eq!(rig.manifest_paths().len(), 3);

    // re-applying the same set changes nothing
    rig.send(Route::File, &project);
    assert_eq!(rig.manifest_paths().len(), 3);

    let mut empty = project.clone();
    empty["file_list"] = json!([]);
    assert_eq!(reply(&rig.send(Route::File, &empty))["err_code"], 0);

    assert_eq!(
        rig.manifest_paths(),
        vec![("/flash/user.py".to_owned(), Domain::User)]
    );
    let manifest = rig.dispatcher.manifest().load().unwrap();
    assert_eq!(manifest.total_size, 1);
}

#[test]
fn multi_write_with_overflowing_sizes_is_rejected() {
    let mut rig = Rig::new();
    let mut single = write_chunk(4, 32, 1, 0, "/flash/user.py", b"u");
    single["file_info"] = json!({"name": "user.py", "size": 1});
    rig.send(Route::File, &single);
    let before = rig.flash.contents(".sync_manifest.json").unwrap();

    let body = json!({
        "file_op": 5,
        "pkg_sn": 33,
        "fs_path": "/flash/p",
        "file_list": [
            {"name": "a", "size": u64::MAX},
            {"name": "b", "size": 1}
        ]
    });
    let ack = reply(&rig.send(Route::File, &body));
    assert_eq!(ack["file_op"], 5);
    assert_eq!(ack["pkg_sn"], 33);
    assert_eq!(ack["err_code"], ErrorCode::ParseError.code());
    assert_eq!(rig.flash.contents(".sync_manifest.json").unwrap(), before);
    assert_eq!(rig.dispatcher.manifest().load().unwrap().total_size, 1);
}

#[test]
fn list_v2_overlays_known_digests() {
    let mut rig = Rig::new();
    let mut tracked = write_chunk(4, 40, 1, 0, "/flash/app/main.py", b"print()");
    tracked["file_info"] = json!({"name": "main.py", "size": 7, "md5": "abc"});
    rig.send(Route::File, &tracked);
    rig.send(Route::File, &write_chunk(0, 41, 1, 0, "/flash/app/raw.txt", b"raw"));

    let out = rig.send(Route::File, &json!({"file_op": 6, "pkg_sn": 42, "fs_path": "/flash/app"}));
    let list = reply(&out);
    assert_eq!(list["file_op"], 2);
    assert_eq!(list["fs_path"], "/flash/app");
    assert_eq!(list["pkg_sn"], 42);
    assert_eq!(list["err_code"], 0);
    assert_eq!(
        list["file_list"],
        json!([{"name": "main.py", "md5": "abc"}, {"name": "raw.txt", "md5": null}])
    );

    // plain list never consults the manifest
    let plain = reply(&rig.send(Route::File, &json!({"file_op": 2, "pkg_sn": 43, "fs_path": "/flash/app"})));
    assert_eq!(plain["file_list"][0]["md5"], Value::Null);
}

#[test]
fn list_of_missing_directory_reports_error_with_empty_list() {
    let mut rig = Rig::new();
    let list = reply(&rig.send(Route::File, &json!({"file_op": 6, "pkg_sn": 3, "fs_path": "/flash/nope"})));
    assert_eq!(list["file_op"], 2);
    assert_eq!(list["file_list"], json!([]));
    assert_eq!(list["err_code"], ErrorCode::NoSuchFileOrDirectory.code());
}

#[test]
fn list_with_corrupt_manifest_is_parse_error() {
    let mut rig = Rig::new();
    rig.send(Route::File, &write_chunk(0, 50, 1, 0, "/flash/app/a.py", b"a"));
    rig.plant(".sync_manifest.json", b"{broken");

    let list = reply(&rig.send(Route::File, &json!({"file_op": 6, "pkg_sn": 52, "fs_path": "/flash/app"})));
    assert_eq!(list["err_code"], ErrorCode::ParseError.code());
    assert_eq!(list["file_list"], json!([]));
    assert_eq!(rig.flash.contents(".sync_manifest.json").unwrap(), b"{broken");
}

#[test]
fn manifest_file_is_not_reachable_through_file_ops() {
    let mut rig = Rig::new();
    let mut body = write_chunk(4, 80, 1, 0, "/flash/keep.py", b"k");
    body["file_info"] = json!({"name": "keep.py", "size": 1});
    rig.send(Route::File, &body);
    rig.plant(".sync_manifest.json.tmp", b"leftover");
    let manifest = rig.flash.contents(".sync_manifest.json").unwrap();

    let write = rig.send(Route::File, &write_chunk(0, 81, 1, 0, "/flash/.sync_manifest.json", b"{}"));
    assert_eq!(reply(&write)["err_code"], ErrorCode::FileOpenError.code());
    let sneaky = rig.send(Route::File, &write_chunk(0, 82, 1, 0, "/flash//./.sync_manifest.json", b"{}"));
    assert_eq!(reply(&sneaky)["err_code"], ErrorCode::FileOpenError.code());

    let remove = json!({"file_op": 3, "pkg_sn": 83, "fs_path": "/flash/.sync_manifest.json"});
    assert_eq!(reply(&rig.send(Route::File, &remove))["err_code"], ErrorCode::FileRemoveError.code());

    let read = json!({"file_op": 1, "pkg_sn": 84, "fs_path": "/flash/.sync_manifest.json.tmp"});
    let ack = reply(&rig.send(Route::File, &read));
    assert_eq!(ack["file_op"], 1);
    assert_eq!(ack["err_code"], ErrorCode::FileOpenError.code());
    assert!(rig.reads.jobs.borrow().is_empty());

    assert_eq!(rig.flash.contents(".sync_manifest.json").unwrap(), manifest);
    let list = reply(&rig.send(Route::File, &json!({"file_op": 2, "pkg_sn": 85, "fs_path": "/flash"})));
    assert_eq!(list["err_code"], 0);
    assert_eq!(list["file_list"], json!([{"name": "keep.py", "md5": null}]));
}

#[test]
fn remove_deletes_file_and_entry() {
    let mut rig = Rig::new();
    let mut body = write_chunk(4, 60, 1, 0, "/flash/gone.py", b"bye");
    body["file_info"] = json!({"name": "gone.py", "size": 3});
    rig.send(Route::File, &body);

    let ack = reply(&rig.send(Route::File, &json!({"file_op": 3, "pkg_sn": 61, "fs_path": "/flash/gone.py"})));
    assert_eq!(ack["file_op"], 3);
    assert_eq!(ack["err_code"], 0);
    assert!(rig.flash.contents("gone.py").is_none());
    assert!(rig.manifest_paths().is_empty());

    let again = reply(&rig.send(Route::File, &json!({"file_op": 3, "pkg_sn": 62, "fs_path": "/flash/gone.py"})));
    assert_eq!(again["err_code"], ErrorCode::NoSuchFileOrDirectory.code());
}

// ── Reads ─────────────────────────────────────────────────────

#[test]
fn read_is_scheduled_without_ack() {
    let mut rig = Rig::new();
    let out = rig.send(Route::File, &json!({"file_op": 1, "pkg_sn": 70, "fs_path": "/flash/main.py"}));
    assert!(out.outbound.is_empty());

    let jobs = rig.reads.jobs.borrow();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].sequence_id, 70);
    assert_eq!(jobs[0].path, "/flash/main.py");
}

#[test]
fn read_without_path_is_acked_as_parse_error() {
    let mut rig = Rig::new();
    let ack = reply(&rig.send(Route::File, &json!({"file_op": 1, "pkg_sn": 71})));
    assert_eq!(ack["file_op"], 1);
    assert_eq!(ack["err_code"], ErrorCode::ParseError.code());
    assert!(rig.reads.jobs.borrow().is_empty());
}

// ── exec / ping / paircode ────────────────────────────────────

#[test]
fn exec_stream_reaches_console_with_cr_line_endings() {
    let mut rig = Rig::new();
    let parts: [&[u8]; 2] = [b"print(1)\n", b"print(2)\n"];
    let mut last = DispatchOutcome::default();
    for (idx, part) in parts.iter().enumerate() {
        last = rig.send(
            Route::Exec,
            &json!({
                "pkg_sn": 80,
                "pkg_tot": 2,
                "pkg_idx": idx,
                "pkg_len": part.len(),
                "pkg_ctx": codec::encode(part),
            }),
        );
        let ack = reply(&last);
        assert_eq!(ack["err_code"], 0);
        assert_eq!(ack["pkg_idx"], idx as i64);
        assert_eq!(last.outbound[0].topic, rig.dispatcher.topics().up(Route::Exec));
    }

    assert_eq!(rig.console.bytes, b"print(1)\rprint(2)\r");
    assert_eq!(
        rig.console.calls,
        vec![ConsoleCall::Begin, ConsoleCall::Feed(9), ConsoleCall::Feed(9), ConsoleCall::Finish]
    );
    assert_eq!(
        last.events,
        vec![SyncEvent::TransferCompleted { sequence_id: 80, bytes: 18 }]
    );
}

#[test]
fn exec_consumer_failure_is_execute_error() {
    let mut rig = Rig::new();
    rig.console.reject_feed = true;
    let out = rig.send(
        Route::Exec,
        &json!({"pkg_sn": 81, "pkg_tot": 1, "pkg_idx": 0, "pkg_len": 1, "pkg_ctx": codec::encode(b"x")}),
    );
    assert_eq!(reply(&out)["err_code"], ErrorCode::ExecuteError.code());
    assert!(out.events.is_empty());
}

#[test]
fn ping_adopts_first_identity_only() {
    let mut rig = Rig::new();
    let first = json!({"pkg_sn": 1, "category": 3, "account_id": "acct-1", "name": "desk", "avatar": "", "token": "t"});
    let ack = reply(&rig.send(Route::Ping, &first));
    assert_eq!(ack, json!({"pkg_sn": 1, "pkg_idx": 0, "err_code": 0}));

    let second = json!({"pkg_sn": 2, "account_id": "acct-2"});
    assert_eq!(reply(&rig.send(Route::Ping, &second))["err_code"], 0);

    let session = session::lock(rig.dispatcher.session());
    let identity = session.identity().unwrap();
    assert_eq!(identity.account_id, "acct-1");
    assert_eq!(identity.category, 3);
    assert_eq!(identity.mac, TEST_MAC);
}

#[test]
fn ping_without_account_is_parse_error() {
    let mut rig = Rig::new();
    let ack = reply(&rig.send(Route::Ping, &json!({"pkg_sn": 5})));
    assert_eq!(ack["pkg_sn"], 5);
    assert_eq!(ack["err_code"], ErrorCode::ParseError.code());
    assert!(session::lock(rig.dispatcher.session()).identity().is_none());
}

#[test]
fn pair_code_change_is_reported_once() {
    let mut rig = Rig::new();
    let body = json!({"pkg_sn": 9, "pair_code": "482913", "alias_name": "kitchen"});

    let first = rig.send(Route::PairCode, &body);
    assert_eq!(reply(&first)["err_code"], 0);
    assert_eq!(first.outbound[0].topic, rig.dispatcher.topics().up(Route::PairCode));
    assert_eq!(
        first.events,
        vec![SyncEvent::PairingUpdated { pair_code: "482913".into() }]
    );

    let repeat = rig.send(Route::PairCode, &body);
    assert_eq!(reply(&repeat)["err_code"], 0);
    assert!(repeat.events.is_empty());

    let snapshot = session::lock(rig.dispatcher.session()).snapshot();
    assert_eq!(snapshot.pairing.alias_name, "kitchen");
}
