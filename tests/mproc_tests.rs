//! Multi-process mode tests: owner/attacher handles, the conversion
//! pipeline, and the shared name registry, exercised deterministically with
//! both roles inside one test process.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use plume::logger::{ Logger, LoggerConfig, MprocRole };
use plume::sink::Sink;
use plume::snapshot::Arg;
use plume::{ FullFormatter, Level, MessageFormatter, PlumeError };

struct VecSink {
    lines: Mutex<Vec<String>>,
}

impl VecSink {
    fn new() -> Arc<Self> {
        Arc::new(Self { lines: Mutex::new(Vec::new()) })
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl Sink for VecSink {
    fn write(&self, line: &str) -> plume::Result<()> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

fn unique_name(tag: &str) -> String {
    format!("/plume-mproc-it-{}-{}", tag, std::process::id())
}

fn wait_for<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn producer_records_reach_owner_consumer() {
    let name = unique_name("flow");
    let sink = VecSink::new();

    let owner = Logger::with_output(
        LoggerConfig::mproc(&name, MprocRole::Owner),
        Arc::new(MessageFormatter),
        vec![Arc::clone(&sink) as Arc<dyn Sink>]
    ).unwrap();

    let producer = Logger::with_output(
        LoggerConfig::mproc(&name, MprocRole::Producer),
        Arc::new(MessageFormatter),
        vec![]
    ).unwrap();

    for i in 0..10i64 {
        assert!(producer.log(Level::Info, "job {}", &[Arg::I64(i)]).is_published());
    }
    producer.flush();

    assert!(
        wait_for(|| sink.lines().len() == 10, Duration::from_secs(5)),
        "owner consumer received {} of 10 lines",
        sink.lines().len()
    );
    assert_eq!(sink.lines()[0], "job 0");
    assert_eq!(sink.lines()[9], "job 9");

    drop(producer);
    drop(owner);
}

#[test]
fn registry_names_appear_in_owner_output() {
    let name = unique_name("names");
    let sink = VecSink::new();

    let owner = Logger::with_output(
        LoggerConfig::mproc(&name, MprocRole::Owner),
        Arc::new(FullFormatter),
        vec![Arc::clone(&sink) as Arc<dyn Sink>]
    ).unwrap();

    let producer = Logger::with_output(
        LoggerConfig::mproc(&name, MprocRole::Producer),
        Arc::new(FullFormatter),
        vec![]
    ).unwrap();

    producer.set_process_name("worker-7");
    producer.set_thread_module("ingest");
    producer.log(Level::Info, "checkpoint", &[]);
    producer.flush();

    assert!(
        wait_for(|| !sink.lines().is_empty(), Duration::from_secs(5)),
        "no line reached the owner"
    );
    let line = &sink.lines()[0];
    assert!(line.contains("[worker-7:ingest]"), "line was: {line}");
    assert!(line.ends_with("checkpoint"), "line was: {line}");

    drop(producer);
    drop(owner);
}

#[test]
fn borrowed_templates_survive_the_process_boundary() {
    // The producer captures its template as a borrowed view; the pipeline
    // must rewrite it inline before it enters the shared ring, so the
    // consumer renders it without touching producer memory.
    let name = unique_name("convert");
    let sink = VecSink::new();

    let owner = Logger::with_output(
        LoggerConfig::mproc(&name, MprocRole::Owner),
        Arc::new(MessageFormatter),
        vec![Arc::clone(&sink) as Arc<dyn Sink>]
    ).unwrap();

    let producer = Logger::with_output(
        LoggerConfig::mproc(&name, MprocRole::Producer),
        Arc::new(MessageFormatter),
        vec![]
    ).unwrap();

    let dynamic = String::from("payload-bytes");
    producer.log(Level::Warn, "carry {} and {}", &[Arg::Str(&dynamic), Arg::U64(17)]);
    producer.flush();
    drop(dynamic);

    assert!(wait_for(|| !sink.lines().is_empty(), Duration::from_secs(5)));
    assert_eq!(sink.lines()[0], "carry payload-bytes and 17");

    drop(producer);
    drop(owner);
}

#[test]
fn attach_without_owner_fails_not_found() {
    let name = unique_name("orphan");
    let result = Logger::with_output(
        LoggerConfig::mproc(&name, MprocRole::Producer),
        Arc::new(MessageFormatter),
        vec![]
    );
    assert!(matches!(result.unwrap_err(), PlumeError::NotFound { .. }));
}

#[test]
fn owner_unlinks_segments_on_drop() {
    let name = unique_name("unlink");
    {
        let _owner = Logger::with_output(
            LoggerConfig::mproc(&name, MprocRole::Owner),
            Arc::new(MessageFormatter),
            vec![]
        ).unwrap();

        // While the owner lives, attach succeeds.
        let attached = Logger::with_output(
            LoggerConfig::mproc(&name, MprocRole::Producer),
            Arc::new(MessageFormatter),
            vec![]
        );
        assert!(attached.is_ok());
    }

    // Owner gone: the segments are unlinked.
    let result = Logger::with_output(
        LoggerConfig::mproc(&name, MprocRole::Producer),
        Arc::new(MessageFormatter),
        vec![]
    );
    assert!(matches!(result.unwrap_err(), PlumeError::NotFound { .. }));
}

#[test]
fn wfc_unblocks_once_record_is_forwarded() {
    let name = unique_name("wfc");
    let sink = VecSink::new();

    let owner = Logger::with_output(
        LoggerConfig::mproc(&name, MprocRole::Owner).with_wfc(true),
        Arc::new(MessageFormatter),
        vec![Arc::clone(&sink) as Arc<dyn Sink>]
    ).unwrap();

    let producer = Logger::with_output(
        LoggerConfig::mproc(&name, MprocRole::Producer).with_wfc(true),
        Arc::new(MessageFormatter),
        vec![]
    ).unwrap();

    // Must return (no deadlock) and the record must eventually land.
    let result = producer.log_wfc(Level::Critical, "durable {}", &[Arg::U32(1)]);
    assert!(result.is_published());
    assert!(wait_for(|| !sink.lines().is_empty(), Duration::from_secs(5)));
    assert_eq!(sink.lines()[0], "durable 1");

    drop(producer);
    drop(owner);
}
