//! End-to-end logger tests: async delivery, WFC, flush/shutdown semantics.

use std::sync::Arc;
use std::time::{ Duration, Instant };

use parking_lot::Mutex;

use plume::logger::{ Logger, LoggerConfig };
use plume::sink::Sink;
use plume::snapshot::Arg;
use plume::{ Level, MessageFormatter, QueueFullPolicy };

/// Sink that records lines and write timestamps.
struct RecordingSink {
    lines: Mutex<Vec<(Instant, String)>>,
    delay: Duration,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(Vec::new()),
            delay,
        })
    }

    fn texts(&self) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .map(|(_, s)| s.clone())
            .collect()
    }
}

impl Sink for RecordingSink {
    fn write(&self, line: &str) -> plume::Result<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.lines.lock().push((Instant::now(), line.to_string()));
        Ok(())
    }
}

fn async_logger(sink: Arc<RecordingSink>, config: LoggerConfig) -> Logger {
    Logger::with_output(config, Arc::new(MessageFormatter), vec![
        sink as Arc<dyn Sink>,
    ]).unwrap()
}

#[test]
fn async_delivery_preserves_producer_order() {
    let sink = RecordingSink::new();
    let logger = async_logger(Arc::clone(&sink), LoggerConfig::async_mode());

    for i in 0..100i64 {
        assert!(logger.log(Level::Info, "seq {}", &[Arg::I64(i)]).is_published());
    }
    logger.flush();

    let texts = sink.texts();
    assert_eq!(texts.len(), 100);
    for (i, line) in texts.iter().enumerate() {
        assert_eq!(line, &format!("seq {i}"));
    }
}

#[test]
fn wfc_returns_after_sink_received_the_record() {
    // Scenario: push a WFC record with a slow sink and check the producer
    // blocked until the write happened.
    let sink = RecordingSink::with_delay(Duration::from_millis(50));
    let logger = async_logger(
        Arc::clone(&sink),
        LoggerConfig::async_mode().with_wfc(true)
    );

    let start = Instant::now();
    let result = logger.log_wfc(Level::Critical, "critical {}", &[Arg::I32(0xdead)]);
    let elapsed = start.elapsed();

    assert!(result.is_published());
    assert!(elapsed >= Duration::from_millis(50), "WFC returned before the sink write");
    assert_eq!(sink.texts(), vec!["critical 57005"]);
}

#[test]
fn plain_push_does_not_wait_for_slow_sink() {
    let sink = RecordingSink::with_delay(Duration::from_millis(40));
    let logger = async_logger(
        Arc::clone(&sink),
        LoggerConfig::async_mode().with_wfc(true)
    );

    let start = Instant::now();
    logger.log(Level::Info, "fire and forget", &[]);
    assert!(start.elapsed() < Duration::from_millis(20), "plain push must not block");

    logger.flush();
    assert_eq!(sink.texts(), vec!["fire and forget"]);
}

#[test]
fn shutdown_drains_and_stops_delivery() {
    let sink = RecordingSink::new();
    let logger = async_logger(Arc::clone(&sink), LoggerConfig::async_mode());

    for i in 0..50i64 {
        logger.log(Level::Info, "n {}", &[Arg::I64(i)]);
    }
    logger.shutdown();

    // Everything pushed before shutdown is delivered and the ring is empty.
    assert_eq!(sink.texts().len(), 50);
    let metrics = logger.metrics();
    assert_eq!(metrics.pushed, metrics.popped);

    // Nothing further is.
    let result = logger.log(Level::Info, "late", &[]);
    assert!(!result.is_published());
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(sink.texts().len(), 50);
}

#[test]
fn shutdown_is_idempotent_and_drop_safe() {
    let sink = RecordingSink::new();
    let logger = async_logger(Arc::clone(&sink), LoggerConfig::async_mode());
    logger.log(Level::Info, "one", &[]);
    logger.shutdown();
    logger.shutdown();
    drop(logger);
    assert_eq!(sink.texts(), vec!["one"]);
}

#[test]
fn flush_is_quiescent_point() {
    let sink = RecordingSink::with_delay(Duration::from_millis(1));
    let logger = async_logger(Arc::clone(&sink), LoggerConfig::async_mode());

    for _ in 0..20 {
        logger.log(Level::Info, "burst", &[]);
    }
    logger.flush();
    // After flush, every accepted record reached the sink.
    assert_eq!(sink.texts().len() as u64, logger.metrics().pushed);
}

#[test]
fn overload_under_drop_newest_increments_counter() {
    let sink = RecordingSink::with_delay(Duration::from_millis(5));
    let logger = async_logger(
        Arc::clone(&sink),
        LoggerConfig::async_mode()
            .with_capacity(4)
            .with_policy(QueueFullPolicy::DropNewest)
    );

    for i in 0..64i64 {
        logger.log(Level::Info, "burst {}", &[Arg::I64(i)]);
    }
    logger.flush();

    let metrics = logger.metrics();
    assert!(metrics.dropped_newest > 0, "slow sink must cause drops");
    assert_eq!(metrics.pushed + metrics.dropped_newest, 64);
    assert_eq!(sink.texts().len() as u64, metrics.pushed);
}

#[test]
fn multithreaded_producers_all_delivered() {
    let sink = RecordingSink::new();
    let logger = Arc::new(
        async_logger(
            Arc::clone(&sink),
            LoggerConfig::async_mode().with_policy(QueueFullPolicy::Block)
        )
    );

    let mut handles = Vec::new();
    for t in 0..4i64 {
        let logger = Arc::clone(&logger);
        handles.push(
            std::thread::spawn(move || {
                for i in 0..500i64 {
                    logger.log(Level::Info, "p{} m{}", &[Arg::I64(t), Arg::I64(i)]);
                }
            })
        );
    }
    for h in handles {
        h.join().unwrap();
    }
    logger.flush();
    assert_eq!(sink.texts().len(), 2000);
}
