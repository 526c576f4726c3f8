//! Asynchronous logging: producers publish into the lock-free ring, a
//! background writer drains it into the sink.
//!
//! Run with: cargo run --example async_logging

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use plume::logger::{ Logger, LoggerConfig };
use plume::{ ConsoleSink, CompactFormatter, Level, QueueFullPolicy };

fn main() -> Result<()> {
    let logger = Arc::new(
        Logger::with_output(
            LoggerConfig::async_mode()
                .with_capacity(16_384)
                .with_policy(QueueFullPolicy::Block)
                .with_wfc(true),
            Arc::new(CompactFormatter),
            vec![Arc::new(ConsoleSink::stdout())]
        )?
    );

    let start = Instant::now();
    let mut workers = Vec::new();
    for worker in 0..4u32 {
        let logger = Arc::clone(&logger);
        workers.push(
            std::thread::spawn(move || {
                logger.set_thread_module(&format!("worker-{worker}"));
                for i in 0..1_000u32 {
                    plume::info!(logger, "worker {} item {}", worker, i);
                }
            })
        );
    }
    for w in workers {
        w.join().expect("worker thread");
    }

    // A critical record that must be on the sink before we continue.
    plume::log_wfc!(logger, Level::Critical, "all workers done after {} ms", start
        .elapsed()
        .as_millis() as u64);

    logger.flush();
    let metrics = logger.metrics();
    eprintln!(
        "pushed={} popped={} dropped={}",
        metrics.pushed,
        metrics.popped,
        metrics.dropped_newest + metrics.dropped_oldest
    );

    logger.shutdown();
    Ok(())
}
