//! Synchronous logging: format and write on the calling thread.
//!
//! Run with: cargo run --example sync_logging

use std::sync::Arc;

use anyhow::Result;
use plume::logger::{ Logger, LoggerConfig };
use plume::{ ConsoleSink, FullFormatter, Level };

fn main() -> Result<()> {
    let logger = Logger::with_output(
        LoggerConfig::sync().with_level(Level::Debug),
        Arc::new(FullFormatter),
        vec![Arc::new(ConsoleSink::stdout())]
    )?;

    logger.set_process_name("sync-demo");
    logger.set_thread_module("main");

    plume::info!(logger, "starting up, pid pool size = {}", 4u32);
    plume::debug!(logger, "loaded {} routes in {} ms", 128u32, 3.7f64);
    plume::warn!(logger, "cache miss ratio {} above threshold {}", 0.31f64, 0.25f64);
    plume::error!(logger, "backend {} unreachable, retrying", "db-primary");

    logger.flush();
    Ok(())
}
