//! Multi-process logging over shared memory, fork-style.
//!
//! The parent creates the shared ring + name registry and runs the consumer;
//! forked children attach as producers, name themselves, and log. The
//! eventfd handle recorded in the segment header is inherited across the
//! fork, so child pushes wake the parent's consumer.
//!
//! Run with: cargo run --example mproc_fork

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use nix::sys::wait::waitpid;
use nix::unistd::{ fork, ForkResult };
use plume::logger::{ Logger, LoggerConfig, MprocRole };
use plume::{ ConsoleSink, FullFormatter };

const WORKERS: u32 = 3;

fn main() -> Result<()> {
    let shm_name = format!("/plume-mproc-demo-{}", std::process::id());

    // Parent: owner + consumer. Create before forking so children can attach.
    let owner = Logger::with_output(
        LoggerConfig::mproc(&shm_name, MprocRole::Owner),
        Arc::new(FullFormatter),
        vec![Arc::new(ConsoleSink::stdout())]
    )?;
    owner.set_process_name("aggregator");

    let mut children = Vec::new();
    for worker in 0..WORKERS {
        // SAFETY: single-threaded at fork time apart from plume's pipeline
        // threads, and the child execs no async-signal-unsafe work beyond
        // attaching to the already-created segments.
        match unsafe { fork() }? {
            ForkResult::Child => {
                run_worker(&shm_name, worker);
                std::process::exit(0);
            }
            ForkResult::Parent { child } => children.push(child),
        }
    }

    plume::info!(owner, "spawned {} workers", WORKERS);

    for child in children {
        waitpid(child, None)?;
    }

    // Give the consumer a moment to drain the tail of the shared ring.
    std::thread::sleep(Duration::from_millis(100));
    owner.flush();
    owner.shutdown();
    Ok(())
}

fn run_worker(shm_name: &str, worker: u32) {
    let logger = match
        Logger::with_output(
            LoggerConfig::mproc(shm_name, MprocRole::Producer),
            Arc::new(FullFormatter),
            vec![]
        )
    {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("worker {worker}: attach failed: {e}");
            return;
        }
    };

    logger.set_process_name(&format!("worker-{worker}"));
    logger.set_thread_module("job");

    for i in 0..5u32 {
        plume::info!(logger, "worker {} processed batch {}", worker, i);
    }
    logger.flush();
    logger.shutdown();
}
