//! Background pipelines draining ring buffers.
//!
//! [`writer::WriterPipeline`] is the consumer task that turns log entries
//! into sink output. [`mproc::MprocPipeline`] is the producer-side bridge
//! that moves entries from a process-local ring into the shared ring.

pub mod mproc;
pub mod writer;

pub use mproc::MprocPipeline;
pub use writer::{ RingSource, WriterPipeline };
