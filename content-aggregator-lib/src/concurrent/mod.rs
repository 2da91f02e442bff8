//! Concurrency primitives behind the pipeline.
//!
//! - [`RateGate`]: token bucket that admits fetches at a steady rate
//! - [`WorkerPool`]: spawns the per-batch workers and owns their shutdown
//!
//! Workers themselves are internal; callers interact with them only through
//! [`crate::Pipeline`].

mod pool;
mod rate_gate;
mod worker;

pub use pool::WorkerPool;
pub use rate_gate::RateGate;

pub(crate) use worker::{BatchChannels, WorkerContext};
