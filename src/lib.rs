//! Gradepool - a distributed autograder engine
//!
//! Gradepool runs every candidate executable against every integer
//! parameter, spreading the work over a pool of worker processes. Each
//! worker runs its jobs in bounded batches under a per-batch watchdog and
//! streams classified outcomes back to the coordinator over a tagged
//! message channel.

pub mod coordinator;
pub mod domain;
pub mod error;
pub mod exec;
pub mod ipc;
pub mod report;
pub mod scheduler;
pub mod worker;

pub use error::{GraderError, Result};
