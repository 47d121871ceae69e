//! Scheduling of jobs onto workers.

mod partition;

pub use partition::{WorkerShare, effective_workers, enumerate_jobs, partition, share_sizes};
