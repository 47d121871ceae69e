//! Coordinator: partitions the work, drives workers through the protocol and
//! assembles the result table.

mod distributed;
mod local;
mod protocol;

pub use distributed::{CoordinatorConfig, WORKER_BINARY, default_worker_program, run_distributed};
pub use local::run_local;
pub use protocol::{Coordinator, CoordinatorState, DEFAULT_POLL_INTERVAL, WorkerMonitor};
