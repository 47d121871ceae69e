//! Execution engine
//!
//! This module provides:
//! - **Classifier**: pure mapping from termination + captured output to an Outcome
//! - **Batch executor**: concurrent child processes under one per-batch watchdog
//! - **Transports**: argument, input file or pipe delivery of the parameter
//! - **Staging**: capture/input file naming and cleanup

pub mod batch;
pub mod classifier;
pub mod staging;
pub mod transport;

pub use batch::{BatchExecutor, DEFAULT_TIMEOUT_MS, ExecutorConfig, Watchdog, WatchdogState};
pub use classifier::{Termination, WATCHDOG_SIGNAL, classify};
pub use staging::{capture_path, input_path};
pub use transport::Transport;
