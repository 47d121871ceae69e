//! Error types for gradepool
//!
//! Centralized error handling using thiserror. Candidate outcomes (correct,
//! incorrect, crash, timeout) are never errors; everything here is fatal to
//! the run.

use std::path::PathBuf;

use thiserror::Error;

/// All error types that can abort a grading run
#[derive(Debug, Error)]
pub enum GraderError {
    /// Candidate broke the output contract (capture file not 0 or 1)
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Child terminated by a signal the engine never sends
    #[error("Unexpected termination signal {signal} for {job}")]
    UnexpectedSignal { job: String, signal: i32 },

    /// Could not start a child process
    #[error("Failed to spawn {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Message channel send/receive failure
    #[error("Channel error: {0}")]
    Channel(String),

    /// Peer behind a tag closed its end of the channel
    #[error("Channel peer for tag {0} disconnected")]
    Disconnected(u32),

    /// Worker process ended without sending its DONE sentinel
    #[error("Worker {0} exited before sending DONE")]
    WorkerLost(u32),

    /// Malformed wire message
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// Bad argument or configuration value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for gradepool operations
pub type Result<T> = std::result::Result<T, GraderError>;
