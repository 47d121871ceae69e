//! Classified outcome of running one job.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GraderError;

/// Outcome of a single job. Produced exactly once per job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Candidate printed 0
    Correct,
    /// Candidate printed 1
    Incorrect,
    /// Candidate died from a segmentation fault
    Crashed,
    /// Candidate was killed by the batch watchdog
    TimedOut,
}

impl Outcome {
    /// Token used on the wire between worker and coordinator
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
            Self::Crashed => "crashed",
            Self::TimedOut => "timed_out",
        }
    }

    /// Label used in the results report
    pub fn label(&self) -> &'static str {
        match self {
            Self::Correct => "correct",
            Self::Incorrect => "incorrect",
            Self::Crashed => "crash",
            Self::TimedOut => "stuck/inf",
        }
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Self::Correct)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = GraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "correct" => Ok(Self::Correct),
            "incorrect" => Ok(Self::Incorrect),
            "crashed" => Ok(Self::Crashed),
            "timed_out" => Ok(Self::TimedOut),
            other => Err(GraderError::Malformed(format!("unknown outcome '{}'", other))),
        }
    }
}
