//! Envelope and payload formats exchanged between coordinator and workers.
//!
//! Every message carries a positive integer tag:
//! - `1..N`: point-to-point, coordinator -> worker assignments and
//!   worker -> coordinator results (same tag both ways)
//! - `BROADCAST`: coordinator -> all workers control messages
//! - `ACK`: all workers -> coordinator handshake acknowledgements
//!
//! Payloads are plain text lines. Fields are split from the right so
//! executable paths may contain spaces.

use serde::{Deserialize, Serialize};

use crate::domain::{Job, Outcome, ResultRecord};
use crate::error::{GraderError, Result};

/// Message type tag
pub type Tag = u32;

/// Coordinator -> every worker
pub const BROADCAST: Tag = u32::MAX - 1;

/// Every worker -> coordinator barrier acknowledgements
pub const ACK: Tag = BROADCAST + 1;

/// First frame a worker sends on its own tag after connecting
pub const ATTACH: &str = "ATTACH";
/// Worker has received its whole assignment
pub const ACK_TEXT: &str = "ACK";
/// Coordinator releases the barrier
pub const PROCEED: &str = "SYNACK";
/// Worker has streamed every result
pub const DONE: &str = "DONE";

/// A tagged text message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub tag: Tag,
    pub text: String,
}

impl Envelope {
    pub fn new(tag: Tag, text: impl Into<String>) -> Self {
        Self { tag, text: text.into() }
    }
}

/// Validate a worker id against the reserved tags.
pub fn worker_tag(worker_id: u32) -> Result<Tag> {
    if worker_id == 0 || worker_id >= BROADCAST {
        return Err(GraderError::InvalidArgument(format!(
            "worker id {} outside 1..{}",
            worker_id, BROADCAST
        )));
    }
    Ok(worker_id)
}

fn path_text(job: &Job) -> Result<&str> {
    job.executable
        .to_str()
        .ok_or_else(|| GraderError::Malformed(format!("non UTF-8 executable path: {}", job.executable.display())))
}

/// `"<exe_path> <param>"`
pub fn format_assignment(job: &Job) -> Result<String> {
    Ok(format!("{} {}", path_text(job)?, job.parameter))
}

pub fn parse_assignment(text: &str) -> Result<Job> {
    let (path, param) = text
        .rsplit_once(' ')
        .ok_or_else(|| GraderError::Malformed(format!("assignment '{}'", text)))?;
    let parameter = param
        .parse::<i64>()
        .map_err(|_| GraderError::Malformed(format!("assignment parameter '{}'", param)))?;
    if path.is_empty() {
        return Err(GraderError::Malformed(format!("assignment without path '{}'", text)));
    }
    Ok(Job::new(path, parameter))
}

/// `"<exe_path> <param> <outcome>"`
pub fn format_result(record: &ResultRecord) -> Result<String> {
    Ok(format!("{} {}", format_assignment(&record.job)?, record.outcome))
}

pub fn parse_result(text: &str) -> Result<ResultRecord> {
    let (assignment, outcome) = text
        .rsplit_once(' ')
        .ok_or_else(|| GraderError::Malformed(format!("result '{}'", text)))?;
    let outcome = outcome.parse::<Outcome>()?;
    Ok(ResultRecord::new(parse_assignment(assignment)?, outcome))
}

/// `"<n>"`
pub fn parse_job_count(text: &str) -> Result<usize> {
    text.trim()
        .parse::<usize>()
        .map_err(|_| GraderError::Malformed(format!("job count '{}'", text)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_tags_above_worker_ids() {
        assert_eq!(ACK, u32::MAX);
        assert!(worker_tag(1).is_ok());
        assert!(worker_tag(0).is_err());
        assert!(worker_tag(BROADCAST).is_err());
        assert!(worker_tag(ACK).is_err());
    }

    #[test]
    fn test_assignment_format() {
        let job = Job::new("/grading/sols/sol_4", -12);
        let text = format_assignment(&job).unwrap();
        assert_eq!(text, "/grading/sols/sol_4 -12");
        assert_eq!(parse_assignment(&text).unwrap(), job);
    }

    #[test]
    fn test_assignment_path_with_spaces() {
        let job = Job::new("/tmp/my sols/sol 1", 3);
        let parsed = parse_assignment(&format_assignment(&job).unwrap()).unwrap();
        assert_eq!(parsed, job);
    }

    #[test]
    fn test_result_format() {
        let record = ResultRecord::new(Job::new("/s/sol_2", 9), Outcome::TimedOut);
        let text = format_result(&record).unwrap();
        assert_eq!(text, "/s/sol_2 9 timed_out");
        assert_eq!(parse_result(&text).unwrap(), record);
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(parse_assignment("noparam").is_err());
        assert!(parse_assignment("/s/sol_1 abc").is_err());
        assert!(parse_assignment(" 5").is_err());
        assert!(parse_result("/s/sol_1 5").is_err());
        assert!(parse_result("/s/sol_1 5 maybe").is_err());
        assert!(parse_job_count("-1").is_err());
        assert!(parse_job_count("DONE").is_err());
    }

    #[test]
    fn test_job_count() {
        assert_eq!(parse_job_count("17").unwrap(), 17);
        assert_eq!(parse_job_count("0").unwrap(), 0);
    }
}
