//! Outcome classification.
//!
//! A pure function over how a child terminated and what it wrote. The rules,
//! in priority order:
//! 1. killed by SIGSEGV -> Crashed
//! 2. killed by the watchdog signal -> TimedOut
//! 3. killed by anything else -> fatal, the engine never sends other signals
//! 4. exited -> captured stdout must be the integer 0 (Correct) or 1 (Incorrect)

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;

use crate::domain::{Job, Outcome};
use crate::error::{GraderError, Result};

/// Signal the watchdog sends to stragglers
pub const WATCHDOG_SIGNAL: Signal = Signal::SIGKILL;

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Normal exit with a status code
    Exited(i32),
    /// Terminated by a signal
    Signaled(i32),
}

impl Termination {
    pub fn is_signaled(&self) -> bool {
        matches!(self, Self::Signaled(_))
    }
}

impl From<ExitStatus> for Termination {
    fn from(status: ExitStatus) -> Self {
        match status.signal() {
            Some(signal) => Self::Signaled(signal),
            None => Self::Exited(status.code().unwrap_or(-1)),
        }
    }
}

/// Classify a terminated job.
///
/// `capture` is the job's captured stdout; it is only consulted for normal
/// exits. The exit code itself is ignored, only the printed verdict counts.
pub fn classify(job: &Job, termination: Termination, capture: Option<&[u8]>) -> Result<Outcome> {
    match termination {
        Termination::Signaled(signal) => match Signal::try_from(signal) {
            Ok(Signal::SIGSEGV) => Ok(Outcome::Crashed),
            Ok(s) if s == WATCHDOG_SIGNAL => Ok(Outcome::TimedOut),
            _ => Err(GraderError::UnexpectedSignal {
                job: job.to_string(),
                signal,
            }),
        },
        Termination::Exited(_) => {
            let bytes = capture.ok_or_else(|| GraderError::Protocol(format!("{} produced no capture file", job)))?;
            parse_verdict(job, bytes)
        }
    }
}

fn parse_verdict(job: &Job, bytes: &[u8]) -> Result<Outcome> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| GraderError::Protocol(format!("{} wrote non-text output", job)))?
        .trim();

    match text.parse::<i64>() {
        Ok(0) => Ok(Outcome::Correct),
        Ok(1) => Ok(Outcome::Incorrect),
        Ok(other) => Err(GraderError::Protocol(format!("{} printed {}, expected 0 or 1", job, other))),
        Err(_) => Err(GraderError::Protocol(format!(
            "{} printed {:?}, expected 0 or 1",
            job, text
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new("/tmp/sol_1", 4)
    }

    #[test]
    fn test_segfault_is_crashed() {
        let t = Termination::Signaled(Signal::SIGSEGV as i32);
        assert_eq!(classify(&job(), t, None).unwrap(), Outcome::Crashed);
    }

    #[test]
    fn test_watchdog_kill_is_timed_out() {
        let t = Termination::Signaled(WATCHDOG_SIGNAL as i32);
        assert_eq!(classify(&job(), t, None).unwrap(), Outcome::TimedOut);
    }

    #[test]
    fn test_other_signal_is_fatal() {
        let t = Termination::Signaled(Signal::SIGABRT as i32);
        let err = classify(&job(), t, None).unwrap_err();
        assert!(matches!(err, GraderError::UnexpectedSignal { signal, .. } if signal == Signal::SIGABRT as i32));
    }

    #[test]
    fn test_signal_ignores_capture() {
        let t = Termination::Signaled(Signal::SIGSEGV as i32);
        assert_eq!(classify(&job(), t, Some(b"garbage")).unwrap(), Outcome::Crashed);
    }

    #[test]
    fn test_exit_zero_output_is_correct() {
        let t = Termination::Exited(0);
        assert_eq!(classify(&job(), t, Some(b"0\n")).unwrap(), Outcome::Correct);
    }

    #[test]
    fn test_exit_one_output_is_incorrect() {
        let t = Termination::Exited(0);
        assert_eq!(classify(&job(), t, Some(b"1")).unwrap(), Outcome::Incorrect);
    }

    #[test]
    fn test_exit_code_does_not_matter() {
        let t = Termination::Exited(3);
        assert_eq!(classify(&job(), t, Some(b"0")).unwrap(), Outcome::Correct);
    }

    #[test]
    fn test_other_output_is_protocol_violation() {
        for bytes in [&b"2"[..], b"", b"yes", b"\xff\xfe"] {
            let err = classify(&job(), Termination::Exited(0), Some(bytes)).unwrap_err();
            assert!(matches!(err, GraderError::Protocol(_)), "{:?}", bytes);
        }
    }

    #[test]
    fn test_missing_capture_is_protocol_violation() {
        let err = classify(&job(), Termination::Exited(0), None).unwrap_err();
        assert!(matches!(err, GraderError::Protocol(_)));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let t = Termination::Exited(0);
        let first = classify(&job(), t, Some(b"1")).unwrap();
        for _ in 0..10 {
            assert_eq!(classify(&job(), t, Some(b"1")).unwrap(), first);
        }
    }

    #[test]
    fn test_termination_from_exit_status() {
        let exited = ExitStatus::from_raw(2 << 8);
        assert_eq!(Termination::from(exited), Termination::Exited(2));

        let killed = ExitStatus::from_raw(Signal::SIGKILL as i32);
        assert_eq!(Termination::from(killed), Termination::Signaled(9));
        assert!(Termination::from(killed).is_signaled());
    }
}
