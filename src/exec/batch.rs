//! Batch executor: run a window of jobs concurrently under one watchdog.
//!
//! Each batch owns its children, its scratch files and its watchdog. Nothing
//! is shared through process-wide state: when the deadline passes, the reap
//! loop itself kills whatever in *this* batch has not been reaped yet.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use log::{debug, warn};
use nix::sys::signal;
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::time::Instant;

use crate::domain::{Job, Outcome};
use crate::error::{GraderError, Result};
use crate::exec::classifier::{Termination, WATCHDOG_SIGNAL, classify};
use crate::exec::staging::{capture_path, io_context, remove_scratch};
use crate::exec::transport::Transport;

/// Default wall-clock budget for one batch
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Configuration for a batch executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Watchdog budget for a whole batch, regardless of its size
    pub timeout: Duration,
    /// Where capture files are staged
    pub output_dir: PathBuf,
    /// Where input files are staged (input-file transport only)
    pub input_dir: PathBuf,
    /// Parameter delivery
    pub transport: Transport,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            output_dir: PathBuf::from("output"),
            input_dir: PathBuf::from("input"),
            transport: Transport::Argument,
        }
    }
}

impl ExecutorConfig {
    /// Set the watchdog budget in milliseconds
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout = Duration::from_millis(ms);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input_dir = dir.into();
        self
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }
}

/// Watchdog state for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Armed,
    Fired,
    Disarmed,
}

/// Per-batch deadline. Armed once when the batch starts, fires at most once,
/// and is disarmed when the last child is reaped.
#[derive(Debug)]
pub struct Watchdog {
    deadline: Instant,
    state: WatchdogState,
}

impl Watchdog {
    /// Arm a watchdog that expires `timeout` from now
    pub fn arm(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            state: WatchdogState::Armed,
        }
    }

    pub fn state(&self) -> WatchdogState {
        self.state
    }

    /// Resolves at the deadline while armed; never resolves otherwise.
    pub async fn expired(&self) {
        match self.state {
            WatchdogState::Armed => tokio::time::sleep_until(self.deadline).await,
            WatchdogState::Fired | WatchdogState::Disarmed => std::future::pending::<()>().await,
        }
    }

    fn fire(&mut self) {
        self.state = WatchdogState::Fired;
    }

    /// Stop the watchdog. A fired watchdog stays fired.
    pub fn disarm(&mut self) {
        if self.state == WatchdogState::Armed {
            self.state = WatchdogState::Disarmed;
        }
    }
}

/// One running job inside a batch
struct Slot {
    job: Job,
    child: Child,
    capture: PathBuf,
    input: Option<PathBuf>,
    reaped: bool,
}

enum ReapEvent {
    Exited(std::io::Result<ExitStatus>),
    Expired,
}

/// The children of one batch, owned by whoever is running it.
struct Batch {
    slots: Vec<Slot>,
}

impl Batch {
    /// Wait for slot `idx`, killing every unreaped child if the watchdog
    /// expires first. Interrupted waits are retried inside tokio's reaper.
    async fn reap(&mut self, idx: usize, watchdog: &mut Watchdog) -> Result<ExitStatus> {
        loop {
            let event = {
                let slot = &mut self.slots[idx];
                tokio::select! {
                    status = slot.child.wait() => ReapEvent::Exited(status),
                    _ = watchdog.expired() => ReapEvent::Expired,
                }
            };

            match event {
                ReapEvent::Exited(status) => {
                    let slot = &mut self.slots[idx];
                    let status = status.map_err(|e| io_context("wait for", slot.job.executable(), e))?;
                    slot.reaped = true;
                    return Ok(status);
                }
                ReapEvent::Expired => {
                    watchdog.fire();
                    self.kill_unreaped()?;
                }
            }
        }
    }

    fn kill_unreaped(&mut self) -> Result<()> {
        let pending: Vec<&Slot> = self.slots.iter().filter(|s| !s.reaped).collect();
        warn!("Watchdog expired, killing {} unfinished job(s)", pending.len());

        for slot in pending {
            let Some(pid) = slot.child.id() else {
                continue;
            };
            debug!("Killing {} (pid {})", slot.job, pid);
            match signal::kill(Pid::from_raw(pid as i32), WATCHDOG_SIGNAL) {
                Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => {
                    return Err(io_context("kill", slot.job.executable(), std::io::Error::from(e)));
                }
            }
        }
        Ok(())
    }
}

/// Runs batches of jobs as child processes and classifies each one.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    config: ExecutorConfig,
}

impl BatchExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run every job concurrently and return one outcome per job, in input
    /// order. Any system failure aborts the batch; children still running
    /// are killed when their handles drop.
    pub async fn run_batch(&self, jobs: &[Job]) -> Result<Vec<Outcome>> {
        if jobs.is_empty() {
            return Ok(Vec::new());
        }
        self.prepare_dirs()?;

        let mut batch = Batch {
            slots: Vec::with_capacity(jobs.len()),
        };
        for job in jobs {
            batch.slots.push(self.spawn(job)?);
        }

        let mut watchdog = Watchdog::arm(self.config.timeout);
        debug!("Batch of {} armed for {:?}", jobs.len(), self.config.timeout);

        let mut outcomes = Vec::with_capacity(jobs.len());
        for idx in 0..batch.slots.len() {
            let status = batch.reap(idx, &mut watchdog).await?;
            let slot = &batch.slots[idx];
            let outcome = self.classify_slot(slot, status)?;
            debug!("{} -> {}", slot.job, outcome);
            outcomes.push(outcome);
        }

        watchdog.disarm();
        if watchdog.state() == WatchdogState::Fired {
            debug!("Batch finished after watchdog fired");
        }
        Ok(outcomes)
    }

    fn prepare_dirs(&self) -> Result<()> {
        create_dir(&self.config.output_dir)?;
        if self.config.transport == Transport::InputFile {
            create_dir(&self.config.input_dir)?;
        }
        Ok(())
    }

    fn spawn(&self, job: &Job) -> Result<Slot> {
        let capture = capture_path(&self.config.output_dir, job);
        let stdout = File::create(&capture).map_err(|e| io_context("create", &capture, e))?;

        let mut cmd = Command::new(job.executable());
        cmd.stdout(Stdio::from(stdout)).kill_on_drop(true);
        let input = self.config.transport.stage(&mut cmd, job, &self.config.input_dir)?;

        let child = cmd.spawn().map_err(|source| GraderError::Spawn {
            program: job.executable().to_path_buf(),
            source,
        })?;
        debug!("Spawned {} as pid {:?}", job, child.id());

        Ok(Slot {
            job: job.clone(),
            child,
            capture,
            input,
            reaped: false,
        })
    }

    fn classify_slot(&self, slot: &Slot, status: ExitStatus) -> Result<Outcome> {
        let termination = Termination::from(status);
        let capture = match termination {
            Termination::Exited(_) => {
                Some(std::fs::read(&slot.capture).map_err(|e| io_context("read", &slot.capture, e))?)
            }
            Termination::Signaled(_) => None,
        };

        let outcome = classify(&slot.job, termination, capture.as_deref())?;

        remove_scratch(&slot.capture)?;
        if let Some(input) = &slot.input {
            remove_scratch(input)?;
        }
        Ok(outcome)
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| io_context("create directory", dir, e))
}
