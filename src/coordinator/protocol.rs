//! Coordinator side of the message protocol, independent of how workers
//! are hosted.

use std::time::Duration;

use log::{debug, info, warn};

use crate::domain::ResultTable;
use crate::error::{GraderError, Result};
use crate::ipc::MessageChannel;
use crate::ipc::messages::{ACK, ACK_TEXT, BROADCAST, DONE, PROCEED, Tag, format_assignment, parse_result};
use crate::scheduler::WorkerShare;

/// Pause between collection sweeps that made no progress
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Liveness oracle for workers. A worker that has exited can no longer send,
/// so the collector may block on its tag until the channel reports the end.
pub trait WorkerMonitor {
    fn has_exited(&mut self, worker_id: Tag) -> Result<bool>;
}

/// Where the coordinator is in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Partitioning,
    Spawning,
    Assigning,
    AwaitingAck,
    Broadcasting,
    Collecting,
    Draining,
    Done,
}

pub struct Coordinator<C> {
    channel: C,
    shares: Vec<WorkerShare>,
    table: ResultTable,
    state: CoordinatorState,
    poll_interval: Duration,
}

impl<C: MessageChannel> Coordinator<C> {
    pub fn new(channel: C, shares: Vec<WorkerShare>, table: ResultTable) -> Self {
        Self {
            channel,
            shares,
            table,
            state: CoordinatorState::Spawning,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn table(&self) -> &ResultTable {
        &self.table
    }

    /// Drive a run from assignment to the last `DONE`.
    pub async fn run(&mut self, monitor: &mut impl WorkerMonitor) -> Result<()> {
        self.send_job_counts().await?;
        self.assign_jobs().await?;
        self.await_acks(monitor).await?;
        self.broadcast_proceed().await?;
        self.collect(monitor).await
    }

    /// Tell every worker how many jobs to expect.
    pub async fn send_job_counts(&mut self) -> Result<()> {
        for share in &self.shares {
            self.channel.send(share.worker_id, &share.job_count().to_string()).await?;
        }
        Ok(())
    }

    /// Send the jobs in global dispatch order. Share `i` holds every
    /// `N`th job starting at `i`, so round `r` of the shares replays the
    /// enumeration.
    pub async fn assign_jobs(&mut self) -> Result<()> {
        self.state = CoordinatorState::Assigning;
        let rounds = self.shares.first().map_or(0, |s| s.job_count());
        for round in 0..rounds {
            for share in &self.shares {
                if let Some(job) = share.jobs.get(round) {
                    self.channel.send(share.worker_id, &format_assignment(job)?).await?;
                }
            }
        }
        debug!("Assigned {} job(s) to {} worker(s)", self.table.capacity(), self.shares.len());
        Ok(())
    }

    /// Block until every worker has acknowledged its assignment.
    pub async fn await_acks(&mut self, monitor: &mut impl WorkerMonitor) -> Result<()> {
        self.state = CoordinatorState::AwaitingAck;
        let mut acked = 0;
        while acked < self.shares.len() {
            match tokio::time::timeout(self.poll_interval, self.channel.recv(ACK)).await {
                Ok(Ok(text)) if text == ACK_TEXT => acked += 1,
                Ok(Ok(text)) => return Err(GraderError::Protocol(format!("unexpected ack payload '{}'", text))),
                Ok(Err(GraderError::Disconnected(_))) => return Err(self.first_lost(monitor)?),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    for share in &self.shares {
                        if monitor.has_exited(share.worker_id)? {
                            return Err(GraderError::WorkerLost(share.worker_id));
                        }
                    }
                }
            }
        }
        info!("All {} worker(s) acknowledged", acked);
        Ok(())
    }

    pub async fn broadcast_proceed(&mut self) -> Result<()> {
        self.state = CoordinatorState::Broadcasting;
        self.channel.send(BROADCAST, PROCEED).await
    }

    /// Merge result records until every worker has sent `DONE`. Live workers
    /// are polled; an exited worker's remaining messages are drained with a
    /// blocking receive.
    pub async fn collect(&mut self, monitor: &mut impl WorkerMonitor) -> Result<()> {
        self.state = CoordinatorState::Collecting;
        let mut received = vec![0usize; self.shares.len()];
        let mut done = vec![false; self.shares.len()];

        while done.iter().any(|d| !d) {
            let mut progressed = false;

            for (i, share) in self.shares.iter().enumerate() {
                if done[i] {
                    continue;
                }
                let tag = share.worker_id;
                let exited = monitor.has_exited(tag)?;

                loop {
                    let next = if exited {
                        Some(self.channel.recv(tag).await)
                    } else {
                        self.channel.try_recv(tag).transpose()
                    };
                    let text = match next {
                        None => break,
                        Some(Ok(text)) => text,
                        Some(Err(GraderError::Disconnected(_))) => return Err(GraderError::WorkerLost(tag)),
                        Some(Err(e)) => return Err(e),
                    };
                    progressed = true;

                    if text == DONE {
                        if received[i] != share.job_count() {
                            return Err(GraderError::Protocol(format!(
                                "worker {} sent DONE after {} of {} results",
                                tag,
                                received[i],
                                share.job_count()
                            )));
                        }
                        debug!("Worker {} done", tag);
                        done[i] = true;
                        break;
                    }

                    let record = parse_result(&text)?;
                    if !share.jobs.contains(&record.job) {
                        return Err(GraderError::Protocol(format!(
                            "worker {} reported {} which it was never assigned",
                            tag, record.job
                        )));
                    }
                    self.table.record(record)?;
                    received[i] += 1;
                }
            }

            if !progressed {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        self.state = CoordinatorState::Draining;
        if !self.table.is_complete() {
            let missing = self.table.missing();
            warn!("{} result(s) missing after every worker finished", missing.len());
            return Err(GraderError::Protocol(format!("{} result(s) never reported", missing.len())));
        }
        info!("Collected {} result(s)", self.table.recorded());
        Ok(())
    }

    /// Finish the run and hand back the channel and the filled table.
    pub fn finish(mut self) -> (C, ResultTable) {
        self.state = CoordinatorState::Done;
        (self.channel, self.table)
    }

    fn first_lost(&self, monitor: &mut impl WorkerMonitor) -> Result<GraderError> {
        for share in &self.shares {
            if monitor.has_exited(share.worker_id)? {
                return Ok(GraderError::WorkerLost(share.worker_id));
            }
        }
        Ok(GraderError::Channel("a worker disconnected before acknowledging".into()))
    }
}
