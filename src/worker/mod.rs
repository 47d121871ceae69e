//! Worker protocol.
//!
//! A worker receives its job count and jobs on its own tag, acknowledges on
//! the shared ack tag, waits for the coordinator's broadcast to proceed, then
//! runs its jobs in small sub-batches and streams each sub-batch's results
//! back before starting the next. `DONE` on its own tag ends the stream.

use log::{debug, info};

use crate::domain::{Job, ResultRecord};
use crate::error::{GraderError, Result};
use crate::exec::BatchExecutor;
use crate::ipc::messages::{
    ACK, ACK_TEXT, BROADCAST, DONE, PROCEED, Tag, format_result, parse_assignment, parse_job_count, worker_tag,
};
use crate::ipc::MessageChannel;

/// Default sub-batch size, kept small so one worker never floods the host
pub const DEFAULT_WORKER_BATCH: usize = 8;

/// Where a worker is in its protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    AwaitingAssignmentCount,
    ReceivingJobs,
    Acking,
    AwaitingProceed,
    Running,
    Done,
}

pub struct Worker<C> {
    id: Tag,
    channel: C,
    executor: BatchExecutor,
    batch_size: usize,
    state: WorkerState,
    jobs: Vec<Job>,
}

impl<C: MessageChannel> Worker<C> {
    pub fn new(id: u32, channel: C, executor: BatchExecutor, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(GraderError::InvalidArgument("worker batch size must be at least 1".into()));
        }
        Ok(Self {
            id: worker_tag(id)?,
            channel,
            executor,
            batch_size,
            state: WorkerState::AwaitingAssignmentCount,
            jobs: Vec::new(),
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Run the whole protocol. Hands the channel back so the caller can
    /// shut it down cleanly.
    pub async fn run(mut self) -> Result<C> {
        self.receive_assignment().await?;
        self.acknowledge().await?;
        self.await_proceed().await?;
        self.execute().await?;
        self.finish().await?;
        Ok(self.channel)
    }

    async fn receive_assignment(&mut self) -> Result<()> {
        let count = parse_job_count(&self.channel.recv(self.id).await?)?;
        debug!("Worker {} expects {} job(s)", self.id, count);

        self.state = WorkerState::ReceivingJobs;
        self.jobs = Vec::with_capacity(count);
        for _ in 0..count {
            let job = parse_assignment(&self.channel.recv(self.id).await?)?;
            debug!("Worker {} received {}", self.id, job);
            self.jobs.push(job);
        }
        Ok(())
    }

    async fn acknowledge(&mut self) -> Result<()> {
        self.state = WorkerState::Acking;
        self.channel.send(ACK, ACK_TEXT).await
    }

    async fn await_proceed(&mut self) -> Result<()> {
        self.state = WorkerState::AwaitingProceed;
        loop {
            let text = self.channel.recv(BROADCAST).await?;
            if text == PROCEED {
                return Ok(());
            }
            debug!("Worker {} ignoring broadcast '{}'", self.id, text);
        }
    }

    async fn execute(&mut self) -> Result<()> {
        self.state = WorkerState::Running;
        info!("Worker {} running {} job(s)", self.id, self.jobs.len());

        for chunk in self.jobs.chunks(self.batch_size) {
            let outcomes = self.executor.run_batch(chunk).await?;
            for (job, outcome) in chunk.iter().zip(outcomes) {
                let line = format_result(&ResultRecord::new(job.clone(), outcome))?;
                self.channel.send(self.id, &line).await?;
            }
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.channel.send(self.id, DONE).await?;
        self.state = WorkerState::Done;
        info!("Worker {} done", self.id);
        Ok(())
    }
}
