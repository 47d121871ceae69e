//! Multi-process run: one worker process per share, talking over a Unix
//! socket channel.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use crate::coordinator::protocol::{Coordinator, DEFAULT_POLL_INTERVAL, WorkerMonitor};
use crate::domain::ResultTable;
use crate::error::{GraderError, Result};
use crate::exec::ExecutorConfig;
use crate::ipc::messages::Tag;
use crate::ipc::{SocketHub, socket_path};
use crate::scheduler::partition;
use crate::worker::DEFAULT_WORKER_BATCH;

/// File name of the worker binary installed next to the coordinator
pub const WORKER_BINARY: &str = "gradepool-worker";

/// Everything a distributed run needs besides the jobs themselves
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Requested worker count; clamped to the number of jobs
    pub workers: usize,
    /// Worker executable
    pub worker_program: PathBuf,
    /// Sub-batch size inside each worker
    pub worker_batch_size: usize,
    /// Passed through to every worker's executor
    pub executor: ExecutorConfig,
    /// Where the channel socket is created
    pub socket_dir: PathBuf,
    /// How long a spawned worker has to connect
    pub attach_timeout: Duration,
    pub poll_interval: Duration,
    /// Log filter handed to workers
    pub log_level: String,
}

impl CoordinatorConfig {
    pub fn new(workers: usize, worker_program: impl Into<PathBuf>, executor: ExecutorConfig) -> Self {
        Self {
            workers,
            worker_program: worker_program.into(),
            worker_batch_size: DEFAULT_WORKER_BATCH,
            executor,
            socket_dir: std::env::temp_dir(),
            attach_timeout: Duration::from_secs(10),
            poll_interval: DEFAULT_POLL_INTERVAL,
            log_level: "info".to_string(),
        }
    }

    pub fn worker_batch_size(mut self, size: usize) -> Self {
        self.worker_batch_size = size;
        self
    }

    pub fn socket_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.socket_dir = dir.into();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }
}

/// The worker binary that sits beside the running executable.
pub fn default_worker_program() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(exe.with_file_name(WORKER_BINARY))
}

/// A worker and the process group it leads. Candidates a worker starts
/// inherit the group, so signalling the group reaches them too.
struct WorkerProcess {
    child: Child,
    group: Pid,
}

/// Spawned worker processes, keyed by worker id. Dropping the pool kills
/// the workers themselves; `abort` also kills their candidates.
struct WorkerPool {
    workers: BTreeMap<Tag, WorkerProcess>,
}

impl WorkerPool {
    fn new() -> Self {
        Self {
            workers: BTreeMap::new(),
        }
    }

    fn spawn(&mut self, config: &CoordinatorConfig, socket: &Path, worker_id: Tag) -> Result<()> {
        let executor = &config.executor;
        let spawn_err = |source: std::io::Error| GraderError::Spawn {
            program: config.worker_program.clone(),
            source,
        };
        let child = Command::new(&config.worker_program)
            .arg("--socket")
            .arg(socket)
            .arg("--id")
            .arg(worker_id.to_string())
            .arg("--timeout-ms")
            .arg(executor.timeout.as_millis().to_string())
            .arg("--batch-size")
            .arg(config.worker_batch_size.to_string())
            .arg("--output-dir")
            .arg(&executor.output_dir)
            .arg("--input-dir")
            .arg(&executor.input_dir)
            .arg("--transport")
            .arg(executor.transport.as_str())
            .arg("--log-level")
            .arg(&config.log_level)
            .stdin(Stdio::null())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let pid = child
            .id()
            .ok_or_else(|| spawn_err(std::io::Error::other("worker exited before its pid was read")))?;
        debug!("Spawned worker {} as pid {}", worker_id, pid);
        self.workers.insert(
            worker_id,
            WorkerProcess {
                child,
                group: Pid::from_raw(pid as i32),
            },
        );
        Ok(())
    }

    /// Wait for every worker to exit. A worker that sent DONE but then
    /// exited non-zero only earns a warning.
    async fn reap(&mut self) -> Result<()> {
        for (worker_id, worker) in self.workers.iter_mut() {
            let status = worker.child.wait().await?;
            if status.success() {
                debug!("Worker {} exited", worker_id);
            } else {
                warn!("Worker {} exited with {}", worker_id, status);
            }
        }
        Ok(())
    }

    /// Kill every worker's process group, candidates included, then reap
    /// the workers. Groups already gone are skipped.
    async fn abort(&mut self) {
        for (worker_id, worker) in self.workers.iter_mut() {
            match signal::killpg(worker.group, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!("Failed to kill process group of worker {}: {}", worker_id, e),
            }
            if let Err(e) = worker.child.wait().await {
                warn!("Failed to reap worker {}: {}", worker_id, e);
            }
        }
    }
}

impl WorkerMonitor for WorkerPool {
    fn has_exited(&mut self, worker_id: Tag) -> Result<bool> {
        match self.workers.get_mut(&worker_id) {
            Some(worker) => Ok(worker.child.try_wait()?.is_some()),
            None => Ok(true),
        }
    }
}

/// Grade every executable against every parameter using worker processes.
pub async fn run_distributed(config: &CoordinatorConfig, executables: &[PathBuf], params: &[i64]) -> Result<ResultTable> {
    let table = ResultTable::new(executables, params)?;
    let shares = partition(executables, params, config.workers);
    if shares.is_empty() {
        info!("Nothing to grade");
        return Ok(table);
    }
    info!(
        "Grading {} job(s) on {} worker(s)",
        table.capacity(),
        shares.len()
    );

    let mut hub = SocketHub::bind(socket_path(&config.socket_dir))?;
    let mut pool = WorkerPool::new();
    let socket = hub.path().to_path_buf();

    for share in &shares {
        let attached = match pool.spawn(config, &socket, share.worker_id) {
            Ok(()) => hub.attach(share.worker_id, config.attach_timeout).await,
            Err(e) => Err(e),
        };
        if let Err(e) = attached {
            return Err(abort(pool, hub, e).await);
        }
    }

    let mut coordinator = Coordinator::new(hub, shares, table).poll_interval(config.poll_interval);
    let outcome = coordinator.run(&mut pool).await;
    let (hub, table) = coordinator.finish();

    if let Err(e) = outcome {
        return Err(abort(pool, hub, e).await);
    }
    if let Err(e) = pool.reap().await {
        return Err(abort(pool, hub, e).await);
    }

    hub.close()?;
    Ok(table)
}

/// Tear down a failed run: no worker or candidate outlives it and the
/// socket file is removed. Returns the error that caused the abort.
async fn abort(mut pool: WorkerPool, hub: SocketHub, error: GraderError) -> GraderError {
    warn!("Aborting run: {}", error);
    pool.abort().await;
    if let Err(e) = hub.close() {
        warn!("Failed to close channel: {}", e);
    }
    error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_worker_program_is_sibling() {
        let program = default_worker_program().unwrap();
        assert_eq!(program.file_name().unwrap(), WORKER_BINARY);
        assert_eq!(program.parent(), std::env::current_exe().unwrap().parent());
    }

    #[test]
    fn test_config_builders() {
        let config = CoordinatorConfig::new(3, "/bin/worker", ExecutorConfig::default())
            .worker_batch_size(2)
            .socket_dir("/tmp/sockets")
            .log_level("debug");
        assert_eq!(config.workers, 3);
        assert_eq!(config.worker_batch_size, 2);
        assert_eq!(config.socket_dir, PathBuf::from("/tmp/sockets"));
        assert_eq!(config.log_level, "debug");
    }

    #[tokio::test]
    async fn test_no_jobs_spawns_nothing() {
        let config = CoordinatorConfig::new(4, "/nonexistent/worker", ExecutorConfig::default());
        let table = run_distributed(&config, &[], &[1, 2]).await.unwrap();
        assert_eq!(table.capacity(), 0);
        assert!(table.is_complete());
    }

    #[tokio::test]
    async fn test_missing_worker_binary_is_spawn_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = CoordinatorConfig::new(1, tmp.path().join("no-such-worker"), ExecutorConfig::default())
            .socket_dir(tmp.path());
        let err = run_distributed(&config, &[PathBuf::from("x/sol_1")], &[1]).await.unwrap_err();
        assert!(matches!(err, GraderError::Spawn { .. }));
        assert!(!socket_path(tmp.path()).exists());
    }
}
