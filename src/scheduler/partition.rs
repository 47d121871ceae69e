//! Task partitioning across workers.
//!
//! Jobs are enumerated parameter-major (every executable for the first
//! parameter, then the second, ...) and dealt round-robin: job `k` goes to
//! worker `k mod N`. Share sizes therefore differ by at most one, with the
//! remainder landing on the lowest worker ids.

use std::path::PathBuf;

use crate::domain::Job;

/// The jobs assigned to one worker. Worker ids start at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerShare {
    pub worker_id: u32,
    pub jobs: Vec<Job>,
}

impl WorkerShare {
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }
}

/// Clamp the requested worker count so no worker is idle.
pub fn effective_workers(requested: usize, total_jobs: usize) -> usize {
    requested.max(1).min(total_jobs)
}

/// Number of jobs each of `workers` receives out of `total_jobs`.
pub fn share_sizes(workers: usize, total_jobs: usize) -> Vec<usize> {
    if workers == 0 {
        return Vec::new();
    }
    let base = total_jobs / workers;
    let remainder = total_jobs % workers;
    (0..workers).map(|i| base + usize::from(remainder > i)).collect()
}

/// All jobs in dispatch order: outer loop over parameters, inner over executables.
pub fn enumerate_jobs(executables: &[PathBuf], params: &[i64]) -> Vec<Job> {
    params
        .iter()
        .flat_map(|p| executables.iter().map(move |exe| Job::new(exe.clone(), *p)))
        .collect()
}

/// Split every (executable, parameter) pair across at most `requested_workers`
/// workers. Returns no shares when there is nothing to run.
pub fn partition(executables: &[PathBuf], params: &[i64], requested_workers: usize) -> Vec<WorkerShare> {
    let jobs = enumerate_jobs(executables, params);
    let workers = effective_workers(requested_workers, jobs.len());

    let mut shares: Vec<WorkerShare> = share_sizes(workers, jobs.len())
        .into_iter()
        .enumerate()
        .map(|(i, size)| WorkerShare {
            worker_id: i as u32 + 1,
            jobs: Vec::with_capacity(size),
        })
        .collect();

    for (k, job) in jobs.into_iter().enumerate() {
        shares[k % workers].jobs.push(job);
    }
    shares
}
