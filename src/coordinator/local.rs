//! Single-process run: the coordinator executes every batch itself.

use std::path::PathBuf;

use log::{debug, info};

use crate::domain::{Job, ResultRecord, ResultTable};
use crate::error::{GraderError, Result};
use crate::exec::BatchExecutor;

/// Grade every executable against every parameter in-process. For each
/// parameter, executables run in windows of `batch_size`.
pub async fn run_local(
    executor: &BatchExecutor,
    batch_size: usize,
    executables: &[PathBuf],
    params: &[i64],
) -> Result<ResultTable> {
    if batch_size == 0 {
        return Err(GraderError::InvalidArgument("batch size must be at least 1".into()));
    }
    let mut table = ResultTable::new(executables, params)?;
    info!("Grading {} job(s) in-process, {} at a time", table.capacity(), batch_size);

    for param in params {
        for window in executables.chunks(batch_size) {
            let jobs: Vec<Job> = window.iter().map(|exe| Job::new(exe.clone(), *param)).collect();
            let outcomes = executor.run_batch(&jobs).await?;
            for (job, outcome) in jobs.into_iter().zip(outcomes) {
                table.record(ResultRecord::new(job, outcome))?;
            }
        }
        debug!("Parameter {} graded", param);
    }
    Ok(table)
}
