//! Result records and the coordinator's result table.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::domain::{Job, Outcome, executable_name};
use crate::error::{GraderError, Result};

/// A classified job, as streamed from a worker to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub job: Job,
    pub outcome: Outcome,
}

impl ResultRecord {
    pub fn new(job: Job, outcome: Outcome) -> Self {
        Self { job, outcome }
    }
}

/// Outcomes of one executable, aligned to the table's parameter order.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub executable: PathBuf,
    pub outcomes: Vec<Option<Outcome>>,
}

impl ResultRow {
    /// Base name of the executable
    pub fn name(&self) -> String {
        executable_name(&self.executable)
    }

    /// Fraction of recorded outcomes that are Correct
    pub fn score(&self) -> f64 {
        let recorded: Vec<_> = self.outcomes.iter().flatten().collect();
        if recorded.is_empty() {
            return 0.0;
        }
        let correct = recorded.iter().filter(|o| o.is_correct()).count();
        correct as f64 / recorded.len() as f64
    }
}

/// Mapping executable -> outcomes, aligned to the command-line parameter order.
///
/// Each (executable, parameter) slot is written at most once; a second write
/// is a protocol error rather than a silent overwrite.
#[derive(Debug, Clone)]
pub struct ResultTable {
    params: Vec<i64>,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    /// Create an empty table. Duplicate parameters are rejected.
    pub fn new(executables: &[PathBuf], params: &[i64]) -> Result<Self> {
        let mut seen = HashSet::new();
        for p in params {
            if !seen.insert(*p) {
                return Err(GraderError::InvalidArgument(format!("parameter {} given more than once", p)));
            }
        }

        let rows = executables
            .iter()
            .map(|exe| ResultRow {
                executable: exe.clone(),
                outcomes: vec![None; params.len()],
            })
            .collect();

        Ok(Self {
            params: params.to_vec(),
            rows,
        })
    }

    pub fn params(&self) -> &[i64] {
        &self.params
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Total number of (executable, parameter) slots
    pub fn capacity(&self) -> usize {
        self.rows.len() * self.params.len()
    }

    /// Number of slots that have an outcome
    pub fn recorded(&self) -> usize {
        self.rows.iter().map(|r| r.outcomes.iter().flatten().count()).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.recorded() == self.capacity()
    }

    /// Look up a recorded outcome
    pub fn get(&self, executable: &Path, parameter: i64) -> Option<Outcome> {
        let row = self.rows.iter().find(|r| r.executable == executable)?;
        let idx = self.params.iter().position(|p| *p == parameter)?;
        row.outcomes[idx]
    }

    /// Merge a record: match executable first, then parameter.
    pub fn record(&mut self, record: ResultRecord) -> Result<()> {
        let ResultRecord { job, outcome } = record;

        let idx = self
            .params
            .iter()
            .position(|p| *p == job.parameter)
            .ok_or_else(|| GraderError::Protocol(format!("result for unknown parameter: {}", job)))?;

        let row = self
            .rows
            .iter_mut()
            .find(|r| r.executable == job.executable)
            .ok_or_else(|| {
                GraderError::Protocol(format!("result for unknown executable: {}", job.executable.display()))
            })?;

        match row.outcomes[idx] {
            Some(existing) => Err(GraderError::Protocol(format!(
                "duplicate result for {} (already {})",
                job, existing
            ))),
            None => {
                row.outcomes[idx] = Some(outcome);
                Ok(())
            }
        }
    }

    /// Jobs that have no outcome yet
    pub fn missing(&self) -> Vec<Job> {
        let mut missing = Vec::new();
        for row in &self.rows {
            for (idx, outcome) in row.outcomes.iter().enumerate() {
                if outcome.is_none() {
                    missing.push(Job::new(row.executable.clone(), self.params[idx]));
                }
            }
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exes() -> Vec<PathBuf> {
        vec![PathBuf::from("d/sol_1"), PathBuf::from("d/sol_2")]
    }

    #[test]
    fn test_new_table_is_empty() {
        let table = ResultTable::new(&exes(), &[3, 1, 2]).unwrap();
        assert_eq!(table.capacity(), 6);
        assert_eq!(table.recorded(), 0);
        assert!(!table.is_complete());
        assert_eq!(table.params(), &[3, 1, 2]);
        assert_eq!(table.missing().len(), 6);
    }

    #[test]
    fn test_duplicate_params_rejected() {
        let result = ResultTable::new(&exes(), &[5, 5]);
        assert!(matches!(result, Err(GraderError::InvalidArgument(_))));
    }

    #[test]
    fn test_record_aligns_to_param_order() {
        let mut table = ResultTable::new(&exes(), &[10, 20, 30]).unwrap();
        table
            .record(ResultRecord::new(Job::new("d/sol_2", 20), Outcome::Crashed))
            .unwrap();
        assert_eq!(table.rows()[1].outcomes, vec![None, Some(Outcome::Crashed), None]);
        assert_eq!(table.get(Path::new("d/sol_2"), 20), Some(Outcome::Crashed));
        assert_eq!(table.get(Path::new("d/sol_1"), 20), None);
    }

    #[test]
    fn test_record_twice_is_error() {
        let mut table = ResultTable::new(&exes(), &[1]).unwrap();
        let rec = ResultRecord::new(Job::new("d/sol_1", 1), Outcome::Correct);
        table.record(rec.clone()).unwrap();
        let err = table.record(rec).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
        assert_eq!(table.recorded(), 1);
    }

    #[test]
    fn test_record_unknown_executable_or_param() {
        let mut table = ResultTable::new(&exes(), &[1]).unwrap();
        assert!(
            table
                .record(ResultRecord::new(Job::new("d/other", 1), Outcome::Correct))
                .is_err()
        );
        assert!(
            table
                .record(ResultRecord::new(Job::new("d/sol_1", 9), Outcome::Correct))
                .is_err()
        );
    }

    #[test]
    fn test_complete_and_score() {
        let mut table = ResultTable::new(&exes()[..1], &[1, 2, 3, 4]).unwrap();
        let outcomes = [Outcome::Correct, Outcome::Incorrect, Outcome::Correct, Outcome::TimedOut];
        for (p, o) in [1, 2, 3, 4].into_iter().zip(outcomes) {
            table.record(ResultRecord::new(Job::new("d/sol_1", p), o)).unwrap();
        }
        assert!(table.is_complete());
        assert!(table.missing().is_empty());
        assert!((table.rows()[0].score() - 0.5).abs() < f64::EPSILON);
    }
}
