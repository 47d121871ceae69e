//! Job identity: one (executable, parameter) unit of work.

use std::fmt;
use std::path::{Path, PathBuf};

/// One candidate executable run against one integer parameter.
///
/// Identity is the pair itself. A grading run never schedules the same pair
/// twice, which is what lets capture files be keyed by name and parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Job {
    pub executable: PathBuf,
    pub parameter: i64,
}

impl Job {
    /// Create a new job
    pub fn new(executable: impl Into<PathBuf>, parameter: i64) -> Self {
        Self {
            executable: executable.into(),
            parameter,
        }
    }

    /// Path of the candidate executable
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Base name of the executable, used to key capture and input files
    pub fn name(&self) -> String {
        executable_name(&self.executable)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.parameter)
    }
}

/// Base name of an executable path, falling back to the whole path.
pub fn executable_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_name_is_base_name() {
        let job = Job::new("/tmp/solutions/sol_3", 7);
        assert_eq!(job.name(), "sol_3");
        assert_eq!(job.executable(), Path::new("/tmp/solutions/sol_3"));
    }

    #[test]
    fn test_job_display() {
        let job = Job::new("dir/sol_1", -2);
        assert_eq!(job.to_string(), "sol_1(-2)");
    }

    #[test]
    fn test_job_identity_is_the_pair() {
        assert_eq!(Job::new("a/x", 1), Job::new("a/x", 1));
        assert_ne!(Job::new("a/x", 1), Job::new("a/x", 2));
        assert_ne!(Job::new("a/x", 1), Job::new("b/x", 1));
    }
}
