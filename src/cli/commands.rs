//! CLI definitions using clap.

use clap::Parser;
use gradepool::exec::Transport;
use std::path::PathBuf;

/// Gradepool - grade candidate executables across a pool of workers
#[derive(Parser, Debug)]
#[command(name = "gradepool")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the candidate executables
    pub dir: PathBuf,

    /// Integer parameters every candidate is run with
    #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
    pub params: Vec<i64>,

    /// Optional config file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run every batch in this process instead of spawning workers
    #[arg(long)]
    pub single: bool,

    /// Number of worker processes
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Concurrent candidates per batch in single-process mode
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Concurrent candidates per batch inside each worker
    #[arg(long)]
    pub worker_batch_size: Option<usize>,

    /// Wall-clock budget for one batch, in milliseconds
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,

    /// How candidates receive their parameter
    #[arg(long, value_enum)]
    pub transport: Option<Transport>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dir_and_params() {
        let cli = Cli::try_parse_from(["gradepool", "solutions", "1", "-4", "7"]).unwrap();
        assert_eq!(cli.dir, PathBuf::from("solutions"));
        assert_eq!(cli.params, vec![1, -4, 7]);
        assert!(!cli.single);
        assert_eq!(cli.transport, None);
    }

    #[test]
    fn test_params_required() {
        assert!(Cli::try_parse_from(["gradepool", "solutions"]).is_err());
        assert!(Cli::try_parse_from(["gradepool", "solutions", "seven"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "gradepool",
            "--single",
            "--workers",
            "3",
            "--timeout-ms",
            "500",
            "--transport",
            "pipe",
            "solutions",
            "2",
        ])
        .unwrap();
        assert!(cli.single);
        assert_eq!(cli.workers, Some(3));
        assert_eq!(cli.timeout_ms, Some(500));
        assert_eq!(cli.transport, Some(Transport::Pipe));
    }
}
