//! How a candidate receives its parameter.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::domain::Job;
use crate::error::Result;
use crate::exec::staging::{input_path, io_context};

/// Parameter delivery. All three are interchangeable from the grading
/// point of view; candidates are written against one of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Transport {
    /// Parameter is argv[1]
    #[default]
    Argument,
    /// Parameter is written to a per-job input file that becomes stdin
    InputFile,
    /// Parameter is written into a pipe; the read end is stdin and its fd
    /// number is argv[1]
    Pipe,
}

impl Transport {
    /// Name accepted by `--transport`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Argument => "argument",
            Self::InputFile => "input-file",
            Self::Pipe => "pipe",
        }
    }

    /// Wire the parameter into `cmd`. Returns the input file to delete once
    /// the job is classified, if one was created.
    pub(crate) fn stage(&self, cmd: &mut Command, job: &Job, input_dir: &Path) -> Result<Option<PathBuf>> {
        let param = job.parameter.to_string();
        match self {
            Self::Argument => {
                cmd.arg(&param).stdin(Stdio::null());
                Ok(None)
            }
            Self::InputFile => {
                let path = input_path(input_dir, job);
                std::fs::write(&path, &param).map_err(|e| io_context("write", &path, e))?;
                let file = File::open(&path).map_err(|e| io_context("open", &path, e))?;
                cmd.stdin(Stdio::from(file));
                Ok(Some(path))
            }
            Self::Pipe => {
                let (read_end, write_end) = nix::unistd::pipe().map_err(std::io::Error::from)?;
                // Parameter fits in the pipe buffer, so the write completes
                // before the child exists.
                let mut writer = File::from(write_end);
                writer.write_all(param.as_bytes())?;
                drop(writer);
                cmd.stdin(Stdio::from(read_end)).arg("0");
                Ok(None)
            }
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
