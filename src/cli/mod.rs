//! CLI module for gradepool - command-line interface.
//!
//! A single command: grade every candidate in a directory against a list of
//! integer parameters.

pub mod commands;

pub use commands::Cli;
