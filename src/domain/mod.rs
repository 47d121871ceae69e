//! Domain types for gradepool
//!
//! - Job: one (executable, parameter) unit of work
//! - Outcome: the classified result of running a job
//! - ResultRecord / ResultTable: what the coordinator collects

pub mod job;
pub mod outcome;
pub mod results;

pub use job::{Job, executable_name};
pub use outcome::Outcome;
pub use results::{ResultRecord, ResultRow, ResultTable};
