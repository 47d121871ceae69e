//! Candidate discovery and the plain-text reports written after a run.

mod discovery;
mod sink;

pub use discovery::list_candidates;
pub use sink::{format_results, format_scores, write_results, write_scores};
