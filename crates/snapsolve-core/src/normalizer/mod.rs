//! Best-effort recovery of structured records from free-form model output.
//!
//! Nothing here returns an error: unusable output degrades to a record with
//! `fallback_used` set and the raw text preserved.

mod extraction;
mod solution;

pub use extraction::{parse_extraction, strip_fences};
pub use solution::{
    DEFAULT_SPACE_COMPLEXITY, DEFAULT_TIME_COMPLEXITY, parse_debug, parse_issues, parse_solution,
};
pub(crate) use solution::comment_prefix;
