//! Module validation framework
//!
//! Name validation and near-match lookup used by every caller-facing operation.

pub mod names;

pub use names::{is_valid_name, suggest_names, validate_name};
