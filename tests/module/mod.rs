//! Shared helpers for loader integration tests

pub mod test_utils;
