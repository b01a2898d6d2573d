//! Repository layer
//!
//! Repositories abstract communication with Buildkite. They expose the
//! queries the watcher needs without any filtering logic of their own.
//!
//! All repositories are trait-based to enable testing and mocking.

mod builds;

pub use builds::{BuildRepository, HttpBuildRepository};
