//! Core domain types
//!
//! Builds and jobs as reported by the Buildkite REST API, and the
//! notification handed from the watcher to the dispatcher.

pub mod build;
pub mod notification;

pub use build::{Build, BuildkiteJob, PipelineRef};
pub use notification::JobNotification;
