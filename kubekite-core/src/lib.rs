//! Kubekite Core
//!
//! Core types shared by the Kubekite crates.
//!
//! This crate contains:
//! - Domain types: Buildkite builds and jobs, and the notifications the watcher emits
//! - Mapping: the job-template mapping file that pairs templates with filter tags

pub mod domain;
pub mod mapping;
