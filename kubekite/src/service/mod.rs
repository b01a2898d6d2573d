//! Service layer
//!
//! Services hold the daemon's side effects against the cluster. The
//! dispatcher only sees the [`JobLauncher`] trait, so tests can swap in
//! recording fakes.

mod launcher;

pub use launcher::{JobLauncher, KubeJobLauncher};
