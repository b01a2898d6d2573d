//! Scheduler layer
//!
//! The watch-and-dispatch pipeline: the watcher polls Buildkite for
//! scheduled jobs on the target queue, the router picks the template whose
//! filters best match a job's tags, and the dispatcher launches it.

pub mod dispatcher;
pub mod router;
pub mod watcher;

pub use dispatcher::Dispatcher;
pub use router::{TemplateBinding, TemplateRegistry};
pub use watcher::{WatcherSettings, start_watcher};
