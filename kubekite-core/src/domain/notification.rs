//! Watcher output

use serde::{Deserialize, Serialize};

use super::build::BuildkiteJob;

/// A schedulable job discovered by the watcher
///
/// The id is opaque to the dispatcher. Tags are the job's agent query rules
/// in the order Buildkite reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobNotification {
    pub id: String,
    pub tags: Vec<String>,
}

impl JobNotification {
    pub fn new(id: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            id: id.into(),
            tags,
        }
    }
}

impl From<&BuildkiteJob> for JobNotification {
    fn from(job: &BuildkiteJob) -> Self {
        Self {
            id: job.id.clone(),
            tags: job.agent_query_rules.clone(),
        }
    }
}
