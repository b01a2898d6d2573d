//! Build and job domain types

use serde::{Deserialize, Deserializer, Serialize};

/// Job state Buildkite reports while a job waits for an agent
pub const SCHEDULED_STATE: &str = "scheduled";

/// Build record as returned by `GET /organizations/{org}/builds`
///
/// Only the fields the watcher needs are modelled; everything else in the
/// payload is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Build {
    pub id: String,
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub pipeline: Option<PipelineRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub jobs: Vec<BuildkiteJob>,
}

/// Pipeline a build belongs to
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineRef {
    pub slug: String,
}

/// A single job inside a build
///
/// Waiter and trigger steps come back as jobs too; they carry no state
/// relevant to agents and no query rules, so both fields are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildkiteJob {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub agent_query_rules: Vec<String>,
}

impl BuildkiteJob {
    /// Whether the job is waiting for an agent to pick it up
    pub fn is_scheduled(&self) -> bool {
        self.state.as_deref() == Some(SCHEDULED_STATE)
    }

    /// Whether one of the job's agent query rules is exactly `queue=<queue>`
    pub fn targets_queue(&self, queue: &str) -> bool {
        let target = queue_rule(queue);
        self.agent_query_rules.iter().any(|rule| *rule == target)
    }
}

/// Reads an explicit `null` list as empty
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Formats the agent query rule that routes a job to `queue`
pub fn queue_rule(queue: &str) -> String {
    format!("queue={}", queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(state: Option<&str>, rules: &[&str]) -> BuildkiteJob {
        BuildkiteJob {
            id: "job-1".to_string(),
            state: state.map(str::to_string),
            agent_query_rules: rules.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_scheduled() {
        assert!(job(Some("scheduled"), &[]).is_scheduled());
        assert!(!job(Some("running"), &[]).is_scheduled());
        assert!(!job(Some("Scheduled"), &[]).is_scheduled());
        assert!(!job(None, &[]).is_scheduled());
    }

    #[test]
    fn test_targets_queue_is_exact() {
        let j = job(Some("scheduled"), &["os=linux", "queue=kubernetes"]);
        assert!(j.targets_queue("kubernetes"));
        assert!(!j.targets_queue("kube"));
        assert!(!j.targets_queue("kubernetes*"));

        let j = job(Some("scheduled"), &["queue=kubernetes-gpu"]);
        assert!(!j.targets_queue("kubernetes"));
    }

    #[test]
    fn test_deserialize_build_payload() {
        let payload = r#"{
            "id": "f62a1b4d-10f9-4790-bc1c-e2c3a0c80983",
            "number": 12,
            "state": "running",
            "pipeline": { "slug": "my-pipeline", "name": "My Pipeline" },
            "jobs": [
                {
                    "id": "b63254c0-3271-4a98-8270-7cfbd6c2f14e",
                    "type": "script",
                    "name": ":hammer: build",
                    "state": "scheduled",
                    "agent_query_rules": ["queue=kubernetes", "os=linux"]
                },
                { "id": "9c2d1f", "type": "waiter" }
            ]
        }"#;

        let build: Build = serde_json::from_str(payload).unwrap();
        assert_eq!(build.number, 12);
        assert_eq!(build.pipeline.as_ref().unwrap().slug, "my-pipeline");
        assert_eq!(build.jobs.len(), 2);
        assert!(build.jobs[0].is_scheduled());
        assert_eq!(build.jobs[0].kind.as_deref(), Some("script"));
        assert!(build.jobs[1].state.is_none());
        assert!(build.jobs[1].agent_query_rules.is_empty());
    }

    #[test]
    fn test_deserialize_null_lists() {
        let payload = r#"[
            { "id": "b1", "jobs": [
                { "id": "trigger", "type": "trigger", "state": null, "agent_query_rules": null },
                { "id": "j1", "type": "script", "state": "scheduled", "agent_query_rules": ["queue=kubernetes"] }
            ] },
            { "id": "b2", "jobs": null }
        ]"#;

        let builds: Vec<Build> = serde_json::from_str(payload).unwrap();
        assert_eq!(builds.len(), 2);
        assert!(builds[0].jobs[0].agent_query_rules.is_empty());
        assert!(builds[0].jobs[1].is_scheduled());
        assert!(builds[0].jobs[1].targets_queue("kubernetes"));
        assert!(builds[1].jobs.is_empty());
    }
}
