//! Job launcher service
//!
//! Turns a Buildkite job id into a Kubernetes Job. The job template is parsed
//! once at startup; each launch renders a copy that names the Job after the
//! Buildkite job and tells the agent inside which job to acquire.

use anyhow::{Context, Result};
use async_trait::async_trait;
use kubekite_client::KubeClient;
use serde_json::{Map, Value, json};
use std::path::Path;
use tracing::{debug, info};

/// Label carrying the Buildkite job id on every launched Job
pub const JOB_ID_LABEL: &str = "kubekite/buildkite-job-id";

/// Environment variable that makes the Buildkite agent run exactly one job
pub const ACQUIRE_JOB_ENV: &str = "BUILDKITE_AGENT_ACQUIRE_JOB";

const JOB_NAME_PREFIX: &str = "kubekite-";
const MAX_NAME_LEN: usize = 63;

/// Service trait for launching cluster work for a Buildkite job
#[async_trait]
pub trait JobLauncher: Send + Sync {
    /// Human-readable name of the template behind this launcher
    fn name(&self) -> &str;

    /// Launches cluster work for the given Buildkite job
    ///
    /// Launching a job that is already running is not an error.
    async fn launch_job(&self, job_id: &str) -> Result<()>;
}

/// Launches Kubernetes Jobs from a YAML template
pub struct KubeJobLauncher {
    name: String,
    template: Value,
    namespace: String,
    client: KubeClient,
}

impl KubeJobLauncher {
    /// Creates a launcher from an already parsed template
    ///
    /// Fails if the template is not a Job manifest with at least one container.
    pub fn new(
        name: impl Into<String>,
        template: Value,
        namespace: impl Into<String>,
        client: KubeClient,
    ) -> Result<Self> {
        validate_template(&template)?;
        Ok(Self {
            name: name.into(),
            template,
            namespace: namespace.into(),
            client,
        })
    }

    /// Reads and parses a template file
    pub fn from_file(path: &Path, namespace: impl Into<String>, client: KubeClient) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job template {}", path.display()))?;
        let template: Value = serde_yaml::from_str(&yaml)
            .with_context(|| format!("Failed to parse job template {}", path.display()))?;

        Self::new(path.display().to_string(), template, namespace, client)
            .with_context(|| format!("Invalid job template {}", path.display()))
    }
}

#[async_trait]
impl JobLauncher for KubeJobLauncher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn launch_job(&self, job_id: &str) -> Result<()> {
        let manifest = render_job(&self.template, job_id);

        match self.client.create_job(&self.namespace, &manifest).await {
            Ok(_) => {
                info!(
                    job_id,
                    template = %self.name,
                    namespace = %self.namespace,
                    "Launched Kubernetes job"
                );
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                debug!(job_id, namespace = %self.namespace, "Kubernetes job already exists");
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e)
                .context(format!("Failed to create Kubernetes job for {}", job_id))),
        }
    }
}

fn validate_template(template: &Value) -> Result<()> {
    if !template.is_object() {
        anyhow::bail!("job template must be a mapping");
    }

    if let Some(kind) = template.get("kind").and_then(Value::as_str)
        && kind != "Job"
    {
        anyhow::bail!("job template has kind {}, expected Job", kind);
    }

    let has_containers = template
        .pointer("/spec/template/spec/containers")
        .and_then(Value::as_array)
        .is_some_and(|containers| !containers.is_empty());

    if !has_containers {
        anyhow::bail!("job template must define spec.template.spec.containers");
    }

    if !null_or(template.get("metadata"), Value::is_object)
        || !null_or(template.pointer("/metadata/labels"), Value::is_object)
    {
        anyhow::bail!("job template metadata and metadata.labels must be mappings");
    }

    let containers = template
        .pointer("/spec/template/spec/containers")
        .and_then(Value::as_array)
        .into_iter()
        .flatten();
    for container in containers {
        if !container.is_object() || !null_or(container.get("env"), Value::is_array) {
            anyhow::bail!("job template containers must be mappings with a list env");
        }
    }

    Ok(())
}

/// Whether `value` is absent, null or passes `check`
fn null_or(value: Option<&Value>, check: fn(&Value) -> bool) -> bool {
    value.is_none_or(|v| v.is_null() || check(v))
}

/// Returns `map[key]`, replacing a missing or null entry with `empty`
fn entry_or_empty<'a>(map: &'a mut Map<String, Value>, key: &str, empty: Value) -> &'a mut Value {
    let value = map.entry(key).or_insert(Value::Null);
    if value.is_null() {
        *value = empty;
    }
    value
}

/// Renders the template for one Buildkite job
pub fn render_job(template: &Value, job_id: &str) -> Value {
    let mut job = template.clone();

    if let Some(root) = job.as_object_mut() {
        root.entry("apiVersion").or_insert_with(|| json!("batch/v1"));
        root.entry("kind").or_insert_with(|| json!("Job"));

        let metadata = entry_or_empty(root, "metadata", json!({}));
        if let Some(metadata) = metadata.as_object_mut() {
            metadata.remove("generateName");
            metadata.insert("name".to_string(), json!(job_name(job_id)));

            let labels = entry_or_empty(metadata, "labels", json!({}));
            if let Some(labels) = labels.as_object_mut() {
                labels.insert(JOB_ID_LABEL.to_string(), json!(job_id));
            }
        }
    }

    if let Some(containers) = job
        .pointer_mut("/spec/template/spec/containers")
        .and_then(Value::as_array_mut)
    {
        for container in containers.iter_mut().filter_map(Value::as_object_mut) {
            let env = entry_or_empty(container, "env", json!([]));
            if let Some(env) = env.as_array_mut() {
                env.push(json!({ "name": ACQUIRE_JOB_ENV, "value": job_id }));
            }
        }
    }

    job
}

/// Job name derived from the Buildkite job id, valid as a DNS-1123 label
pub fn job_name(job_id: &str) -> String {
    let mut name: String = JOB_NAME_PREFIX.to_string();
    name.extend(
        job_id
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' }),
    );
    name.truncate(MAX_NAME_LEN);
    name.trim_end_matches('-').to_string()
}
