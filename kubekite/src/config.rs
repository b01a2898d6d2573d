//! Daemon configuration
//!
//! Every setting can be given as a command-line flag or through the matching
//! environment variable. [`Cli`] captures the raw values; [`Config`] is the
//! validated form the rest of the daemon consumes.

use anyhow::{Context, Result};
use clap::Parser;
use kubekite_client::{DEFAULT_BUILDKITE_API_URL, KubeAccess};
use kubekite_core::mapping::{JobMapping, load_mappings};
use std::path::PathBuf;
use std::time::Duration;

/// Smallest notification channel the watcher is allowed to use
pub const MIN_CHANNEL_CAPACITY: usize = 10;

/// Namespace used when neither the flag nor the cluster access names one
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Parser, Debug)]
#[command(name = "kubekite")]
#[command(about = "Launch Kubernetes jobs for scheduled Buildkite jobs", long_about = None)]
pub struct Cli {
    /// Turn on debugging
    #[arg(long, env = "DEBUG")]
    pub debug: bool,

    /// Buildkite API token
    #[arg(long, env = "BUILDKITE_API_TOKEN", hide_env_values = true)]
    pub buildkite_api_token: Option<String>,

    /// Your Buildkite organization
    #[arg(long, env = "BUILDKITE_ORG")]
    pub buildkite_org: Option<String>,

    /// Buildkite queue to watch for new jobs
    #[arg(long, env = "BUILDKITE_QUEUE")]
    pub buildkite_queue: Option<String>,

    /// Buildkite REST API base URL
    #[arg(long, env = "BUILDKITE_API_URL", default_value = DEFAULT_BUILDKITE_API_URL)]
    pub buildkite_api_url: String,

    /// Path to your kubeconfig file; in-cluster credentials are used when unset
    #[arg(long, env = "KUBECONFIG")]
    pub kube_config: Option<PathBuf>,

    /// Kubernetes namespace to run jobs in [default: the context's namespace, else "default"]
    #[arg(long, env = "KUBE_NAMESPACE")]
    pub kube_namespace: Option<String>,

    /// Timeout (in seconds) for Kubernetes API requests. Set to 0 for no timeout
    #[arg(long, env = "KUBE_TIMEOUT", default_value_t = 15)]
    pub kube_timeout: u64,

    /// Path to your job template YAML file
    #[arg(long, env = "JOB_TEMPLATE")]
    pub job_template: Option<PathBuf>,

    /// Path to your job mapping YAML file
    #[arg(long, env = "JOB_MAPPING")]
    pub job_mapping: Option<PathBuf>,

    /// Seconds between Buildkite polls
    #[arg(long, env = "POLL_INTERVAL", default_value_t = 5)]
    pub poll_interval: u64,

    /// Notifications buffered between the watcher and the dispatcher
    #[arg(long, env = "CHANNEL_CAPACITY", default_value_t = MIN_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,
}

/// Where the job templates come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateSource {
    /// One template that receives every job
    Single(PathBuf),
    /// A mapping file listing templates and their filter tags
    Mapping(PathBuf),
}

impl TemplateSource {
    /// Resolves the source into template/filter pairs
    pub fn load(&self) -> Result<Vec<JobMapping>> {
        match self {
            Self::Single(path) => Ok(vec![JobMapping::single(path.clone())]),
            Self::Mapping(path) => load_mappings(path)
                .with_context(|| format!("Failed to load job mapping {}", path.display())),
        }
    }
}

/// Validated daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub buildkite_api_token: String,
    pub buildkite_api_url: String,
    pub org: String,
    pub queue: String,

    /// `None` selects in-cluster credentials
    pub kube_config: Option<PathBuf>,
    /// `None` defers to the namespace of the cluster access
    pub kube_namespace: Option<String>,
    /// `None` means requests never time out
    pub kube_timeout: Option<Duration>,

    pub templates: TemplateSource,

    pub poll_interval: Duration,
    pub channel_capacity: usize,
}

impl Config {
    /// Builds and validates the configuration from parsed arguments
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let buildkite_api_token = non_empty(cli.buildkite_api_token).context(
            "must provide API token via --buildkite-api-token flag or BUILDKITE_API_TOKEN environment variable",
        )?;
        let org = non_empty(cli.buildkite_org).context(
            "must provide a Buildkite organization via --buildkite-org flag or BUILDKITE_ORG environment variable",
        )?;
        let queue = non_empty(cli.buildkite_queue).context(
            "must provide a Buildkite queue via --buildkite-queue flag or BUILDKITE_QUEUE environment variable",
        )?;

        let templates = match (
            non_empty_path(cli.job_template),
            non_empty_path(cli.job_mapping),
        ) {
            (Some(template), None) => TemplateSource::Single(template),
            (None, Some(mapping)) => TemplateSource::Mapping(mapping),
            (Some(_), Some(_)) => {
                anyhow::bail!("--job-template and --job-mapping are mutually exclusive")
            }
            (None, None) => anyhow::bail!(
                "must provide a Kubernetes job template via --job-template (JOB_TEMPLATE) or a job mapping via --job-mapping (JOB_MAPPING)"
            ),
        };

        let config = Self {
            buildkite_api_token,
            buildkite_api_url: cli.buildkite_api_url,
            org,
            queue,
            kube_config: non_empty_path(cli.kube_config),
            kube_namespace: non_empty(cli.kube_namespace),
            kube_timeout: (cli.kube_timeout > 0).then(|| Duration::from_secs(cli.kube_timeout)),
            templates,
            poll_interval: Duration::from_secs(cli.poll_interval),
            channel_capacity: cli.channel_capacity,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.buildkite_api_url.starts_with("http://")
            && !self.buildkite_api_url.starts_with("https://")
        {
            anyhow::bail!("buildkite_api_url must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.channel_capacity < MIN_CHANNEL_CAPACITY {
            anyhow::bail!("channel_capacity must be at least {}", MIN_CHANNEL_CAPACITY);
        }

        Ok(())
    }

    /// Namespace to launch jobs in
    ///
    /// An explicit setting wins, then the namespace named by the cluster
    /// access, then [`DEFAULT_NAMESPACE`].
    pub fn namespace_for(&self, access: &KubeAccess) -> String {
        self.kube_namespace
            .clone()
            .or_else(|| access.namespace.clone().filter(|ns| !ns.is_empty()))
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn non_empty_path(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|p| !p.as_os_str().is_empty())
}
