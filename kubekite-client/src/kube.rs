//! Kubernetes API client
//!
//! Only what Kubekite needs: resolving cluster access from a kubeconfig file
//! or the in-cluster service account, and creating `batch/v1` Jobs.
//!
//! Authentication is bearer-token only (`token` / `tokenFile` in kubeconfig,
//! or the mounted service account token).

use reqwest::{Certificate, Client};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::handle_response;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Resolved connection settings for one API server
#[derive(Debug, Clone, Default)]
pub struct KubeAccess {
    /// API server URL (e.g., "https://10.0.0.1:443")
    pub server: String,
    /// Bearer token, if the user authenticates with one
    pub token: Option<String>,
    /// PEM bundle of the cluster CA
    pub ca_pem: Option<Vec<u8>>,
    /// Skip TLS verification of the API server
    pub insecure: bool,
    /// Namespace named by the current context or the service account
    pub namespace: Option<String>,
}

impl KubeAccess {
    /// Load access settings from a kubeconfig file using its current context
    pub fn from_kubeconfig(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| ClientError::io(path, e))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_kubeconfig_str(&yaml, base_dir)
    }

    /// Parse kubeconfig YAML. Relative file references resolve against `base_dir`.
    pub fn from_kubeconfig_str(yaml: &str, base_dir: &Path) -> Result<Self> {
        let config: Kubeconfig = serde_yaml::from_str(yaml)
            .map_err(|e| ClientError::InvalidConfig(format!("malformed kubeconfig: {}", e)))?;

        let context_name = config
            .current_context
            .as_deref()
            .ok_or_else(|| ClientError::InvalidConfig("kubeconfig has no current-context".into()))?;

        let context = config
            .contexts
            .iter()
            .find(|c| c.name == context_name)
            .map(|c| &c.context)
            .ok_or_else(|| {
                ClientError::InvalidConfig(format!("context {} not found", context_name))
            })?;

        let cluster = config
            .clusters
            .iter()
            .find(|c| c.name == context.cluster)
            .map(|c| &c.cluster)
            .ok_or_else(|| {
                ClientError::InvalidConfig(format!("cluster {} not found", context.cluster))
            })?;

        let user = match &context.user {
            Some(name) => config.users.iter().find(|u| &u.name == name).map(|u| &u.user),
            None => None,
        };

        let token = match user {
            Some(UserSpec { token: Some(token), .. }) => Some(token.clone()),
            Some(UserSpec {
                token_file: Some(file),
                ..
            }) => Some(read_token(&base_dir.join(file))?),
            _ => None,
        };

        let ca_pem = match &cluster.certificate_authority {
            Some(file) => {
                let path = base_dir.join(file);
                Some(std::fs::read(&path).map_err(|e| ClientError::io(path, e))?)
            }
            None => None,
        };

        Ok(Self {
            server: cluster.server.clone(),
            token,
            ca_pem,
            insecure: cluster.insecure_skip_tls_verify,
            namespace: context.namespace.clone(),
        })
    }

    /// Access settings for a pod running inside the cluster
    pub fn in_cluster() -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
            ClientError::InvalidConfig("KUBERNETES_SERVICE_HOST not set; not running in a cluster".into())
        })?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());

        let dir = Path::new(SERVICE_ACCOUNT_DIR);
        let token = read_token(&dir.join("token"))?;
        let ca_path = dir.join("ca.crt");
        let ca_pem = std::fs::read(&ca_path).map_err(|e| ClientError::io(ca_path, e))?;
        let namespace = std::fs::read_to_string(dir.join("namespace"))
            .ok()
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty());

        let host = if host.contains(':') {
            format!("[{}]", host)
        } else {
            host
        };

        Ok(Self {
            server: format!("https://{}:{}", host, port),
            token: Some(token),
            ca_pem: Some(ca_pem),
            insecure: false,
            namespace,
        })
    }
}

fn read_token(path: &Path) -> Result<String> {
    let token = std::fs::read_to_string(path).map_err(|e| ClientError::io(path, e))?;
    Ok(token.trim().to_string())
}

/// HTTP client for the Kubernetes API server
#[derive(Debug, Clone)]
pub struct KubeClient {
    server: String,
    token: Option<String>,
    client: Client,
}

impl KubeClient {
    /// Build a client from resolved access settings
    ///
    /// # Arguments
    /// * `access` - Server URL and credentials
    /// * `timeout` - Per-request timeout; `None` waits indefinitely
    pub fn new(access: KubeAccess, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(pem) = &access.ca_pem {
            let cert = Certificate::from_pem(pem)
                .map_err(|e| ClientError::InvalidConfig(format!("invalid cluster CA: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        if access.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        Ok(Self {
            server: access.server.trim_end_matches('/').to_string(),
            token: access.token,
            client: builder.build()?,
        })
    }

    /// Get the API server URL
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Create a `batch/v1` Job in `namespace`
    ///
    /// Returns the created object as reported by the API server. A Job with
    /// the same name surfaces as an `ApiError` with status 409.
    pub async fn create_job(&self, namespace: &str, job: &Value) -> Result<Value> {
        let url = self.jobs_url(namespace);
        debug!(%url, "Creating Kubernetes job");

        let mut request = self.client.post(&url).json(job);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        handle_response(response).await
    }

    fn jobs_url(&self, namespace: &str) -> String {
        format!("{}/apis/batch/v1/namespaces/{}/jobs", self.server, namespace)
    }
}

// =============================================================================
// Kubeconfig shape
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    current_context: Option<String>,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextSpec,
}

#[derive(Debug, Deserialize)]
struct ContextSpec {
    cluster: String,
    user: Option<String>,
    namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterSpec,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterSpec {
    server: String,
    certificate_authority: Option<PathBuf>,
    #[serde(default)]
    insecure_skip_tls_verify: bool,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    user: UserSpec,
}

#[derive(Debug, Default, Deserialize)]
struct UserSpec {
    token: Option<String>,
    #[serde(rename = "tokenFile")]
    token_file: Option<PathBuf>,
}
