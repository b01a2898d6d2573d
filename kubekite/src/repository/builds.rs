//! Builds repository
//!
//! Fetches the builds of an organization, jobs included.

use anyhow::{Context, Result};
use async_trait::async_trait;
use kubekite_client::BuildkiteClient;
use kubekite_core::domain::Build;

/// Repository trait for reading builds from Buildkite
#[async_trait]
pub trait BuildRepository: Send + Sync {
    /// Fetches the current builds of an organization
    ///
    /// # Arguments
    /// * `org` - The organization slug
    async fn list_builds(&self, org: &str) -> Result<Vec<Build>>;
}

/// HTTP implementation of BuildRepository
pub struct HttpBuildRepository {
    client: BuildkiteClient,
}

impl HttpBuildRepository {
    /// Creates a new HTTP build repository
    pub fn new(client: BuildkiteClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BuildRepository for HttpBuildRepository {
    async fn list_builds(&self, org: &str) -> Result<Vec<Build>> {
        self.client
            .list_builds_by_org(org)
            .await
            .with_context(|| format!("Failed to fetch builds for {}", org))
    }
}
