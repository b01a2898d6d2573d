//! Buildkite REST API client

use kubekite_core::domain::Build;
use reqwest::Client;
use tracing::debug;

use crate::error::Result;
use crate::handle_response;

/// Public Buildkite REST endpoint
pub const DEFAULT_BUILDKITE_API_URL: &str = "https://api.buildkite.com/v2";

/// Builds requested per listing call
const BUILDS_PER_PAGE: u32 = 100;

/// HTTP client for the Buildkite REST API
#[derive(Debug, Clone)]
pub struct BuildkiteClient {
    /// Base URL of the API (e.g., "https://api.buildkite.com/v2")
    base_url: String,
    /// API access token sent as a bearer token
    token: String,
    /// HTTP client instance
    client: Client,
}

impl BuildkiteClient {
    /// Create a client against the public Buildkite API
    ///
    /// # Arguments
    /// * `token` - A Buildkite API access token with `read_builds` scope
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_client(DEFAULT_BUILDKITE_API_URL, token, Client::new())
    }

    /// Create a client with a custom base URL and HTTP client
    ///
    /// Useful for pointing at a proxy or configuring timeouts.
    pub fn with_client(base_url: impl Into<String>, token: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        }
    }

    /// Get the base URL of the API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List the most recent builds of an organization, jobs included
    ///
    /// # Arguments
    /// * `org` - The organization slug
    pub async fn list_builds_by_org(&self, org: &str) -> Result<Vec<Build>> {
        let url = self.builds_url(org);
        debug!(%url, "Listing Buildkite builds");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("per_page", BUILDS_PER_PAGE)])
            .send()
            .await?;

        handle_response(response).await
    }

    fn builds_url(&self, org: &str) -> String {
        format!("{}/organizations/{}/builds", self.base_url, org)
    }
}
