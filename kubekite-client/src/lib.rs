//! Kubekite HTTP clients
//!
//! Thin, typed clients for the two backends Kubekite bridges:
//! - [`BuildkiteClient`]: lists builds and their jobs from the Buildkite REST API
//! - [`KubeClient`]: creates batch Jobs through the Kubernetes API server
//!
//! # Example
//!
//! ```no_run
//! use kubekite_client::BuildkiteClient;
//!
//! #[tokio::main]
//! async fn main() -> kubekite_client::Result<()> {
//!     let client = BuildkiteClient::new("bkua_token");
//!     let builds = client.list_builds_by_org("my-org").await?;
//!     println!("{} builds", builds.len());
//!     Ok(())
//! }
//! ```

mod buildkite;
pub mod error;
pub mod kube;

pub use buildkite::{BuildkiteClient, DEFAULT_BUILDKITE_API_URL};
pub use error::{ClientError, Result};
pub use kube::{KubeAccess, KubeClient};

use serde::de::DeserializeOwned;

// =============================================================================
// Response Handlers
// =============================================================================

/// Check the status code and deserialize a JSON body
pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}
