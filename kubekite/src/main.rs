//! Kubekite
//!
//! Watches a Buildkite queue and launches a Kubernetes Job for every job
//! waiting on it.
//!
//! Architecture:
//! - Configuration: flags with environment fallbacks, validated up front
//! - Repositories: Buildkite API access (builds and their jobs)
//! - Services: Kubernetes job launchers, one per configured template
//! - Scheduler: watcher, template router and dispatcher
//! - Lifecycle: shared cancellation and draining of background tasks
//!
//! Startup is all-or-nothing: every template and client is built before the
//! watcher starts, and any failure exits the process.

mod config;
mod lifecycle;
mod repository;
mod scheduler;
mod service;
#[cfg(test)]
mod test_utils;

use anyhow::{Context, Result};
use clap::Parser;
use kubekite_client::{BuildkiteClient, KubeAccess, KubeClient};
use kubekite_core::mapping::JobMapping;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Cli, Config};
use crate::lifecycle::Lifecycle;
use crate::repository::HttpBuildRepository;
use crate::scheduler::{Dispatcher, TemplateBinding, TemplateRegistry, WatcherSettings, start_watcher};
use crate::service::KubeJobLauncher;

/// Timeout for Buildkite API requests
const BUILDKITE_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "kubekite=debug" } else { "kubekite=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_cli(cli)?;
    info!("Starting Kubekite: org={}, queue={}", config.org, config.queue);

    let mappings = config.templates.load()?;
    let (kube, namespace) = build_kube_client(&config)?;
    info!("Launching jobs in namespace {}", namespace);
    let registry = build_registry(&mappings, &namespace, &kube)?;
    info!("Loaded {} job template(s)", registry.len());

    let http = reqwest::Client::builder()
        .timeout(BUILDKITE_TIMEOUT)
        .build()
        .context("Error starting Buildkite API client")?;
    let buildkite = BuildkiteClient::with_client(
        config.buildkite_api_url.clone(),
        config.buildkite_api_token.clone(),
        http,
    );
    let repository = Arc::new(HttpBuildRepository::new(buildkite));

    let lifecycle = Lifecycle::new();
    lifecycle.listen_for_signals();

    let settings = WatcherSettings {
        org: config.org.clone(),
        queue: config.queue.clone(),
        poll_interval: config.poll_interval,
        channel_capacity: config.channel_capacity,
    };
    let notifications = start_watcher(&lifecycle, repository, &settings);

    let dispatcher = Dispatcher::new(registry);
    dispatcher.run(notifications, lifecycle.token()).await;

    lifecycle.shutdown().await;
    info!(state = ?lifecycle.state(), "Kubekite stopped");

    Ok(())
}

fn build_kube_client(config: &Config) -> Result<(KubeClient, String)> {
    let access = match &config.kube_config {
        Some(path) => KubeAccess::from_kubeconfig(path)
            .with_context(|| format!("Error loading kubeconfig {}", path.display()))?,
        None => KubeAccess::in_cluster().context("Error loading in-cluster Kubernetes config")?,
    };

    info!("Using Kubernetes API server {}", access.server);
    let namespace = config.namespace_for(&access);
    let client =
        KubeClient::new(access, config.kube_timeout).context("Error starting Kubernetes client")?;

    Ok((client, namespace))
}

fn build_registry(
    mappings: &[JobMapping],
    namespace: &str,
    kube: &KubeClient,
) -> Result<TemplateRegistry> {
    let mut bindings = Vec::with_capacity(mappings.len());

    for mapping in mappings {
        let launcher =
            KubeJobLauncher::from_file(&mapping.template, namespace, kube.clone())
                .context("Error starting job manager")?;

        let binding = TemplateBinding::new(Arc::new(launcher), mapping.filters.clone());
        info!(
            template = %mapping.template.display(),
            filters = ?binding.filters(),
            "Registered job template"
        );
        bindings.push(binding);
    }

    TemplateRegistry::new(bindings)
}
