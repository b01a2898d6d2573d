//! Job dispatcher
//!
//! Consumes watcher notifications, asks the registry which template should
//! run each job and launches it. A failed launch is logged and never stops
//! the loop. Cancellation is checked before every receive, so once shutdown
//! is requested no further launches are started; a launch already in flight
//! runs to completion.

use anyhow::Result;
use kubekite_core::domain::JobNotification;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::router::TemplateRegistry;

pub struct Dispatcher {
    registry: TemplateRegistry,
}

impl Dispatcher {
    pub fn new(registry: TemplateRegistry) -> Self {
        Self { registry }
    }

    /// Routes one notification and launches it
    ///
    /// A notification no binding accepts is dropped.
    pub async fn dispatch(&self, notification: &JobNotification) -> Result<()> {
        let Some(binding) = self.registry.select(&notification.tags) else {
            debug!(job_id = %notification.id, "No template matched job, dropping");
            return Ok(());
        };

        debug!(
            job_id = %notification.id,
            template = binding.launcher().name(),
            score = binding.score(&notification.tags),
            "Selected template for job"
        );

        binding.launcher().launch_job(&notification.id).await
    }

    /// Services notifications until cancelled or the channel closes
    pub async fn run(&self, mut rx: mpsc::Receiver<JobNotification>, shutdown: CancellationToken) {
        info!(templates = self.registry.len(), "Job dispatcher started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Cancellation request received. Cancelling job processor.");
                    break;
                }
                notification = rx.recv() => match notification {
                    Some(notification) => {
                        if let Err(e) = self.dispatch(&notification).await {
                            error!(job_id = %notification.id, "Error launching job: {:#}", e);
                        }
                    }
                    None => {
                        info!("Notification channel closed, stopping job processor");
                        break;
                    }
                },
            }
        }
    }
}
