//! Buildkite job watcher
//!
//! Polls Buildkite on a fixed interval and emits a [`JobNotification`] for
//! every job that is scheduled and routed to the target queue. Notifications
//! go onto a bounded channel; when the dispatcher falls behind the watcher
//! blocks on that channel, which also delays discovery of newer jobs. Every
//! wait is raced against the shutdown token so a stalled channel never holds
//! up shutdown.

use anyhow::{Result, anyhow};
use kubekite_core::domain::{Build, JobNotification};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::lifecycle::Lifecycle;
use crate::repository::BuildRepository;

/// What to watch and how often
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    pub org: String,
    pub queue: String,
    pub poll_interval: Duration,
    pub channel_capacity: usize,
}

/// Jobs across `builds` that are scheduled on `queue`, in listing order
pub fn schedulable_jobs(builds: &[Build], queue: &str) -> Vec<JobNotification> {
    builds
        .iter()
        .flat_map(|build| build.jobs.iter())
        .filter(|job| job.is_scheduled() && job.targets_queue(queue))
        .map(JobNotification::from)
        .collect()
}

/// Polls Buildkite and feeds the dispatcher
pub struct Watcher {
    repository: Arc<dyn BuildRepository>,
    org: String,
    queue: String,
    poll_interval: Duration,
    tx: mpsc::Sender<JobNotification>,
    shutdown: CancellationToken,
}

impl Watcher {
    pub fn new(
        repository: Arc<dyn BuildRepository>,
        settings: &WatcherSettings,
        tx: mpsc::Sender<JobNotification>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            repository,
            org: settings.org.clone(),
            queue: settings.queue.clone(),
            poll_interval: settings.poll_interval,
            tx,
            shutdown,
        }
    }

    /// Polls until cancelled or until the dispatcher goes away
    pub async fn run(self) {
        info!(
            org = %self.org,
            queue = %self.queue,
            interval = ?self.poll_interval,
            "Buildkite job watcher started"
        );

        loop {
            debug!("Checking Buildkite API for builds and jobs");

            let outcome = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                outcome = self.poll_once() => outcome,
            };

            match outcome {
                Ok(sent) if sent > 0 => info!(jobs = sent, "Queued scheduled job(s) for dispatch"),
                Ok(_) => debug!("No scheduled jobs on queue"),
                Err(e) if self.tx.is_closed() => {
                    debug!(error = %e, "Notification channel closed");
                    break;
                }
                Err(e) => error!("Error fetching builds from Buildkite API: {:#}", e),
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = time::sleep(self.poll_interval) => {}
            }
        }

        info!("Buildkite job watcher stopped");
    }

    /// Performs a single poll cycle, returning how many jobs were queued
    pub async fn poll_once(&self) -> Result<usize> {
        let builds = self.repository.list_builds(&self.org).await?;
        let jobs = schedulable_jobs(&builds, &self.queue);

        let count = jobs.len();
        for notification in jobs {
            self.emit(notification).await?;
        }

        Ok(count)
    }

    async fn emit(&self, notification: JobNotification) -> Result<()> {
        debug!(job_id = %notification.id, tags = ?notification.tags, "Found scheduled job");

        let notification = match self.tx.try_send(notification) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(notification)) => notification,
            Err(TrySendError::Closed(_)) => return Err(anyhow!("notification channel closed")),
        };

        warn!(
            capacity = self.tx.max_capacity(),
            "Notification channel full, waiting for dispatcher"
        );
        self.tx
            .send(notification)
            .await
            .map_err(|_| anyhow!("notification channel closed"))
    }
}

/// Spawns a watcher under `lifecycle` and returns the notification stream
pub fn start_watcher(
    lifecycle: &Lifecycle,
    repository: Arc<dyn BuildRepository>,
    settings: &WatcherSettings,
) -> mpsc::Receiver<JobNotification> {
    let (tx, rx) = mpsc::channel(settings.channel_capacity);
    let watcher = Watcher::new(repository, settings, tx, lifecycle.token());

    lifecycle.spawn("buildkite-watcher", watcher.run());

    rx
}
