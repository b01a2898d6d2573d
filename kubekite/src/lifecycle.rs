//! Process lifecycle
//!
//! One cancellation token is shared by the watcher and the dispatcher. A
//! termination signal cancels it; [`Lifecycle::shutdown`] then waits for every
//! background task spawned through [`Lifecycle::spawn`] before returning.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

/// Where the process is in its shutdown sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    CancelRequested,
    Draining,
    Stopped,
}

/// Owns the shared cancellation token and tracks background tasks
pub struct Lifecycle {
    token: CancellationToken,
    tracker: TaskTracker,
    state: Arc<watch::Sender<LifecycleState>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (state, _) = watch::channel(LifecycleState::Running);
        Self {
            token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            state: Arc::new(state),
        }
    }

    /// Token observed by every loop that must stop on shutdown
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn state(&self) -> LifecycleState {
        let state = *self.state.borrow();
        if state == LifecycleState::Running && self.token.is_cancelled() {
            LifecycleState::CancelRequested
        } else {
            state
        }
    }

    /// Subscribe to state transitions
    #[allow(dead_code)]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Requests cancellation. Calling it again has no further effect.
    pub fn cancel(&self) {
        if !self.token.is_cancelled() {
            info!("Cancellation requested");
        }
        request_cancel(&self.token, &self.state);
    }

    /// Spawns a task that shutdown waits for
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task = name, "Starting background task");
        self.tracker.spawn(async move {
            task.await;
            debug!(task = name, "Background task finished");
        });
    }

    /// Cancels the token on the first SIGINT or SIGTERM
    pub fn listen_for_signals(&self) {
        let token = self.token.clone();
        let state = self.state.clone();

        self.spawn("signal-listener", async move {
            tokio::select! {
                _ = token.cancelled() => {}
                signal = shutdown_signal() => match signal {
                    Ok(name) => {
                        info!(signal = name, "Termination signal received, cancelling");
                        request_cancel(&token, &state);
                    }
                    Err(e) => error!(error = %e, "Failed to install signal handlers"),
                },
            }
        });
    }

    /// Cancels, then blocks until all tracked tasks have finished
    pub async fn shutdown(&self) {
        self.cancel();
        self.state.send_replace(LifecycleState::Draining);

        info!(tasks = self.tracker.len(), "Draining background tasks");
        self.tracker.close();
        self.tracker.wait().await;

        self.state.send_replace(LifecycleState::Stopped);
        info!("All background tasks finished");
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

fn request_cancel(token: &CancellationToken, state: &watch::Sender<LifecycleState>) {
    token.cancel();
    state.send_if_modified(|state| {
        let running = *state == LifecycleState::Running;
        if running {
            *state = LifecycleState::CancelRequested;
        }
        running
    });
}

async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Running);

        lifecycle.cancel();
        lifecycle.cancel();

        assert!(lifecycle.token().is_cancelled());
        assert_eq!(lifecycle.state(), LifecycleState::CancelRequested);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_tasks() {
        let lifecycle = Lifecycle::new();
        let finished = Arc::new(AtomicBool::new(false));

        let token = lifecycle.token();
        let flag = finished.clone();
        lifecycle.spawn("slow-task", async move {
            token.cancelled().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });

        lifecycle.shutdown().await;

        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_state_transitions_are_observable() {
        let lifecycle = Lifecycle::new();
        let mut states = lifecycle.subscribe();

        lifecycle.cancel();
        states.changed().await.unwrap();
        assert_eq!(*states.borrow_and_update(), LifecycleState::CancelRequested);

        lifecycle.shutdown().await;
        assert_eq!(*states.borrow_and_update(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_signal_listener_exits_on_cancel() {
        let lifecycle = Lifecycle::new();
        lifecycle.listen_for_signals();

        tokio::time::timeout(Duration::from_secs(1), lifecycle.shutdown())
            .await
            .expect("signal listener should stop once cancelled");
    }
}
