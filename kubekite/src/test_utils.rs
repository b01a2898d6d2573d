//! Shared test doubles for the repository and launcher traits.

use anyhow::Result;
use async_trait::async_trait;
use kubekite_core::domain::{Build, BuildkiteJob};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::repository::BuildRepository;
use crate::scheduler::TemplateBinding;
use crate::service::JobLauncher;

/// Launcher that records every job id it is asked to launch
pub struct RecordingLauncher {
    name: String,
    fail: bool,
    launched: Mutex<Vec<String>>,
}

impl RecordingLauncher {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail: false,
            launched: Mutex::new(Vec::new()),
        })
    }

    /// A launcher whose every launch attempt fails after being recorded
    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            fail: true,
            launched: Mutex::new(Vec::new()),
        })
    }

    pub fn launched(&self) -> Vec<String> {
        self.launched.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobLauncher for RecordingLauncher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn launch_job(&self, job_id: &str) -> Result<()> {
        self.launched.lock().unwrap().push(job_id.to_string());
        if self.fail {
            anyhow::bail!("cluster unavailable");
        }
        Ok(())
    }
}

pub fn binding(launcher: &Arc<RecordingLauncher>, filters: &[&str]) -> TemplateBinding {
    TemplateBinding::new(
        launcher.clone(),
        filters.iter().map(|f| f.to_string()),
    )
}

pub fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Repository that replays canned responses, then returns no builds
#[derive(Default)]
pub struct FakeBuildRepository {
    responses: Mutex<VecDeque<Result<Vec<Build>>>>,
    calls: AtomicUsize,
}

impl FakeBuildRepository {
    pub fn new(responses: Vec<Result<Vec<Build>>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildRepository for FakeBuildRepository {
    async fn list_builds(&self, _org: &str) -> Result<Vec<Build>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub fn job(id: &str, state: &str, rules: &[&str]) -> BuildkiteJob {
    BuildkiteJob {
        id: id.to_string(),
        kind: Some("script".to_string()),
        state: Some(state.to_string()),
        agent_query_rules: tags(rules),
        ..Default::default()
    }
}

pub fn build(jobs: Vec<BuildkiteJob>) -> Build {
    Build {
        id: "build-1".to_string(),
        number: 1,
        state: Some("running".to_string()),
        jobs,
        ..Default::default()
    }
}
