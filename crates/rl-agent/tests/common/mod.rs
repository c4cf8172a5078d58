//! Shared fixtures for the pipeline tests: a scriptable platform, a canned
//! analyzer, and file-backed stores so assertions can reopen the database an
//! agent wrote to.

use async_trait::async_trait;
use chrono::Utc;
use rl_agent::agent::AgentDeps;
use rl_core::plugins::{LanguageProfile, PluginRegistry};
use rl_core::types::{
    CommentThread, FindingCategory, FixVerdict, IterationChange, IterationInfo, LineFinding,
    NewThread, PrEvent, PrEventKind, PrSnapshot, RepoHandle, RepoId, Repository, SummaryFinding,
    ThreadStatus,
};
use rl_db::{schema, DbStore};
use rl_events::bus::EventBus;
use rl_platform::{
    AnalysisRequest, Analyzer, AnalyzerError, ArchInput, Platform, PlatformError, PlatformRepo,
    PriorFinding,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use ulid::Ulid;

pub struct MockInner {
    pub snapshot: PrSnapshot,
    pub iterations: Vec<IterationInfo>,
    pub changes: HashMap<i64, Vec<IterationChange>>,
    pub files: HashMap<(String, String), String>,
    pub threads: Vec<CommentThread>,
    pub next_thread_id: i64,
    pub status_updates: Vec<(i64, ThreadStatus)>,
    pub replies: Vec<(i64, String)>,
}

pub struct MockPlatform {
    pub inner: Mutex<MockInner>,
}

impl MockPlatform {
    pub fn new(snapshot: PrSnapshot) -> Self {
        Self {
            inner: Mutex::new(MockInner {
                snapshot,
                iterations: Vec::new(),
                changes: HashMap::new(),
                files: HashMap::new(),
                threads: Vec::new(),
                next_thread_id: 1,
                status_updates: Vec::new(),
                replies: Vec::new(),
            }),
        }
    }

    pub fn iteration(self, id: i64, commit: &str) -> Self {
        self.inner.lock().unwrap().iterations.push(IterationInfo {
            id,
            source_commit: commit.to_string(),
        });
        self
    }

    pub fn change(self, iteration: i64, path: &str, kind: rl_core::types::ChangeKind) -> Self {
        self.inner
            .lock()
            .unwrap()
            .changes
            .entry(iteration)
            .or_default()
            .push(IterationChange {
                path: path.to_string(),
                kind,
            });
        self
    }

    pub fn file(self, commit: &str, path: &str, content: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .files
            .insert((commit.to_string(), path.to_string()), content.to_string());
        self
    }

    pub fn existing_thread(self, thread: CommentThread) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.next_thread_id = inner.next_thread_id.max(thread.thread_id + 1);
            inner.threads.push(thread);
        }
        self
    }

    pub fn created_inline_threads(&self) -> Vec<(String, u32, String)> {
        self.inner
            .lock()
            .unwrap()
            .threads
            .iter()
            .filter(|thread| thread.path.is_some())
            .map(|thread| {
                (
                    thread.path.clone().unwrap(),
                    thread.line.unwrap_or(0),
                    thread.content.clone(),
                )
            })
            .collect()
    }

    pub fn pr_level_threads(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .threads
            .iter()
            .filter(|thread| thread.path.is_none())
            .map(|thread| thread.content.clone())
            .collect()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn get_repository(
        &self,
        _project: &str,
        name: &str,
    ) -> Result<PlatformRepo, PlatformError> {
        Ok(PlatformRepo {
            id: "mock-guid".to_string(),
            name: name.to_string(),
        })
    }

    async fn get_pr(&self, _repo: &RepoHandle, _pr_id: i64) -> Result<PrSnapshot, PlatformError> {
        Ok(self.inner.lock().unwrap().snapshot.clone())
    }

    async fn list_iterations(
        &self,
        _repo: &RepoHandle,
        _pr_id: i64,
    ) -> Result<Vec<IterationInfo>, PlatformError> {
        Ok(self.inner.lock().unwrap().iterations.clone())
    }

    async fn get_iteration_changes(
        &self,
        _repo: &RepoHandle,
        _pr_id: i64,
        iteration_id: i64,
    ) -> Result<Vec<IterationChange>, PlatformError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .changes
            .get(&iteration_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_file(
        &self,
        _repo: &RepoHandle,
        path: &str,
        commit: &str,
    ) -> Result<Option<String>, PlatformError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .files
            .get(&(commit.to_string(), path.to_string()))
            .cloned())
    }

    async fn list_threads(
        &self,
        _repo: &RepoHandle,
        _pr_id: i64,
    ) -> Result<Vec<CommentThread>, PlatformError> {
        Ok(self.inner.lock().unwrap().threads.clone())
    }

    async fn create_thread(
        &self,
        _repo: &RepoHandle,
        _pr_id: i64,
        thread: &NewThread,
    ) -> Result<i64, PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_thread_id;
        inner.next_thread_id += 1;
        inner.threads.push(CommentThread {
            thread_id: id,
            path: thread.path.clone(),
            line: thread.line,
            status: thread.status,
            content: thread.content.clone(),
        });
        Ok(id)
    }

    async fn update_thread(
        &self,
        _repo: &RepoHandle,
        _pr_id: i64,
        thread_id: i64,
        status: ThreadStatus,
    ) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        inner.status_updates.push((thread_id, status));
        if let Some(thread) = inner
            .threads
            .iter_mut()
            .find(|thread| thread.thread_id == thread_id)
        {
            thread.status = status;
        }
        Ok(())
    }

    async fn reply_to_thread(
        &self,
        _repo: &RepoHandle,
        _pr_id: i64,
        thread_id: i64,
        content: &str,
    ) -> Result<(), PlatformError> {
        self.inner
            .lock()
            .unwrap()
            .replies
            .push((thread_id, content.to_string()));
        Ok(())
    }

    async fn register_hook(
        &self,
        _platform_repo_id: &str,
        _event_type: &str,
        _url: &str,
    ) -> Result<String, PlatformError> {
        Ok("mock-hook".to_string())
    }

    async fn unregister_hook(&self, _hook_id: &str) -> Result<(), PlatformError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MockAnalyzer {
    pub findings_by_path: Mutex<HashMap<String, Vec<LineFinding>>>,
    pub summary: Mutex<Option<SummaryFinding>>,
    pub verdicts: Mutex<HashMap<String, FixVerdict>>,
    pub fail_all: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
    pub analyze_calls: AtomicU32,
}

impl MockAnalyzer {
    pub fn with_finding(self, path: &str, finding: LineFinding) -> Self {
        self.findings_by_path
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push(finding);
        self
    }

    pub fn with_verdict(self, prior_message: &str, verdict: FixVerdict) -> Self {
        self.verdicts
            .lock()
            .unwrap()
            .insert(prior_message.to_string(), verdict);
        self
    }

    pub fn failing(self) -> Self {
        self.fail_all.store(true, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(
        &self,
        _profile: &LanguageProfile,
        requests: &[AnalysisRequest],
    ) -> Result<Vec<LineFinding>, AnalyzerError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(AnalyzerError::Unavailable { status: 503 });
        }
        let by_path = self.findings_by_path.lock().unwrap();
        let mut findings = Vec::new();
        for request in requests {
            if let Some(for_path) = by_path.get(&request.context.path) {
                findings.extend(for_path.iter().cloned());
            }
        }
        Ok(findings)
    }

    async fn summarize(&self, _input: &ArchInput) -> Result<Option<SummaryFinding>, AnalyzerError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(AnalyzerError::Unavailable { status: 503 });
        }
        Ok(self.summary.lock().unwrap().clone())
    }

    async fn verify_fix(
        &self,
        prior: &PriorFinding,
        _current_region: &str,
    ) -> Result<FixVerdict, AnalyzerError> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(AnalyzerError::Unavailable { status: 503 });
        }
        Ok(self
            .verdicts
            .lock()
            .unwrap()
            .iter()
            .find(|(message, _)| prior.message.contains(message.as_str()))
            .map(|(_, verdict)| *verdict)
            .unwrap_or(FixVerdict::Unknown))
    }
}

pub fn temp_db_path() -> String {
    std::env::temp_dir()
        .join(format!("rl-pipeline-{}.db", Ulid::new()))
        .to_string_lossy()
        .to_string()
}

pub fn open_store(path: &str) -> DbStore {
    DbStore::new(schema::open_and_migrate(path).expect("open test db"))
}

pub fn deps(platform: Arc<MockPlatform>, analyzer: Arc<MockAnalyzer>) -> Arc<AgentDeps> {
    Arc::new(AgentDeps {
        platform,
        analyzer,
        plugins: PluginRegistry,
        analyzer_permits: Arc::new(Semaphore::new(8)),
        bus: EventBus::new(64),
    })
}

pub fn snapshot(pr_id: i64) -> PrSnapshot {
    PrSnapshot {
        pr_id,
        title: "Add checkout flow".to_string(),
        author: "dev@contoso.com".to_string(),
        source_branch: "feature/checkout".to_string(),
        target_branch: "main".to_string(),
        source_commit: "src-commit".to_string(),
        target_commit: "base".to_string(),
    }
}

pub fn event(repo: &RepoId, pr_id: i64, kind: PrEventKind, iteration: Option<i64>) -> PrEvent {
    PrEvent {
        kind,
        pr_id,
        repository_id: repo.clone(),
        platform_repo_id: "mock-guid".to_string(),
        source_branch: "feature/checkout".to_string(),
        target_branch: "main".to_string(),
        source_commit: "src-commit".to_string(),
        target_commit: "base".to_string(),
        iteration_id: iteration,
        author: "dev@contoso.com".to_string(),
        title: "Add checkout flow".to_string(),
        received_at: Utc::now(),
    }
}

pub fn registration(repo: &RepoId) -> Repository {
    let now = Utc::now();
    Repository {
        id: repo.clone(),
        organization: "contoso".to_string(),
        project: "Payments".to_string(),
        name: "checkout-api".to_string(),
        url: "https://dev.azure.com/contoso/Payments/_git/checkout-api".to_string(),
        platform_repo_id: "mock-guid".to_string(),
        hook_id: Some("sub-1,sub-2".to_string()),
        created_at: now,
        updated_at: now,
    }
}

pub fn handle() -> RepoHandle {
    RepoHandle {
        project: "Payments".to_string(),
        repository_id: "mock-guid".to_string(),
    }
}

pub fn finding(path: &str, line: u32, message: &str) -> LineFinding {
    LineFinding::new(
        path,
        line,
        rl_core::types::Severity::Warning,
        FindingCategory::Bug,
        message,
    )
}
