//! Worker pool and supervisor around the review agents: leases events off
//! the queue, enforces the one-running-agent-per-PR claim, delivers
//! cancellation to stale or overdue agents, and recovers state after a
//! process restart.

use crate::agent::{AgentDeps, ReviewAgent};
use chrono::{Duration as ChronoDuration, Utc};
use rl_core::config::Settings;
use rl_core::plugins::PluginRegistry;
use rl_core::redline::{build_event_record, RequestContext};
use rl_core::store::{
    ClaimOutcome, ClaimRepository, EventRepository, ExecutionRepository, QueueRepository,
    RegistrationRepository, StateRepository, Store, TimeoutRepository,
};
use rl_core::types::{AgentId, AgentStatus, EventBody, QueueEntry, RepoHandle, RunTotals};
use rl_db::schema;
use rl_db::DbStore;
use rl_events::bus::EventBus;
use rl_events::types::EventSource;
use rl_platform::{Analyzer, Platform};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// How long a dispatching worker waits for a cancelled predecessor to
/// release its claim before evicting it.
const STALE_WAIT: Duration = Duration::from_secs(10);
const STALE_POLL: Duration = Duration::from_millis(250);
/// Idle sleep between queue polls.
const QUEUE_POLL: Duration = Duration::from_secs(1);
const SUPERVISOR_TICK: Duration = Duration::from_secs(1);
/// State-blob purge cadence, in supervisor ticks.
const PURGE_EVERY: u64 = 60;

pub struct Orchestrator {
    settings: Arc<Settings>,
    deps: Arc<AgentDeps>,
    bus: EventBus,
    cancels: Arc<Mutex<HashMap<AgentId, CancellationToken>>>,
}

impl Orchestrator {
    pub fn new(
        settings: Arc<Settings>,
        bus: EventBus,
        platform: Arc<dyn Platform>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        let deps = Arc::new(AgentDeps {
            platform,
            analyzer,
            plugins: PluginRegistry,
            analyzer_permits: Arc::new(Semaphore::new(settings.analyzer_concurrency)),
            bus: bus.clone(),
        });
        Self {
            settings,
            deps,
            bus,
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn open_store(&self) -> Result<DbStore, rl_core::error::StoreError> {
        schema::open_and_migrate(&self.settings.db_path)
            .map(DbStore::new)
            .map_err(rl_db::util::store_err)
    }

    /// Boot-time recovery: runs whose deadline passed while the process was
    /// down become `Timeout`, and their claims and timeout entries go away.
    /// Leased-but-unacked queue entries come back on their own once the
    /// visibility window lapses.
    pub fn recover(&self) -> Result<usize, rl_core::error::StoreError> {
        let store = self.open_store()?;
        let recovered = match store.executions().recover_expired(Utc::now()) {
            Ok(recovered) => recovered,
            Err(err) => {
                tracing::error!(error = %err, "boot recovery scan failed");
                return Ok(0);
            }
        };
        for execution in &recovered {
            let _ = store
                .claims()
                .force_release(&execution.repository_id, execution.pr_id);
            let _ = store.timeouts().cancel(&execution.agent_id);
            self.emit(&store, EventBody::AgentTimedOut {
                execution: execution.clone(),
            });
            tracing::warn!(
                agent_id = %execution.agent_id,
                pr_id = execution.pr_id,
                "recovered expired agent from previous process"
            );
        }
        Ok(recovered.len())
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut tasks = Vec::new();
        for worker in 0..self.settings.workers {
            let orchestrator = self.clone();
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                orchestrator.worker_loop(worker, shutdown).await;
            }));
        }
        let supervisor = self.clone();
        let supervisor_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            supervisor.supervisor_loop(supervisor_shutdown).await;
        }));

        shutdown.cancelled().await;
        // Agents observe their tokens at the next suspension point.
        for (_, token) in self.cancels.lock().unwrap().iter() {
            token.cancel();
        }
        for task in tasks {
            let _ = task.await;
        }
        tracing::info!("orchestrator stopped");
    }

    async fn worker_loop(&self, worker: usize, shutdown: CancellationToken) {
        let worker_id = format!("worker-{worker}");
        tracing::info!(worker = %worker_id, "worker started");

        while !shutdown.is_cancelled() {
            let store = match self.open_store() {
                Ok(store) => store,
                Err(err) => {
                    tracing::error!(worker = %worker_id, error = %err, "store open failed");
                    tokio::time::sleep(QUEUE_POLL).await;
                    continue;
                }
            };
            let visibility =
                ChronoDuration::from_std(self.settings.visibility_timeout).unwrap_or_else(|_| {
                    ChronoDuration::seconds(900)
                });
            let dequeue_result = store.queue().dequeue(&worker_id, visibility);
            let entry = match dequeue_result {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    drop(store);
                    tokio::select! {
                        _ = tokio::time::sleep(QUEUE_POLL) => continue,
                        _ = shutdown.cancelled() => break,
                    }
                }
                Err(err) => {
                    tracing::error!(worker = %worker_id, error = %err, "dequeue failed");
                    tokio::time::sleep(QUEUE_POLL).await;
                    continue;
                }
            };
            drop(store);

            self.process_entry(&worker_id, entry, &shutdown).await;
        }
        tracing::info!(worker = %worker_id, "worker stopped");
    }

    async fn process_entry(&self, worker_id: &str, entry: QueueEntry, shutdown: &CancellationToken) {
        let event = entry.event.clone();
        let store = match self.open_store() {
            Ok(store) => store,
            Err(err) => {
                tracing::error!(worker = %worker_id, error = %err, "store open failed");
                return;
            }
        };

        // The registration can disappear between enqueue and dispatch.
        let registration = match store.registrations().get(&event.repository_id) {
            Ok(Some(registration)) => registration,
            Ok(None) => {
                tracing::warn!(
                    pr_id = event.pr_id,
                    repository_id = %event.repository_id,
                    "event for unregistered repository dropped"
                );
                let _ = store.queue().ack(entry.entry_id);
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "registration lookup failed");
                return;
            }
        };

        let agent_id = AgentId::generate();
        if !self
            .acquire_claim(&event.repository_id, event.pr_id, &agent_id, shutdown)
            .await
        {
            // Entry stays leased; redelivery retries the whole dispatch.
            return;
        }

        let deadline = Utc::now()
            + ChronoDuration::from_std(self.settings.agent_timeout)
                .unwrap_or_else(|_| ChronoDuration::seconds(600));
        if let Err(err) = store.timeouts().schedule(&agent_id, deadline) {
            tracing::error!(agent_id = %agent_id, error = %err, "timeout schedule failed");
        }

        let token = CancellationToken::new();
        self.cancels
            .lock()
            .unwrap()
            .insert(agent_id.clone(), token.clone());

        self.emit(&store, EventBody::AgentSpawned {
            agent_id: agent_id.clone(),
            repository_id: event.repository_id.clone(),
            pr_id: event.pr_id,
        });

        let repo = RepoHandle {
            project: registration.project.clone(),
            repository_id: registration.platform_repo_id.clone(),
        };
        let agent = ReviewAgent::new(
            store,
            self.deps.clone(),
            repo,
            agent_id.clone(),
            event,
            deadline,
            token,
        );
        let execution = agent.run().await;

        self.cancels.lock().unwrap().remove(&agent_id);

        match self.open_store() {
            Ok(store) => {
                if let Err(err) = store.queue().ack(entry.entry_id) {
                    tracing::error!(entry_id = entry.entry_id, error = %err, "ack failed");
                }
            }
            Err(err) => tracing::error!(error = %err, "store open for ack failed"),
        }

        tracing::info!(
            worker = %worker_id,
            agent_id = %execution.agent_id,
            status = ?execution.status,
            "dispatch complete"
        );
    }

    /// Claim the PR, cancelling and waiting out a still-running predecessor.
    ///
    /// Each phase below opens its own short-lived `DbStore` rather than
    /// holding one across the polling loop's `.await`: `DbStore` wraps a
    /// non-`Sync` `rusqlite::Connection`, so a reference kept live across an
    /// await point would make this future non-`Send` and unspawnable.
    async fn acquire_claim(
        &self,
        repository_id: &rl_core::types::RepoId,
        pr_id: i64,
        agent_id: &AgentId,
        shutdown: &CancellationToken,
    ) -> bool {
        let store = match self.open_store() {
            Ok(store) => store,
            Err(err) => {
                tracing::error!(pr_id, error = %err, "store open for claim failed");
                return false;
            }
        };
        let previous = match store.claims().claim(repository_id, pr_id, agent_id) {
            Ok(ClaimOutcome::Acquired) => return true,
            Ok(ClaimOutcome::Held { by }) => by,
            Err(err) => {
                tracing::error!(pr_id, error = %err, "claim failed");
                return false;
            }
        };
        drop(store);

        tracing::info!(
            pr_id,
            previous = %previous,
            replacement = %agent_id,
            "cancelling stale agent"
        );
        if let Some(token) = self.cancels.lock().unwrap().get(&previous) {
            token.cancel();
        }

        let waited_until = std::time::Instant::now() + STALE_WAIT;
        while std::time::Instant::now() < waited_until && !shutdown.is_cancelled() {
            let holder_result = match self.open_store() {
                Ok(store) => store.claims().holder(repository_id, pr_id),
                Err(err) => Err(err),
            };
            match holder_result {
                Ok(None) => break,
                Ok(Some(holder)) if holder != previous => break,
                _ => tokio::time::sleep(STALE_POLL).await,
            }
        }

        let store = match self.open_store() {
            Ok(store) => store,
            Err(err) => {
                tracing::error!(pr_id, error = %err, "store open for post-wait check failed");
                return false;
            }
        };
        match store.claims().holder(repository_id, pr_id) {
            Ok(Some(holder)) if holder == previous => {
                tracing::warn!(pr_id, stale = %previous, "stale agent killed");
                let _ = store.claims().force_release(repository_id, pr_id);
                if let Ok(Some(_)) = store.executions().get(&previous) {
                    let _ = store.executions().finish(
                        &previous,
                        AgentStatus::Failed,
                        &RunTotals::default(),
                        Some("preempted by a newer event"),
                    );
                }
                let _ = store.timeouts().cancel(&previous);
                self.emit(&store, EventBody::StaleAgentKilled {
                    pr_id,
                    previous: previous.clone(),
                    replacement: agent_id.clone(),
                });
            }
            _ => {}
        }

        matches!(
            store.claims().claim(repository_id, pr_id, agent_id),
            Ok(ClaimOutcome::Acquired)
        )
    }

    /// One-second supervision tick: cancel overdue agents, clean up entries
    /// whose agent no longer exists in this process, and periodically purge
    /// expired state blobs.
    async fn supervisor_loop(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(SUPERVISOR_TICK);
        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.cancelled() => break,
            }
            ticks += 1;

            let store = match self.open_store() {
                Ok(store) => store,
                Err(err) => {
                    tracing::error!(error = %err, "supervisor store open failed");
                    continue;
                }
            };

            match store.timeouts().due(Utc::now()) {
                Ok(due) => {
                    for agent_id in due {
                        let token = self.cancels.lock().unwrap().get(&agent_id).cloned();
                        match token {
                            Some(token) => {
                                tracing::warn!(agent_id = %agent_id, "agent deadline reached");
                                token.cancel();
                            }
                            None => self.reap_orphan(&store, &agent_id),
                        }
                    }
                }
                Err(err) => tracing::error!(error = %err, "due timeout scan failed"),
            }

            if ticks % PURGE_EVERY == 0 {
                let ttl = ChronoDuration::from_std(self.settings.state_ttl)
                    .unwrap_or_else(|_| ChronoDuration::hours(24));
                match store.states().purge_older_than(Utc::now() - ttl) {
                    Ok(0) => {}
                    Ok(purged) => tracing::info!(purged, "expired state blobs purged"),
                    Err(err) => tracing::warn!(error = %err, "state purge failed"),
                }
            }
        }
        tracing::info!("supervisor stopped");
    }

    /// A due timeout with no local token belongs to an agent from a previous
    /// process. Close out whatever it left behind.
    fn reap_orphan(&self, store: &DbStore, agent_id: &AgentId) {
        let _ = store.timeouts().cancel(agent_id);
        if let Ok(Some(execution)) = store.executions().get(agent_id) {
            if execution.status == AgentStatus::Running {
                let totals = RunTotals {
                    files_analyzed: execution.files_analyzed,
                    findings_posted: execution.findings_posted,
                    duplicates_skipped: execution.duplicates_skipped,
                    resolutions_marked: execution.resolutions_marked,
                    api_calls: execution.api_calls,
                    api_errors: execution.api_errors,
                };
                if let Ok(finished) = store.executions().finish(
                    agent_id,
                    AgentStatus::Timeout,
                    &totals,
                    Some("no live agent for overdue deadline"),
                ) {
                    let _ = store
                        .claims()
                        .force_release(&finished.repository_id, finished.pr_id);
                    self.emit(store, EventBody::AgentTimedOut {
                        execution: finished,
                    });
                }
            }
        }
    }

    fn emit(&self, store: &DbStore, body: EventBody) {
        let ctx = RequestContext::new(EventSource::Orchestrator, None);
        let Ok(record) = build_event_record(&ctx, body) else {
            return;
        };
        if let Ok(record) = store.events().append(record) {
            let _ = self.bus.publish(record);
        }
    }
}
