//! The per-PR review agent: an explicit state machine that checkpoints its
//! blob after every phase transition and observes cancellation at each
//! suspension point. Partial failures collect into `errors[]` and never
//! unwind; fatal ones route through the Error phase, which performs the same
//! cleanup as Done with a failed status.

use crate::differ::{self, DiffError};
use crate::ledger;
use crate::metrics::RunMetrics;
use crate::outline;
use crate::render;
use chrono::{DateTime, Utc};
use rl_core::plugins::{LanguageProfile, PluginRegistry};
use rl_core::redline::{build_event_record, RequestContext};
use rl_core::store::{
    ClaimRepository, EventRepository, ExecutionRepository, StateRepository, Store,
    TimeoutRepository, WatermarkRepository,
};
use rl_core::types::delta::{ChangeDelta, CONTEXT_BAND};
use rl_core::types::{
    AgentExecution, AgentId, AgentPhase, AgentState, AgentStatus, EventBody, FixVerdict,
    LineFinding, NewThread, PrEvent, RepoHandle, ThreadStatus,
};
use rl_events::bus::EventBus;
use rl_events::types::EventSource;
use rl_platform::{
    AnalysisRequest, Analyzer, AnalyzerError, ArchFile, ArchInput, Platform, PlatformError,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Regions per analyzer call.
const ANALYSIS_BATCH: usize = 5;
/// Iteration diff attempts before falling back to a full review.
const DIFF_ATTEMPTS: u32 = 2;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid event: {message}")]
    InvalidEvent { message: String },
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error("store error: {0}")]
    Store(#[from] rl_core::error::StoreError),
}

/// Shared handles an agent needs beyond its store: clients, plugin lookup,
/// the analyzer concurrency bound, and the event bus.
pub struct AgentDeps {
    pub platform: Arc<dyn Platform>,
    pub analyzer: Arc<dyn Analyzer>,
    pub plugins: PluginRegistry,
    pub analyzer_permits: Arc<Semaphore>,
    pub bus: EventBus,
}

pub struct ReviewAgent<S: Store> {
    store: S,
    deps: Arc<AgentDeps>,
    repo: RepoHandle,
    state: AgentState,
    metrics: RunMetrics,
    deadline: DateTime<Utc>,
    cancel: CancellationToken,
}

impl<S: Store> ReviewAgent<S> {
    pub fn new(
        store: S,
        deps: Arc<AgentDeps>,
        repo: RepoHandle,
        agent_id: AgentId,
        event: PrEvent,
        deadline: DateTime<Utc>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            deps,
            repo,
            state: AgentState::new(agent_id, event),
            metrics: RunMetrics::new(),
            deadline,
            cancel,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.state.agent_id
    }

    /// Drive the phases to a terminal status. Always returns an execution
    /// record; store failures during teardown are logged, not propagated.
    pub async fn run(mut self) -> AgentExecution {
        tracing::info!(
            agent_id = %self.state.agent_id,
            pr_id = self.state.pr_id,
            repository_id = %self.state.repository_id,
            kind = ?self.state.event.kind,
            "review agent started"
        );

        loop {
            let phase = self.state.phase;
            if phase == AgentPhase::Done {
                // Partial failures keep the run alive but taint its outcome;
                // the watermark only advances on a clean completion.
                return if self.state.errors.is_empty() {
                    self.finalize(AgentStatus::Completed, None).await
                } else {
                    let message = format!(
                        "{} partial failure(s); first: {}",
                        self.state.errors.len(),
                        self.state.errors[0].message
                    );
                    self.finalize(AgentStatus::Failed, Some(message)).await
                };
            }
            if phase == AgentPhase::Error {
                return self
                    .finalize(AgentStatus::Failed, Some("entered error state".to_string()))
                    .await;
            }
            if Utc::now() >= self.deadline {
                self.state.record_error("deadline", "wall deadline reached");
                return self
                    .finalize(AgentStatus::Timeout, Some("deadline exceeded".to_string()))
                    .await;
            }

            let timer = Instant::now();
            let cancel = self.cancel.clone();
            let outcome = cancel.run_until_cancelled(self.step(phase)).await;
            let elapsed = timer.elapsed().as_millis() as u64;
            *self.state.phase_timings.entry(phase).or_insert(0) += elapsed;

            match outcome {
                None => {
                    let timed_out = Utc::now() >= self.deadline;
                    let (status, message) = if timed_out {
                        (AgentStatus::Timeout, "deadline exceeded")
                    } else {
                        (AgentStatus::Failed, "cancelled before completion")
                    };
                    self.state.record_error("cancel", message);
                    return self.finalize(status, Some(message.to_string())).await;
                }
                Some(Ok(next)) => {
                    tracing::debug!(
                        agent_id = %self.state.agent_id,
                        pr_id = self.state.pr_id,
                        from = ?phase,
                        to = ?next,
                        ms = elapsed,
                        "phase transition"
                    );
                    self.state.phase = next;
                    self.checkpoint();
                    self.emit(EventBody::PhaseCompleted {
                        agent_id: self.state.agent_id.clone(),
                        pr_id: self.state.pr_id,
                        from: phase,
                        to: next,
                        ms: elapsed,
                    });
                }
                Some(Err(err)) => {
                    tracing::error!(
                        agent_id = %self.state.agent_id,
                        pr_id = self.state.pr_id,
                        phase = ?phase,
                        error = %err,
                        "fatal phase error"
                    );
                    self.state.record_error("fatal", err.to_string());
                    self.state.phase = AgentPhase::Error;
                    self.checkpoint();
                    return self.finalize(AgentStatus::Failed, Some(err.to_string())).await;
                }
            }
        }
    }

    async fn step(&mut self, phase: AgentPhase) -> Result<AgentPhase, AgentError> {
        match phase {
            AgentPhase::Init => self.init(),
            AgentPhase::FetchMeta => self.fetch_meta().await,
            AgentPhase::LoadWatermark => self.load_watermark(),
            AgentPhase::Diff => self.diff_phase().await,
            AgentPhase::FullList => self.full_list().await,
            AgentPhase::Parse => self.parse(),
            AgentPhase::LineAnalysis => self.line_analysis().await,
            AgentPhase::ArchAnalysis => self.arch_analysis().await,
            AgentPhase::ResolutionCheck => self.resolution_check().await,
            AgentPhase::Publish => self.publish().await,
            AgentPhase::Done | AgentPhase::Error => Ok(phase),
        }
    }

    fn init(&mut self) -> Result<AgentPhase, AgentError> {
        let event = &self.state.event;
        if event.pr_id <= 0 {
            return Err(AgentError::InvalidEvent {
                message: format!("pr_id {} out of range", event.pr_id),
            });
        }
        if event.source_commit.is_empty() || event.target_commit.is_empty() {
            return Err(AgentError::InvalidEvent {
                message: "event without merge commits".to_string(),
            });
        }

        let execution = AgentExecution {
            agent_id: self.state.agent_id.clone(),
            repository_id: self.state.repository_id.clone(),
            pr_id: self.state.pr_id,
            dedup_key: event.dedup_key(),
            phase: AgentPhase::Init,
            status: AgentStatus::Running,
            started_at: self.state.started_at,
            deadline: self.deadline,
            ended_at: None,
            duration_ms: None,
            files_analyzed: 0,
            findings_posted: 0,
            duplicates_skipped: 0,
            resolutions_marked: 0,
            api_calls: 0,
            api_errors: 0,
            error: None,
        };
        self.store.executions().insert(&execution)?;
        Ok(AgentPhase::FetchMeta)
    }

    async fn fetch_meta(&mut self) -> Result<AgentPhase, AgentError> {
        let result = self.deps.platform.get_pr(&self.repo, self.state.pr_id).await;
        self.metrics.track(&result);
        let snapshot = result?;

        let result = self
            .deps
            .platform
            .list_iterations(&self.repo, self.state.pr_id)
            .await;
        self.metrics.track(&result);
        let iterations = result?;

        let current = iterations
            .iter()
            .map(|iteration| iteration.id)
            .max()
            .unwrap_or(1);
        self.state.pr = Some(snapshot);
        self.state.iteration_id = Some(current);

        if self.state.is_update() {
            Ok(AgentPhase::LoadWatermark)
        } else {
            Ok(AgentPhase::FullList)
        }
    }

    fn load_watermark(&mut self) -> Result<AgentPhase, AgentError> {
        let prior = self
            .store
            .watermarks()
            .get(&self.state.repository_id, self.state.pr_id)?;
        let current = self.state.iteration_id.unwrap_or(1);
        match prior {
            Some(prior) if prior >= current => {
                // Nothing newer than the watermark; an empty delta still
                // drives the run to Done.
                self.state.last_reviewed_iteration = Some(prior);
                self.state.delta = Some(ChangeDelta::default());
                Ok(AgentPhase::Parse)
            }
            Some(prior) => {
                self.state.last_reviewed_iteration = Some(prior);
                Ok(AgentPhase::Diff)
            }
            None => Ok(AgentPhase::FullList),
        }
    }

    async fn diff_phase(&mut self) -> Result<AgentPhase, AgentError> {
        let prior = self
            .state
            .last_reviewed_iteration
            .ok_or_else(|| AgentError::InvalidEvent {
                message: "diff without a watermark".to_string(),
            })?;
        let current = self.state.iteration_id.unwrap_or(1);

        let mut reason = String::new();
        for attempt in 0..DIFF_ATTEMPTS {
            let result = differ::diff(
                self.deps.platform.as_ref(),
                &self.repo,
                self.state.pr_id,
                prior,
                current,
            )
            .await;
            self.metrics.track(&result);
            match result {
                Ok(delta) => {
                    self.state.delta = Some(delta);
                    return Ok(AgentPhase::Parse);
                }
                Err(DiffError::PriorIterationUnknown) => {
                    reason = "prior iteration unknown".to_string();
                    break;
                }
                Err(DiffError::Platform(PlatformError::Unauthorized)) => {
                    return Err(PlatformError::Unauthorized.into());
                }
                Err(DiffError::Platform(err)) => {
                    // Fallback is logged, never recorded as a run error.
                    tracing::warn!(
                        agent_id = %self.state.agent_id,
                        attempt = attempt + 1,
                        error = %err,
                        "iteration diff attempt failed"
                    );
                    reason = err.to_string();
                }
            }
        }

        tracing::warn!(
            agent_id = %self.state.agent_id,
            pr_id = self.state.pr_id,
            reason = %reason,
            "iteration diff unavailable, falling back to full review"
        );
        self.emit(EventBody::DiffFallback {
            agent_id: self.state.agent_id.clone(),
            pr_id: self.state.pr_id,
            reason,
        });
        Ok(AgentPhase::FullList)
    }

    async fn full_list(&mut self) -> Result<AgentPhase, AgentError> {
        let current = self.state.iteration_id.unwrap_or(1);
        let target_commit = self
            .state
            .pr
            .as_ref()
            .map(|pr| pr.target_commit.clone())
            .unwrap_or_else(|| self.state.event.target_commit.clone());

        let result = differ::full(
            self.deps.platform.as_ref(),
            &self.repo,
            self.state.pr_id,
            current,
            &target_commit,
        )
        .await;
        self.metrics.track(&result);
        match result {
            Ok(delta) => {
                self.state.delta = Some(delta);
                Ok(AgentPhase::Parse)
            }
            Err(DiffError::Platform(err)) => Err(err.into()),
            Err(DiffError::PriorIterationUnknown) => Err(AgentError::InvalidEvent {
                message: "current iteration missing from the platform".to_string(),
            }),
        }
    }

    fn parse(&mut self) -> Result<AgentPhase, AgentError> {
        let delta = self.state.delta.clone().unwrap_or_default();
        let mut outlined = 0u32;
        let mut skipped = 0u32;
        let mut failed = 0u32;

        for slice in &delta.files {
            if self.deps.plugins.is_binary(&slice.path) {
                skipped += 1;
                continue;
            }
            let Some(profile) = self.deps.plugins.profile_for_path(&slice.path) else {
                skipped += 1;
                continue;
            };
            // One unparseable file never aborts the phase.
            match outline::outline(profile, &slice.target_content) {
                Ok(parsed) => {
                    self.state.outlines.insert(slice.path.clone(), parsed);
                    outlined += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        agent_id = %self.state.agent_id,
                        pr_id = self.state.pr_id,
                        path = %slice.path,
                        error = %err,
                        "outline parse failed"
                    );
                    self.state
                        .record_error("parse", format!("{}: {err}", slice.path));
                    failed += 1;
                }
            }
        }

        self.metrics.files_analyzed(outlined);
        tracing::info!(
            agent_id = %self.state.agent_id,
            pr_id = self.state.pr_id,
            outlined,
            skipped,
            failed,
            "parse complete"
        );
        Ok(AgentPhase::LineAnalysis)
    }

    async fn line_analysis(&mut self) -> Result<AgentPhase, AgentError> {
        let delta = self.state.delta.clone().unwrap_or_default();

        let mut jobs: Vec<(&'static LanguageProfile, Vec<AnalysisRequest>)> = Vec::new();
        for slice in &delta.files {
            let Some(outline_map) = self.state.outlines.get(&slice.path) else {
                continue;
            };
            let Some(profile) = self.deps.plugins.profile_for_path(&slice.path) else {
                continue;
            };
            let requests: Vec<AnalysisRequest> = slice
                .line_ranges
                .iter()
                .map(|&(start, end)| AnalysisRequest {
                    context: outline::context_for_range(
                        outline_map,
                        &slice.path,
                        &slice.target_content,
                        start,
                        profile.context_lines,
                    ),
                    content: outline::range_text(&slice.target_content, start, end),
                })
                .collect();
            for chunk in requests.chunks(ANALYSIS_BATCH) {
                jobs.push((profile, chunk.to_vec()));
            }
        }

        let deps = self.deps.clone();
        let calls = jobs.into_iter().map(|(profile, batch)| {
            let deps = deps.clone();
            async move {
                match deps.analyzer_permits.clone().acquire_owned().await {
                    Ok(_permit) => deps.analyzer.analyze(profile, &batch).await,
                    Err(_) => Err(AnalyzerError::Http {
                        message: "analyzer pool closed".to_string(),
                    }),
                }
            }
        });
        let results = futures::future::join_all(calls).await;

        let mut seen: HashSet<String> = self
            .state
            .findings
            .iter()
            .map(|finding| finding.fingerprint.clone())
            .collect();
        for result in results {
            self.metrics.track(&result);
            match result {
                Ok(findings) => {
                    for finding in findings {
                        if !in_delta(&delta, &finding) {
                            tracing::debug!(
                                path = %finding.path,
                                line = finding.line,
                                "finding outside the delta dropped"
                            );
                            continue;
                        }
                        if seen.insert(finding.fingerprint.clone()) {
                            self.state.findings.push(finding);
                        }
                    }
                }
                Err(err) => {
                    self.state.record_error("line_analysis", err.to_string());
                }
            }
        }

        Ok(AgentPhase::ArchAnalysis)
    }

    async fn arch_analysis(&mut self) -> Result<AgentPhase, AgentError> {
        let delta = self.state.delta.clone().unwrap_or_default();
        let next = if self.state.is_update() {
            AgentPhase::ResolutionCheck
        } else {
            AgentPhase::Publish
        };
        if delta.is_empty() {
            return Ok(next);
        }

        let input = ArchInput {
            title: self
                .state
                .pr
                .as_ref()
                .map(|pr| pr.title.clone())
                .unwrap_or_default(),
            files: delta
                .files
                .iter()
                .map(|slice| ArchFile {
                    path: slice.path.clone(),
                    kind: slice.kind,
                    outline_summary: self
                        .state
                        .outlines
                        .get(&slice.path)
                        .map(|outline| outline.summary()),
                })
                .collect(),
        };

        let result = match self.deps.analyzer_permits.clone().acquire_owned().await {
            Ok(_permit) => self.deps.analyzer.summarize(&input).await,
            Err(_) => Err(AnalyzerError::Http {
                message: "analyzer pool closed".to_string(),
            }),
        };
        self.metrics.track(&result);
        match result {
            Ok(summary) => self.state.summary = summary,
            Err(err) => self.state.record_error("arch_analysis", err.to_string()),
        }
        Ok(next)
    }

    async fn resolution_check(&mut self) -> Result<AgentPhase, AgentError> {
        let delta = self.state.delta.clone().unwrap_or_default();

        let result = self
            .deps
            .platform
            .list_threads(&self.repo, self.state.pr_id)
            .await;
        self.metrics.track(&result);
        let threads = match result {
            Ok(threads) => threads,
            Err(err) => {
                self.state.record_error("resolution_check", err.to_string());
                return Ok(AgentPhase::Publish);
            }
        };

        let candidates = ledger::resolution_candidates(&threads, &self.state.findings, &delta);
        for candidate in candidates {
            let Some(slice) = delta
                .files
                .iter()
                .find(|slice| ledger::norm_path(&slice.path) == ledger::norm_path(&candidate.finding.path))
            else {
                continue;
            };
            let region = outline::range_text(
                &slice.target_content,
                candidate.finding.line.saturating_sub(CONTEXT_BAND).max(1),
                candidate.finding.line + CONTEXT_BAND,
            );

            let verdict = match self.deps.analyzer_permits.clone().acquire_owned().await {
                Ok(_permit) => {
                    self.deps
                        .analyzer
                        .verify_fix(&candidate.finding, &region)
                        .await
                }
                Err(_) => Err(AnalyzerError::Http {
                    message: "analyzer pool closed".to_string(),
                }),
            };
            self.metrics.track(&verdict);

            match verdict {
                Ok(FixVerdict::Resolved) => {
                    let update = self
                        .deps
                        .platform
                        .update_thread(
                            &self.repo,
                            self.state.pr_id,
                            candidate.thread_id,
                            ThreadStatus::Fixed,
                        )
                        .await;
                    self.metrics.track(&update);
                    match update {
                        Ok(()) => {
                            let reply = self
                                .deps
                                .platform
                                .reply_to_thread(
                                    &self.repo,
                                    self.state.pr_id,
                                    candidate.thread_id,
                                    &render::resolution_reply(),
                                )
                                .await;
                            self.metrics.track(&reply);
                            if let Err(err) = reply {
                                self.state.record_error("resolution_check", err.to_string());
                            }
                            self.metrics.resolution_marked();
                        }
                        Err(PlatformError::Unauthorized) => {
                            return Err(PlatformError::Unauthorized.into())
                        }
                        Err(err) => {
                            self.state.record_error("resolution_check", err.to_string());
                        }
                    }
                }
                // Unresolved or unknown: leave the thread untouched.
                Ok(_) => {}
                Err(err) => {
                    self.state.record_error("resolution_check", err.to_string());
                }
            }
        }

        Ok(AgentPhase::Publish)
    }

    async fn publish(&mut self) -> Result<AgentPhase, AgentError> {
        // Publish needs the current thread list; a failed fetch aborts the
        // phase.
        let result = self
            .deps
            .platform
            .list_threads(&self.repo, self.state.pr_id)
            .await;
        self.metrics.track(&result);
        let threads = result?;

        let (to_post, skipped) = ledger::filter_new(&threads, self.state.findings.clone());
        self.metrics.duplicates_skipped(skipped);

        for finding in &to_post {
            let thread = NewThread::inline(
                finding.path.clone(),
                finding.line,
                render::render_finding(finding),
            );
            let result = self
                .deps
                .platform
                .create_thread(&self.repo, self.state.pr_id, &thread)
                .await;
            self.metrics.track(&result);
            match result {
                Ok(_) => self.metrics.finding_posted(),
                Err(PlatformError::Unauthorized) => return Err(PlatformError::Unauthorized.into()),
                Err(err) => {
                    self.state.record_error(
                        "publish",
                        format!("{}:{}: {err}", finding.path, finding.line),
                    );
                }
            }
        }

        if let Some(summary) = &self.state.summary {
            let fingerprint = render::summary_fingerprint(summary);
            if !ledger::has_summary(&threads, &fingerprint) {
                let thread = NewThread::pr_level(render::render_summary(summary));
                let result = self
                    .deps
                    .platform
                    .create_thread(&self.repo, self.state.pr_id, &thread)
                    .await;
                self.metrics.track(&result);
                match result {
                    Ok(_) => self.metrics.finding_posted(),
                    Err(PlatformError::Unauthorized) => {
                        return Err(PlatformError::Unauthorized.into())
                    }
                    Err(err) => self.state.record_error("publish", format!("summary: {err}")),
                }
            }
        }

        self.emit(EventBody::FindingsPublished {
            agent_id: self.state.agent_id.clone(),
            pr_id: self.state.pr_id,
            posted: self.metrics.totals().findings_posted,
            duplicates_skipped: skipped,
        });
        Ok(AgentPhase::Done)
    }

    /// Terminal bookkeeping shared by Done and Error: watermark on success,
    /// execution row, claim, timeout entry, final state blob, event.
    async fn finalize(mut self, status: AgentStatus, error: Option<String>) -> AgentExecution {
        let mut status = status;
        let mut error = error;

        if status == AgentStatus::Completed {
            self.state.phase = AgentPhase::Done;
            if let Some(iteration) = self.state.iteration_id {
                match self
                    .store
                    .watermarks()
                    .set(&self.state.repository_id, self.state.pr_id, iteration)
                {
                    Ok(()) => self.emit(EventBody::WatermarkAdvanced {
                        repository_id: self.state.repository_id.clone(),
                        pr_id: self.state.pr_id,
                        iteration_id: iteration,
                    }),
                    Err(err) => {
                        // A run whose watermark write failed does not count
                        // as reviewed.
                        status = AgentStatus::Failed;
                        error = Some(format!("watermark write failed: {err}"));
                        self.state.phase = AgentPhase::Error;
                    }
                }
            }
        } else {
            self.state.phase = AgentPhase::Error;
        }

        self.checkpoint();

        let finished = self.store.executions().finish(
            &self.state.agent_id,
            status,
            self.metrics.totals(),
            error.as_deref(),
        );

        if let Err(err) =
            self.store
                .claims()
                .release(&self.state.repository_id, self.state.pr_id, &self.state.agent_id)
        {
            tracing::error!(agent_id = %self.state.agent_id, error = %err, "claim release failed");
        }
        if let Err(err) = self.store.timeouts().cancel(&self.state.agent_id) {
            tracing::warn!(agent_id = %self.state.agent_id, error = %err, "timeout cancel failed");
        }

        let execution = match finished {
            Ok(execution) => execution,
            Err(err) => {
                tracing::error!(
                    agent_id = %self.state.agent_id,
                    error = %err,
                    "execution finish failed, synthesizing record"
                );
                self.synthesize_execution(status, error.clone())
            }
        };

        let body = match status {
            AgentStatus::Completed => EventBody::AgentCompleted {
                execution: execution.clone(),
            },
            AgentStatus::Timeout => EventBody::AgentTimedOut {
                execution: execution.clone(),
            },
            _ => EventBody::AgentFailed {
                execution: execution.clone(),
            },
        };
        self.emit(body);

        tracing::info!(
            agent_id = %self.state.agent_id,
            pr_id = self.state.pr_id,
            status = ?status,
            findings_posted = execution.findings_posted,
            duration_ms = execution.duration_ms,
            "review agent finished"
        );
        execution
    }

    fn checkpoint(&mut self) {
        if let Err(err) = self.store.states().put(&self.state.agent_id, &self.state) {
            tracing::warn!(
                agent_id = %self.state.agent_id,
                error = %err,
                "state checkpoint failed"
            );
        }
        if let Err(err) = self
            .store
            .executions()
            .set_phase(&self.state.agent_id, self.state.phase)
        {
            tracing::warn!(
                agent_id = %self.state.agent_id,
                error = %err,
                "phase update failed"
            );
        }
    }

    fn emit(&self, body: EventBody) {
        let ctx = RequestContext::new(EventSource::Agent, None);
        let Ok(record) = build_event_record(&ctx, body) else {
            return;
        };
        if let Ok(record) = self.store.events().append(record) {
            let _ = self.deps.bus.publish(record);
        }
    }

    fn synthesize_execution(&self, status: AgentStatus, error: Option<String>) -> AgentExecution {
        let totals = self.metrics.totals();
        let ended_at = Utc::now();
        AgentExecution {
            agent_id: self.state.agent_id.clone(),
            repository_id: self.state.repository_id.clone(),
            pr_id: self.state.pr_id,
            dedup_key: self.state.event.dedup_key(),
            phase: self.state.phase,
            status,
            started_at: self.state.started_at,
            deadline: self.deadline,
            ended_at: Some(ended_at),
            duration_ms: Some((ended_at - self.state.started_at).num_milliseconds()),
            files_analyzed: totals.files_analyzed,
            findings_posted: totals.findings_posted,
            duplicates_skipped: totals.duplicates_skipped,
            resolutions_marked: totals.resolutions_marked,
            api_calls: totals.api_calls,
            api_errors: totals.api_errors,
            error,
        }
    }
}

fn in_delta(delta: &ChangeDelta, finding: &LineFinding) -> bool {
    delta
        .files
        .iter()
        .find(|slice| ledger::norm_path(&slice.path) == ledger::norm_path(&finding.path))
        .is_some_and(|slice| slice.contains_line(finding.line))
}
