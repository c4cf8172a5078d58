//! End-to-end review pipeline tests: real store and agent, scripted platform
//! and analyzer.

mod common;

use chrono::{Duration, Utc};
use common::*;
use rl_agent::render;
use rl_agent::{Orchestrator, ReviewAgent};
use rl_core::config::{AnalyzerSettings, Settings};
use rl_core::redline::{DropReason, IngestOutcome};
use rl_core::store::{
    ClaimOutcome, ClaimRepository, EventRepository, ExecutionRepository,
    RegistrationRepository, Store, TimeoutRepository, WatermarkRepository,
};
use rl_core::types::{
    AgentExecution, AgentId, AgentPhase, AgentStatus, ChangeKind, CommentThread, FixVerdict,
    PrEventKind, RepoId, ThreadStatus,
};
use rl_core::{Redline, RequestContext};
use rl_db::DbStore;
use rl_events::bus::EventBus;
use rl_events::types::EventSource;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const JAVA_V1: &str = "public class Cart {\n    int total = items.get(0);\n    int count = 0;\n}\n";
const JAVA_V2: &str = "public class Cart {\n    int total = items.isEmpty() ? 0 : items.get(0);\n    int count = 0;\n}\n";
const JAVA_NEW: &str = "public class Coupon {\n    String code = null;\n    int discount = 0;\n}\n";

fn agent_for(
    db_path: &str,
    deps: Arc<rl_agent::AgentDeps>,
    repo: &RepoId,
    pr_id: i64,
    kind: PrEventKind,
    iteration: Option<i64>,
) -> (ReviewAgent<DbStore>, AgentId) {
    let store = open_store(db_path);
    let agent_id = AgentId::generate();
    assert_eq!(
        store
            .claims()
            .claim(repo, pr_id, &agent_id)
            .expect("claim"),
        ClaimOutcome::Acquired
    );
    let agent = ReviewAgent::new(
        store,
        deps,
        handle(),
        agent_id.clone(),
        event(repo, pr_id, kind, iteration),
        Utc::now() + Duration::minutes(10),
        CancellationToken::new(),
    );
    (agent, agent_id)
}

fn assert_released(store: &DbStore, repo: &RepoId, pr_id: i64) {
    assert_eq!(store.claims().holder(repo, pr_id).unwrap(), None);
}

#[tokio::test]
async fn created_event_posts_findings_and_advances_watermark() {
    let db_path = temp_db_path();
    let repo = RepoId::generate();

    let platform = Arc::new(
        MockPlatform::new(snapshot(101))
            .iteration(1, "c1")
            .change(1, "/src/Cart.java", ChangeKind::Add)
            .file("c1", "/src/Cart.java", JAVA_V1),
    );
    let analyzer = Arc::new(
        MockAnalyzer::default()
            .with_finding("/src/Cart.java", finding("/src/Cart.java", 1, "class lacks javadoc"))
            .with_finding("/src/Cart.java", finding("/src/Cart.java", 2, "unchecked list access"))
            .with_finding("/src/Cart.java", finding("/src/Cart.java", 3, "unused counter")),
    );

    let (agent, agent_id) = agent_for(
        &db_path,
        deps(platform.clone(), analyzer),
        &repo,
        101,
        PrEventKind::Created,
        None,
    );
    let execution = agent.run().await;

    assert_eq!(execution.status, AgentStatus::Completed);
    assert_eq!(execution.phase, AgentPhase::Done);
    assert_eq!(execution.findings_posted, 3);
    assert_eq!(execution.files_analyzed, 1);
    assert!(execution.ended_at.is_some());
    assert_eq!(
        execution.duration_ms.unwrap(),
        (execution.ended_at.unwrap() - execution.started_at).num_milliseconds()
    );

    let posted = platform.created_inline_threads();
    assert_eq!(posted.len(), 3);
    assert!(posted.iter().all(|(path, _, content)| {
        path == "/src/Cart.java" && content.contains("<!-- redline")
    }));
    // No architectural summary was produced, so no PR-level thread either.
    assert!(platform.pr_level_threads().is_empty());

    let store = open_store(&db_path);
    assert_eq!(store.watermarks().get(&repo, 101).unwrap(), Some(1));
    assert_released(&store, &repo, 101);
    let recorded = store.executions().get(&agent_id).unwrap().unwrap();
    assert_eq!(recorded.status, AgentStatus::Completed);

    // Every phase transition lands in the persisted event log.
    let events = store.events().list(None, Some(500)).unwrap();
    let phase_events = events
        .iter()
        .filter(|event| event.body["type"] == "PhaseCompleted")
        .count();
    assert!(phase_events >= 5, "expected phase events, got {phase_events}");
    assert!(events
        .iter()
        .any(|event| event.body["type"] == "WatermarkAdvanced"));

    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn malformed_source_records_parse_failure() {
    let db_path = temp_db_path();
    let repo = RepoId::generate();

    // Truncated file: the braces never balance.
    let platform = Arc::new(
        MockPlatform::new(snapshot(101))
            .iteration(1, "c1")
            .change(1, "/src/Cart.java", ChangeKind::Add)
            .file("c1", "/src/Cart.java", "public class Cart {\n    int total = 0;\n"),
    );
    let analyzer = Arc::new(MockAnalyzer::default());

    let (agent, _) = agent_for(
        &db_path,
        deps(platform.clone(), analyzer.clone()),
        &repo,
        101,
        PrEventKind::Created,
        None,
    );
    let execution = agent.run().await;

    // The failure is recorded, the file is never analyzed, and the run does
    // not count as reviewed.
    assert_eq!(execution.status, AgentStatus::Failed);
    assert!(execution
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("partial failure"));
    assert_eq!(execution.files_analyzed, 0);
    assert_eq!(
        analyzer
            .analyze_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
    assert!(platform.created_inline_threads().is_empty());

    let store = open_store(&db_path);
    assert_eq!(store.watermarks().get(&repo, 101).unwrap(), None);
    assert_released(&store, &repo, 101);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn update_event_diffs_resolves_and_posts_incrementally() {
    let db_path = temp_db_path();
    let repo = RepoId::generate();

    // The thread a previous run left on line 2 of Cart.java.
    let prior = finding("/src/Cart.java", 2, "unchecked list access");
    let prior_thread = CommentThread {
        thread_id: 7,
        path: Some("/src/Cart.java".to_string()),
        line: Some(2),
        status: ThreadStatus::Active,
        content: render::render_finding(&prior),
    };

    let platform = Arc::new(
        MockPlatform::new(snapshot(101))
            .iteration(1, "c1")
            .iteration(2, "c2")
            .change(1, "/src/Cart.java", ChangeKind::Add)
            .change(2, "/src/Cart.java", ChangeKind::Edit)
            .change(2, "/src/Coupon.java", ChangeKind::Add)
            .file("c1", "/src/Cart.java", JAVA_V1)
            .file("c2", "/src/Cart.java", JAVA_V2)
            .file("c2", "/src/Coupon.java", JAVA_NEW)
            .existing_thread(prior_thread),
    );
    let analyzer = Arc::new(
        MockAnalyzer::default()
            .with_finding(
                "/src/Coupon.java",
                finding("/src/Coupon.java", 2, "field initialized to null"),
            )
            .with_verdict("unchecked list access", FixVerdict::Resolved),
    );

    {
        let store = open_store(&db_path);
        store.watermarks().set(&repo, 101, 1).unwrap();
    }

    let (agent, _) = agent_for(
        &db_path,
        deps(platform.clone(), analyzer),
        &repo,
        101,
        PrEventKind::Updated,
        Some(2),
    );
    let execution = agent.run().await;

    assert_eq!(execution.status, AgentStatus::Completed);
    assert_eq!(execution.resolutions_marked, 1);
    assert_eq!(execution.findings_posted, 1);

    {
        let inner = platform.inner.lock().unwrap();
        assert!(inner
            .status_updates
            .contains(&(7, ThreadStatus::Fixed)));
        assert_eq!(inner.replies.len(), 1);
        assert_eq!(inner.replies[0].0, 7);
    }
    let posted = platform.created_inline_threads();
    let coupon: Vec<_> = posted
        .iter()
        .filter(|(path, _, _)| path == "/src/Coupon.java")
        .collect();
    assert_eq!(coupon.len(), 1);
    assert_eq!(coupon[0].1, 2);

    let store = open_store(&db_path);
    assert_eq!(store.watermarks().get(&repo, 101).unwrap(), Some(2));
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn duplicate_webhook_is_dropped_at_ingest() {
    let store = DbStore::new(rl_db::schema::with_test_db().unwrap());
    let repo = RepoId::generate();
    store
        .registrations()
        .insert(&registration(&repo))
        .unwrap();
    let redline = Redline::new(store, EventBus::new(16));
    let ctx = RequestContext::new(EventSource::Webhook, None);

    let normalized = rl_core::ingest::NormalizedPr {
        kind: PrEventKind::Created,
        pr_id: 101,
        platform_repo_id: "mock-guid".to_string(),
        source_branch: "feature/checkout".to_string(),
        target_branch: "main".to_string(),
        source_commit: "src-commit".to_string(),
        target_commit: "base".to_string(),
        iteration_id: None,
        author: "dev@contoso.com".to_string(),
        title: "Add checkout flow".to_string(),
    };

    let first = redline.ingest().accept(&ctx, normalized.clone()).unwrap();
    assert!(matches!(first, IngestOutcome::Queued { pr_id: 101, .. }));

    let second = redline.ingest().accept(&ctx, normalized.clone()).unwrap();
    assert!(matches!(
        second,
        IngestOutcome::Dropped(DropReason::Duplicate { .. })
    ));

    // Unknown platform repository: acked but never queued.
    let mut foreign = normalized;
    foreign.platform_repo_id = "other-guid".to_string();
    let third = redline.ingest().accept(&ctx, foreign).unwrap();
    assert!(matches!(
        third,
        IngestOutcome::Dropped(DropReason::Unmonitored { .. })
    ));
}

#[tokio::test]
async fn analyzer_outage_fails_run_and_posts_nothing() {
    let db_path = temp_db_path();
    let repo = RepoId::generate();

    let platform = Arc::new(
        MockPlatform::new(snapshot(105))
            .iteration(1, "c1")
            .change(1, "/src/Cart.java", ChangeKind::Add)
            .file("c1", "/src/Cart.java", JAVA_V1),
    );
    let analyzer = Arc::new(MockAnalyzer::default().failing());

    let (agent, _) = agent_for(
        &db_path,
        deps(platform.clone(), analyzer),
        &repo,
        105,
        PrEventKind::Created,
        None,
    );
    let execution = agent.run().await;

    assert_eq!(execution.status, AgentStatus::Failed);
    assert!(execution.error.is_some());
    assert!(execution.api_errors > 0);
    assert!(platform.created_inline_threads().is_empty());

    let store = open_store(&db_path);
    // A failed run never advances the watermark.
    assert_eq!(store.watermarks().get(&repo, 105).unwrap(), None);
    assert_released(&store, &repo, 105);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn empty_delta_still_completes_and_advances_watermark() {
    let db_path = temp_db_path();
    let repo = RepoId::generate();

    let platform = Arc::new(
        MockPlatform::new(snapshot(101))
            .iteration(1, "c1")
            .iteration(2, "c2"),
    );
    let analyzer = Arc::new(MockAnalyzer::default());

    {
        let store = open_store(&db_path);
        store.watermarks().set(&repo, 101, 2).unwrap();
    }

    let (agent, _) = agent_for(
        &db_path,
        deps(platform.clone(), analyzer),
        &repo,
        101,
        PrEventKind::Updated,
        Some(2),
    );
    let execution = agent.run().await;

    assert_eq!(execution.status, AgentStatus::Completed);
    assert_eq!(execution.findings_posted, 0);
    assert!(platform.created_inline_threads().is_empty());

    let store = open_store(&db_path);
    assert_eq!(store.watermarks().get(&repo, 101).unwrap(), Some(2));
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn republished_findings_are_suppressed_by_existing_threads() {
    let db_path = temp_db_path();
    let repo = RepoId::generate();

    let build_platform = || {
        MockPlatform::new(snapshot(101))
            .iteration(1, "c1")
            .iteration(2, "c2")
            .change(1, "/src/Cart.java", ChangeKind::Add)
            .change(2, "/src/Cart.java", ChangeKind::Edit)
            .file("c1", "/src/Cart.java", JAVA_V1)
            .file("c2", "/src/Cart.java", JAVA_V2)
    };
    let platform = Arc::new(build_platform());
    let analyzer = Arc::new(MockAnalyzer::default().with_finding(
        "/src/Cart.java",
        finding("/src/Cart.java", 2, "unchecked list access"),
    ));

    let (first, _) = agent_for(
        &db_path,
        deps(platform.clone(), analyzer.clone()),
        &repo,
        101,
        PrEventKind::Created,
        None,
    );
    let execution = first.run().await;
    assert_eq!(execution.status, AgentStatus::Completed);
    assert_eq!(execution.findings_posted, 1);

    // Simulate watermark loss so the second run re-reviews the same region
    // against the same thread list.
    {
        let store = open_store(&db_path);
        store.watermarks().set(&repo, 101, 1).unwrap();
    }
    let (second, _) = agent_for(
        &db_path,
        deps(platform.clone(), analyzer),
        &repo,
        101,
        PrEventKind::Updated,
        Some(2),
    );
    let execution = second.run().await;

    assert_eq!(execution.status, AgentStatus::Completed);
    assert_eq!(execution.findings_posted, 0);
    assert_eq!(execution.duplicates_skipped, 1);
    assert_eq!(platform.created_inline_threads().len(), 1);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn two_prs_review_in_parallel_without_claim_conflicts() {
    let db_path = temp_db_path();
    let repo = RepoId::generate();

    let make_platform = |pr_id: i64| {
        Arc::new(
            MockPlatform::new(snapshot(pr_id))
                .iteration(1, "c1")
                .change(1, "/src/Cart.java", ChangeKind::Add)
                .file("c1", "/src/Cart.java", JAVA_V1),
        )
    };
    let analyzer = Arc::new(MockAnalyzer::default().with_finding(
        "/src/Cart.java",
        finding("/src/Cart.java", 2, "unchecked list access"),
    ));

    let platform_a = make_platform(103);
    let platform_b = make_platform(104);
    let (agent_a, _) = agent_for(
        &db_path,
        deps(platform_a.clone(), analyzer.clone()),
        &repo,
        103,
        PrEventKind::Created,
        None,
    );
    let (agent_b, _) = agent_for(
        &db_path,
        deps(platform_b.clone(), analyzer),
        &repo,
        104,
        PrEventKind::Created,
        None,
    );

    let (exec_a, exec_b) = tokio::join!(agent_a.run(), agent_b.run());
    assert_eq!(exec_a.status, AgentStatus::Completed);
    assert_eq!(exec_b.status, AgentStatus::Completed);

    let store = open_store(&db_path);
    assert_eq!(store.watermarks().get(&repo, 103).unwrap(), Some(1));
    assert_eq!(store.watermarks().get(&repo, 104).unwrap(), Some(1));
    assert_released(&store, &repo, 103);
    assert_released(&store, &repo, 104);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn cancellation_reaches_a_terminal_status_promptly() {
    let db_path = temp_db_path();
    let repo = RepoId::generate();

    let platform = Arc::new(
        MockPlatform::new(snapshot(101))
            .iteration(1, "c1")
            .change(1, "/src/Cart.java", ChangeKind::Add)
            .file("c1", "/src/Cart.java", JAVA_V1),
    );
    let analyzer = Arc::new(MockAnalyzer::default());
    *analyzer.delay.lock().unwrap() = Some(std::time::Duration::from_secs(30));

    let store = open_store(&db_path);
    let agent_id = AgentId::generate();
    store.claims().claim(&repo, 101, &agent_id).unwrap();
    let token = CancellationToken::new();
    let agent = ReviewAgent::new(
        store,
        deps(platform, analyzer),
        handle(),
        agent_id.clone(),
        event(&repo, 101, PrEventKind::Created, None),
        Utc::now() + Duration::minutes(10),
        token.clone(),
    );

    let started = std::time::Instant::now();
    let run = tokio::spawn(agent.run());
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    token.cancel();
    let execution = run.await.unwrap();

    assert!(started.elapsed() < std::time::Duration::from_secs(5));
    assert_eq!(execution.status, AgentStatus::Failed);
    assert!(execution.error.as_deref().unwrap_or_default().contains("cancelled"));

    let store = open_store(&db_path);
    assert_released(&store, &repo, 101);
    let _ = std::fs::remove_file(&db_path);
}

#[tokio::test]
async fn boot_recovery_times_out_expired_agents() {
    let db_path = temp_db_path();
    let repo = RepoId::generate();
    let agent_id = AgentId::generate();

    {
        let store = open_store(&db_path);
        let now = Utc::now();
        store
            .executions()
            .insert(&AgentExecution {
                agent_id: agent_id.clone(),
                repository_id: repo.clone(),
                pr_id: 106,
                dedup_key: "106:abc:Created".to_string(),
                phase: AgentPhase::Parse,
                status: AgentStatus::Running,
                started_at: now - Duration::minutes(20),
                deadline: now - Duration::minutes(10),
                ended_at: None,
                duration_ms: None,
                files_analyzed: 1,
                findings_posted: 0,
                duplicates_skipped: 0,
                resolutions_marked: 0,
                api_calls: 3,
                api_errors: 0,
                error: None,
            })
            .unwrap();
        store.claims().claim(&repo, 106, &agent_id).unwrap();
        store
            .timeouts()
            .schedule(&agent_id, now - Duration::minutes(10))
            .unwrap();
    }

    let settings = Arc::new(Settings {
        organization: "contoso".to_string(),
        pat: "pat".to_string(),
        public_url: "http://localhost:4870".to_string(),
        webhook_secret: None,
        db_path: db_path.clone(),
        port: 4870,
        workers: 1,
        agent_timeout: std::time::Duration::from_secs(600),
        analyzer_concurrency: 8,
        platform_timeout: std::time::Duration::from_secs(30),
        visibility_timeout: std::time::Duration::from_secs(900),
        state_ttl: std::time::Duration::from_secs(86_400),
        analyzer: AnalyzerSettings {
            endpoint: "https://api.openai.com/v1".to_string(),
            api_key: "test".to_string(),
            model: "gpt-4o".to_string(),
            deployment: None,
            timeout: std::time::Duration::from_secs(60),
        },
    });
    let orchestrator = Orchestrator::new(
        settings,
        EventBus::new(16),
        Arc::new(MockPlatform::new(snapshot(106))),
        Arc::new(MockAnalyzer::default()),
    );
    assert_eq!(orchestrator.recover().unwrap(), 1);

    let store = open_store(&db_path);
    let recovered = store.executions().get(&agent_id).unwrap().unwrap();
    assert_eq!(recovered.status, AgentStatus::Timeout);
    assert!(recovered.ended_at.is_some());
    assert_released(&store, &repo, 106);
    let _ = std::fs::remove_file(&db_path);
}
