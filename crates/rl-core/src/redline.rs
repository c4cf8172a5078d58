use crate::error::{AgentQueryError, IngestError, RedlineError, RepoError};
use crate::ingest::NormalizedPr;
use crate::store::{
    EventRepository, ExecutionRepository, QueueRepository, RegistrationRepository,
    StateRepository, Store,
};
use crate::types::event_body::EventBody;
use crate::types::{
    AgentExecution, AgentId, AgentState, PrEvent, RepoCoordinates, RepoId, Repository,
};
use chrono::Utc;
use rl_events::bus::EventBus;
use rl_events::types::{EventRecord, EventSource};

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub source: EventSource,
    pub correlation_id: Option<String>,
}

impl RequestContext {
    pub fn new(source: EventSource, correlation_id: Option<String>) -> Self {
        Self {
            source,
            correlation_id,
        }
    }
}

/// Why an accepted webhook produced no queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    Unmonitored { platform_repo_id: String },
    Duplicate { dedup_key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Queued { entry_id: i64, pr_id: i64 },
    Dropped(DropReason),
}

/// Synchronous domain surface over the store: admin registration, webhook
/// acceptance, and the read side of agent executions. The asynchronous
/// review machinery lives elsewhere and talks to the store directly.
pub struct Redline<S: Store> {
    store: S,
    event_bus: EventBus,
}

impl<S: Store> Redline<S> {
    pub fn new(store: S, event_bus: EventBus) -> Self {
        Self { store, event_bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn repositories(&self) -> RepositoriesApi<'_, S> {
        RepositoriesApi { core: self }
    }

    pub fn ingest(&self) -> IngestApi<'_, S> {
        IngestApi { core: self }
    }

    pub fn agents(&self) -> AgentsApi<'_, S> {
        AgentsApi { core: self }
    }

    pub fn events(&self) -> EventsApi<'_, S> {
        EventsApi { core: self }
    }

    fn with_events<T, F>(&self, ctx: &RequestContext, f: F) -> Result<T, RedlineError>
    where
        F: FnOnce(&S) -> Result<(T, Vec<EventBody>), RedlineError>,
    {
        let (value, records) = self.store.with_tx(|store| {
            let (value, bodies) = f(store)?;
            let mut records = Vec::new();
            for body in bodies {
                let record = build_event_record(ctx, body)?;
                let record = store.events().append(record)?;
                records.push(record);
            }
            Ok((value, records))
        })?;
        for record in records {
            let _ = self.event_bus.publish(record);
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRepositoryInput {
    pub url: String,
    pub coordinates: RepoCoordinates,
    pub platform_repo_id: String,
}

pub struct RepositoriesApi<'a, S: Store> {
    core: &'a Redline<S>,
}

impl<'a, S: Store> RepositoriesApi<'a, S> {
    pub fn register(
        &self,
        ctx: &RequestContext,
        input: RegisterRepositoryInput,
    ) -> Result<Repository, RedlineError> {
        self.core.with_events(ctx, |store| {
            if store.registrations().get_by_url(&input.url)?.is_some() {
                return Err(RedlineError::Repo(RepoError::AlreadyRegistered));
            }
            let now = Utc::now();
            let repository = Repository {
                id: RepoId::generate(),
                organization: input.coordinates.organization.clone(),
                project: input.coordinates.project.clone(),
                name: input.coordinates.name.clone(),
                url: input.url.clone(),
                platform_repo_id: input.platform_repo_id.clone(),
                hook_id: None,
                created_at: now,
                updated_at: now,
            };
            store.registrations().insert(&repository)?;
            Ok((
                repository.clone(),
                vec![EventBody::RepositoryRegistered { repository }],
            ))
        })
    }

    /// Record the service hook ids once the platform subscription exists.
    pub fn set_hook(
        &self,
        ctx: &RequestContext,
        id: &RepoId,
        hook_id: Option<&str>,
    ) -> Result<Repository, RedlineError> {
        self.core.with_events(ctx, |store| {
            let repository = store.registrations().set_hook(id, hook_id)?;
            Ok((repository, Vec::new()))
        })
    }

    /// Remove the registration and return the deleted row so the caller can
    /// tear down its platform hooks.
    pub fn unregister(
        &self,
        ctx: &RequestContext,
        id: &RepoId,
    ) -> Result<Repository, RedlineError> {
        self.core.with_events(ctx, |store| {
            let repository = store.registrations().delete(id)?;
            Ok((
                repository,
                vec![EventBody::RepositoryUnregistered {
                    repository_id: id.clone(),
                }],
            ))
        })
    }

    pub fn get(&self, id: &RepoId) -> Result<Option<Repository>, RedlineError> {
        self.core
            .store
            .registrations()
            .get(id)
            .map_err(RedlineError::from)
    }

    pub fn list(&self) -> Result<Vec<Repository>, RedlineError> {
        self.core
            .store
            .registrations()
            .list()
            .map_err(RedlineError::from)
    }
}

pub struct IngestApi<'a, S: Store> {
    core: &'a Redline<S>,
}

impl<'a, S: Store> IngestApi<'a, S> {
    /// Resolve the registration, deduplicate, and enqueue. Cheap enough to
    /// run inside the webhook request; the review itself happens later.
    pub fn accept(
        &self,
        ctx: &RequestContext,
        normalized: NormalizedPr,
    ) -> Result<IngestOutcome, RedlineError> {
        let registration = self
            .core
            .store
            .registrations()
            .get_by_platform_id(&normalized.platform_repo_id)
            .map_err(|err| IngestError::Store {
                message: err.to_string(),
            })?;
        let Some(registration) = registration else {
            return Ok(IngestOutcome::Dropped(DropReason::Unmonitored {
                platform_repo_id: normalized.platform_repo_id,
            }));
        };

        let event = PrEvent {
            kind: normalized.kind,
            pr_id: normalized.pr_id,
            repository_id: registration.id.clone(),
            platform_repo_id: normalized.platform_repo_id,
            source_branch: normalized.source_branch,
            target_branch: normalized.target_branch,
            source_commit: normalized.source_commit,
            target_commit: normalized.target_commit,
            iteration_id: normalized.iteration_id,
            author: normalized.author,
            title: normalized.title,
            received_at: Utc::now(),
        };
        let dedup_key = event.dedup_key();

        self.core.with_events(ctx, |store| {
            if store.queue().is_queued(&dedup_key)? || store.executions().dedup_seen(&dedup_key)? {
                return Ok((
                    IngestOutcome::Dropped(DropReason::Duplicate {
                        dedup_key: dedup_key.clone(),
                    }),
                    vec![EventBody::ReviewDropped {
                        pr_id: event.pr_id,
                        reason: format!("duplicate delivery ({dedup_key})"),
                    }],
                ));
            }
            let entry_id = store.queue().enqueue(&event, &dedup_key)?;
            Ok((
                IngestOutcome::Queued {
                    entry_id,
                    pr_id: event.pr_id,
                },
                vec![EventBody::ReviewQueued {
                    entry_id,
                    repository_id: event.repository_id.clone(),
                    pr_id: event.pr_id,
                    kind: event.kind,
                }],
            ))
        })
    }
}

pub struct AgentsApi<'a, S: Store> {
    core: &'a Redline<S>,
}

impl<'a, S: Store> AgentsApi<'a, S> {
    pub fn list(&self, limit: Option<u32>) -> Result<Vec<AgentExecution>, RedlineError> {
        self.core
            .store
            .executions()
            .list(limit)
            .map_err(RedlineError::from)
    }

    pub fn get(
        &self,
        id: &AgentId,
    ) -> Result<Option<(AgentExecution, Option<AgentState>)>, RedlineError> {
        let Some(execution) = self.core.store.executions().get(id)? else {
            return Ok(None);
        };
        let state = self.core.store.states().get(id)?;
        Ok(Some((execution, state)))
    }

    pub fn require(
        &self,
        id: &AgentId,
    ) -> Result<(AgentExecution, Option<AgentState>), RedlineError> {
        self.get(id)?
            .ok_or(RedlineError::Agent(AgentQueryError::NotFound))
    }
}

pub struct EventsApi<'a, S: Store> {
    core: &'a Redline<S>,
}

impl<'a, S: Store> EventsApi<'a, S> {
    pub fn list(
        &self,
        after: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<EventRecord>, RedlineError> {
        self.core.store.events().list(after, limit)
    }
}

/// Build an unsequenced event record; the store assigns `id` and `seq` on
/// append.
pub fn build_event_record(
    ctx: &RequestContext,
    body: EventBody,
) -> Result<EventRecord, RedlineError> {
    let value = serde_json::to_value(body).map_err(|err| RedlineError::Internal {
        message: err.to_string(),
    })?;
    Ok(EventRecord {
        id: String::new(),
        seq: 0,
        at: Utc::now(),
        correlation_id: ctx.correlation_id.clone(),
        source: ctx.source,
        body: value,
    })
}
