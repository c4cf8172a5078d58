use crate::error::PlatformError;
use crate::types::{
    thread_status_str, WireChangeEntry, WireIteration, WireIterationChanges, WireList,
    WirePullRequest, WireRepository, WireThread,
};
use async_trait::async_trait;
use rl_core::types::{
    CommentThread, IterationChange, IterationInfo, NewThread, PrSnapshot, RepoHandle,
    ThreadStatus,
};
use rl_resilience::{execute, CircuitBreaker, RetryPolicy};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

const API_VERSION: &str = "7.0";

/// Repository as the platform identifies it; used once at registration time
/// to resolve the GUID behind a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformRepo {
    pub id: String,
    pub name: String,
}

/// The idempotent platform operations the review core consumes. Duplicate
/// thread posts are prevented above this layer by the comment ledger.
#[async_trait]
pub trait Platform: Send + Sync {
    async fn get_repository(
        &self,
        project: &str,
        name: &str,
    ) -> Result<PlatformRepo, PlatformError>;
    async fn get_pr(&self, repo: &RepoHandle, pr_id: i64) -> Result<PrSnapshot, PlatformError>;
    async fn list_iterations(
        &self,
        repo: &RepoHandle,
        pr_id: i64,
    ) -> Result<Vec<IterationInfo>, PlatformError>;
    async fn get_iteration_changes(
        &self,
        repo: &RepoHandle,
        pr_id: i64,
        iteration_id: i64,
    ) -> Result<Vec<IterationChange>, PlatformError>;
    /// File content at a commit; `None` for paths the platform cannot serve
    /// as text (missing at that commit, or binary).
    async fn get_file(
        &self,
        repo: &RepoHandle,
        path: &str,
        commit: &str,
    ) -> Result<Option<String>, PlatformError>;
    async fn list_threads(
        &self,
        repo: &RepoHandle,
        pr_id: i64,
    ) -> Result<Vec<CommentThread>, PlatformError>;
    async fn create_thread(
        &self,
        repo: &RepoHandle,
        pr_id: i64,
        thread: &NewThread,
    ) -> Result<i64, PlatformError>;
    async fn update_thread(
        &self,
        repo: &RepoHandle,
        pr_id: i64,
        thread_id: i64,
        status: ThreadStatus,
    ) -> Result<(), PlatformError>;
    async fn reply_to_thread(
        &self,
        repo: &RepoHandle,
        pr_id: i64,
        thread_id: i64,
        content: &str,
    ) -> Result<(), PlatformError>;
    async fn register_hook(
        &self,
        platform_repo_id: &str,
        event_type: &str,
        url: &str,
    ) -> Result<String, PlatformError>;
    async fn unregister_hook(&self, hook_id: &str) -> Result<(), PlatformError>;
}

/// Azure DevOps REST client. Every operation runs inside the retry +
/// circuit-breaker kit; the breaker is shared across operations because they
/// hit the same dependency.
pub struct AzureClient {
    http: reqwest::Client,
    base_url: String,
    pat: String,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl AzureClient {
    pub fn new(organization: &str, pat: &str, timeout: Duration) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PlatformError::from)?;
        Ok(Self {
            http,
            base_url: format!("https://dev.azure.com/{organization}"),
            pat: pat.to_string(),
            retry: RetryPolicy::default(),
            breaker: CircuitBreaker::default(),
        })
    }

    fn git_url(&self, repo: &RepoHandle, rest: &str) -> String {
        format!(
            "{}/{}/_apis/git/repositories/{}/{rest}",
            self.base_url, repo.project, repo.repository_id
        )
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<T, PlatformError> {
        tracing::debug!(url, what, "platform GET");
        let response = self
            .http
            .get(url)
            .basic_auth("", Some(&self.pat))
            .query(&[("api-version", API_VERSION)])
            .query(query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::from_status(status.as_u16(), what));
        }
        response.json::<T>().await.map_err(PlatformError::from)
    }

    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<serde_json::Value, PlatformError> {
        let response = request
            .basic_auth("", Some(&self.pat))
            .query(&[("api-version", API_VERSION)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlatformError::from_status(status.as_u16(), what));
        }
        response.json().await.map_err(PlatformError::from)
    }
}

#[async_trait]
impl Platform for AzureClient {
    async fn get_repository(
        &self,
        project: &str,
        name: &str,
    ) -> Result<PlatformRepo, PlatformError> {
        let url = format!("{}/{project}/_apis/git/repositories/{name}", self.base_url);
        let wire: WireRepository = execute(&self.retry, &self.breaker, || {
            self.get_json(&url, &[], "repository")
        })
        .await?;
        Ok(PlatformRepo {
            id: wire.id,
            name: wire.name,
        })
    }

    async fn get_pr(&self, repo: &RepoHandle, pr_id: i64) -> Result<PrSnapshot, PlatformError> {
        let url = self.git_url(repo, &format!("pullRequests/{pr_id}"));
        let wire: WirePullRequest = execute(&self.retry, &self.breaker, || {
            self.get_json(&url, &[], "pull request")
        })
        .await?;
        wire.into_snapshot().ok_or_else(|| PlatformError::Decode {
            message: "pull request without merge commits".to_string(),
        })
    }

    async fn list_iterations(
        &self,
        repo: &RepoHandle,
        pr_id: i64,
    ) -> Result<Vec<IterationInfo>, PlatformError> {
        let url = self.git_url(repo, &format!("pullRequests/{pr_id}/iterations"));
        let wire: WireList<WireIteration> = execute(&self.retry, &self.breaker, || {
            self.get_json(&url, &[], "iterations")
        })
        .await?;
        Ok(wire.value.into_iter().map(WireIteration::into_info).collect())
    }

    async fn get_iteration_changes(
        &self,
        repo: &RepoHandle,
        pr_id: i64,
        iteration_id: i64,
    ) -> Result<Vec<IterationChange>, PlatformError> {
        let url = self.git_url(
            repo,
            &format!("pullRequests/{pr_id}/iterations/{iteration_id}/changes"),
        );
        let wire: WireIterationChanges = execute(&self.retry, &self.breaker, || {
            self.get_json(&url, &[], "iteration changes")
        })
        .await?;
        Ok(wire
            .change_entries
            .into_iter()
            .filter_map(WireChangeEntry::into_change)
            .collect())
    }

    async fn get_file(
        &self,
        repo: &RepoHandle,
        path: &str,
        commit: &str,
    ) -> Result<Option<String>, PlatformError> {
        let url = self.git_url(repo, "items");
        let result = execute(&self.retry, &self.breaker, || async {
            let response = self
                .http
                .get(&url)
                .basic_auth("", Some(&self.pat))
                .query(&[
                    ("api-version", API_VERSION),
                    ("path", path),
                    ("versionDescriptor.version", commit),
                    ("versionDescriptor.versionType", "commit"),
                    ("includeContent", "true"),
                ])
                .header(reqwest::header::ACCEPT, "text/plain")
                .send()
                .await?;
            let status = response.status();
            if status.as_u16() == 404 {
                return Ok(None);
            }
            if !status.is_success() {
                return Err(PlatformError::from_status(status.as_u16(), "file content"));
            }
            Ok(Some(response.text().await?))
        })
        .await?;
        Ok(result)
    }

    async fn list_threads(
        &self,
        repo: &RepoHandle,
        pr_id: i64,
    ) -> Result<Vec<CommentThread>, PlatformError> {
        let url = self.git_url(repo, &format!("pullRequests/{pr_id}/threads"));
        let wire: WireList<WireThread> = execute(&self.retry, &self.breaker, || {
            self.get_json(&url, &[], "threads")
        })
        .await?;
        Ok(wire
            .value
            .into_iter()
            .filter_map(WireThread::into_thread)
            .collect())
    }

    async fn create_thread(
        &self,
        repo: &RepoHandle,
        pr_id: i64,
        thread: &NewThread,
    ) -> Result<i64, PlatformError> {
        let url = self.git_url(repo, &format!("pullRequests/{pr_id}/threads"));
        let mut body = json!({
            "comments": [{
                "parentCommentId": 0,
                "content": thread.content,
                "commentType": "text"
            }],
            "status": thread_status_str(thread.status),
        });
        if let (Some(path), Some(line)) = (&thread.path, thread.line) {
            body["threadContext"] = json!({
                "filePath": path,
                "rightFileStart": { "line": line, "offset": 1 },
                "rightFileEnd": { "line": line, "offset": 1 }
            });
        }
        let created = execute(&self.retry, &self.breaker, || {
            self.send_json(self.http.post(&url).json(&body), "create thread")
        })
        .await?;
        created
            .get("id")
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| PlatformError::Decode {
                message: "created thread without id".to_string(),
            })
    }

    async fn update_thread(
        &self,
        repo: &RepoHandle,
        pr_id: i64,
        thread_id: i64,
        status: ThreadStatus,
    ) -> Result<(), PlatformError> {
        let url = self.git_url(repo, &format!("pullRequests/{pr_id}/threads/{thread_id}"));
        let body = json!({ "status": thread_status_str(status) });
        execute(&self.retry, &self.breaker, || {
            self.send_json(self.http.patch(&url).json(&body), "update thread")
        })
        .await?;
        Ok(())
    }

    async fn reply_to_thread(
        &self,
        repo: &RepoHandle,
        pr_id: i64,
        thread_id: i64,
        content: &str,
    ) -> Result<(), PlatformError> {
        let url = self.git_url(
            repo,
            &format!("pullRequests/{pr_id}/threads/{thread_id}/comments"),
        );
        let body = json!({ "parentCommentId": 1, "content": content, "commentType": "text" });
        execute(&self.retry, &self.breaker, || {
            self.send_json(self.http.post(&url).json(&body), "reply to thread")
        })
        .await?;
        Ok(())
    }

    async fn register_hook(
        &self,
        platform_repo_id: &str,
        event_type: &str,
        url: &str,
    ) -> Result<String, PlatformError> {
        let endpoint = format!("{}/_apis/hooks/subscriptions", self.base_url);
        let body = json!({
            "publisherId": "tfs",
            "eventType": event_type,
            "resourceVersion": "1.0",
            "consumerId": "webHooks",
            "consumerActionId": "httpRequest",
            "publisherInputs": { "repository": platform_repo_id },
            "consumerInputs": { "url": url }
        });
        let created = execute(&self.retry, &self.breaker, || {
            self.send_json(self.http.post(&endpoint).json(&body), "hook subscription")
        })
        .await?;
        created
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Decode {
                message: "hook subscription without id".to_string(),
            })
    }

    async fn unregister_hook(&self, hook_id: &str) -> Result<(), PlatformError> {
        let url = format!("{}/_apis/hooks/subscriptions/{hook_id}", self.base_url);
        execute(&self.retry, &self.breaker, || async {
            let response = self
                .http
                .delete(&url)
                .basic_auth("", Some(&self.pat))
                .query(&[("api-version", API_VERSION)])
                .send()
                .await?;
            let status = response.status();
            // Deleting an already-gone subscription is success for us.
            if !status.is_success() && status.as_u16() != 404 {
                return Err(PlatformError::from_status(status.as_u16(), "hook subscription"));
            }
            Ok(())
        })
        .await
    }
}
