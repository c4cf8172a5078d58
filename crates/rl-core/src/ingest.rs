//! Webhook payload verification and normalization. The HTTP sink stays thin;
//! everything testable lives here.

use crate::error::IngestError;
use crate::types::enums::PrEventKind;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Payload fields extracted from the platform webhook, before the repository
/// registration is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedPr {
    pub kind: PrEventKind,
    pub pr_id: i64,
    pub platform_repo_id: String,
    pub source_branch: String,
    pub target_branch: String,
    pub source_commit: String,
    pub target_commit: String,
    pub iteration_id: Option<i64>,
    pub author: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Event(NormalizedPr),
    /// Event types the service does not review; acknowledged and dropped.
    UnknownKind(String),
}

/// Verify the `X-Hub-Signature-256` HMAC when a secret is configured.
/// Accepts the bare hex digest or the `sha256=`-prefixed form.
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), IngestError> {
    let Some(signature) = signature else {
        return Err(IngestError::Unauthorized);
    };
    let hex = signature.strip_prefix("sha256=").unwrap_or(signature);
    let provided = decode_hex(hex).ok_or(IngestError::Unauthorized)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| IngestError::Unauthorized)?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| IngestError::Unauthorized)
}

/// Map the raw webhook JSON to the internal event shape.
pub fn normalize(payload: &Value) -> Result<Normalized, IngestError> {
    let event_type = payload
        .get("eventType")
        .and_then(Value::as_str)
        .ok_or_else(|| rejected("missing eventType"))?;

    let kind = match parse_event_kind(event_type) {
        Some(kind) => kind,
        None => return Ok(Normalized::UnknownKind(event_type.to_string())),
    };

    let resource = payload
        .get("resource")
        .and_then(Value::as_object)
        .ok_or_else(|| rejected("missing resource"))?;

    let pr_id = resource
        .get("pullRequestId")
        .and_then(Value::as_i64)
        .ok_or_else(|| rejected("missing resource.pullRequestId"))?;
    let platform_repo_id = resource
        .get("repository")
        .and_then(|repo| repo.get("id"))
        .and_then(Value::as_str)
        .ok_or_else(|| rejected("missing resource.repository.id"))?
        .to_string();

    let source_branch = branch_name(resource.get("sourceRefName"));
    let target_branch = branch_name(resource.get("targetRefName"));
    let source_commit = commit_id(resource.get("lastMergeSourceCommit"))
        .ok_or_else(|| rejected("missing resource.lastMergeSourceCommit"))?;
    let target_commit = commit_id(resource.get("lastMergeTargetCommit"))
        .ok_or_else(|| rejected("missing resource.lastMergeTargetCommit"))?;

    let iteration_id = match kind {
        PrEventKind::Created => None,
        PrEventKind::Updated => resource.get("iterationId").and_then(Value::as_i64),
    };

    let author = resource
        .get("createdBy")
        .and_then(|by| by.get("uniqueName").or_else(|| by.get("displayName")))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let title = resource
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(Normalized::Event(NormalizedPr {
        kind,
        pr_id,
        platform_repo_id,
        source_branch,
        target_branch,
        source_commit,
        target_commit,
        iteration_id,
        author,
        title,
    }))
}

fn parse_event_kind(event_type: &str) -> Option<PrEventKind> {
    match event_type.rsplit_once('.').map(|(_, last)| last) {
        Some("created") if event_type.contains("pullrequest") => Some(PrEventKind::Created),
        Some("updated") if event_type.contains("pullrequest") => Some(PrEventKind::Updated),
        _ => None,
    }
}

fn branch_name(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(|name| name.trim_start_matches("refs/heads/").to_string())
        .unwrap_or_default()
}

fn commit_id(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|commit| commit.get("commitId"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn rejected(message: &str) -> IngestError {
    IngestError::Rejected {
        message: message.to_string(),
    }
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&value[i..i + 2], 16).ok())
        .collect()
}
