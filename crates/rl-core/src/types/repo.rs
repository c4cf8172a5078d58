use crate::types::ids::RepoId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A monitored Azure DevOps repository. Unique on
/// `(organization, project, name)` and on `url`; events for repositories
/// without a row here are acknowledged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Repository {
    pub id: RepoId,
    pub organization: String,
    pub project: String,
    pub name: String,
    pub url: String,
    /// Repository id as the platform knows it; webhook payloads carry this.
    pub platform_repo_id: String,
    /// Service hook subscription ids, one per subscribed event type.
    pub hook_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoCoordinates {
    pub organization: String,
    pub project: String,
    pub name: String,
}

impl RepoCoordinates {
    /// Parse `https://dev.azure.com/{org}/{project}/_git/{name}` (or the
    /// legacy `{org}.visualstudio.com` form) into coordinates.
    pub fn parse(url: &str) -> Option<Self> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        let mut segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();

        let organization = if host == "dev.azure.com" {
            if segments.is_empty() {
                return None;
            }
            segments.remove(0).to_string()
        } else if let Some(org) = host.strip_suffix(".visualstudio.com") {
            org.to_string()
        } else {
            return None;
        };

        match segments.as_slice() {
            [project, "_git", name] => Some(Self {
                organization,
                project: (*project).to_string(),
                name: (*name).to_string(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dev_azure_url() {
        let coords =
            RepoCoordinates::parse("https://dev.azure.com/contoso/Payments/_git/checkout-api")
                .unwrap();
        assert_eq!(coords.organization, "contoso");
        assert_eq!(coords.project, "Payments");
        assert_eq!(coords.name, "checkout-api");
    }

    #[test]
    fn parses_visualstudio_url() {
        let coords =
            RepoCoordinates::parse("https://contoso.visualstudio.com/Payments/_git/checkout-api")
                .unwrap();
        assert_eq!(coords.organization, "contoso");
    }

    #[test]
    fn rejects_non_repo_urls() {
        assert!(RepoCoordinates::parse("https://dev.azure.com/contoso/Payments").is_none());
        assert!(RepoCoordinates::parse("https://github.com/contoso/checkout").is_none());
        assert!(RepoCoordinates::parse("not a url").is_none());
    }
}
