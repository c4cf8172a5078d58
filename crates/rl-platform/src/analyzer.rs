use crate::error::AnalyzerError;
use async_trait::async_trait;
use rl_core::config::AnalyzerSettings;
use rl_core::plugins::LanguageProfile;
use rl_core::types::{
    CodeContext, FindingCategory, FixVerdict, LineFinding, Severity, SliceKind, SummaryFinding,
};
use rl_resilience::{execute, CircuitBreaker, RetryPolicy};
use serde::Deserialize;
use serde_json::json;

/// One changed region submitted for line analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub context: CodeContext,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchFile {
    pub path: String,
    pub kind: SliceKind,
    pub outline_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchInput {
    pub title: String,
    pub files: Vec<ArchFile>,
}

/// A previously posted finding being checked for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorFinding {
    pub path: String,
    pub line: u32,
    pub category: FindingCategory,
    pub message: String,
}

/// The LLM boundary. One call shape for line analysis, one for the
/// architectural pass, one for fix verification.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        profile: &LanguageProfile,
        requests: &[AnalysisRequest],
    ) -> Result<Vec<LineFinding>, AnalyzerError>;
    async fn summarize(&self, input: &ArchInput) -> Result<Option<SummaryFinding>, AnalyzerError>;
    async fn verify_fix(
        &self,
        prior: &PriorFinding,
        current_region: &str,
    ) -> Result<FixVerdict, AnalyzerError>;
}

/// Chat-completions client for OpenAI-style endpoints, including Azure
/// OpenAI deployments. Process-wide handle; the breaker state is local to
/// this process.
pub struct OpenAiAnalyzer {
    http: reqwest::Client,
    settings: AnalyzerSettings,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl OpenAiAnalyzer {
    pub fn new(settings: AnalyzerSettings) -> Result<Self, AnalyzerError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(AnalyzerError::from)?;
        Ok(Self {
            http,
            settings,
            retry: RetryPolicy::default(),
            breaker: CircuitBreaker::default(),
        })
    }

    fn endpoint(&self) -> String {
        let base = self.settings.endpoint.trim_end_matches('/');
        match &self.settings.deployment {
            Some(deployment) => format!(
                "{base}/openai/deployments/{deployment}/chat/completions?api-version=2024-02-01"
            ),
            None => format!("{base}/chat/completions"),
        }
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String, AnalyzerError> {
        let body = json!({
            "model": self.settings.model,
            "temperature": 0.1,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user }
            ]
        });
        execute(&self.retry, &self.breaker, || async {
            let mut request = self.http.post(self.endpoint()).json(&body);
            request = if self.settings.deployment.is_some() {
                request.header("api-key", &self.settings.api_key)
            } else {
                request.bearer_auth(&self.settings.api_key)
            };
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(AnalyzerError::from_status(status.as_u16()));
            }
            let completion: ChatCompletion = response.json().await?;
            completion
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .ok_or_else(|| AnalyzerError::InvalidResponse {
                    message: "completion without choices".to_string(),
                })
        })
        .await
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl Analyzer for OpenAiAnalyzer {
    async fn analyze(
        &self,
        profile: &LanguageProfile,
        requests: &[AnalysisRequest],
    ) -> Result<Vec<LineFinding>, AnalyzerError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        let user = build_analysis_prompt(profile, requests);
        let content = self.chat(profile.system_prompt, &user).await?;
        parse_findings(&content)
    }

    async fn summarize(&self, input: &ArchInput) -> Result<Option<SummaryFinding>, AnalyzerError> {
        let system = "You assess the architecture of a pull request as a whole: SOLID \
                      violations, design patterns present or missing, layering problems. \
                      Answer in JSON only.";
        let content = self.chat(system, &build_arch_prompt(input)).await?;
        parse_summary(&content)
    }

    async fn verify_fix(
        &self,
        prior: &PriorFinding,
        current_region: &str,
    ) -> Result<FixVerdict, AnalyzerError> {
        let system = "You judge whether a previously reported review finding is addressed by \
                      the code as it now stands. Answer in JSON only.";
        let user = build_fix_prompt(prior, current_region);
        let content = self.chat(system, &user).await?;
        parse_verdict(&content)
    }
}

fn build_analysis_prompt(profile: &LanguageProfile, requests: &[AnalysisRequest]) -> String {
    let mut prompt = String::from("Review the following changed regions.\n\nRules to apply:\n");
    for rule in profile.rules {
        prompt.push_str(&format!(
            "- {} ({:?}/{:?}): {}\n",
            rule.name, rule.category, rule.severity, rule.guidance
        ));
    }
    for request in requests {
        let ctx = &request.context;
        prompt.push_str(&format!(
            "\n--- file: {} (starting at line {})\n",
            ctx.path, ctx.line
        ));
        if let Some(enclosing) = &ctx.enclosing {
            prompt.push_str(&format!("enclosing: {enclosing}\n"));
        }
        if !ctx.imports.is_empty() {
            prompt.push_str(&format!("imports: {}\n", ctx.imports.join(", ")));
        }
        prompt.push_str("```\n");
        prompt.push_str(&request.content);
        if !request.content.ends_with('\n') {
            prompt.push('\n');
        }
        prompt.push_str("```\n");
    }
    prompt.push_str(
        "\nRespond with a JSON array; one object per finding: \
         {\"path\", \"line\", \"severity\": \"Info|Warning|Error\", \
         \"category\": \"CodeSmell|Bug|Security|BestPractice|Architecture\", \
         \"message\", \"suggestion\"?, \"example\"?}. \
         `line` is the absolute line number in the file. Empty array if nothing to report.",
    );
    prompt
}

fn build_arch_prompt(input: &ArchInput) -> String {
    let mut prompt = format!("Pull request: {}\n\nChanged files:\n", input.title);
    for file in &input.files {
        prompt.push_str(&format!("- {} ({:?})", file.path, file.kind));
        if let Some(summary) = &file.outline_summary {
            prompt.push_str(&format!(": {summary}"));
        }
        prompt.push('\n');
    }
    prompt.push_str(
        "\nRespond with one JSON object: {\"message\", \"solid_violations\": [], \
         \"identified_patterns\": [], \"suggested_patterns\": [], \
         \"architectural_issues\": []}. Use an empty message if there is nothing \
         noteworthy at the architectural level.",
    );
    prompt
}

fn build_fix_prompt(prior: &PriorFinding, current_region: &str) -> String {
    format!(
        "Earlier finding at {}:{} ({:?}): {}\n\nThe code now reads:\n```\n{}\n```\n\n\
         Respond with one JSON object: {{\"verdict\": \"Resolved|Unresolved|Unknown\", \
         \"confidence\": 0.0-1.0}}.",
        prior.path, prior.line, prior.category, prior.message, current_region
    )
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    path: String,
    line: u32,
    severity: Severity,
    category: FindingCategory,
    message: String,
    #[serde(default)]
    suggestion: Option<String>,
    #[serde(default)]
    example: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    verdict: FixVerdict,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Resolutions below this confidence stay open.
const FIX_CONFIDENCE_FLOOR: f64 = 0.7;

fn parse_findings(content: &str) -> Result<Vec<LineFinding>, AnalyzerError> {
    let raw: Vec<RawFinding> =
        serde_json::from_str(strip_fences(content)).map_err(|err| {
            AnalyzerError::InvalidResponse {
                message: err.to_string(),
            }
        })?;
    Ok(raw
        .into_iter()
        .map(|finding| {
            let mut built = LineFinding::new(
                finding.path,
                finding.line,
                finding.severity,
                finding.category,
                finding.message,
            );
            built.suggestion = finding.suggestion;
            built.example = finding.example;
            built
        })
        .collect())
}

fn parse_summary(content: &str) -> Result<Option<SummaryFinding>, AnalyzerError> {
    let summary: SummaryFinding =
        serde_json::from_str(strip_fences(content)).map_err(|err| {
            AnalyzerError::InvalidResponse {
                message: err.to_string(),
            }
        })?;
    if summary.message.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(summary))
}

/// Conservative bias: only a confident affirmative counts as resolved.
fn parse_verdict(content: &str) -> Result<FixVerdict, AnalyzerError> {
    let raw: RawVerdict =
        serde_json::from_str(strip_fences(content)).map_err(|err| {
            AnalyzerError::InvalidResponse {
                message: err.to_string(),
            }
        })?;
    match raw.verdict {
        FixVerdict::Resolved if raw.confidence.unwrap_or(0.0) >= FIX_CONFIDENCE_FLOOR => {
            Ok(FixVerdict::Resolved)
        }
        FixVerdict::Resolved => Ok(FixVerdict::Unknown),
        other => Ok(other),
    }
}

/// Models wrap JSON in markdown fences often enough to handle it here.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_findings_with_fences() {
        let content = r#"```json
        [{"path": "/src/Main.java", "line": 12, "severity": "Error",
          "category": "Bug", "message": "possible null dereference",
          "suggestion": "guard against null"}]
        ```"#;
        let findings = parse_findings(content).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, 12);
        assert_eq!(findings[0].category, FindingCategory::Bug);
        assert!(!findings[0].fingerprint.is_empty());
    }

    #[test]
    fn empty_array_is_no_findings() {
        assert!(parse_findings("[]").unwrap().is_empty());
    }

    #[test]
    fn malformed_findings_are_invalid_response() {
        assert!(matches!(
            parse_findings("not json"),
            Err(AnalyzerError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn summary_with_empty_message_is_none() {
        let content = r#"{"message": "", "solid_violations": []}"#;
        assert!(parse_summary(content).unwrap().is_none());

        let content = r#"{"message": "Service layer bypassed", "solid_violations": ["DIP"]}"#;
        let summary = parse_summary(content).unwrap().unwrap();
        assert_eq!(summary.solid_violations, vec!["DIP".to_string()]);
    }

    #[test]
    fn low_confidence_resolution_stays_open() {
        assert_eq!(
            parse_verdict(r#"{"verdict": "Resolved", "confidence": 0.95}"#).unwrap(),
            FixVerdict::Resolved
        );
        assert_eq!(
            parse_verdict(r#"{"verdict": "Resolved", "confidence": 0.4}"#).unwrap(),
            FixVerdict::Unknown
        );
        assert_eq!(
            parse_verdict(r#"{"verdict": "Resolved"}"#).unwrap(),
            FixVerdict::Unknown
        );
        assert_eq!(
            parse_verdict(r#"{"verdict": "Unresolved", "confidence": 0.9}"#).unwrap(),
            FixVerdict::Unresolved
        );
    }

    #[test]
    fn analysis_prompt_carries_rules_and_regions() {
        let profile = rl_core::plugins::PluginRegistry
            .profile_for_path("Main.java")
            .unwrap();
        let request = AnalysisRequest {
            context: CodeContext {
                language: "java".to_string(),
                path: "/src/Main.java".to_string(),
                line: 10,
                enclosing: Some("class Main".to_string()),
                imports: vec!["java.util.List".to_string()],
                surrounding: Vec::new(),
            },
            content: "int x = list.get(0);".to_string(),
        };
        let prompt = build_analysis_prompt(profile, &[request]);
        assert!(prompt.contains("avoid_null_pointer"));
        assert!(prompt.contains("/src/Main.java"));
        assert!(prompt.contains("class Main"));
    }
}
