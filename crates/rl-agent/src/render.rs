//! Markdown rendering for platform comments. Every bot comment carries a
//! hidden marker so later runs can recognize their own threads.

use rl_core::types::{FindingCategory, LineFinding, Severity, SummaryFinding};

pub const MARKER_PREFIX: &str = "<!-- redline";

pub fn render_finding(finding: &LineFinding) -> String {
    let mut parts = vec![
        format!(
            "{} **{}**",
            severity_marker(finding.severity),
            category_label(finding.category)
        ),
        String::new(),
        finding.message.clone(),
    ];
    if let Some(suggestion) = &finding.suggestion {
        parts.push(String::new());
        parts.push("**Suggestion:**".to_string());
        parts.push(suggestion.clone());
    }
    if let Some(example) = &finding.example {
        parts.push(String::new());
        parts.push("**Example:**".to_string());
        parts.push(format!("```\n{example}\n```"));
    }
    parts.push(String::new());
    parts.push(marker(&finding.fingerprint, finding.category));
    parts.join("\n")
}

pub fn render_summary(summary: &SummaryFinding) -> String {
    let mut parts = vec!["## Review summary".to_string(), String::new(), summary.message.clone()];
    push_section(&mut parts, "SOLID violations", &summary.solid_violations);
    push_section(&mut parts, "Patterns identified", &summary.identified_patterns);
    push_section(&mut parts, "Patterns to consider", &summary.suggested_patterns);
    push_section(&mut parts, "Architectural issues", &summary.architectural_issues);
    parts.push(String::new());
    parts.push(marker(&summary_fingerprint(summary), FindingCategory::Architecture));
    parts.join("\n")
}

/// Summaries are deduplicated by their message, anchored to no line.
pub fn summary_fingerprint(summary: &SummaryFinding) -> String {
    rl_core::types::finding::fingerprint("", 0, FindingCategory::Architecture, &summary.message)
}

pub fn resolution_reply() -> String {
    "The latest iteration appears to address this; marking the thread as fixed.".to_string()
}

pub fn marker(fingerprint: &str, category: FindingCategory) -> String {
    format!("{MARKER_PREFIX} fp={fingerprint} cat={category:?} -->")
}

fn push_section(parts: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    parts.push(String::new());
    parts.push(format!("**{title}:**"));
    for item in items {
        parts.push(format!("- {item}"));
    }
}

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "🔴",
        Severity::Warning => "⚠️",
        Severity::Info => "ℹ️",
    }
}

fn category_label(category: FindingCategory) -> &'static str {
    match category {
        FindingCategory::CodeSmell => "Code Smell",
        FindingCategory::Bug => "Potential Bug",
        FindingCategory::Security => "Security Issue",
        FindingCategory::BestPractice => "Best Practice",
        FindingCategory::Architecture => "Architecture",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finding_renders_sections_and_marker() {
        let mut finding = LineFinding::new(
            "/src/Main.java",
            12,
            Severity::Error,
            FindingCategory::Bug,
            "possible null dereference",
        );
        finding.suggestion = Some("guard against null".to_string());
        finding.example = Some("if (x != null) { ... }".to_string());

        let rendered = render_finding(&finding);
        assert!(rendered.contains("**Potential Bug**"));
        assert!(rendered.contains("possible null dereference"));
        assert!(rendered.contains("**Suggestion:**"));
        assert!(rendered.contains("```"));
        assert!(rendered.contains(&finding.fingerprint));
        assert!(rendered.contains("cat=Bug"));
    }

    #[test]
    fn summary_omits_empty_sections() {
        let summary = SummaryFinding {
            message: "Clean change overall.".to_string(),
            ..SummaryFinding::default()
        };
        let rendered = render_summary(&summary);
        assert!(rendered.contains("Clean change overall."));
        assert!(!rendered.contains("SOLID violations"));
        assert!(rendered.contains(&summary_fingerprint(&summary)));
    }
}
