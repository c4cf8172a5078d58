use crate::types::enums::{FindingCategory, Severity};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

/// Inline review finding, anchored to one line of the new file content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LineFinding {
    pub path: String,
    pub line: u32,
    pub severity: Severity,
    pub category: FindingCategory,
    pub message: String,
    pub suggestion: Option<String>,
    pub example: Option<String>,
    /// Duplicate-suppression key; see [`fingerprint`].
    pub fingerprint: String,
}

impl LineFinding {
    pub fn new(
        path: impl Into<String>,
        line: u32,
        severity: Severity,
        category: FindingCategory,
        message: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let message = message.into();
        let fingerprint = fingerprint(&path, line, category, &message);
        Self {
            path,
            line,
            severity,
            category,
            message,
            suggestion: None,
            example: None,
            fingerprint,
        }
    }
}

/// Architectural summary for the whole delta; at most one per run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct SummaryFinding {
    pub message: String,
    #[serde(default)]
    pub solid_violations: Vec<String>,
    #[serde(default)]
    pub identified_patterns: Vec<String>,
    #[serde(default)]
    pub suggested_patterns: Vec<String>,
    #[serde(default)]
    pub architectural_issues: Vec<String>,
}

/// Stable hash of `(path, line, category, normalized message)`. Two findings
/// with the same fingerprint describe the same issue, regardless of which
/// run produced them.
pub fn fingerprint(path: &str, line: u32, category: FindingCategory, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update([0]);
    hasher.update(line.to_le_bytes());
    hasher.update([0]);
    hasher.update(format!("{category:?}").as_bytes());
    hasher.update([0]);
    hasher.update(normalize_message(message).as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Case- and whitespace-insensitive message form, so cosmetic rephrasings by
/// the analyzer do not defeat duplicate suppression.
fn normalize_message(message: &str) -> String {
    message
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_whitespace_and_case() {
        let a = fingerprint("src/A.java", 10, FindingCategory::Bug, "Possible  NULL deref");
        let b = fingerprint("src/A.java", 10, FindingCategory::Bug, "possible null\nderef");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_varies_by_anchor() {
        let base = fingerprint("src/A.java", 10, FindingCategory::Bug, "possible null deref");
        assert_ne!(
            base,
            fingerprint("src/B.java", 10, FindingCategory::Bug, "possible null deref")
        );
        assert_ne!(
            base,
            fingerprint("src/A.java", 11, FindingCategory::Bug, "possible null deref")
        );
        assert_ne!(
            base,
            fingerprint(
                "src/A.java",
                10,
                FindingCategory::CodeSmell,
                "possible null deref"
            )
        );
    }

    #[test]
    fn new_computes_fingerprint() {
        let finding = LineFinding::new(
            "src/A.java",
            3,
            Severity::Warning,
            FindingCategory::Security,
            "unsanitized input",
        );
        assert_eq!(
            finding.fingerprint,
            fingerprint("src/A.java", 3, FindingCategory::Security, "unsanitized input")
        );
    }
}
