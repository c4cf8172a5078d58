//! Duplicate suppression and resolution bookkeeping against the PR's
//! existing comment threads.

use crate::render::MARKER_PREFIX;
use rl_core::types::delta::ChangeDelta;
use rl_core::types::{CommentThread, FindingCategory, LineFinding, ThreadStatus};
use rl_platform::PriorFinding;
use std::collections::HashSet;

/// Identity of a bot thread, recovered from the hidden marker in its first
/// comment. Threads without a marker (human comments) never participate in
/// suppression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub fingerprint: String,
    pub category: FindingCategory,
}

pub fn parse_marker(content: &str) -> Option<Marker> {
    let start = content.find(MARKER_PREFIX)?;
    let rest = &content[start + MARKER_PREFIX.len()..];
    let end = rest.find("-->")?;
    let mut fingerprint = None;
    let mut category = None;
    for token in rest[..end].split_whitespace() {
        if let Some(value) = token.strip_prefix("fp=") {
            fingerprint = Some(value.to_string());
        } else if let Some(value) = token.strip_prefix("cat=") {
            category = parse_category(value);
        }
    }
    Some(Marker {
        fingerprint: fingerprint?,
        category: category?,
    })
}

fn parse_category(value: &str) -> Option<FindingCategory> {
    match value {
        "CodeSmell" => Some(FindingCategory::CodeSmell),
        "Bug" => Some(FindingCategory::Bug),
        "Security" => Some(FindingCategory::Security),
        "BestPractice" => Some(FindingCategory::BestPractice),
        "Architecture" => Some(FindingCategory::Architecture),
        _ => None,
    }
}

/// Paths arrive with and without the platform's leading slash.
pub fn norm_path(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Split `findings` into those safe to post and the count suppressed because
/// an active thread already covers the same `(path, line, category)`.
pub fn filter_new(
    existing: &[CommentThread],
    findings: Vec<LineFinding>,
) -> (Vec<LineFinding>, u32) {
    let active: HashSet<(String, u32, FindingCategory)> = existing
        .iter()
        .filter(|thread| thread.status == ThreadStatus::Active)
        .filter_map(|thread| {
            let marker = parse_marker(&thread.content)?;
            let path = thread.path.as_deref()?;
            let line = thread.line?;
            Some((norm_path(path).to_string(), line, marker.category))
        })
        .collect();

    let mut to_post = Vec::new();
    let mut skipped = 0u32;
    for finding in findings {
        let key = (
            norm_path(&finding.path).to_string(),
            finding.line,
            finding.category,
        );
        if active.contains(&key) {
            skipped += 1;
        } else {
            to_post.push(finding);
        }
    }
    (to_post, skipped)
}

/// Whether a PR-level thread with this fingerprint already exists; keeps a
/// re-published summary from doubling up.
pub fn has_summary(existing: &[CommentThread], fingerprint: &str) -> bool {
    existing
        .iter()
        .filter(|thread| thread.path.is_none())
        .filter_map(|thread| parse_marker(&thread.content))
        .any(|marker| marker.fingerprint == fingerprint)
}

/// A previously posted finding that may have been addressed by the current
/// iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionCandidate {
    pub thread_id: i64,
    pub fingerprint: String,
    pub finding: PriorFinding,
}

/// Active bot threads whose file is part of the current delta and whose
/// fingerprint no longer appears among the new findings.
pub fn resolution_candidates(
    existing: &[CommentThread],
    new_findings: &[LineFinding],
    delta: &ChangeDelta,
) -> Vec<ResolutionCandidate> {
    let still_reported: HashSet<&str> = new_findings
        .iter()
        .map(|finding| finding.fingerprint.as_str())
        .collect();

    existing
        .iter()
        .filter(|thread| thread.status == ThreadStatus::Active)
        .filter_map(|thread| {
            let marker = parse_marker(&thread.content)?;
            let path = thread.path.as_deref()?;
            let line = thread.line?;
            if still_reported.contains(marker.fingerprint.as_str()) {
                return None;
            }
            delta
                .files
                .iter()
                .find(|slice| norm_path(&slice.path) == norm_path(path))?;
            Some(ResolutionCandidate {
                thread_id: thread.thread_id,
                fingerprint: marker.fingerprint.clone(),
                finding: PriorFinding {
                    path: path.to_string(),
                    line,
                    category: marker.category,
                    message: message_text(&thread.content),
                },
            })
        })
        .collect()
}

/// The human-readable part of a bot comment: everything before the marker,
/// minus the heading line.
fn message_text(content: &str) -> String {
    let body = content
        .split(MARKER_PREFIX)
        .next()
        .unwrap_or(content)
        .trim();
    body.lines()
        .filter(|line| !line.trim_start().starts_with("🔴") && !line.trim_start().starts_with("⚠") && !line.trim_start().starts_with("ℹ"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::render_finding;
    use rl_core::types::delta::FileSlice;
    use rl_core::types::Severity;

    fn finding(path: &str, line: u32, category: FindingCategory, message: &str) -> LineFinding {
        LineFinding::new(path, line, Severity::Warning, category, message)
    }

    fn bot_thread(id: i64, finding: &LineFinding, status: ThreadStatus) -> CommentThread {
        CommentThread {
            thread_id: id,
            path: Some(format!("/{}", norm_path(&finding.path))),
            line: Some(finding.line),
            status,
            content: render_finding(finding),
        }
    }

    #[test]
    fn marker_round_trips_through_rendering() {
        let original = finding("/src/A.java", 9, FindingCategory::Security, "raw sql");
        let marker = parse_marker(&render_finding(&original)).unwrap();
        assert_eq!(marker.fingerprint, original.fingerprint);
        assert_eq!(marker.category, FindingCategory::Security);
    }

    #[test]
    fn human_comments_have_no_marker() {
        assert!(parse_marker("just a human note").is_none());
    }

    #[test]
    fn filter_drops_triple_matches_only() {
        let posted = finding("/src/A.java", 5, FindingCategory::Bug, "old message");
        let threads = vec![
            bot_thread(1, &posted, ThreadStatus::Active),
            // Fixed threads do not suppress.
            bot_thread(
                2,
                &finding("/src/A.java", 9, FindingCategory::Bug, "fixed earlier"),
                ThreadStatus::Fixed,
            ),
        ];

        let incoming = vec![
            // Same triple, different wording: still a duplicate.
            finding("src/A.java", 5, FindingCategory::Bug, "new wording"),
            // Same line, different category: posts.
            finding("src/A.java", 5, FindingCategory::CodeSmell, "smelly"),
            // Line of the fixed thread: posts again.
            finding("src/A.java", 9, FindingCategory::Bug, "regressed"),
        ];
        let (to_post, skipped) = filter_new(&threads, incoming);
        assert_eq!(skipped, 1);
        let lines: Vec<(u32, FindingCategory)> = to_post
            .iter()
            .map(|finding| (finding.line, finding.category))
            .collect();
        assert_eq!(
            lines,
            vec![(5, FindingCategory::CodeSmell), (9, FindingCategory::Bug)]
        );
    }

    #[test]
    fn publish_twice_posts_nothing_new() {
        let findings = vec![
            finding("/src/A.java", 5, FindingCategory::Bug, "npe"),
            finding("/src/A.java", 9, FindingCategory::Security, "raw sql"),
        ];
        let threads: Vec<CommentThread> = findings
            .iter()
            .enumerate()
            .map(|(index, f)| bot_thread(index as i64, f, ThreadStatus::Active))
            .collect();

        let (to_post, skipped) = filter_new(&threads, findings);
        assert!(to_post.is_empty());
        assert_eq!(skipped, 2);
    }

    #[test]
    fn resolution_candidates_need_delta_coverage_and_absence() {
        let gone = finding("/src/A.java", 5, FindingCategory::Bug, "npe");
        let still_there = finding("/src/A.java", 9, FindingCategory::Security, "raw sql");
        let off_delta = finding("/src/Other.java", 3, FindingCategory::Bug, "leak");
        let threads = vec![
            bot_thread(1, &gone, ThreadStatus::Active),
            bot_thread(2, &still_there, ThreadStatus::Active),
            bot_thread(3, &off_delta, ThreadStatus::Active),
        ];

        let delta = ChangeDelta {
            files: vec![FileSlice::modified(
                "/src/A.java".to_string(),
                vec![(5, 5)],
                "x\n".repeat(20),
            )],
        };
        // The security finding was reported again this run.
        let new_findings = vec![still_there.clone()];

        let candidates = resolution_candidates(&threads, &new_findings, &delta);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].thread_id, 1);
        assert_eq!(candidates[0].fingerprint, gone.fingerprint);
        assert_eq!(candidates[0].finding.line, 5);
        assert!(candidates[0].finding.message.contains("npe"));
    }
}
