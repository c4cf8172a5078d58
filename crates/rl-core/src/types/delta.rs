use crate::types::enums::SliceKind;
use serde::{Deserialize, Serialize};

/// Lines of context carried around every changed range so the analyzer sees
/// the surrounding code.
pub const CONTEXT_BAND: u32 = 3;

/// One changed file inside a [`ChangeDelta`]. Ranges are 1-based, inclusive,
/// expressed against `target_content`, and never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSlice {
    pub path: String,
    pub kind: SliceKind,
    pub line_ranges: Vec<(u32, u32)>,
    pub target_content: String,
}

impl FileSlice {
    pub fn added(path: impl Into<String>, target_content: String) -> Self {
        let lines = count_lines(&target_content);
        Self {
            path: path.into(),
            kind: SliceKind::Added,
            line_ranges: if lines == 0 { Vec::new() } else { vec![(1, lines)] },
            target_content,
        }
    }

    pub fn modified(
        path: impl Into<String>,
        changed: Vec<(u32, u32)>,
        target_content: String,
    ) -> Self {
        let lines = count_lines(&target_content);
        Self {
            path: path.into(),
            kind: SliceKind::Modified,
            line_ranges: merge_ranges(changed, CONTEXT_BAND, lines),
            target_content,
        }
    }

    pub fn contains_line(&self, line: u32) -> bool {
        self.line_ranges
            .iter()
            .any(|&(start, end)| line >= start && line <= end)
    }
}

/// The regions of a PR that are new in the current iteration relative to the
/// last-reviewed one. Deleted files are never present.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangeDelta {
    pub files: Vec<FileSlice>,
}

impl ChangeDelta {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file(&self, path: &str) -> Option<&FileSlice> {
        self.files.iter().find(|slice| slice.path == path)
    }

    pub fn contains(&self, path: &str, line: u32) -> bool {
        self.file(path).is_some_and(|slice| slice.contains_line(line))
    }
}

pub fn count_lines(content: &str) -> u32 {
    content.lines().count() as u32
}

/// Pad each range by `band` lines, clamp to `[1, max_line]`, and merge
/// overlapping or adjacent ranges into one.
pub fn merge_ranges(mut ranges: Vec<(u32, u32)>, band: u32, max_line: u32) -> Vec<(u32, u32)> {
    if max_line == 0 {
        return Vec::new();
    }
    ranges.retain(|&(start, end)| start >= 1 && start <= end);
    ranges.sort_unstable();

    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        let start = start.saturating_sub(band).max(1);
        let end = end.saturating_add(band).min(max_line);
        match merged.last_mut() {
            Some(last) if start <= last.1.saturating_add(1) => {
                last.1 = last.1.max(end);
            }
            _ => merged.push((start, end)),
        }
    }
    merged
}
