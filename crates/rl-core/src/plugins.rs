//! Per-extension language profiles: a pure lookup from file extension to the
//! rule set and prompt material the analyzer is driven with. No behavior
//! lives here beyond the lookup itself.

use crate::types::enums::{FindingCategory, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisRule {
    pub name: &'static str,
    pub category: FindingCategory,
    pub severity: Severity,
    pub guidance: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageProfile {
    pub language: &'static str,
    pub extensions: &'static [&'static str],
    /// Lines of surrounding code included in each analyzer request.
    pub context_lines: u32,
    pub system_prompt: &'static str,
    pub rules: &'static [AnalysisRule],
}

static JAVA_RULES: &[AnalysisRule] = &[
    AnalysisRule {
        name: "avoid_null_pointer",
        category: FindingCategory::Bug,
        severity: Severity::Error,
        guidance: "Flag dereferences of values that can be null on this path; prefer Optional or an explicit null check.",
    },
    AnalysisRule {
        name: "resource_leak",
        category: FindingCategory::Bug,
        severity: Severity::Warning,
        guidance: "Flag Closeable/AutoCloseable resources not managed by try-with-resources.",
    },
    AnalysisRule {
        name: "exception_handling",
        category: FindingCategory::BestPractice,
        severity: Severity::Warning,
        guidance: "Flag empty catch blocks, catch of bare Exception/Throwable, and swallowed interrupts.",
    },
    AnalysisRule {
        name: "injection",
        category: FindingCategory::Security,
        severity: Severity::Error,
        guidance: "Flag SQL or command strings built by concatenating untrusted input.",
    },
    AnalysisRule {
        name: "naming_conventions",
        category: FindingCategory::BestPractice,
        severity: Severity::Info,
        guidance: "Flag identifiers that break Java naming conventions.",
    },
    AnalysisRule {
        name: "code_complexity",
        category: FindingCategory::CodeSmell,
        severity: Severity::Warning,
        guidance: "Flag deeply nested or branch-heavy code that should be decomposed.",
    },
    AnalysisRule {
        name: "magic_numbers",
        category: FindingCategory::BestPractice,
        severity: Severity::Info,
        guidance: "Flag unexplained numeric literals outside trivial cases.",
    },
    AnalysisRule {
        name: "long_methods",
        category: FindingCategory::CodeSmell,
        severity: Severity::Warning,
        guidance: "Flag methods long enough to obscure their single responsibility.",
    },
];

static TYPESCRIPT_RULES: &[AnalysisRule] = &[
    AnalysisRule {
        name: "unsubscribe_observables",
        category: FindingCategory::Bug,
        severity: Severity::Warning,
        guidance: "Flag subscriptions without a matching unsubscribe, takeUntil or async pipe.",
    },
    AnalysisRule {
        name: "change_detection_performance",
        category: FindingCategory::CodeSmell,
        severity: Severity::Warning,
        guidance: "Flag work in templates or bindings that runs on every change-detection cycle.",
    },
    AnalysisRule {
        name: "dependency_injection",
        category: FindingCategory::BestPractice,
        severity: Severity::Warning,
        guidance: "Flag manual construction of injectable services.",
    },
    AnalysisRule {
        name: "rxjs_best_practices",
        category: FindingCategory::BestPractice,
        severity: Severity::Info,
        guidance: "Flag nested subscribes and missing error handling in observable chains.",
    },
    AnalysisRule {
        name: "memory_leaks",
        category: FindingCategory::Bug,
        severity: Severity::Warning,
        guidance: "Flag event listeners, timers or detached DOM references kept past component destruction.",
    },
    AnalysisRule {
        name: "strict_typing",
        category: FindingCategory::CodeSmell,
        severity: Severity::Info,
        guidance: "Flag any-typed values and unchecked casts where a concrete type is available.",
    },
];

static JAVA: LanguageProfile = LanguageProfile {
    language: "java",
    extensions: &[".java"],
    context_lines: 8,
    system_prompt: "You review Java changes in a pull request. Judge only the lines you are shown, \
                    in their given context. Report real, actionable problems; do not restate style \
                    that a formatter enforces.",
    rules: JAVA_RULES,
};

static TYPESCRIPT: LanguageProfile = LanguageProfile {
    language: "typescript",
    extensions: &[".ts", ".tsx"],
    context_lines: 8,
    system_prompt: "You review TypeScript/Angular changes in a pull request. Judge only the lines \
                    you are shown, in their given context. Report real, actionable problems; do \
                    not restate style that a linter enforces.",
    rules: TYPESCRIPT_RULES,
};

static PROFILES: &[&LanguageProfile] = &[&JAVA, &TYPESCRIPT];

const BINARY_EXTENSIONS: &[&str] = &[
    ".png", ".jpg", ".jpeg", ".gif", ".bmp", ".ico", ".svg", ".pdf", ".zip", ".tar", ".gz",
    ".rar", ".7z", ".exe", ".dll", ".so", ".dylib", ".class", ".jar", ".war", ".woff", ".woff2",
    ".ttf", ".eot",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct PluginRegistry;

impl PluginRegistry {
    pub fn profile_for_path(&self, path: &str) -> Option<&'static LanguageProfile> {
        let lower = path.to_lowercase();
        PROFILES
            .iter()
            .copied()
            .find(|profile| profile.extensions.iter().any(|ext| lower.ends_with(ext)))
    }

    pub fn is_binary(&self, path: &str) -> bool {
        let lower = path.to_lowercase();
        BINARY_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
    }

    pub fn languages(&self) -> Vec<&'static str> {
        PROFILES.iter().map(|profile| profile.language).collect()
    }
}
