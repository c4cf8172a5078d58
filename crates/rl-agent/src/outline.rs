//! Line-oriented structural sketches of changed files. A brace-depth scan
//! (aware of strings and comments) is enough to anchor analyzer context; it
//! does not try to be a parser. Source whose braces do not balance is
//! reported as a parse failure rather than guessed at.

use rl_core::plugins::LanguageProfile;
use rl_core::types::{CodeContext, Definition, DefinitionKind, SourceOutline};
use thiserror::Error;

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "else", "for", "while", "switch", "catch", "try", "do", "return", "new", "throw",
    "synchronized",
];

const TYPE_KEYWORDS: &[&str] = &["class", "interface", "enum", "record"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OutlineError {
    #[error("unexpected closing brace at line {line}")]
    UnexpectedClose { line: u32 },
    #[error("{open} unclosed brace(s) at end of file")]
    UnbalancedBraces { open: u32 },
}

/// Lexical state carried across lines while scanning for braces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Code,
    Str(char),
    BlockComment,
}

enum BraceEvent {
    Open,
    Close,
}

pub fn outline(profile: &LanguageProfile, content: &str) -> Result<SourceOutline, OutlineError> {
    let mut result = SourceOutline {
        language: profile.language.to_string(),
        imports: Vec::new(),
        definitions: Vec::new(),
    };

    // Stack of (definition index, brace depth at which it closes).
    let mut open: Vec<(usize, u32)> = Vec::new();
    let mut pending: Option<usize> = None;
    let mut depth: u32 = 0;
    let mut lex = Lex::Code;
    let total_lines = content.lines().count() as u32;

    for (index, line) in content.lines().enumerate() {
        let line_no = index as u32 + 1;
        let trimmed = line.trim();
        let in_comment = lex == Lex::BlockComment;

        if !in_comment {
            if let Some(import) = parse_import(trimmed) {
                result.imports.push(import);
                continue;
            }
            if let Some(definition) = detect_definition(trimmed, line_no, total_lines) {
                result.definitions.push(definition);
                pending = Some(result.definitions.len() - 1);
            }
        }

        let (events, next_lex) = scan_line(line, lex);
        lex = next_lex;
        for event in events {
            match event {
                BraceEvent::Open => {
                    depth += 1;
                    if let Some(def_index) = pending.take() {
                        open.push((def_index, depth));
                    }
                }
                BraceEvent::Close => {
                    if depth == 0 {
                        return Err(OutlineError::UnexpectedClose { line: line_no });
                    }
                    if let Some(&(def_index, close_depth)) = open.last() {
                        if close_depth == depth {
                            result.definitions[def_index].end_line = line_no;
                            open.pop();
                        }
                    }
                    depth -= 1;
                }
            }
        }

        // A declaration that never opened a body (interface members and the
        // like) collapses to its own line.
        if let Some(def_index) = pending.take() {
            if trimmed.ends_with(';') {
                result.definitions[def_index].end_line = line_no;
            } else {
                pending = Some(def_index);
            }
        }
    }

    if depth > 0 {
        return Err(OutlineError::UnbalancedBraces { open: depth });
    }
    Ok(result)
}

/// Brace events on one line, skipping string literals and comments. Plain
/// string literals end at the newline; template literals and block comments
/// carry their state into the next line.
fn scan_line(line: &str, mut lex: Lex) -> (Vec<BraceEvent>, Lex) {
    let mut events = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match lex {
            Lex::Code => match ch {
                '"' | '\'' | '`' => lex = Lex::Str(ch),
                '/' => match chars.peek() {
                    Some('/') => break,
                    Some('*') => {
                        chars.next();
                        lex = Lex::BlockComment;
                    }
                    _ => {}
                },
                '{' => events.push(BraceEvent::Open),
                '}' => events.push(BraceEvent::Close),
                _ => {}
            },
            Lex::Str(delim) => match ch {
                '\\' => {
                    chars.next();
                }
                _ if ch == delim => lex = Lex::Code,
                _ => {}
            },
            Lex::BlockComment => {
                if ch == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    lex = Lex::Code;
                }
            }
        }
    }
    if let Lex::Str(delim) = lex {
        if delim != '`' {
            lex = Lex::Code;
        }
    }
    (events, lex)
}

/// Analyzer context for one changed range: enclosing definition, imports and
/// up to `lead` lines before the range.
pub fn context_for_range(
    outline: &SourceOutline,
    path: &str,
    content: &str,
    start: u32,
    lead: u32,
) -> CodeContext {
    let lines: Vec<&str> = content.lines().collect();
    let from = start.saturating_sub(lead + 1) as usize;
    let to = start.saturating_sub(1) as usize;
    let surrounding = lines
        .get(from..to.min(lines.len()))
        .unwrap_or_default()
        .iter()
        .map(|line| (*line).to_string())
        .collect();

    CodeContext {
        language: outline.language.clone(),
        path: path.to_string(),
        line: start,
        enclosing: outline
            .enclosing(start)
            .map(|def| format!("{} {}", format!("{:?}", def.kind).to_lowercase(), def.name)),
        imports: outline.imports.clone(),
        surrounding,
    }
}

/// Slice the lines of an inclusive 1-based range out of `content`.
pub fn range_text(content: &str, start: u32, end: u32) -> String {
    content
        .lines()
        .skip(start.saturating_sub(1) as usize)
        .take((end.saturating_sub(start) + 1) as usize)
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_import(trimmed: &str) -> Option<String> {
    let rest = trimmed.strip_prefix("import ")?;
    Some(rest.trim_end_matches(';').trim().to_string())
}

fn detect_definition(trimmed: &str, line_no: u32, total_lines: u32) -> Option<Definition> {
    if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with('*') {
        return None;
    }

    let tokens: Vec<&str> = trimmed.split_whitespace().collect();
    for (index, token) in tokens.iter().enumerate() {
        if TYPE_KEYWORDS.contains(token) {
            let name = tokens.get(index + 1)?;
            let name = name
                .split(['<', '{', '(', ':'])
                .next()
                .unwrap_or(name)
                .to_string();
            if name.is_empty() {
                return None;
            }
            return Some(Definition {
                name,
                kind: DefinitionKind::Type,
                start_line: line_no,
                end_line: total_lines,
            });
        }
    }

    detect_function(trimmed, &tokens, line_no, total_lines)
}

fn detect_function(
    trimmed: &str,
    tokens: &[&str],
    line_no: u32,
    total_lines: u32,
) -> Option<Definition> {
    // `function name(...)` and arrow assignments first.
    if let Some(index) = tokens.iter().position(|token| *token == "function") {
        let name = tokens.get(index + 1)?.split('(').next()?.to_string();
        if !name.is_empty() {
            return Some(function_def(name, line_no, total_lines));
        }
    }
    if trimmed.contains("=>") && trimmed.contains('=') {
        let name = trimmed
            .split('=')
            .next()?
            .split_whitespace()
            .last()?
            .split(':')
            .next()?
            .to_string();
        if is_identifier(&name) {
            return Some(function_def(name, line_no, total_lines));
        }
    }

    // `ReturnType name(args) {` / `name(args) {` method shapes. Assignments
    // and control flow are not declarations.
    let paren = trimmed.find('(')?;
    if !trimmed.contains(')') {
        return None;
    }
    let head = &trimmed[..paren];
    if head.contains('=') {
        return None;
    }
    let name = head.split_whitespace().last()?.to_string();
    if !is_identifier(&name) || CONTROL_KEYWORDS.contains(&name.as_str()) {
        return None;
    }
    let opens_body = trimmed.ends_with('{') || trimmed.ends_with(';');
    if !opens_body {
        return None;
    }
    Some(function_def(name, line_no, total_lines))
}

fn function_def(name: String, line_no: u32, total_lines: u32) -> Definition {
    Definition {
        name,
        kind: DefinitionKind::Function,
        start_line: line_no,
        end_line: total_lines,
    }
}

fn is_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '$')
        && !value.chars().next().unwrap_or('0').is_numeric()
}
