use serde::{Deserialize, Serialize};

/// Structural sketch of one source file: imports plus the spans of its
/// top-level and nested definitions. Enough to anchor analyzer context;
/// deliberately not a full syntax tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceOutline {
    pub language: String,
    pub imports: Vec<String>,
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    pub kind: DefinitionKind,
    /// 1-based, inclusive.
    pub start_line: u32,
    pub end_line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DefinitionKind {
    Type,
    Function,
}

impl SourceOutline {
    /// Innermost definition whose span covers `line`.
    pub fn enclosing(&self, line: u32) -> Option<&Definition> {
        self.definitions
            .iter()
            .filter(|def| def.start_line <= line && line <= def.end_line)
            .min_by_key(|def| def.end_line - def.start_line)
    }

    /// One-line digest used by the architectural analyzer.
    pub fn summary(&self) -> String {
        let types = self
            .definitions
            .iter()
            .filter(|d| d.kind == DefinitionKind::Type)
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let functions = self
            .definitions
            .iter()
            .filter(|d| d.kind == DefinitionKind::Function)
            .count();
        format!(
            "{} types [{}], {} functions, {} imports",
            self.definitions
                .iter()
                .filter(|d| d.kind == DefinitionKind::Type)
                .count(),
            types,
            functions,
            self.imports.len()
        )
    }
}

/// Context handed to the analyzer for one changed region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeContext {
    pub language: String,
    pub path: String,
    /// First line of the region, 1-based.
    pub line: u32,
    pub enclosing: Option<String>,
    pub imports: Vec<String>,
    pub surrounding: Vec<String>,
}
