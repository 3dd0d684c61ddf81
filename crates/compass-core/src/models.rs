//! Shared typed models used across indexing, storage, and query layers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// 1. SymbolKind
// ---------------------------------------------------------------------------

/// The kind of a named declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Class,
    Function,
    Method,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "class" => Some(SymbolKind::Class),
            "function" => Some(SymbolKind::Function),
            "method" => Some(SymbolKind::Method),
            _ => None,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// 2. Symbol
// ---------------------------------------------------------------------------

/// One class, function, or method declaration with its rendered signature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub file_path: String,
    /// 1-based, inclusive.
    pub line_start: i64,
    pub line_end: i64,
    pub signature: String,
    /// Enclosing class name, set for methods.
    pub parent: Option<String>,
}

// ---------------------------------------------------------------------------
// 3. ImportSpec
// ---------------------------------------------------------------------------

/// Statement form of an import.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    /// `import a.b`
    Import,
    /// `from a.b import c`
    From,
}

/// One import statement: module token plus relative level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImportSpec {
    /// Dotted module token without leading dots. Empty for `from . import x`.
    pub module: String,
    /// Number of leading dots; 0 for absolute imports.
    pub level: u32,
    pub kind: ImportKind,
    /// Names listed after `import` in a `from` statement, aliases dropped.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    pub line: i64,
    /// First project file this import resolved to, filled by the resolver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
}

impl ImportSpec {
    pub fn absolute(module: impl Into<String>, line: i64) -> Self {
        Self {
            module: module.into(),
            level: 0,
            kind: ImportKind::Import,
            names: Vec::new(),
            line,
            resolved: None,
        }
    }

    pub fn from_import(module: impl Into<String>, level: u32, names: Vec<String>, line: i64) -> Self {
        Self {
            module: module.into(),
            level,
            kind: ImportKind::From,
            names,
            line,
            resolved: None,
        }
    }

    pub fn is_relative(&self) -> bool {
        self.level > 0
    }
}

// ---------------------------------------------------------------------------
// 4. FileRecord
// ---------------------------------------------------------------------------

/// The parsed representation of one source file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Project-relative path with `/` separators; unique key.
    pub path: String,
    pub language: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub symbols: Vec<Symbol>,
    pub imports: Vec<ImportSpec>,
    /// Set when the content could not be parsed; symbols and imports are then empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl FileRecord {
    /// A record carrying no facts, only a diagnostic marker.
    pub fn failed(
        path: impl Into<String>,
        language: impl Into<String>,
        content_hash: impl Into<String>,
        size_bytes: i64,
        diagnostic: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            language: language.into(),
            content_hash: content_hash.into(),
            size_bytes,
            symbols: Vec::new(),
            imports: Vec::new(),
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.diagnostic.is_some()
    }
}

// ---------------------------------------------------------------------------
// 5. StoreStats
// ---------------------------------------------------------------------------

/// Aggregate counts over the persisted index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_files: i64,
    pub total_symbols: i64,
    pub total_edges: i64,
    /// File count per language tag.
    pub by_language: BTreeMap<String, i64>,
    /// Symbol count per kind (`class`, `function`, `method`).
    pub by_kind: BTreeMap<String, i64>,
}
