//! Symbol and import extraction from Python source.
//!
//! Walks the tree-sitter syntax tree at declaration level only: the module
//! body, class bodies, and the blocks of compound statements. Function bodies
//! are never entered; a definition contributes its rendered signature, not
//! its implementation.
//!
//! Malformed input never produces an error. Content that fails to decode or
//! parse yields a `FileRecord` with empty symbol and import lists and a
//! diagnostic marker.

use tree_sitter::Node;

use crate::indexer::filesystem::{content_hash, detect_language, normalize_relative_path};
use crate::indexer::parser::{first_error_line, is_supported, parse_source};
use crate::models::{FileRecord, ImportSpec, Symbol, SymbolKind};

/// Placeholder for annotation shapes that are not rendered.
pub const ANNOTATION_PLACEHOLDER: &str = "Any";

/// Placeholder for default values that are not literals, names or containers.
pub const DEFAULT_PLACEHOLDER: &str = "...";

const MAX_ANNOTATION_DEPTH: usize = 32;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Result of parsing one file, with the node kinds the traversal did not
/// recognise.
#[derive(Clone, Debug)]
pub struct SourceParse {
    pub record: FileRecord,
    pub unsupported: Vec<String>,
}

/// Parse raw file content into a `FileRecord`. Never fails.
pub fn extract_file_record(path: &str, content: &[u8]) -> FileRecord {
    parse_file(path, content).record
}

/// Parse raw file content, also reporting unsupported declaration-level nodes.
pub fn parse_file(path: &str, content: &[u8]) -> SourceParse {
    let path = normalize_relative_path(path);
    let language = detect_language(&path).unwrap_or_else(|| "unknown".to_string());
    let hash = content_hash(content);
    let size_bytes = content.len() as i64;

    let failed = |diagnostic: String| SourceParse {
        record: FileRecord::failed(&path, &language, &hash, size_bytes, diagnostic),
        unsupported: Vec::new(),
    };

    if !is_supported(&language) {
        return failed(format!("no symbol extractor for language: {language}"));
    }

    let source = content.strip_prefix(UTF8_BOM).unwrap_or(content);
    if let Err(e) = std::str::from_utf8(source) {
        return failed(format!("invalid utf-8: {e}"));
    }

    let tree = match parse_source(source, &language) {
        Ok(tree) => tree,
        Err(e) => return failed(e.to_string()),
    };
    if let Some(line) = first_error_line(&tree) {
        return failed(format!("syntax error at line {line}"));
    }

    let extractor = Extractor {
        source,
        path: &path,
    };
    let mut out = Extraction::default();
    extractor.visit_block(tree.root_node(), Scope::default(), &mut out);

    SourceParse {
        record: FileRecord {
            path: path.clone(),
            language,
            content_hash: hash,
            size_bytes,
            symbols: out.symbols,
            imports: out.imports,
            diagnostic: None,
        },
        unsupported: out.unsupported.into_iter().map(str::to_string).collect(),
    }
}

// ---------------------------------------------------------------------------
// Node classification
// ---------------------------------------------------------------------------

/// Declaration-level view of a syntax node.
#[derive(Debug)]
pub(crate) enum DeclNode<'t> {
    Class(Node<'t>),
    Function(Node<'t>),
    Decorated(Node<'t>),
    Import(Node<'t>),
    ImportFrom(Node<'t>),
    FutureImport(Node<'t>),
    /// Holds nested blocks that may contain declarations.
    Compound(Node<'t>),
    /// A simple statement with nothing to index.
    Statement,
    Unsupported(&'static str),
}

pub(crate) fn classify(node: Node<'_>) -> DeclNode<'_> {
    match node.kind() {
        "class_definition" => DeclNode::Class(node),
        "function_definition" => DeclNode::Function(node),
        "decorated_definition" => DeclNode::Decorated(node),
        "import_statement" => DeclNode::Import(node),
        "import_from_statement" => DeclNode::ImportFrom(node),
        "future_import_statement" => DeclNode::FutureImport(node),
        "block" | "if_statement" | "elif_clause" | "else_clause" | "for_statement"
        | "while_statement" | "try_statement" | "except_clause" | "except_group_clause"
        | "finally_clause" | "with_statement" | "match_statement" | "case_clause" => {
            DeclNode::Compound(node)
        }
        "expression_statement" | "pass_statement" | "return_statement" | "delete_statement"
        | "raise_statement" | "global_statement" | "nonlocal_statement" | "assert_statement"
        | "break_statement" | "continue_statement" | "type_alias_statement" | "comment" => {
            DeclNode::Statement
        }
        other => DeclNode::Unsupported(other),
    }
}

fn is_nested_block(kind: &str) -> bool {
    matches!(
        kind,
        "block"
            | "elif_clause"
            | "else_clause"
            | "except_clause"
            | "except_group_clause"
            | "finally_clause"
            | "case_clause"
    )
}

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

/// Traversal context threaded through every recursive call.
#[derive(Clone, Debug, Default, PartialEq)]
struct Scope {
    enclosing_class: Option<String>,
}

impl Scope {
    fn within_class(name: &str) -> Self {
        Self {
            enclosing_class: Some(name.to_string()),
        }
    }
}

#[derive(Default)]
struct Extraction {
    symbols: Vec<Symbol>,
    imports: Vec<ImportSpec>,
    unsupported: Vec<&'static str>,
}

struct Extractor<'a> {
    source: &'a [u8],
    path: &'a str,
}

impl<'a> Extractor<'a> {
    fn visit(&self, node: Node<'_>, scope: Scope, out: &mut Extraction) -> Scope {
        match classify(node) {
            DeclNode::Class(n) => self.visit_class(n, Vec::new(), scope, out),
            DeclNode::Function(n) => self.visit_function(n, Vec::new(), scope, out),
            DeclNode::Decorated(n) => self.visit_decorated(n, scope, out),
            DeclNode::Import(n) => {
                self.collect_import(n, out);
                scope
            }
            DeclNode::ImportFrom(n) => {
                self.collect_import_from(n, out);
                scope
            }
            DeclNode::FutureImport(n) => {
                let names = self.imported_names(n);
                out.imports
                    .push(ImportSpec::from_import("__future__", 0, names, line_of(n)));
                scope
            }
            DeclNode::Compound(n) => self.visit_compound(n, scope, out),
            DeclNode::Statement => scope,
            DeclNode::Unsupported(kind) => {
                out.unsupported.push(kind);
                scope
            }
        }
    }

    /// Visit every statement of a block, threading the scope through siblings.
    fn visit_block(&self, block: Node<'_>, scope: Scope, out: &mut Extraction) -> Scope {
        let mut cursor = block.walk();
        let children: Vec<Node<'_>> = block.named_children(&mut cursor).collect();
        children
            .into_iter()
            .fold(scope, |scope, child| self.visit(child, scope, out))
    }

    fn visit_compound(&self, node: Node<'_>, scope: Scope, out: &mut Extraction) -> Scope {
        if node.kind() == "block" {
            return self.visit_block(node, scope, out);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        children
            .into_iter()
            .filter(|child| is_nested_block(child.kind()))
            .fold(scope, |scope, child| self.visit(child, scope, out))
    }

    fn visit_decorated(&self, node: Node<'_>, scope: Scope, out: &mut Extraction) -> Scope {
        let mut cursor = node.walk();
        let decorators: Vec<String> = node
            .named_children(&mut cursor)
            .filter(|child| child.kind() == "decorator")
            .map(|decorator| self.render_decorator(decorator))
            .collect();

        match node.child_by_field_name("definition").map(classify) {
            Some(DeclNode::Class(def)) => self.visit_class(def, decorators, scope, out),
            Some(DeclNode::Function(def)) => self.visit_function(def, decorators, scope, out),
            Some(_) | None => {
                out.unsupported.push(node.kind());
                scope
            }
        }
    }

    fn visit_class(
        &self,
        node: Node<'_>,
        decorators: Vec<String>,
        scope: Scope,
        out: &mut Extraction,
    ) -> Scope {
        let Some(name) = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
        else {
            return scope;
        };

        let mut signature = decorator_prefix(&decorators);
        signature.push_str("class ");
        signature.push_str(&name);
        if let Some(type_params) = node.child_by_field_name("type_parameters") {
            signature.push_str(&collapse_whitespace(self.text(type_params)));
        }
        let bases = node
            .child_by_field_name("superclasses")
            .map(|args| self.render_bases(args))
            .unwrap_or_default();
        if !bases.is_empty() {
            signature.push('(');
            signature.push_str(&bases.join(", "));
            signature.push(')');
        }
        signature.push(':');

        out.symbols.push(self.symbol(node, &name, SymbolKind::Class, signature, None));

        if let Some(body) = node.child_by_field_name("body") {
            // Methods see this class; the caller's scope is restored on return.
            self.visit_block(body, Scope::within_class(&name), out);
        }
        scope
    }

    fn visit_function(
        &self,
        node: Node<'_>,
        decorators: Vec<String>,
        scope: Scope,
        out: &mut Extraction,
    ) -> Scope {
        let Some(name) = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
        else {
            return scope;
        };

        let is_async = node.child(0).is_some_and(|first| first.kind() == "async");

        let mut signature = decorator_prefix(&decorators);
        if is_async {
            signature.push_str("async ");
        }
        signature.push_str("def ");
        signature.push_str(&name);
        if let Some(type_params) = node.child_by_field_name("type_parameters") {
            signature.push_str(&collapse_whitespace(self.text(type_params)));
        }
        signature.push('(');
        if let Some(params) = node.child_by_field_name("parameters") {
            signature.push_str(&self.render_parameters(params).join(", "));
        }
        signature.push(')');
        if let Some(return_type) = node.child_by_field_name("return_type") {
            signature.push_str(" -> ");
            signature.push_str(&self.render_annotation(return_type, 0));
        }
        signature.push(':');

        let (kind, parent) = match &scope.enclosing_class {
            Some(class_name) => (SymbolKind::Method, Some(class_name.clone())),
            None => (SymbolKind::Function, None),
        };
        out.symbols.push(self.symbol(node, &name, kind, signature, parent));
        scope
    }

    fn symbol(
        &self,
        node: Node<'_>,
        name: &str,
        kind: SymbolKind,
        signature: String,
        parent: Option<String>,
    ) -> Symbol {
        let line_start = line_of(node);
        let line_end = (node.end_position().row as i64 + 1).max(line_start);
        Symbol {
            name: name.to_string(),
            kind,
            file_path: self.path.to_string(),
            line_start,
            line_end,
            signature,
            parent,
        }
    }

    // -- imports ------------------------------------------------------------

    fn collect_import(&self, node: Node<'_>, out: &mut Extraction) {
        let line = line_of(node);
        let mut cursor = node.walk();
        let modules: Vec<String> = node
            .children_by_field_name("name", &mut cursor)
            .filter_map(|child| self.imported_module(child))
            .collect();
        for module in modules {
            out.imports.push(ImportSpec::absolute(module, line));
        }
    }

    fn collect_import_from(&self, node: Node<'_>, out: &mut Extraction) {
        let (module, level) = match node.child_by_field_name("module_name") {
            Some(m) if m.kind() == "relative_import" => self.relative_module(m),
            Some(m) => (strip_whitespace(self.text(m)), 0),
            None => (String::new(), 0),
        };
        let names = self.imported_names(node);
        out.imports
            .push(ImportSpec::from_import(module, level, names, line_of(node)));
    }

    /// `(module, level)` for a `relative_import` node such as `..pkg.mod`.
    fn relative_module(&self, node: Node<'_>) -> (String, u32) {
        let mut level = 0u32;
        let mut module = String::new();
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "import_prefix" => {
                    level += self.text(child).chars().filter(|c| *c == '.').count() as u32;
                }
                "dotted_name" => module = strip_whitespace(self.text(child)),
                _ => {}
            }
        }
        (module, level)
    }

    fn imported_names(&self, node: Node<'_>) -> Vec<String> {
        let mut cursor = node.walk();
        let names: Vec<String> = node
            .children_by_field_name("name", &mut cursor)
            .filter_map(|child| self.imported_module(child))
            .collect();
        names
    }

    /// Dotted name of an import list entry, dropping any `as` alias.
    fn imported_module(&self, node: Node<'_>) -> Option<String> {
        let target = match node.kind() {
            "aliased_import" => node.child_by_field_name("name")?,
            "dotted_name" | "identifier" => node,
            _ => return None,
        };
        let name = strip_whitespace(self.text(target));
        (!name.is_empty()).then_some(name)
    }

    // -- rendering ----------------------------------------------------------

    fn render_decorator(&self, node: Node<'_>) -> String {
        let expression = node
            .named_child(0)
            .map(|expr| collapse_whitespace(self.text(expr)))
            .unwrap_or_default();
        format!("@{expression}")
    }

    fn render_bases(&self, args: Node<'_>) -> Vec<String> {
        let mut cursor = args.walk();
        let children: Vec<Node<'_>> = args.named_children(&mut cursor).collect();
        children
            .into_iter()
            .filter(|child| child.kind() != "comment")
            .map(|child| match child.kind() {
                "keyword_argument" => {
                    let key = child
                        .child_by_field_name("name")
                        .map(|n| self.text(n).to_string())
                        .unwrap_or_default();
                    let value = child
                        .child_by_field_name("value")
                        .map(|v| self.render_annotation(v, 0))
                        .unwrap_or_else(|| ANNOTATION_PLACEHOLDER.to_string());
                    format!("{key}={value}")
                }
                "call" | "list_splat" | "dictionary_splat" => {
                    collapse_whitespace(self.text(child))
                }
                _ => self.render_annotation(child, 0),
            })
            .collect()
    }

    fn render_parameters(&self, params: Node<'_>) -> Vec<String> {
        let mut cursor = params.walk();
        let children: Vec<Node<'_>> = params.named_children(&mut cursor).collect();
        children
            .into_iter()
            .filter(|child| child.kind() != "comment")
            .map(|child| self.render_parameter(child))
            .collect()
    }

    fn render_parameter(&self, node: Node<'_>) -> String {
        match node.kind() {
            "identifier" => self.text(node).to_string(),
            "typed_parameter" => {
                let name = node
                    .named_child(0)
                    .map(|n| self.render_parameter_name(n))
                    .unwrap_or_default();
                match node.child_by_field_name("type") {
                    Some(ty) => format!("{name}: {}", self.render_annotation(ty, 0)),
                    None => name,
                }
            }
            "default_parameter" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| self.render_parameter_name(n))
                    .unwrap_or_default();
                let value = node
                    .child_by_field_name("value")
                    .map(|v| self.render_default(v))
                    .unwrap_or_else(|| DEFAULT_PLACEHOLDER.to_string());
                format!("{name}={value}")
            }
            "typed_default_parameter" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| self.render_parameter_name(n))
                    .unwrap_or_default();
                let ty = node
                    .child_by_field_name("type")
                    .map(|t| self.render_annotation(t, 0))
                    .unwrap_or_else(|| ANNOTATION_PLACEHOLDER.to_string());
                let value = node
                    .child_by_field_name("value")
                    .map(|v| self.render_default(v))
                    .unwrap_or_else(|| DEFAULT_PLACEHOLDER.to_string());
                format!("{name}: {ty} = {value}")
            }
            "list_splat_pattern" | "dictionary_splat_pattern" => self.render_parameter_name(node),
            "keyword_separator" => "*".to_string(),
            "positional_separator" => "/".to_string(),
            _ => collapse_whitespace(self.text(node)),
        }
    }

    fn render_parameter_name(&self, node: Node<'_>) -> String {
        let inner = || {
            node.named_child(0)
                .map(|n| self.text(n).to_string())
                .unwrap_or_default()
        };
        match node.kind() {
            "list_splat_pattern" => format!("*{}", inner()),
            "dictionary_splat_pattern" => format!("**{}", inner()),
            _ => collapse_whitespace(self.text(node)),
        }
    }

    /// Render a default value as a literal, a name, or a placeholder.
    fn render_default(&self, node: Node<'_>) -> String {
        match node.kind() {
            "string" | "concatenated_string" | "integer" | "float" | "true" | "false"
            | "none" | "ellipsis" | "identifier" | "attribute" => {
                collapse_whitespace(self.text(node))
            }
            "unary_operator" if self.has_numeric_operand(node) => {
                collapse_whitespace(self.text(node))
            }
            "list" => "[]".to_string(),
            "dictionary" => "{}".to_string(),
            "tuple" => "()".to_string(),
            "set" => "set()".to_string(),
            _ => DEFAULT_PLACEHOLDER.to_string(),
        }
    }

    /// Render a type annotation. Total: unknown shapes become the placeholder.
    fn render_annotation(&self, node: Node<'_>, depth: usize) -> String {
        if depth > MAX_ANNOTATION_DEPTH {
            return ANNOTATION_PLACEHOLDER.to_string();
        }
        let next = depth + 1;
        match node.kind() {
            "type" | "parenthesized_expression" => match node.named_child(0) {
                Some(inner) => self.render_annotation(inner, next),
                None => ANNOTATION_PLACEHOLDER.to_string(),
            },
            "identifier" => self.text(node).to_string(),
            "attribute" => {
                let object = node.child_by_field_name("object");
                let attribute = node.child_by_field_name("attribute");
                match (object, attribute) {
                    (Some(object), Some(attribute)) => format!(
                        "{}.{}",
                        self.render_annotation(object, next),
                        self.text(attribute)
                    ),
                    _ => ANNOTATION_PLACEHOLDER.to_string(),
                }
            }
            "member_type" => {
                let parts = self.named_children(node);
                match (parts.first(), parts.last()) {
                    (Some(base), Some(member)) if parts.len() == 2 => {
                        format!("{}.{}", self.render_annotation(*base, next), self.text(*member))
                    }
                    _ => ANNOTATION_PLACEHOLDER.to_string(),
                }
            }
            "generic_type" => {
                let parts = self.named_children(node);
                match (parts.first(), parts.get(1)) {
                    (Some(base), Some(params)) => format!(
                        "{}[{}]",
                        self.render_annotation(*base, next),
                        self.render_annotation(*params, next)
                    ),
                    _ => ANNOTATION_PLACEHOLDER.to_string(),
                }
            }
            "type_parameter" | "expression_list" => self.render_joined(node, ", ", next),
            "subscript" => {
                let Some(value) = node.child_by_field_name("value") else {
                    return ANNOTATION_PLACEHOLDER.to_string();
                };
                let mut cursor = node.walk();
                let items: Vec<String> = node
                    .children_by_field_name("subscript", &mut cursor)
                    .map(|item| self.render_annotation(item, next))
                    .collect();
                format!("{}[{}]", self.render_annotation(value, next), items.join(", "))
            }
            "union_type" => self.render_joined(node, " | ", next),
            "binary_operator" => {
                let is_union = node
                    .child_by_field_name("operator")
                    .is_some_and(|op| self.text(op) == "|");
                let left = node.child_by_field_name("left");
                let right = node.child_by_field_name("right");
                match (is_union, left, right) {
                    (true, Some(left), Some(right)) => format!(
                        "{} | {}",
                        self.render_annotation(left, next),
                        self.render_annotation(right, next)
                    ),
                    _ => ANNOTATION_PLACEHOLDER.to_string(),
                }
            }
            "tuple" => format!("({})", self.render_joined(node, ", ", next)),
            "list" => format!("[{}]", self.render_joined(node, ", ", next)),
            "string" | "concatenated_string" | "integer" | "float" | "true" | "false"
            | "none" | "ellipsis" => collapse_whitespace(self.text(node)),
            "unary_operator" if self.has_numeric_operand(node) => {
                collapse_whitespace(self.text(node))
            }
            _ => ANNOTATION_PLACEHOLDER.to_string(),
        }
    }

    fn render_joined(&self, node: Node<'_>, separator: &str, depth: usize) -> String {
        self.named_children(node)
            .into_iter()
            .filter(|child| child.kind() != "comment")
            .map(|child| self.render_annotation(child, depth))
            .collect::<Vec<_>>()
            .join(separator)
    }

    fn has_numeric_operand(&self, node: Node<'_>) -> bool {
        node.child_by_field_name("argument")
            .is_some_and(|arg| matches!(arg.kind(), "integer" | "float"))
    }

    fn named_children<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        let mut cursor = node.walk();
        let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
        children
    }

    fn text(&self, node: Node<'_>) -> &'a str {
        node.utf8_text(self.source).unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn line_of(node: Node<'_>) -> i64 {
    node.start_position().row as i64 + 1
}

fn decorator_prefix(decorators: &[String]) -> String {
    if decorators.is_empty() {
        String::new()
    } else {
        format!("{} ", decorators.join(" "))
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
