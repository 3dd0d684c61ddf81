//! Tree-sitter grammar setup used by extraction passes.

use crate::errors::{CompassError, CompassResult};

const SUPPORTED_LANGUAGES: &[&str] = &["python"];

/// Whether symbols can be extracted for a language tag.
pub fn is_supported(language: &str) -> bool {
    SUPPORTED_LANGUAGES.contains(&language)
}

fn grammar(language: &str) -> CompassResult<tree_sitter::Language> {
    match language {
        "python" => Ok(tree_sitter_python::LANGUAGE.into()),
        _ => Err(CompassError::Parse(format!(
            "No tree-sitter grammar for: {language}"
        ))),
    }
}

/// Parse source bytes into a syntax tree.
///
/// Tree-sitter recovers from syntax errors, so a returned tree may still
/// contain error nodes; callers check `root_node().has_error()`.
pub fn parse_source(source: &[u8], language: &str) -> CompassResult<tree_sitter::Tree> {
    let ts_language = grammar(language)?;

    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&ts_language)
        .map_err(|e| CompassError::Parse(format!("Failed to set language: {e}")))?;

    parser
        .parse(source, None)
        .ok_or_else(|| CompassError::Parse(format!("Parser produced no tree for {language}")))
}

/// Row (1-based) of the first error or missing node in the tree, if any.
pub fn first_error_line(tree: &tree_sitter::Tree) -> Option<usize> {
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node.start_position().row + 1);
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();
        // Reverse so the leftmost child is examined first.
        stack.extend(children.into_iter().rev());
    }
    Some(root.start_position().row + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_is_supported() {
        assert!(is_supported("python"));
        assert!(!is_supported("go"));
    }

    #[test]
    fn test_parse_valid_python() {
        let tree = parse_source(b"def f():\n    return 1\n", "python").unwrap();
        assert_eq!(tree.root_node().kind(), "module");
        assert!(first_error_line(&tree).is_none());
    }

    #[test]
    fn test_parse_reports_error_line() {
        let tree = parse_source(b"x = 1\ndef broken(\n", "python").unwrap();
        assert!(tree.root_node().has_error());
        assert!(first_error_line(&tree).is_some());
    }

    #[test]
    fn test_unknown_language_is_error() {
        assert!(matches!(
            parse_source(b"package main", "go"),
            Err(CompassError::Parse(_))
        ));
    }
}
