//! Path, language and content-hash helpers for indexing passes.

use std::path::{Component, Path};

use sha2::{Digest, Sha256};

const LANGUAGE_BY_EXTENSION: &[(&str, &str)] = &[
    (".py", "python"),
    (".pyi", "python"),
    (".java", "java"),
    (".ts", "typescript"),
    (".tsx", "typescript"),
    (".go", "go"),
];

/// Map a file path to its language tag by extension.
pub fn detect_language(path: &str) -> Option<String> {
    let path = Path::new(path);
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))?;
    LANGUAGE_BY_EXTENSION
        .iter()
        .find(|(e, _)| *e == ext.as_str())
        .map(|(_, lang)| lang.to_string())
}

/// SHA-256 hex digest of raw file bytes.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Normalize a project-relative path to `/` separators without `./` prefixes.
pub fn normalize_relative_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Convert a file path to its dotted module path.
///
/// Strips the file extension and joins path components with dots,
/// skipping any root or `.` segments.
pub fn to_module_path(path: &str) -> String {
    let normalized = normalize_relative_path(path);
    let without_ext = Path::new(&normalized).with_extension("");
    without_ext
        .components()
        .filter_map(|c| match c {
            Component::Normal(os) => os.to_str(),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_language() {
        assert_eq!(detect_language("pkg/mod.py").as_deref(), Some("python"));
        assert_eq!(detect_language("pkg/stubs.PYI").as_deref(), Some("python"));
        assert_eq!(detect_language("web/app.tsx").as_deref(), Some("typescript"));
        assert_eq!(detect_language("README.md"), None);
        assert_eq!(detect_language("Makefile"), None);
    }

    #[test]
    fn test_content_hash_is_sha256() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(content_hash(b"a"), content_hash(b"b"));
    }

    #[test]
    fn test_to_module_path() {
        assert_eq!(to_module_path("src/app/indexer/symbols.py"), "src.app.indexer.symbols");
        assert_eq!(to_module_path("pkg/__init__.py"), "pkg.__init__");
        assert_eq!(to_module_path("./main.py"), "main");
        assert_eq!(to_module_path("foo\\bar\\baz.py"), "foo.bar.baz");
        assert_eq!(to_module_path("foo/bar/baz"), "foo.bar.baz");
    }

    #[test]
    fn test_normalize_relative_path() {
        assert_eq!(normalize_relative_path("./a//b/c.py"), "a/b/c.py");
        assert_eq!(normalize_relative_path("a\\b.py"), "a/b.py");
    }
}
