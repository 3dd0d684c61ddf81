//! Import resolution from Python import specs to project files.

use indexmap::IndexMap;

use crate::config::SuffixFallback;
use crate::indexer::filesystem::{normalize_relative_path, to_module_path};
use crate::models::{FileRecord, ImportSpec};

const PACKAGE_INIT: &str = "__init__";

// ---------------------------------------------------------------------------
// Module-path index
// ---------------------------------------------------------------------------

/// Project-wide map from dotted module path to file path.
///
/// Canonical entries come first, in sorted file-path order. Package aliases
/// (`pkg` for `pkg/__init__.py`) follow and never replace a canonical entry.
#[derive(Clone, Debug, Default)]
pub struct ModuleIndex {
    modules: IndexMap<String, String>,
    by_last_component: IndexMap<String, Vec<String>>,
}

impl ModuleIndex {
    pub fn build<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut files: Vec<String> = paths
            .into_iter()
            .map(|p| normalize_relative_path(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        files.sort();
        files.dedup();

        let mut modules: IndexMap<String, String> = IndexMap::with_capacity(files.len());
        for file in &files {
            let module = to_module_path(file);
            if !module.is_empty() {
                modules.entry(module).or_insert_with(|| file.clone());
            }
        }

        let aliases: Vec<(String, String)> = modules
            .iter()
            .filter_map(|(module, file)| {
                let package = module.strip_suffix(PACKAGE_INIT)?.strip_suffix('.')?;
                Some((package.to_string(), file.clone()))
            })
            .collect();
        for (package, file) in aliases {
            modules.entry(package).or_insert(file);
        }

        let mut by_last_component: IndexMap<String, Vec<String>> = IndexMap::new();
        for (module, file) in &modules {
            let last = last_component(module);
            let entry = by_last_component.entry(last.to_string()).or_default();
            if !entry.contains(file) {
                entry.push(file.clone());
            }
        }

        Self {
            modules,
            by_last_component,
        }
    }

    pub fn lookup(&self, module: &str) -> Option<&str> {
        self.modules.get(module).map(String::as_str)
    }

    /// Files whose module path ends in `component`, in index order.
    pub fn suffix_matches(&self, component: &str) -> &[String] {
        self.by_last_component
            .get(component)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.modules.iter().map(|(m, f)| (m.as_str(), f.as_str()))
    }
}

fn last_component(module: &str) -> &str {
    module.rsplit('.').next().unwrap_or(module)
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

pub struct ModuleResolver {
    index: ModuleIndex,
    fallback: SuffixFallback,
}

impl ModuleResolver {
    pub fn new(index: ModuleIndex, fallback: SuffixFallback) -> Self {
        Self { index, fallback }
    }

    pub fn for_records(records: &[FileRecord], fallback: SuffixFallback) -> Self {
        Self::new(
            ModuleIndex::build(records.iter().map(|r| r.path.as_str())),
            fallback,
        )
    }

    pub fn index(&self) -> &ModuleIndex {
        &self.index
    }

    /// Project files targeted by `spec` when imported from `owner`.
    ///
    /// Empty when the import is external (standard library, third party, or
    /// simply not present in the project). Never contains `owner` itself.
    pub fn resolve(&self, owner: &str, spec: &ImportSpec) -> Vec<String> {
        let owner = normalize_relative_path(owner);
        let mut targets = self.resolve_exact(&owner, spec);
        if targets.is_empty() {
            targets.extend(self.resolve_suffix(spec));
        }
        targets.retain(|target| *target != owner);

        if targets.is_empty() {
            tracing::debug!(
                owner = %owner,
                module = %spec.module,
                level = spec.level,
                "Import left unresolved"
            );
        }
        targets
    }

    fn resolve_exact(&self, owner: &str, spec: &ImportSpec) -> Vec<String> {
        let Some(base) = self.base_module(owner, spec) else {
            return Vec::new();
        };

        let mut targets: Vec<String> = Vec::new();
        for name in &spec.names {
            let candidate = join_module(&base, name);
            if let Some(file) = self.index.lookup(&candidate) {
                if !targets.iter().any(|t| t == file) {
                    targets.push(file.to_string());
                }
            }
        }
        if targets.is_empty() && !base.is_empty() {
            if let Some(file) = self.index.lookup(&base) {
                targets.push(file.to_string());
            }
        }
        targets
    }

    /// Dotted module an import refers to before any imported name is applied.
    ///
    /// `None` when a relative import climbs above the project root.
    fn base_module(&self, owner: &str, spec: &ImportSpec) -> Option<String> {
        if !spec.is_relative() {
            return Some(spec.module.clone());
        }
        let owner_module = to_module_path(owner);
        let components: Vec<&str> = owner_module.split('.').filter(|c| !c.is_empty()).collect();
        let level = spec.level as usize;
        if level > components.len() {
            return None;
        }
        let anchor = components[..components.len() - level].join(".");
        Some(join_module(&anchor, &spec.module))
    }

    fn resolve_suffix(&self, spec: &ImportSpec) -> Option<String> {
        if spec.module.is_empty() {
            return None;
        }
        let matches = self.index.suffix_matches(last_component(&spec.module));
        match self.fallback {
            SuffixFallback::FirstMatch => matches.first().cloned(),
            SuffixFallback::Unambiguous if matches.len() == 1 => matches.first().cloned(),
            SuffixFallback::Unambiguous | SuffixFallback::Disabled => None,
        }
    }

    /// Fill `resolved` on every import spec. Returns the number of external imports.
    pub fn resolve_records(&self, records: &mut [FileRecord]) -> usize {
        let mut external = 0;
        for record in records.iter_mut() {
            let owner = record.path.clone();
            for spec in record.imports.iter_mut() {
                spec.resolved = self.resolve(&owner, spec).into_iter().next();
                if spec.resolved.is_none() {
                    external += 1;
                }
            }
        }
        external
    }
}

fn join_module(base: &str, name: &str) -> String {
    match (base.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}.{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(paths: &[&str]) -> ModuleResolver {
        ModuleResolver::new(ModuleIndex::build(paths.iter().copied()), SuffixFallback::FirstMatch)
    }

    fn from(module: &str, level: u32, names: &[&str]) -> ImportSpec {
        ImportSpec::from_import(module, level, names.iter().map(|n| n.to_string()).collect(), 1)
    }

    #[test]
    fn test_module_index_canonical_paths_and_package_alias() {
        let index = ModuleIndex::build(["pkg/sessions.py", "pkg/__init__.py", "main.py"]);
        assert_eq!(index.lookup("pkg.sessions"), Some("pkg/sessions.py"));
        assert_eq!(index.lookup("pkg.__init__"), Some("pkg/__init__.py"));
        assert_eq!(index.lookup("pkg"), Some("pkg/__init__.py"));
        assert_eq!(index.lookup("main"), Some("main.py"));
        assert_eq!(index.lookup("missing"), None);

        let order: Vec<&str> = index.iter().map(|(m, _)| m).collect();
        assert_eq!(order, vec!["main", "pkg.__init__", "pkg.sessions", "pkg"]);
    }

    #[test]
    fn test_package_alias_never_overrides_canonical_module() {
        let index = ModuleIndex::build(["pkg.py", "pkg/__init__.py"]);
        assert_eq!(index.lookup("pkg"), Some("pkg.py"));
    }

    #[test]
    fn test_absolute_exact_match() {
        let r = resolver(&["app/models.py", "app/views.py"]);
        assert_eq!(
            r.resolve("app/views.py", &ImportSpec::absolute("app.models", 1)),
            vec!["app/models.py"]
        );
    }

    #[test]
    fn test_from_import_prefers_submodules() {
        let r = resolver(&["app/__init__.py", "app/models.py", "app/views.py", "main.py"]);
        let targets = r.resolve("main.py", &from("app", 0, &["models", "views", "helper"]));
        assert_eq!(targets, vec!["app/models.py", "app/views.py"]);

        let targets = r.resolve("main.py", &from("app", 0, &["helper"]));
        assert_eq!(targets, vec!["app/__init__.py"]);
    }

    #[test]
    fn test_relative_import_from_package_init() {
        let r = resolver(&["pkg/__init__.py", "pkg/sessions.py"]);
        let targets = r.resolve("pkg/__init__.py", &from("", 1, &["sessions"]));
        assert_eq!(targets, vec!["pkg/sessions.py"]);
    }

    #[test]
    fn test_relative_import_to_missing_module_is_dropped() {
        let r = resolver(&["pkg/__init__.py", "pkg/other.py"]);
        assert!(r.resolve("pkg/__init__.py", &from("", 1, &["sessions"])).is_empty());
    }

    #[test]
    fn test_relative_levels() {
        let r = resolver(&[
            "pkg/__init__.py",
            "pkg/util.py",
            "pkg/sub/__init__.py",
            "pkg/sub/mod.py",
            "pkg/sub/sibling.py",
        ]);
        assert_eq!(
            r.resolve("pkg/sub/mod.py", &from("sibling", 1, &["thing"])),
            vec!["pkg/sub/sibling.py"]
        );
        assert_eq!(
            r.resolve("pkg/sub/mod.py", &from("util", 2, &["helper"])),
            vec!["pkg/util.py"]
        );
        assert_eq!(
            r.resolve("pkg/sub/mod.py", &from("", 2, &["util"])),
            vec!["pkg/util.py"]
        );
    }

    #[test]
    fn test_relative_level_above_root_is_unresolved() {
        let r = ModuleResolver::new(
            ModuleIndex::build(["pkg/mod.py", "other.py"]),
            SuffixFallback::Disabled,
        );
        assert!(r.resolve("pkg/mod.py", &from("other", 5, &[])).is_empty());
    }

    #[test]
    fn test_self_import_is_dropped() {
        let r = resolver(&["pkg/__init__.py", "pkg/a.py"]);
        assert!(r.resolve("pkg/__init__.py", &from("", 1, &["thing"])).is_empty());
        assert!(r.resolve("pkg/a.py", &ImportSpec::absolute("pkg.a", 1)).is_empty());
    }

    #[test]
    fn test_suffix_fallback_modes() {
        let paths = ["alpha/utils.py", "beta/utils.py", "core/config.py", "main.py"];
        let first = resolver(&paths);
        assert_eq!(
            first.resolve("main.py", &ImportSpec::absolute("vendored.utils", 1)),
            vec!["alpha/utils.py"]
        );

        let unambiguous = ModuleResolver::new(ModuleIndex::build(paths), SuffixFallback::Unambiguous);
        assert!(unambiguous
            .resolve("main.py", &ImportSpec::absolute("vendored.utils", 1))
            .is_empty());
        assert_eq!(
            unambiguous.resolve("main.py", &ImportSpec::absolute("config", 1)),
            vec!["core/config.py"]
        );

        let disabled = ModuleResolver::new(ModuleIndex::build(paths), SuffixFallback::Disabled);
        assert!(disabled
            .resolve("main.py", &ImportSpec::absolute("config", 1))
            .is_empty());
    }

    #[test]
    fn test_external_imports_are_dropped() {
        let r = resolver(&["main.py", "app/models.py"]);
        assert!(r.resolve("main.py", &ImportSpec::absolute("os.path", 1)).is_empty());
        assert!(r.resolve("main.py", &from("typing", 0, &["List"])).is_empty());
    }

    #[test]
    fn test_resolve_records_fills_first_target() {
        let mut records = vec![
            FileRecord {
                path: "main.py".to_string(),
                language: "python".to_string(),
                content_hash: "h".to_string(),
                size_bytes: 0,
                symbols: Vec::new(),
                imports: vec![
                    from("app", 0, &["models", "views"]),
                    ImportSpec::absolute("json", 2),
                ],
                diagnostic: None,
            },
            FileRecord::failed("app/models.py", "python", "h", 0, "syntax error at line 1"),
            FileRecord::failed("app/views.py", "python", "h", 0, "syntax error at line 1"),
        ];
        let r = ModuleResolver::for_records(&records, SuffixFallback::FirstMatch);
        let external = r.resolve_records(&mut records);
        assert_eq!(external, 1);
        assert_eq!(records[0].imports[0].resolved.as_deref(), Some("app/models.py"));
        assert!(records[0].imports[1].resolved.is_none());
    }
}
