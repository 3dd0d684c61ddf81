//! Incremental indexing run with Rayon-based parallel parsing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::config::{IndexConfig, RankingConfig};
use crate::errors::{CompassError, CompassResult};
use crate::indexer::filesystem::{content_hash, detect_language, normalize_relative_path};
use crate::indexer::graph::DependencyGraph;
use crate::indexer::imports::{ModuleIndex, ModuleResolver};
use crate::indexer::pagerank::rank;
use crate::indexer::parser::is_supported;
use crate::indexer::symbols::extract_file_record;
use crate::models::FileRecord;
use crate::store::database::SymbolStore;

/// Outcome of one [`run_index`] call.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IndexReport {
    pub files_seen: usize,
    pub files_parsed: usize,
    pub files_unchanged: usize,
    pub files_removed: usize,
    /// Files with no symbol extractor for their language.
    pub unsupported: usize,
    pub unreadable: usize,
    /// Paths whose content could not be parsed; stored with a diagnostic.
    pub parse_failures: Vec<String>,
    pub symbols_indexed: usize,
    pub edges: usize,
    pub elapsed_ms: u64,
    pub scores: BTreeMap<String, f64>,
}

impl IndexReport {
    pub fn summary(&self) -> String {
        format!(
            "indexed {} files, {} unchanged, {} skipped due to parse errors",
            self.files_parsed,
            self.files_unchanged,
            self.parse_failures.len()
        )
    }
}

struct ParseJob {
    path: String,
    content: Vec<u8>,
}

/// Parse jobs on a worker pool, preserving job order.
fn parallel_extract(jobs: &[ParseJob], workers: usize) -> Vec<FileRecord> {
    if jobs.is_empty() {
        return Vec::new();
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    match pool {
        Ok(pool) => pool.install(|| {
            jobs.par_iter()
                .map(|job| extract_file_record(&job.path, &job.content))
                .collect()
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Worker pool unavailable, parsing sequentially");
            jobs.iter()
                .map(|job| extract_file_record(&job.path, &job.content))
                .collect()
        }
    }
}

fn relative_path(root: &Path, file: &str) -> String {
    let path = Path::new(file);
    let relative = if path.is_absolute() {
        path.strip_prefix(root).unwrap_or(path)
    } else {
        path
    };
    normalize_relative_path(&relative.to_string_lossy())
}

/// Index `files` (paths relative to `root`) into `store`.
///
/// Files whose stored hash matches are loaded from the store instead of being
/// parsed, unless `config.force` is set. Parse failures are recorded and
/// reported, never raised; any store failure aborts the run.
pub fn run_index(
    store: &SymbolStore,
    root: &Path,
    files: &[String],
    config: &IndexConfig,
) -> CompassResult<IndexReport> {
    if !root.is_dir() {
        return Err(CompassError::Index(format!(
            "project root is not a directory: {}",
            root.display()
        )));
    }
    let started = Instant::now();
    let mut report = IndexReport::default();

    let mut candidates: Vec<String> = files
        .iter()
        .map(|f| relative_path(root, f))
        .filter(|p| !p.is_empty())
        .collect();
    candidates.sort();
    candidates.dedup();
    report.files_seen = candidates.len();

    tracing::info!(
        root = %root.display(),
        candidates = candidates.len(),
        force = config.force,
        "Starting index run"
    );

    let mut snapshot: Vec<FileRecord> = Vec::with_capacity(candidates.len());
    let mut jobs: Vec<ParseJob> = Vec::new();

    for path in &candidates {
        let supported = detect_language(path).is_some_and(|lang| is_supported(&lang));
        if !supported {
            tracing::debug!(path = %path, "No extractor for file language, skipping");
            report.unsupported += 1;
            continue;
        }

        let content = match std::fs::read(root.join(path)) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Unreadable file, skipping");
                report.unreadable += 1;
                continue;
            }
        };

        if !config.force && store.is_current(path, &content_hash(&content))? {
            if let Some(record) = store.get(path)? {
                tracing::debug!(path = %path, "Content unchanged, reusing cached record");
                report.files_unchanged += 1;
                if record.is_failed() {
                    report.parse_failures.push(record.path.clone());
                }
                snapshot.push(record);
                continue;
            }
        }
        jobs.push(ParseJob {
            path: path.clone(),
            content,
        });
    }

    let mut parsed = parallel_extract(&jobs, config.workers);
    drop(jobs);

    let resolver = ModuleResolver::new(
        ModuleIndex::build(
            snapshot
                .iter()
                .map(|r| r.path.as_str())
                .chain(parsed.iter().map(|r| r.path.as_str())),
        ),
        config.suffix_fallback,
    );
    resolver.resolve_records(&mut parsed);

    for record in parsed {
        if let Some(diagnostic) = &record.diagnostic {
            tracing::warn!(path = %record.path, diagnostic = %diagnostic, "Parse failure");
            report.parse_failures.push(record.path.clone());
        }
        store.upsert(&record)?;
        report.files_parsed += 1;
        report.symbols_indexed += record.symbols.len();
        snapshot.push(record);
    }

    if config.prune_missing {
        let keep: HashSet<&str> = candidates.iter().map(String::as_str).collect();
        for stored in store.paths()? {
            if !keep.contains(stored.as_str()) && store.delete(&stored)? {
                tracing::debug!(path = %stored, "Pruned file no longer present");
                report.files_removed += 1;
            }
        }
    }

    snapshot.sort_by(|a, b| a.path.cmp(&b.path));
    let (graph, scores) = graph_and_scores(&snapshot, &resolver, &config.ranking);
    store.replace_graph(&graph, &scores)?;
    store.set_meta("project_root", &root.to_string_lossy())?;

    report.edges = graph.edge_count();
    report.scores = scores.into_iter().collect();
    report.elapsed_ms = started.elapsed().as_millis() as u64;

    tracing::info!(
        files_seen = report.files_seen,
        files_parsed = report.files_parsed,
        files_unchanged = report.files_unchanged,
        files_removed = report.files_removed,
        parse_failures = report.parse_failures.len(),
        unreadable = report.unreadable,
        edges = report.edges,
        elapsed_ms = report.elapsed_ms,
        "{}",
        report.summary()
    );

    Ok(report)
}

/// Dependency graph and importance scores for records held in memory.
pub fn index_snapshot(
    records: &[FileRecord],
    config: &IndexConfig,
) -> (DependencyGraph, HashMap<String, f64>) {
    let resolver = ModuleResolver::for_records(records, config.suffix_fallback);
    graph_and_scores(records, &resolver, &config.ranking)
}

fn graph_and_scores(
    records: &[FileRecord],
    resolver: &ModuleResolver,
    ranking: &RankingConfig,
) -> (DependencyGraph, HashMap<String, f64>) {
    let graph = DependencyGraph::build(records, resolver);
    let scores = rank(&graph, ranking);
    (graph, scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::pagerank::ranked;
    use std::fs;
    use tempfile::TempDir;

    const SESSIONS: &str = "\
import os

class Session:
    def process(self):
        pass
";

    fn project() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        fs::write(root.join("pkg/__init__.py"), "from . import sessions\n").unwrap();
        fs::write(root.join("pkg/sessions.py"), SESSIONS).unwrap();
        fs::write(
            root.join("main.py"),
            "from pkg.sessions import Session\n\ndef process():\n    pass\n",
        )
        .unwrap();
        fs::write(root.join("broken.py"), "def broken(\n").unwrap();
        fs::write(root.join("notes.md"), "# notes\n").unwrap();
        dir
    }

    fn files() -> Vec<String> {
        ["pkg/__init__.py", "pkg/sessions.py", "main.py", "broken.py", "notes.md"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn config() -> IndexConfig {
        IndexConfig {
            workers: 2,
            ..IndexConfig::default()
        }
    }

    fn open(dir: &TempDir) -> SymbolStore {
        SymbolStore::open(dir.path().join(".code-compass").join("cache.db")).unwrap()
    }

    #[test]
    fn test_first_run_indexes_project() {
        let dir = project();
        let store = open(&dir);
        let report = run_index(&store, dir.path(), &files(), &config()).unwrap();

        assert_eq!(report.files_seen, 5);
        assert_eq!(report.files_parsed, 4);
        assert_eq!(report.files_unchanged, 0);
        assert_eq!(report.unsupported, 1);
        assert_eq!(report.parse_failures, vec!["broken.py"]);
        assert_eq!(report.symbols_indexed, 3);
        assert_eq!(report.edges, 2);
        assert!(report.summary().contains("1 skipped due to parse errors"));

        assert_eq!(
            store.edges().unwrap(),
            vec![
                ("main.py".to_string(), "pkg/sessions.py".to_string()),
                ("pkg/__init__.py".to_string(), "pkg/sessions.py".to_string()),
            ]
        );
        let order = ranked(&store.scores().unwrap());
        assert_eq!(order[0].0, "pkg/sessions.py");

        let broken = store.get("broken.py").unwrap().unwrap();
        assert!(broken.is_failed());
        assert!(broken.symbols.is_empty());

        let init = store.get("pkg/__init__.py").unwrap().unwrap();
        assert_eq!(init.imports[0].resolved.as_deref(), Some("pkg/sessions.py"));

        assert_eq!(store.find_symbol("process").unwrap().len(), 2);
        assert_eq!(store.stats().unwrap().total_files, 4);
    }

    #[test]
    fn test_unchanged_files_are_not_rewritten() {
        let dir = project();
        let store = open(&dir);
        run_index(&store, dir.path(), &files(), &config()).unwrap();

        let conn = rusqlite::Connection::open(store.db_path()).unwrap();
        conn.execute("UPDATE symbols SET name = 'tampered' WHERE name = 'Session';", [])
            .unwrap();

        let report = run_index(&store, dir.path(), &files(), &config()).unwrap();
        assert_eq!(report.files_parsed, 0);
        assert_eq!(report.files_unchanged, 4);
        assert_eq!(report.parse_failures, vec!["broken.py"]);
        assert!(report.summary().contains("1 skipped due to parse errors"));
        assert_eq!(report.edges, 2);
        assert_eq!(store.find_symbol("tampered").unwrap().len(), 1);

        let forced = IndexConfig {
            force: true,
            ..config()
        };
        let report = run_index(&store, dir.path(), &files(), &forced).unwrap();
        assert_eq!(report.files_parsed, 4);
        assert!(store.find_symbol("tampered").unwrap().is_empty());
        assert_eq!(store.find_symbol("Session").unwrap().len(), 1);
    }

    #[test]
    fn test_changed_file_is_reparsed() {
        let dir = project();
        let store = open(&dir);
        run_index(&store, dir.path(), &files(), &config()).unwrap();

        fs::write(
            dir.path().join("pkg/sessions.py"),
            format!("{SESSIONS}\ndef helper():\n    pass\n"),
        )
        .unwrap();
        let report = run_index(&store, dir.path(), &files(), &config()).unwrap();
        assert_eq!(report.files_parsed, 1);
        assert_eq!(report.files_unchanged, 3);
        assert_eq!(store.find_symbol("helper").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_files_are_pruned() {
        let dir = project();
        let store = open(&dir);
        run_index(&store, dir.path(), &files(), &config()).unwrap();

        fs::remove_file(dir.path().join("main.py")).unwrap();
        let remaining: Vec<String> = files().into_iter().filter(|f| f != "main.py").collect();
        let report = run_index(&store, dir.path(), &remaining, &config()).unwrap();

        assert_eq!(report.files_removed, 1);
        assert_eq!(store.get("main.py").unwrap(), None);
        assert_eq!(store.edges().unwrap().len(), 1);
        assert_eq!(store.dependents("pkg/sessions.py").unwrap(), vec!["pkg/__init__.py"]);
    }

    #[test]
    fn test_pruning_can_be_disabled() {
        let dir = project();
        let store = open(&dir);
        run_index(&store, dir.path(), &files(), &config()).unwrap();

        let keep = IndexConfig {
            prune_missing: false,
            ..config()
        };
        let report = run_index(&store, dir.path(), &["main.py".to_string()], &keep).unwrap();
        assert_eq!(report.files_removed, 0);
        assert_eq!(store.stats().unwrap().total_files, 4);
    }

    #[test]
    fn test_unreadable_file_is_counted_not_fatal() {
        let dir = project();
        let store = open(&dir);
        let mut candidates = files();
        candidates.push("ghost.py".to_string());
        let report = run_index(&store, dir.path(), &candidates, &config()).unwrap();
        assert_eq!(report.unreadable, 1);
        assert_eq!(report.files_parsed, 4);
    }

    #[test]
    fn test_absolute_candidate_paths_are_made_relative() {
        let dir = project();
        let store = open(&dir);
        let absolute = dir.path().join("main.py").to_string_lossy().into_owned();
        let report = run_index(&store, dir.path(), &[absolute], &config()).unwrap();
        assert_eq!(report.files_parsed, 1);
        assert!(store.get("main.py").unwrap().is_some());
    }

    #[test]
    fn test_store_failure_aborts_run() {
        let dir = project();
        let cache = dir.path().join("cache");
        let store = SymbolStore::open(cache.join("cache.db")).unwrap();
        fs::remove_dir_all(&cache).unwrap();

        let err = run_index(&store, dir.path(), &files(), &config()).unwrap_err();
        assert!(err.is_storage_failure());
    }

    #[test]
    fn test_missing_root_is_an_index_error() {
        let dir = project();
        let store = open(&dir);
        let err = run_index(&store, &dir.path().join("nope"), &files(), &config()).unwrap_err();
        assert!(matches!(err, CompassError::Index(_)));
        assert!(!err.is_storage_failure());
    }

    #[test]
    fn test_sequential_and_parallel_runs_agree() {
        let dir = project();
        let one = SymbolStore::open(dir.path().join("one.db")).unwrap();
        let many = SymbolStore::open(dir.path().join("many.db")).unwrap();
        let sequential = IndexConfig {
            workers: 1,
            ..config()
        };
        let parallel = IndexConfig {
            workers: 8,
            ..config()
        };
        let a = run_index(&one, dir.path(), &files(), &sequential).unwrap();
        let b = run_index(&many, dir.path(), &files(), &parallel).unwrap();
        assert_eq!(one.list_all().unwrap(), many.list_all().unwrap());
        assert_eq!(a.scores, b.scores);
    }

    #[test]
    fn test_index_snapshot_in_memory() {
        let records = vec![
            extract_file_record("pkg/__init__.py", b"from . import sessions\n"),
            extract_file_record("pkg/sessions.py", SESSIONS.as_bytes()),
        ];
        let (graph, scores) = index_snapshot(&records, &IndexConfig::default());
        assert_eq!(graph.edges(), vec![("pkg/__init__.py", "pkg/sessions.py")]);
        assert!(scores["pkg/sessions.py"] > scores["pkg/__init__.py"]);

        let (empty_graph, empty_scores) = index_snapshot(&[], &IndexConfig::default());
        assert!(empty_graph.is_empty());
        assert!(empty_scores.is_empty());
    }

    #[test]
    fn test_missing_relative_target_adds_no_edge() {
        let records = vec![extract_file_record("pkg/__init__.py", b"from . import sessions\n")];
        let (graph, scores) = index_snapshot(&records, &IndexConfig::default());
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(scores.len(), 1);
    }
}
