//! SQLite-backed symbol cache keyed by project-relative file path.
//!
//! Each public method opens its own connection. Mutations are serialized
//! through a single write lock and each runs in one IMMEDIATE transaction,
//! so readers never observe a half-written record and a failed write leaves
//! the prior state in place.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::config::{CACHE_DB_NAME, CACHE_DIR_NAME};
use crate::errors::{CompassError, CompassResult};
use crate::indexer::graph::DependencyGraph;
use crate::models::{FileRecord, ImportSpec, StoreStats, Symbol, SymbolKind};
use crate::store::schema;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SYMBOL_COLUMNS: &str = "file_path, name, kind, line_start, line_end, signature, parent";

// ---------------------------------------------------------------------------
// Column conversions
// ---------------------------------------------------------------------------

impl ToSql for SymbolKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SymbolKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        SymbolKind::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown symbol kind: {text}").into()))
    }
}

fn row_to_symbol(row: &rusqlite::Row<'_>) -> rusqlite::Result<Symbol> {
    Ok(Symbol {
        file_path: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        line_start: row.get(3)?,
        line_end: row.get(4)?,
        signature: row.get(5)?,
        parent: row.get(6)?,
    })
}

// ---------------------------------------------------------------------------
// SymbolStore
// ---------------------------------------------------------------------------

/// Durable map from file path to `FileRecord`, plus the derived graph and
/// importance scores of the last run.
pub struct SymbolStore {
    db_path: PathBuf,
    write_lock: Mutex<()>,
}

impl SymbolStore {
    /// Open (creating if needed) the database at `db_path` and bring its
    /// schema up to date.
    pub fn open(db_path: impl AsRef<Path>) -> CompassResult<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if db_path.is_dir() {
            return Err(CompassError::Database(format!(
                "cache path is a directory: {}",
                db_path.display()
            )));
        }
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            db_path,
            write_lock: Mutex::new(()),
        };

        let conn = store.connect()?;
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        schema::init_schema(&conn)?;
        tracing::debug!(
            path = %store.db_path.display(),
            journal_mode = %journal_mode,
            "Opened symbol store"
        );
        Ok(store)
    }

    /// Open the cache at `<root>/.code-compass/cache.db`.
    pub fn open_default(root: impl AsRef<Path>) -> CompassResult<Self> {
        Self::open(root.as_ref().join(CACHE_DIR_NAME).join(CACHE_DB_NAME))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> CompassResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -10000;",
        )?;
        Ok(conn)
    }

    /// Run `f` inside one IMMEDIATE transaction under the write lock.
    /// Any error rolls the whole transaction back.
    fn write<T>(&self, f: impl FnOnce(&Connection) -> CompassResult<T>) -> CompassResult<T> {
        let _guard = self.write_lock.lock();
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&*tx)?;
        tx.commit()?;
        Ok(value)
    }

    // -- file records -------------------------------------------------------

    /// Replace the stored record for `record.path`, including all of its symbols.
    pub fn upsert(&self, record: &FileRecord) -> CompassResult<()> {
        self.write(|conn| upsert_impl(conn, record))
    }

    pub fn get(&self, path: &str) -> CompassResult<Option<FileRecord>> {
        let conn = self.connect()?;
        get_impl(&conn, path)
    }

    /// Every stored record, ordered by path.
    pub fn list_all(&self) -> CompassResult<Vec<FileRecord>> {
        let conn = self.connect()?;
        let paths = paths_impl(&conn)?;
        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(record) = get_impl(&conn, &path)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Stored file paths, ordered.
    pub fn paths(&self) -> CompassResult<Vec<String>> {
        let conn = self.connect()?;
        paths_impl(&conn)
    }

    /// Remove a record with its symbols, score and every edge touching it.
    /// Returns whether the file was stored.
    pub fn delete(&self, path: &str) -> CompassResult<bool> {
        self.write(|conn| delete_impl(conn, path))
    }

    /// Whether the stored hash for `path` equals `content_hash`.
    pub fn is_current(&self, path: &str, content_hash: &str) -> CompassResult<bool> {
        let conn = self.connect()?;
        let stored: Option<String> = conn
            .query_row(
                "SELECT content_hash FROM files WHERE path = ?1;",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        Ok(stored.as_deref() == Some(content_hash))
    }

    /// Drop every stored record, edge and score.
    pub fn clear(&self) -> CompassResult<()> {
        self.write(|conn| {
            conn.execute_batch(
                "DELETE FROM edges;
                 DELETE FROM file_scores;
                 DELETE FROM symbols;
                 DELETE FROM files;",
            )?;
            Ok(())
        })
    }

    // -- symbol lookup ------------------------------------------------------

    /// Symbols named exactly `name`, ordered by file path then start line.
    pub fn find_symbol(&self, name: &str) -> CompassResult<Vec<Symbol>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE name = ?1 \
             ORDER BY file_path, line_start, position;"
        ))?;
        let symbols = stmt
            .query_map(params![name], row_to_symbol)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(symbols)
    }

    /// Symbols whose name contains `query`, ignoring case, ordered by file
    /// path then start line.
    ///
    /// Case folding is Unicode-aware, which SQLite's `LOWER` and `LIKE` are
    /// not, so the match runs here rather than in SQL.
    pub fn search_symbols(&self, query: &str) -> CompassResult<Vec<Symbol>> {
        let needle = query.to_lowercase();
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SYMBOL_COLUMNS} FROM symbols \
             ORDER BY file_path, line_start, position;"
        ))?;
        let mut symbols = Vec::new();
        for symbol in stmt.query_map([], row_to_symbol)? {
            let symbol = symbol?;
            if symbol.name.to_lowercase().contains(&needle) {
                symbols.push(symbol);
            }
        }
        Ok(symbols)
    }

    pub fn stats(&self) -> CompassResult<StoreStats> {
        let conn = self.connect()?;
        let count = |sql: &str| -> CompassResult<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };
        let grouped = |sql: &str| -> CompassResult<BTreeMap<String, i64>> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            Ok(rows)
        };

        Ok(StoreStats {
            total_files: count("SELECT COUNT(*) FROM files;")?,
            total_symbols: count("SELECT COUNT(*) FROM symbols;")?,
            total_edges: count("SELECT COUNT(*) FROM edges;")?,
            by_language: grouped("SELECT language, COUNT(*) FROM files GROUP BY language;")?,
            by_kind: grouped("SELECT kind, COUNT(*) FROM symbols GROUP BY kind;")?,
        })
    }

    // -- graph and scores ---------------------------------------------------

    /// Replace the cached edge set and importance scores in one transaction.
    /// Edges and scores naming files that are not stored are skipped.
    pub fn replace_graph(
        &self,
        graph: &DependencyGraph,
        scores: &HashMap<String, f64>,
    ) -> CompassResult<()> {
        self.write(|conn| {
            conn.execute_batch("DELETE FROM edges; DELETE FROM file_scores;")?;
            let mut edge_stmt = conn.prepare(
                "INSERT OR IGNORE INTO edges(source_path, target_path) \
                 SELECT ?1, ?2 \
                 WHERE EXISTS (SELECT 1 FROM files WHERE path = ?1) \
                   AND EXISTS (SELECT 1 FROM files WHERE path = ?2);",
            )?;
            for (source, target) in graph.edges() {
                edge_stmt.execute(params![source, target])?;
            }
            let mut score_stmt = conn.prepare(
                "INSERT INTO file_scores(path, score) \
                 SELECT ?1, ?2 WHERE EXISTS (SELECT 1 FROM files WHERE path = ?1);",
            )?;
            for (path, score) in scores {
                score_stmt.execute(params![path, score])?;
            }
            Ok(())
        })
    }

    /// Cached edges as `(source, target)`, sorted.
    pub fn edges(&self) -> CompassResult<Vec<(String, String)>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT source_path, target_path FROM edges ORDER BY source_path, target_path;",
        )?;
        let edges = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    /// Files that `path` imports.
    pub fn dependencies(&self, path: &str) -> CompassResult<Vec<String>> {
        self.neighbours(
            "SELECT target_path FROM edges WHERE source_path = ?1 ORDER BY target_path;",
            path,
        )
    }

    /// Files importing `path`.
    pub fn dependents(&self, path: &str) -> CompassResult<Vec<String>> {
        self.neighbours(
            "SELECT source_path FROM edges WHERE target_path = ?1 ORDER BY source_path;",
            path,
        )
    }

    fn neighbours(&self, sql: &str, path: &str) -> CompassResult<Vec<String>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let paths = stmt
            .query_map(params![path], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(paths)
    }

    /// Importance scores from the last `replace_graph`.
    pub fn scores(&self) -> CompassResult<HashMap<String, f64>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT path, score FROM file_scores;")?;
        let scores = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(scores)
    }

    // -- metadata -----------------------------------------------------------

    pub fn get_meta(&self, key: &str) -> CompassResult<Option<String>> {
        let conn = self.connect()?;
        let value = conn
            .query_row(
                "SELECT value FROM repo_meta WHERE key = ?1;",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> CompassResult<()> {
        self.write(|conn| {
            conn.execute(
                "INSERT INTO repo_meta(key, value) VALUES(?1, ?2) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
                params![key, value],
            )?;
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// Statement helpers
// ---------------------------------------------------------------------------

fn upsert_impl(conn: &Connection, record: &FileRecord) -> CompassResult<()> {
    let imports_json = serde_json::to_string(&record.imports)?;
    conn.execute(
        "INSERT INTO files (path, language, content_hash, size_bytes, imports_json, diagnostic) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(path) DO UPDATE SET \
             language = excluded.language, \
             content_hash = excluded.content_hash, \
             size_bytes = excluded.size_bytes, \
             imports_json = excluded.imports_json, \
             diagnostic = excluded.diagnostic, \
             last_indexed_at = CURRENT_TIMESTAMP;",
        params![
            record.path,
            record.language,
            record.content_hash,
            record.size_bytes,
            imports_json,
            record.diagnostic
        ],
    )?;

    conn.execute(
        "DELETE FROM symbols WHERE file_path = ?1;",
        params![record.path],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO symbols \
         (file_path, position, name, kind, line_start, line_end, signature, parent) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
    )?;
    for (position, symbol) in record.symbols.iter().enumerate() {
        stmt.execute(params![
            record.path,
            position as i64,
            symbol.name,
            symbol.kind,
            symbol.line_start,
            symbol.line_end,
            symbol.signature,
            symbol.parent
        ])?;
    }
    Ok(())
}

fn get_impl(conn: &Connection, path: &str) -> CompassResult<Option<FileRecord>> {
    let row = conn
        .query_row(
            "SELECT language, content_hash, size_bytes, imports_json, diagnostic \
             FROM files WHERE path = ?1;",
            params![path],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )
        .optional()?;
    let Some((language, content_hash, size_bytes, imports_json, diagnostic)) = row else {
        return Ok(None);
    };

    let imports: Vec<ImportSpec> = serde_json::from_str(&imports_json)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {SYMBOL_COLUMNS} FROM symbols WHERE file_path = ?1 ORDER BY position;"
    ))?;
    let symbols = stmt
        .query_map(params![path], row_to_symbol)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(FileRecord {
        path: path.to_string(),
        language,
        content_hash,
        size_bytes,
        symbols,
        imports,
        diagnostic,
    }))
}

fn paths_impl(conn: &Connection) -> CompassResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT path FROM files ORDER BY path;")?;
    let paths = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(paths)
}

fn delete_impl(conn: &Connection, path: &str) -> CompassResult<bool> {
    conn.execute(
        "DELETE FROM edges WHERE source_path = ?1 OR target_path = ?1;",
        params![path],
    )?;
    conn.execute("DELETE FROM file_scores WHERE path = ?1;", params![path])?;
    conn.execute("DELETE FROM symbols WHERE file_path = ?1;", params![path])?;
    let removed = conn.execute("DELETE FROM files WHERE path = ?1;", params![path])?;
    Ok(removed > 0)
}
