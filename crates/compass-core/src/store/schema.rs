//! SQLite schema DDL and version stamp for the symbol cache.

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{CompassError, CompassResult};

/// Schema version written by this build. Caches stamped with a newer version
/// are refused rather than read with the wrong layout.
pub const SCHEMA_VERSION: i32 = 1;

/// Core DDL statements, safe to replay on an initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // ── tables ──────────────────────────────────────────────────────────
    "CREATE TABLE IF NOT EXISTS repo_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS files (
        path TEXT PRIMARY KEY,
        language TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        size_bytes INTEGER NOT NULL DEFAULT 0,
        imports_json TEXT NOT NULL DEFAULT '[]',
        diagnostic TEXT,
        last_indexed_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS symbols (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        line_start INTEGER NOT NULL,
        line_end INTEGER NOT NULL,
        signature TEXT NOT NULL,
        parent TEXT,
        CHECK(line_start <= line_end),
        UNIQUE(file_path, position)
    );",
    "CREATE TABLE IF NOT EXISTS edges (
        source_path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
        target_path TEXT NOT NULL REFERENCES files(path) ON DELETE CASCADE,
        PRIMARY KEY(source_path, target_path)
    );",
    "CREATE TABLE IF NOT EXISTS file_scores (
        path TEXT PRIMARY KEY REFERENCES files(path) ON DELETE CASCADE,
        score REAL NOT NULL
    );",
    // ── indexes ─────────────────────────────────────────────────────────
    "CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);",
    "CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_path, line_start);",
    "CREATE INDEX IF NOT EXISTS idx_symbols_kind ON symbols(kind);",
    "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_path);",
    "CREATE INDEX IF NOT EXISTS idx_files_language ON files(language);",
];

/// Create every table and index, then stamp or check the schema version.
pub fn init_schema(conn: &Connection) -> CompassResult<()> {
    for stmt in SCHEMA_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    match get_schema_version(conn)? {
        None => {
            conn.execute(
                "INSERT OR IGNORE INTO repo_meta(key, value) VALUES('schema_version', ?1);",
                params![SCHEMA_VERSION.to_string()],
            )?;
            tracing::debug!(version = SCHEMA_VERSION, "Stamped new cache schema");
            Ok(())
        }
        Some(version) if version > SCHEMA_VERSION => Err(CompassError::Database(format!(
            "cache schema version {version} is newer than supported version {SCHEMA_VERSION}"
        ))),
        Some(_) => Ok(()),
    }
}

/// Stored schema version, `None` when the cache has not been stamped.
/// An unparseable value reads as 0.
pub fn get_schema_version(conn: &Connection) -> CompassResult<Option<i32>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM repo_meta WHERE key = 'schema_version';",
            [],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.map(|v| v.trim().parse::<i32>().unwrap_or(0)))
}
