//! Compass core library: incremental indexing of Python source trees.
//!
//! A run turns source files into per-file symbol tables, resolves import
//! statements into a file-level dependency graph, scores every file with a
//! damped propagation over that graph, and persists the result in a
//! content-hash keyed SQLite cache so unchanged files are skipped next time.
//!
//! File discovery, output formatting and argument handling belong to the
//! driver; this crate starts from a root directory and a list of candidate
//! paths (see [`indexer::pipeline::run_index`]).

pub mod config;
pub mod errors;
pub mod indexer;
pub mod models;
pub mod store;

pub use config::{IndexConfig, RankingConfig, SuffixFallback};
pub use errors::{CompassError, CompassResult};
pub use indexer::graph::DependencyGraph;
pub use indexer::imports::{ModuleIndex, ModuleResolver};
pub use indexer::pipeline::{index_snapshot, run_index, IndexReport};
pub use indexer::symbols::extract_file_record;
pub use models::{FileRecord, ImportKind, ImportSpec, StoreStats, Symbol, SymbolKind};
pub use store::database::SymbolStore;
