use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rtjit_symbols::SymbolEntry;
use serde::Serialize;

/// A persisted object plus its symbol sidecar.
#[derive(Debug, Clone, Serialize)]
pub struct CacheRecord {
    pub key: String,
    pub object_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub object_size: u64,
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub symbols: Vec<SymbolEntry>,
}

impl CacheRecord {
    pub fn new(
        key: impl Into<String>,
        object_path: PathBuf,
        sidecar_path: PathBuf,
        symbols: Vec<SymbolEntry>,
    ) -> Self {
        let (object_size, modified_at) = object_stats(&object_path);
        Self {
            key: key.into(),
            object_path,
            sidecar_path,
            object_size,
            modified_at,
            symbols,
        }
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

fn object_stats(path: &Path) -> (u64, Option<DateTime<Utc>>) {
    match fs::metadata(path) {
        Ok(meta) => (
            meta.len(),
            meta.modified().ok().map(DateTime::<Utc>::from),
        ),
        Err(_) => (0, None),
    }
}

/// Counters kept by an [`ObjectCache`](super::ObjectCache).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub store_failures: u64,
}
