use std::fs;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use rtjit_symbols::{parse_sidecar, write_sidecar};
use sha1::{Digest, Sha1};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::cache::metadata::{CacheRecord, CacheStats};
use crate::cache::path::{ensure_structure, object_path, sidecar_path};
use crate::compiler::CompiledUnit;
use crate::error::{JitError, Result};

/// Stable name of one source file inside the cache directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey(pub Arc<String>);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    store_failures: AtomicU64,
}

/// Directory of compiled objects keyed by source path, each with a symbol
/// sidecar. An entry is valid while the object is at least as new as its
/// source.
#[derive(Debug)]
pub struct ObjectCache {
    root: PathBuf,
    counters: Counters,
}

impl ObjectCache {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        ensure_structure(&root).map_err(|source| JitError::CacheIo {
            path: root.clone(),
            source,
        })?;
        debug!("object cache initialised" = %root.display());
        Ok(Self {
            root,
            counters: Counters::default(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<file name>.<first 16 hex digits of sha1(absolute path)>`.
    pub fn key(&self, source: &Path) -> CacheKey {
        let absolute = absolute_path(source);
        let digest = Sha1::digest(absolute.to_string_lossy().as_bytes());
        let hex = format!("{digest:x}");
        let file_name = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unit".to_string());
        CacheKey(Arc::new(format!("{file_name}.{}", &hex[..16])))
    }

    pub fn object_path(&self, source: &Path) -> PathBuf {
        object_path(&self.root, self.key(source).as_str())
    }

    pub fn sidecar_path(&self, source: &Path) -> PathBuf {
        sidecar_path(&self.root, self.key(source).as_str())
    }

    /// Whether a usable entry exists for `source`. Any filesystem error
    /// counts as "not valid".
    pub fn is_valid(&self, source: &Path) -> bool {
        let (Some(source_time), Some(object_time)) =
            (modified(source), modified(&self.object_path(source)))
        else {
            return false;
        };
        object_time >= source_time && self.sidecar_path(source).is_file()
    }

    /// Load a valid entry, or `None` on a miss.
    pub fn try_load(&self, source: &Path) -> Option<CompiledUnit> {
        let loaded = self.load_entry(source);
        match &loaded {
            Some(unit) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    source = %source.display(),
                    symbols = unit.symbols().len(),
                    "object cache hit"
                );
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
            }
        }
        loaded
    }

    fn load_entry(&self, source: &Path) -> Option<CompiledUnit> {
        if !self.is_valid(source) {
            return None;
        }
        let object = fs::read(self.object_path(source)).ok()?;
        let sidecar = fs::File::open(self.sidecar_path(source)).ok()?;
        let symbols = parse_sidecar(BufReader::new(sidecar)).ok()?;
        if object.is_empty() || symbols.is_empty() {
            return None;
        }
        Some(CompiledUnit::from_cache(source, object, symbols))
    }

    /// Persist a unit's object and sidecar. Both files are written to
    /// temporaries and renamed into place, object last, so a reader never
    /// sees a fresh object next to a stale sidecar.
    pub fn store(&self, unit: &CompiledUnit) -> Result<CacheRecord> {
        let result = self.write_entry(unit);
        match &result {
            Ok(_) => self.counters.stores.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.counters.store_failures.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    fn write_entry(&self, unit: &CompiledUnit) -> Result<CacheRecord> {
        let key = self.key(unit.source());
        let object = object_path(&self.root, key.as_str());
        let sidecar = sidecar_path(&self.root, key.as_str());
        let cache_io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| JitError::CacheIo { path, source }
        };

        let mut sidecar_tmp = NamedTempFile::new_in(&self.root).map_err(cache_io(&sidecar))?;
        write_sidecar(&mut sidecar_tmp, unit.symbols()).map_err(cache_io(&sidecar))?;
        sidecar_tmp
            .persist(&sidecar)
            .map_err(|err| JitError::CacheIo {
                path: sidecar.clone(),
                source: err.error,
            })?;

        let mut object_tmp = NamedTempFile::new_in(&self.root).map_err(cache_io(&object))?;
        object_tmp
            .write_all(unit.object())
            .map_err(cache_io(&object))?;
        object_tmp.persist(&object).map_err(|err| JitError::CacheIo {
            path: object.clone(),
            source: err.error,
        })?;

        debug!(source = %unit.source().display(), key = key.as_str(), "stored object");
        Ok(CacheRecord::new(
            key.as_str(),
            object,
            sidecar,
            unit.symbols().to_vec(),
        ))
    }

    /// Every complete entry in the cache directory, sorted by key.
    pub fn entries(&self) -> Result<Vec<CacheRecord>> {
        let read_dir = fs::read_dir(&self.root).map_err(|source| JitError::CacheIo {
            path: self.root.clone(),
            source,
        })?;

        let mut records = Vec::new();
        for entry in read_dir.flatten() {
            let path = entry.path();
            let Some(key) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_suffix(".o"))
            else {
                continue;
            };
            let sidecar = sidecar_path(&self.root, key);
            let Ok(file) = fs::File::open(&sidecar) else {
                continue;
            };
            let symbols = parse_sidecar(BufReader::new(file)).unwrap_or_default();
            records.push(CacheRecord::new(key, path.clone(), sidecar, symbols));
        }
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    /// Remove every object and sidecar. Returns the number of entries removed.
    pub fn clear(&self) -> Result<usize> {
        let records = self.entries()?;
        for record in &records {
            for path in [&record.object_path, &record.sidecar_path] {
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(JitError::CacheIo {
                            path: path.clone(),
                            source,
                        });
                    }
                }
            }
        }
        Ok(records.len())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            store_failures: self.counters.store_failures.load(Ordering::Relaxed),
        }
    }
}

fn absolute_path(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
