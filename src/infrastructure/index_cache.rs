/// SCIP Index Cache
///
/// Skips re-running the indexer when nothing it depends on has changed.
///
/// Cache structure, in the codebase root:
/// - `index.scip` - The SCIP protobuf index
/// - `index.scip.meta` - JSON metadata for cache validation

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::domain::language::Language;

pub const INDEX_FILE: &str = "index.scip";
const META_FILE: &str = "index.scip.meta";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCacheMetadata {
    /// Version of the cache format
    pub version: u32,
    /// Unix seconds when the index was recorded
    pub created_at: u64,
    pub language: String,
    /// Source file path -> modification time (unix seconds)
    pub source_files: BTreeMap<String, u64>,
    /// Lockfile name -> fingerprint
    pub lockfiles: BTreeMap<String, String>,
}

impl IndexCacheMetadata {
    pub const CURRENT_VERSION: u32 = 2;
}

pub struct IndexCache {
    root: PathBuf,
    language: Language,
    index_path: PathBuf,
    meta_path: PathBuf,
}

impl IndexCache {
    pub fn new(root: &Path, language: Language) -> Self {
        Self {
            root: root.to_path_buf(),
            language,
            index_path: root.join(INDEX_FILE),
            meta_path: root.join(META_FILE),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// The cached index, if it was recorded for exactly these sources and
    /// neither they nor the lockfiles changed since.
    pub fn valid_index(&self, sources: &[String]) -> Option<PathBuf> {
        if !self.index_path.exists() || !self.meta_path.exists() {
            debug!("no cached index in {}", self.root.display());
            return None;
        }

        let meta = match self.load_metadata() {
            Ok(meta) => meta,
            Err(e) => {
                debug!("unreadable index metadata: {:#}", e);
                return None;
            }
        };

        let stale = if meta.version != IndexCacheMetadata::CURRENT_VERSION {
            Some("cache format changed")
        } else if meta.language != self.language.name() {
            Some("language changed")
        } else if meta.source_files != Self::source_mtimes(sources) {
            Some("source files changed")
        } else if meta.lockfiles != self.lockfile_fingerprints() {
            Some("lockfile changed")
        } else {
            None
        };

        match stale {
            Some(reason) => {
                info!("cached index is stale: {}", reason);
                None
            }
            None => {
                info!("cached index is valid, skipping regeneration");
                Some(self.index_path.clone())
            }
        }
    }

    /// Record the state the current index was generated from.
    pub fn record(&self, sources: &[String]) -> Result<()> {
        let meta = IndexCacheMetadata {
            version: IndexCacheMetadata::CURRENT_VERSION,
            created_at: SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            language: self.language.name().to_string(),
            source_files: Self::source_mtimes(sources),
            lockfiles: self.lockfile_fingerprints(),
        };

        let json = serde_json::to_string_pretty(&meta).context("Failed to serialize index metadata")?;
        fs::write(&self.meta_path, json)
            .with_context(|| format!("Failed to write {}", self.meta_path.display()))?;

        debug!("index metadata recorded for {} source files", meta.source_files.len());
        Ok(())
    }

    pub fn invalidate(&self) -> Result<()> {
        for path in [&self.index_path, &self.meta_path] {
            if path.exists() {
                fs::remove_file(path).with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }

    fn load_metadata(&self) -> Result<IndexCacheMetadata> {
        let contents = fs::read_to_string(&self.meta_path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Unreadable files map to 0 so a file that disappears still changes the map.
    fn source_mtimes(sources: &[String]) -> BTreeMap<String, u64> {
        sources
            .iter()
            .map(|path| (path.clone(), file_mtime(Path::new(path)).unwrap_or(0)))
            .collect()
    }

    fn lockfile_fingerprints(&self) -> BTreeMap<String, String> {
        self.language
            .lockfiles()
            .iter()
            .filter_map(|name| {
                let path = self.root.join(name);
                let len = fs::metadata(&path).ok()?.len();
                let mtime = file_mtime(&path).ok()?;
                Some((name.to_string(), format!("{:x}-{:x}", len, mtime)))
            })
            .collect()
    }
}

fn file_mtime(path: &Path) -> Result<u64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(modified.duration_since(SystemTime::UNIX_EPOCH)?.as_secs())
}
