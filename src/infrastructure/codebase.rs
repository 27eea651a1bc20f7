/// Codebase Handle
///
/// A loaded codebase: its units plus the caller index built from its SCIP
/// index. Implements both ports, so the trace use case can run against it
/// directly.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, info};

use super::index_cache::IndexCache;
use super::project_loader::{ProjectLoader, Unit};
use super::scip_runner;
use crate::domain::language::Language;
use crate::domain::scip_ingest::{occurrence_at, ScipIngestor};
use crate::domain::scip_symbol;
use crate::domain::store::{CallerStore, DiskCallerStore, MemoryCallerStore};
use crate::domain::symbol::{SymbolRef, PATH_SEP};
use crate::error::{LoadError, LookupError, ResolveError};
use crate::ports::{CallerLookup, SymbolResolver};

#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Overrides language detection.
    pub language: Option<Language>,
    /// Keep the caller index in a sled database here and reuse it across runs.
    pub store_dir: Option<PathBuf>,
    /// Ignore cached indexes and stores.
    pub reindex: bool,
}

pub struct Codebase {
    root: PathBuf,
    language: Language,
    units: Vec<Unit>,
    store: Box<dyn CallerStore>,
}

impl Codebase {
    pub fn open(descriptor: &Path, options: &OpenOptions) -> Result<Self, LoadError> {
        let project = ProjectLoader::load(descriptor, options.language)?;

        let index_path = match &project.index_path {
            Some(path) => path.clone(),
            None => {
                if options.reindex {
                    IndexCache::new(&project.root, project.language)
                        .invalidate()
                        .map_err(LoadError::Index)?;
                }
                scip_runner::generate_index(&project.root, project.language, &project.source_files)
                    .map_err(LoadError::Index)?
            }
        };

        let store: Box<dyn CallerStore> = match &options.store_dir {
            Some(dir) => Box::new(open_disk_store(dir, &index_path, options.reindex)?),
            None => {
                let store = MemoryCallerStore::default();
                ScipIngestor::ingest_file(&index_path, &store).map_err(LoadError::Index)?;
                Box::new(store)
            }
        };

        info!(
            "opened {} codebase {} with {} units",
            project.language,
            project.root.display(),
            project.units.len()
        );
        Ok(Self::from_parts(project.root, project.language, project.units, store))
    }

    /// Assemble a codebase from an already populated store.
    pub fn from_parts(root: PathBuf, language: Language, units: Vec<Unit>, store: Box<dyn CallerStore>) -> Self {
        Self {
            root,
            language,
            units,
            store,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// Map a file argument to the document path the index uses for it.
    fn document_path(&self, unit: &Unit, file: &str) -> Result<String, ResolveError> {
        let absolute = if Path::new(file).is_absolute() {
            PathBuf::from(file)
        } else {
            unit.root.join(file)
        };
        if let Ok(relative) = absolute.strip_prefix(&self.root) {
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if self.store.document(&relative)?.is_some() {
                return Ok(relative);
            }
        }

        // Fall back to the one indexed document whose path ends with `file`
        let wanted = file.trim_start_matches("./").replace('\\', "/");
        let mut matches: Vec<String> = self
            .store
            .document_paths()?
            .into_iter()
            .filter(|path| path == &wanted || path.ends_with(&format!("/{}", wanted)))
            .collect();
        match matches.len() {
            1 => Ok(matches.remove(0)),
            _ => Err(ResolveError::FileNotFound {
                unit: unit.name.clone(),
                file: file.to_string(),
            }),
        }
    }
}

fn open_disk_store(dir: &Path, index_path: &Path, reindex: bool) -> Result<DiskCallerStore, LoadError> {
    let store = DiskCallerStore::open(dir).map_err(|e| LoadError::Index(e.into()))?;
    let stamp = index_stamp(index_path);

    let current = store.stamp().map_err(|e| LoadError::Index(e.into()))?;
    if !reindex && current.as_deref() == Some(stamp.as_str()) {
        info!("reusing caller store at {}", dir.display());
        return Ok(store);
    }

    debug!("caller store at {} is stale, re-ingesting", dir.display());
    store.clear().map_err(|e| LoadError::Index(e.into()))?;
    ScipIngestor::ingest_file(index_path, &store).map_err(LoadError::Index)?;
    store.set_stamp(&stamp).map_err(|e| LoadError::Index(e.into()))?;
    Ok(store)
}

/// Identifies one version of an index file.
fn index_stamp(index_path: &Path) -> String {
    let meta = fs::metadata(index_path).ok();
    let len = meta.as_ref().map_or(0, |m| m.len());
    let mtime = meta
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_nanos());
    format!("{}:{}:{}", index_path.display(), len, mtime)
}

/// Zero-based line and byte column of a byte offset.
fn offset_to_position(text: &[u8], offset: usize) -> (i32, i32) {
    let before = &text[..offset];
    let line = before.iter().filter(|b| **b == b'\n').count();
    let line_start = before.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1);
    (line as i32, (offset - line_start) as i32)
}

impl CallerLookup for Codebase {
    fn find_callers(&self, symbol: &SymbolRef) -> Result<Vec<SymbolRef>, LookupError> {
        self.store.callers_of(symbol.key())
    }
}

impl SymbolResolver for Codebase {
    fn resolve_by_qualified_name(
        &self,
        type_name: &str,
        member_name: &str,
    ) -> Result<Vec<SymbolRef>, ResolveError> {
        let suffix = format!("{}{}", PATH_SEP, type_name);
        let in_type: Vec<SymbolRef> = self
            .store
            .symbols()?
            .into_iter()
            .filter(|s| s.owner_path() == type_name || s.owner_path().ends_with(&suffix))
            .collect();
        if in_type.is_empty() {
            return Err(ResolveError::TypeNotFound(type_name.to_string()));
        }

        let mut members: Vec<SymbolRef> = in_type
            .into_iter()
            .filter(|s| {
                s.member_name() == member_name || scip_symbol::bare_member(s.member_name()) == member_name
            })
            .collect();
        if members.is_empty() {
            return Err(ResolveError::MemberNotFound {
                member: member_name.to_string(),
                type_name: type_name.to_string(),
            });
        }
        members.sort_by(|a, b| (a.display_name(), a.key()).cmp(&(b.display_name(), b.key())));
        Ok(members)
    }

    fn resolve_at_position(&self, unit: &str, file: &str, offset: usize) -> Result<SymbolRef, ResolveError> {
        let unit = self
            .units
            .iter()
            .find(|u| u.name == unit)
            .ok_or_else(|| ResolveError::UnitNotFound(unit.to_string()))?;
        let document = self.document_path(unit, file)?;

        let path = self.root.join(&document);
        let text = fs::read(&path).map_err(|source| ResolveError::Io {
            path: path.clone(),
            source,
        })?;
        if offset > text.len() {
            return Err(ResolveError::OffsetOutOfRange {
                file: document,
                offset,
                len: text.len(),
            });
        }

        let (line, col) = offset_to_position(&text, offset);
        let occurrences = self.store.document(&document)?.unwrap_or_default();
        let occurrence = occurrence_at(&occurrences, line, col)
            .filter(|o| !scip_symbol::is_local(&o.symbol))
            .ok_or_else(|| ResolveError::NoSymbolAtPosition {
                file: document.clone(),
                offset,
            })?;
        debug!("{}:{}:{} resolves to {}", document, line, col, occurrence.symbol);

        Ok(self
            .store
            .symbol(&occurrence.symbol)?
            .unwrap_or_else(|| scip_symbol::symbol_ref(&occurrence.symbol)))
    }
}
