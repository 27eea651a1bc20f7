use crate::domain::scip_ingest::OccurrenceRecord;
use crate::domain::symbol::SymbolRef;
use crate::error::LookupError;
use crate::ports::CallerLookup;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sled::Db;

/// Trait for reverse caller index backends.
/// Implementations must be thread-safe (Send + Sync): traces may query them
/// from several rayon workers at once.
pub trait CallerStore: Send + Sync {
    fn insert_symbol(&self, symbol: &SymbolRef) -> Result<(), LookupError>;
    /// Record that `caller_key` directly calls `callee_key`. Repeats are ignored.
    fn add_caller(&self, callee_key: &str, caller_key: &str) -> Result<(), LookupError>;
    fn symbol(&self, key: &str) -> Result<Option<SymbolRef>, LookupError>;
    /// Callers of `key` in the order they were first recorded.
    fn callers_of(&self, key: &str) -> Result<Vec<SymbolRef>, LookupError>;
    /// Every known symbol, in no particular order.
    fn symbols(&self) -> Result<Vec<SymbolRef>, LookupError>;
    fn insert_document(&self, path: &str, occurrences: Vec<OccurrenceRecord>) -> Result<(), LookupError>;
    fn document(&self, path: &str) -> Result<Option<Vec<OccurrenceRecord>>, LookupError>;
    fn document_paths(&self) -> Result<Vec<String>, LookupError>;

    fn record_call(&self, caller: &SymbolRef, callee: &SymbolRef) -> Result<(), LookupError> {
        self.insert_symbol(caller)?;
        self.insert_symbol(callee)?;
        self.add_caller(callee.key(), caller.key())
    }
}

/// Serialized form of a `SymbolRef`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SymbolRecord {
    key: String,
    display: String,
    namespace: String,
}

impl From<&SymbolRef> for SymbolRecord {
    fn from(symbol: &SymbolRef) -> Self {
        Self {
            key: symbol.key().to_string(),
            display: symbol.display_name().to_string(),
            namespace: symbol.namespace().to_string(),
        }
    }
}

impl From<SymbolRecord> for SymbolRef {
    fn from(record: SymbolRecord) -> Self {
        SymbolRef::new(record.key, record.display, record.namespace)
    }
}

// ============================================================================
// MemoryCallerStore - Fast in-memory storage using DashMap
// ============================================================================

#[derive(Default)]
pub struct MemoryCallerStore {
    symbols: DashMap<String, SymbolRef>,
    callers: DashMap<String, Vec<String>>,
    documents: DashMap<String, Vec<OccurrenceRecord>>,
}

impl MemoryCallerStore {
    fn resolve_keys(&self, keys: &[String]) -> Vec<SymbolRef> {
        keys.iter()
            .map(|k| {
                self.symbols
                    .get(k)
                    .map(|r| r.clone())
                    .unwrap_or_else(|| SymbolRef::from_path(k))
            })
            .collect()
    }
}

impl CallerStore for MemoryCallerStore {
    fn insert_symbol(&self, symbol: &SymbolRef) -> Result<(), LookupError> {
        self.symbols
            .entry(symbol.key().to_string())
            .or_insert_with(|| symbol.clone());
        Ok(())
    }

    fn add_caller(&self, callee_key: &str, caller_key: &str) -> Result<(), LookupError> {
        let mut callers = self.callers.entry(callee_key.to_string()).or_default();
        if !callers.iter().any(|c| c == caller_key) {
            callers.push(caller_key.to_string());
        }
        Ok(())
    }

    fn symbol(&self, key: &str) -> Result<Option<SymbolRef>, LookupError> {
        Ok(self.symbols.get(key).map(|r| r.clone()))
    }

    fn callers_of(&self, key: &str) -> Result<Vec<SymbolRef>, LookupError> {
        // Clone the keys first so no shard lock is held while reading `symbols`.
        let keys = match self.callers.get(key) {
            Some(keys) => keys.clone(),
            None => return Ok(Vec::new()),
        };
        Ok(self.resolve_keys(&keys))
    }

    fn symbols(&self) -> Result<Vec<SymbolRef>, LookupError> {
        Ok(self.symbols.iter().map(|e| e.value().clone()).collect())
    }

    fn insert_document(&self, path: &str, occurrences: Vec<OccurrenceRecord>) -> Result<(), LookupError> {
        self.documents.insert(path.to_string(), occurrences);
        Ok(())
    }

    fn document(&self, path: &str) -> Result<Option<Vec<OccurrenceRecord>>, LookupError> {
        Ok(self.documents.get(path).map(|r| r.clone()))
    }

    fn document_paths(&self) -> Result<Vec<String>, LookupError> {
        Ok(self.documents.iter().map(|e| e.key().clone()).collect())
    }
}

impl CallerLookup for MemoryCallerStore {
    fn find_callers(&self, symbol: &SymbolRef) -> Result<Vec<SymbolRef>, LookupError> {
        self.callers_of(symbol.key())
    }
}

// ============================================================================
// DiskCallerStore - Persistent storage using sled, reused across runs
// ============================================================================

pub struct DiskCallerStore {
    db: Db,
    symbols_tree: sled::Tree,
    callers_tree: sled::Tree,
    documents_tree: sled::Tree,
}

const STAMP_KEY: &[u8] = b"ingested_from";

impl DiskCallerStore {
    pub fn open(path: &std::path::Path) -> Result<Self, LookupError> {
        let db = sled::open(path)?;
        let symbols_tree = db.open_tree("symbols")?;
        let callers_tree = db.open_tree("callers")?;
        let documents_tree = db.open_tree("documents")?;

        Ok(Self {
            db,
            symbols_tree,
            callers_tree,
            documents_tree,
        })
    }

    /// Fingerprint of the index this store was filled from, if any.
    pub fn stamp(&self) -> Result<Option<String>, LookupError> {
        Ok(self
            .db
            .get(STAMP_KEY)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub fn set_stamp(&self, stamp: &str) -> Result<(), LookupError> {
        self.db.insert(STAMP_KEY, stamp.as_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    /// Drop every record, e.g. before re-ingesting a changed index.
    pub fn clear(&self) -> Result<(), LookupError> {
        self.symbols_tree.clear()?;
        self.callers_tree.clear()?;
        self.documents_tree.clear()?;
        self.db.remove(STAMP_KEY)?;
        Ok(())
    }

    fn decode<T: serde::de::DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, LookupError> {
        bincode::deserialize(bytes).map_err(|source| LookupError::Record {
            symbol: key.to_string(),
            source,
        })
    }

    fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, LookupError> {
        bincode::serialize(value).map_err(|source| LookupError::Record {
            symbol: key.to_string(),
            source,
        })
    }

    fn caller_keys(&self, key: &str) -> Result<Vec<String>, LookupError> {
        match self.callers_tree.get(key.as_bytes())? {
            Some(bytes) => Self::decode(key, &bytes),
            None => Ok(Vec::new()),
        }
    }
}

impl CallerStore for DiskCallerStore {
    fn insert_symbol(&self, symbol: &SymbolRef) -> Result<(), LookupError> {
        let bytes = Self::encode(symbol.key(), &SymbolRecord::from(symbol))?;
        self.symbols_tree.insert(symbol.key().as_bytes(), bytes)?;
        Ok(())
    }

    fn add_caller(&self, callee_key: &str, caller_key: &str) -> Result<(), LookupError> {
        // Read-modify-write pattern for the caller list
        let mut keys = self.caller_keys(callee_key)?;
        if !keys.iter().any(|k| k == caller_key) {
            keys.push(caller_key.to_string());
            let bytes = Self::encode(callee_key, &keys)?;
            self.callers_tree.insert(callee_key.as_bytes(), bytes)?;
        }
        Ok(())
    }

    fn symbol(&self, key: &str) -> Result<Option<SymbolRef>, LookupError> {
        match self.symbols_tree.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode::<SymbolRecord>(key, &bytes)?.into())),
            None => Ok(None),
        }
    }

    fn callers_of(&self, key: &str) -> Result<Vec<SymbolRef>, LookupError> {
        self.caller_keys(key)?
            .iter()
            .map(|k| -> Result<SymbolRef, LookupError> {
                Ok(self.symbol(k)?.unwrap_or_else(|| SymbolRef::from_path(k)))
            })
            .collect()
    }

    fn symbols(&self) -> Result<Vec<SymbolRef>, LookupError> {
        self.symbols_tree
            .iter()
            .map(|entry| -> Result<SymbolRef, LookupError> {
                let (key, bytes) = entry?;
                let key = String::from_utf8_lossy(&key);
                Ok(Self::decode::<SymbolRecord>(&key, &bytes)?.into())
            })
            .collect()
    }

    fn insert_document(&self, path: &str, occurrences: Vec<OccurrenceRecord>) -> Result<(), LookupError> {
        let bytes = Self::encode(path, &occurrences)?;
        self.documents_tree.insert(path.as_bytes(), bytes)?;
        Ok(())
    }

    fn document(&self, path: &str) -> Result<Option<Vec<OccurrenceRecord>>, LookupError> {
        match self.documents_tree.get(path.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(path, &bytes)?)),
            None => Ok(None),
        }
    }

    fn document_paths(&self) -> Result<Vec<String>, LookupError> {
        self.documents_tree
            .iter()
            .keys()
            .map(|key| -> Result<String, LookupError> { Ok(String::from_utf8_lossy(&key?).into_owned()) })
            .collect()
    }
}

impl CallerLookup for DiskCallerStore {
    fn find_callers(&self, symbol: &SymbolRef) -> Result<Vec<SymbolRef>, LookupError> {
        self.callers_of(symbol.key())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
