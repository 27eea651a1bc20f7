use std::path::PathBuf;
use thiserror::Error;

/// Failures of the caller lookup port.
#[derive(Error, Debug)]
pub enum LookupError {
    #[error("caller index unavailable: {0}")]
    Unavailable(String),
    #[error("caller store error: {0}")]
    Store(#[from] sled::Error),
    #[error("bad caller record for {symbol}: {source}")]
    Record {
        symbol: String,
        #[source]
        source: bincode::Error,
    },
}

/// Failures while building a call trace tree.
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("too deep! {symbol} still has callers at the maximum depth of {max_depth}")]
    DepthExceeded { max_depth: usize, symbol: String },
    #[error("failed to find callers of {symbol}: {source}")]
    Lookup {
        symbol: String,
        #[source]
        source: LookupError,
    },
    #[error("maximum depth must be at least 1")]
    InvalidDepth,
    #[error("trace cancelled")]
    Cancelled,
}

/// Failures while mapping a name or position to a symbol.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Couldn't find type {0}")]
    TypeNotFound(String),
    #[error("Couldn't find member '{member}' in {type_name}")]
    MemberNotFound { member: String, type_name: String },
    #[error("'{0}' is not a qualified member name (expected Type::member)")]
    MalformedName(String),
    #[error("no unit named {0} in the codebase")]
    UnitNotFound(String),
    #[error("file {file} is not part of unit {unit}")]
    FileNotFound { unit: String, file: String },
    #[error("offset {offset} is past the end of {file} ({len} bytes)")]
    OffsetOutOfRange { file: String, offset: usize, len: usize },
    #[error("no symbol at {file}:{offset}")]
    NoSymbolAtPosition { file: String, offset: usize },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Failures while loading a codebase and its semantic index.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("codebase descriptor not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read workspace metadata for {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: cargo_metadata::Error,
    },
    #[error("no usable unit in {0}")]
    NoUsableUnits(PathBuf),
    #[error("failed to build caller index: {0:#}")]
    Index(anyhow::Error),
}
