//! Symbol references.
//!
//! A `SymbolRef` is the identity of one callable program element as handed out
//! by a resolver or a caller lookup. Equality and hashing only look at the
//! opaque key, so two references obtained independently for the same element
//! are interchangeable.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Path separator used in display names and namespaces.
pub const PATH_SEP: &str = "::";

#[derive(Debug, Clone)]
pub struct SymbolRef {
    key: Arc<str>,
    display: Arc<str>,
    namespace: Arc<str>,
}

impl SymbolRef {
    pub fn new(
        key: impl Into<Arc<str>>,
        display: impl Into<Arc<str>>,
        namespace: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            key: key.into(),
            display: display.into(),
            namespace: namespace.into(),
        }
    }

    /// Build a reference from a plain `a::b::c` path. The path doubles as the
    /// key and the namespace is everything before the last segment.
    pub fn from_path(path: &str) -> Self {
        let namespace = match path.rfind(PATH_SEP) {
            Some(idx) => &path[..idx],
            None => "",
        };
        Self::new(path, path, namespace)
    }

    /// Opaque identity supplied by whoever created the reference.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Human-readable, fully qualified name.
    pub fn display_name(&self) -> &str {
        &self.display
    }

    /// Containing namespace/module, empty for top-level items.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Last segment of the display name (`method` in `pkg::Type::method`).
    pub fn member_name(&self) -> &str {
        match self.display.rfind(PATH_SEP) {
            Some(idx) => &self.display[idx + PATH_SEP.len()..],
            None => &self.display,
        }
    }

    /// Display name without its last segment (`pkg::Type` in `pkg::Type::method`).
    pub fn owner_path(&self) -> &str {
        match self.display.rfind(PATH_SEP) {
            Some(idx) => &self.display[..idx],
            None => "",
        }
    }
}

impl PartialEq for SymbolRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for SymbolRef {}

impl Hash for SymbolRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for SymbolRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}
