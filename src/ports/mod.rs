use crate::domain::symbol::SymbolRef;
use crate::error::{LookupError, ResolveError};

/// "Who calls this symbol?"
///
/// The implementor is the codebase handle itself. It must return each direct
/// caller once, in a stable order, and be safe to query from several threads.
pub trait CallerLookup: Send + Sync {
    fn find_callers(&self, symbol: &SymbolRef) -> Result<Vec<SymbolRef>, LookupError>;
}

/// Maps names and positions to symbols. Only used to obtain trace roots.
pub trait SymbolResolver: Send + Sync {
    /// Every member called `member_name` on `type_name`, in a stable order.
    fn resolve_by_qualified_name(
        &self,
        type_name: &str,
        member_name: &str,
    ) -> Result<Vec<SymbolRef>, ResolveError>;

    /// The symbol under byte `offset` of `file` inside `unit`.
    fn resolve_at_position(
        &self,
        unit: &str,
        file: &str,
        offset: usize,
    ) -> Result<SymbolRef, ResolveError>;
}
