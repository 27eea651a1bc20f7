//! Call Trace Tree Builder.
//!
//! Expands a root symbol into its reverse call tree by repeatedly asking the
//! caller lookup port for direct callers. Callers are filtered before they
//! become nodes, expanded depth-first in the order the port returns them, and
//! bounded by a depth guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::calltree::{Branch, CallTree, Cut};
use crate::domain::exclusion::ExclusionFilter;
use crate::domain::symbol::SymbolRef;
use crate::error::TraceError;
use crate::ports::CallerLookup;

pub const DEFAULT_MAX_DEPTH: usize = 20;

/// What happens when a node at the maximum depth still has callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthPolicy {
    /// Abort the whole trace with `TraceError::DepthExceeded`.
    #[default]
    Fail,
    /// Keep the node as a leaf marked `Cut::DepthLimit`.
    Truncate,
}

#[derive(Debug, Clone)]
pub struct TraceOptions {
    pub max_depth: usize,
    pub exclusions: ExclusionFilter,
    pub depth_policy: DepthPolicy,
    /// Stop at callers that already appear on the path back to the root.
    pub cycle_guard: bool,
    /// Expand sibling subtrees on the rayon pool.
    pub parallel: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            exclusions: ExclusionFilter::default(),
            depth_policy: DepthPolicy::Fail,
            cycle_guard: false,
            parallel: false,
        }
    }
}

/// Cooperative cancellation flag, checked before every lookup.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Root-ward chain of the symbols currently being expanded.
struct PathLink<'a> {
    symbol: &'a SymbolRef,
    parent: Option<&'a PathLink<'a>>,
}

impl PathLink<'_> {
    fn contains(&self, symbol: &SymbolRef) -> bool {
        let mut link = Some(self);
        while let Some(l) = link {
            if l.symbol == symbol {
                return true;
            }
            link = l.parent;
        }
        false
    }
}

#[derive(Debug, Clone, Default)]
pub struct TraceBuilder {
    options: TraceOptions,
    cancel: Option<CancelToken>,
}

impl TraceBuilder {
    pub fn new(options: TraceOptions) -> Self {
        Self {
            options,
            cancel: None,
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn options(&self) -> &TraceOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut TraceOptions {
        &mut self.options
    }

    /// Build the reverse call tree of `root`.
    ///
    /// Nothing is kept from a failed or cancelled run: subtrees are owned by
    /// the recursion and only laid out into a `CallTree` once the whole
    /// expansion succeeded.
    pub fn build<L>(&self, root: SymbolRef, lookup: &L) -> Result<CallTree, TraceError>
    where
        L: CallerLookup + ?Sized,
    {
        if self.options.max_depth == 0 {
            return Err(TraceError::InvalidDepth);
        }
        debug!(
            "building trace for {} (max depth {}, {:?})",
            root, self.options.max_depth, self.options.depth_policy
        );
        let abort = AtomicBool::new(false);
        let mode = if self.options.parallel {
            Some(&abort)
        } else {
            None
        };
        match self.expand(&root, 0, None, lookup, mode) {
            Ok(branch) => Ok(CallTree::from_branch(branch)),
            Err(Halt::Failed(e)) => Err(e),
            // Only reachable if no subtree reported its failure
            Err(Halt::Aborted) => Err(TraceError::Cancelled),
        }
    }

    /// `abort` is set when expanding siblings in parallel: the first failing
    /// subtree raises it and every other subtree stops at its next node.
    fn expand<L>(
        &self,
        symbol: &SymbolRef,
        depth: usize,
        parent: Option<&PathLink<'_>>,
        lookup: &L,
        abort: Option<&AtomicBool>,
    ) -> Result<Branch, Halt>
    where
        L: CallerLookup + ?Sized,
    {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(TraceError::Cancelled.into());
        }
        if abort.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(Halt::Aborted);
        }

        let callers: Vec<SymbolRef> = lookup
            .find_callers(symbol)
            .map_err(|source| TraceError::Lookup {
                symbol: symbol.to_string(),
                source,
            })?
            .into_iter()
            .filter(|caller| !self.options.exclusions.excludes(caller))
            .collect();

        if callers.is_empty() {
            return Ok(Branch::leaf(symbol.clone()));
        }

        if depth >= self.options.max_depth {
            return match self.options.depth_policy {
                DepthPolicy::Fail => Err(TraceError::DepthExceeded {
                    max_depth: self.options.max_depth,
                    symbol: symbol.to_string(),
                }
                .into()),
                DepthPolicy::Truncate => {
                    warn!(
                        "{} still has {} caller(s) at depth {}, truncating",
                        symbol,
                        callers.len(),
                        depth
                    );
                    Ok(Branch::cut(symbol.clone(), Cut::DepthLimit))
                }
            };
        }

        let link = PathLink { symbol, parent };
        let expand_caller = |caller: &SymbolRef, abort: Option<&AtomicBool>| -> Result<Branch, Halt> {
            if self.options.cycle_guard && link.contains(caller) {
                debug!("cycle: {} already on the path to the root", caller);
                return Ok(Branch::cut(caller.clone(), Cut::Cycle));
            }
            self.expand(caller, depth + 1, Some(&link), lookup, abort)
        };

        let branches = match abort {
            // Sequential: the first failure in caller order stops the loop
            None => callers
                .iter()
                .map(|caller| expand_caller(caller, None))
                .collect::<Result<Vec<_>, _>>()?,
            Some(flag) => {
                let results: Vec<Result<Branch, Halt>> = callers
                    .par_iter()
                    .map(|caller| {
                        let result = expand_caller(caller, Some(flag));
                        if matches!(result, Err(Halt::Failed(_))) {
                            flag.store(true, Ordering::Relaxed);
                        }
                        result
                    })
                    .collect();

                let first_failure = results.iter().position(|r| matches!(r, Err(Halt::Failed(_))));
                let mut branches = Vec::with_capacity(results.len());
                for (i, result) in results.into_iter().enumerate() {
                    match result {
                        Ok(branch) => branches.push(branch),
                        // An earlier sibling was cut short by a later one's failure.
                        // Finish it sequentially so the reported error is the one a
                        // sequential run hits first.
                        Err(Halt::Aborted) => match first_failure {
                            Some(failed) if i < failed => branches.push(expand_caller(&callers[i], None)?),
                            _ => return Err(Halt::Aborted),
                        },
                        Err(failure) => return Err(failure),
                    }
                }
                branches
            }
        };

        Ok(Branch {
            symbol: symbol.clone(),
            callers: branches,
            cut: None,
        })
    }
}

/// Why an expansion stopped before finishing its subtree.
enum Halt {
    Failed(TraceError),
    /// A sibling subtree failed first.
    Aborted,
}

impl From<TraceError> for Halt {
    fn from(error: TraceError) -> Self {
        Halt::Failed(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::exclusion::ExclusionRule;
    use crate::domain::store::{CallerStore, MemoryCallerStore};
    use crate::error::LookupError;

    fn sym(path: &str) -> SymbolRef {
        SymbolRef::from_path(path)
    }

    fn graph(edges: &[(&str, &str)]) -> MemoryCallerStore {
        let store = MemoryCallerStore::default();
        for (caller, callee) in edges {
            store.record_call(&sym(caller), &sym(callee)).unwrap();
        }
        store
    }

    fn names(tree: &CallTree) -> Vec<String> {
        tree.iter()
            .map(|(_, n)| format!("{}{}", "-".repeat(n.depth()), n.symbol()))
            .collect()
    }

    #[test]
    fn test_builds_reverse_tree() {
        let store = graph(&[("app::a", "app::root"), ("app::b", "app::a"), ("app::c", "app::root")]);
        let tree = TraceBuilder::default().build(sym("app::root"), &store).unwrap();
        assert_eq!(names(&tree), ["app::root", "-app::a", "--app::b", "-app::c"]);
    }

    #[test]
    fn test_cycle_fails_at_depth_bound() {
        let store = graph(&[("app::ping", "app::pong"), ("app::pong", "app::ping")]);
        let builder = TraceBuilder::new(TraceOptions {
            max_depth: 5,
            ..TraceOptions::default()
        });
        match builder.build(sym("app::ping"), &store) {
            Err(TraceError::DepthExceeded { max_depth, .. }) => assert_eq!(max_depth, 5),
            other => panic!("expected DepthExceeded, got {:?}", other),
        }
    }

    #[test]
    fn test_chain_exactly_at_max_depth_is_fine() {
        let store = graph(&[("app::b", "app::a"), ("app::c", "app::b")]);
        let builder = TraceBuilder::new(TraceOptions {
            max_depth: 2,
            ..TraceOptions::default()
        });
        let tree = builder.build(sym("app::a"), &store).unwrap();
        assert_eq!(tree.max_depth(), 2);
    }

    #[test]
    fn test_truncate_policy_marks_node() {
        let store = graph(&[("app::recurse", "app::recurse")]);
        let builder = TraceBuilder::new(TraceOptions {
            max_depth: 3,
            depth_policy: DepthPolicy::Truncate,
            ..TraceOptions::default()
        });
        let tree = builder.build(sym("app::recurse"), &store).unwrap();
        assert_eq!(tree.len(), 4);
        let last = tree.entry_points().next().unwrap();
        assert_eq!(tree.node(last).cut(), Some(Cut::DepthLimit));
        assert_eq!(tree.node(last).depth(), 3);
    }

    #[test]
    fn test_cycle_guard_short_circuits() {
        let store = graph(&[("app::b", "app::a"), ("app::a", "app::b")]);
        let builder = TraceBuilder::new(TraceOptions {
            cycle_guard: true,
            ..TraceOptions::default()
        });
        let tree = builder.build(sym("app::a"), &store).unwrap();
        assert_eq!(names(&tree), ["app::a", "-app::b", "--app::a"]);
        let leaf = tree.entry_points().next().unwrap();
        assert_eq!(tree.node(leaf).cut(), Some(Cut::Cycle));
    }

    #[test]
    fn test_exclusion_prunes_subtree() {
        let store = graph(&[
            ("app::tests::helper", "app::target"),
            ("app::runner", "app::tests::helper"),
            ("app::main", "app::target"),
        ]);
        let builder = TraceBuilder::new(TraceOptions {
            exclusions: ExclusionFilter::new(vec![ExclusionRule::new("::tests")]),
            ..TraceOptions::default()
        });
        let tree = builder.build(sym("app::target"), &store).unwrap();
        assert_eq!(names(&tree), ["app::target", "-app::main"]);
    }

    #[test]
    fn test_zero_depth_rejected() {
        let builder = TraceBuilder::new(TraceOptions {
            max_depth: 0,
            ..TraceOptions::default()
        });
        assert!(matches!(
            builder.build(sym("x"), &MemoryCallerStore::default()),
            Err(TraceError::InvalidDepth)
        ));
    }

    #[test]
    fn test_cancelled_before_first_lookup() {
        let token = CancelToken::new();
        token.cancel();
        let builder = TraceBuilder::default().with_cancel_token(token);
        let store = graph(&[("app::a", "app::root")]);
        assert!(matches!(
            builder.build(sym("app::root"), &store),
            Err(TraceError::Cancelled)
        ));
    }

    /// Every symbol is called by `a`, `b` and `c`.
    struct Clique {
        lookups: std::sync::atomic::AtomicUsize,
    }

    impl Clique {
        fn new() -> Self {
            Self {
                lookups: std::sync::atomic::AtomicUsize::new(0),
            }
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    impl CallerLookup for Clique {
        fn find_callers(&self, _symbol: &SymbolRef) -> Result<Vec<SymbolRef>, LookupError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(vec![sym("app::a"), sym("app::b"), sym("app::c")])
        }
    }

    #[test]
    fn test_depth_failure_stops_sibling_expansion() {
        for max_depth in [4, 8, 20] {
            let clique = Clique::new();
            let builder = TraceBuilder::new(TraceOptions {
                max_depth,
                ..TraceOptions::default()
            });
            assert!(matches!(
                builder.build(sym("app::a"), &clique),
                Err(TraceError::DepthExceeded { .. })
            ));
            assert!(clique.lookups() <= max_depth + 1, "{} lookups", clique.lookups());
        }
    }

    #[test]
    fn test_parallel_depth_failure_stops_early() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
        let clique = Clique::new();
        let builder = TraceBuilder::new(TraceOptions {
            max_depth: 8,
            parallel: true,
            ..TraceOptions::default()
        });
        let err = pool.install(|| builder.build(sym("app::a"), &clique)).unwrap_err();
        assert!(matches!(err, TraceError::DepthExceeded { .. }));
        // the full tree down to depth 8 takes 9841 lookups
        assert!(clique.lookups() < 2_000, "{} lookups", clique.lookups());
    }

    #[test]
    fn test_parallel_reports_first_failure_in_caller_order() {
        // target <- slow (fails deep) ; target <- fast (fails at once)
        let store = graph(&[
            ("app::slow", "app::target"),
            ("app::fast", "app::target"),
            ("app::fast", "app::fast"),
            ("app::s1", "app::slow"),
            ("app::s2", "app::s1"),
            ("app::s3", "app::s2"),
        ]);
        let options = TraceOptions {
            max_depth: 3,
            ..TraceOptions::default()
        };
        let sequential = TraceBuilder::new(options.clone())
            .build(sym("app::target"), &store)
            .unwrap_err();
        let parallel = TraceBuilder::new(TraceOptions {
            parallel: true,
            ..options
        })
        .build(sym("app::target"), &store)
        .unwrap_err();
        assert!(sequential.to_string().contains("app::s2"));
        assert_eq!(sequential.to_string(), parallel.to_string());
    }

    struct Broken;

    impl CallerLookup for Broken {
        fn find_callers(&self, _symbol: &SymbolRef) -> Result<Vec<SymbolRef>, LookupError> {
            Err(LookupError::Unavailable("index offline".to_string()))
        }
    }

    #[test]
    fn test_lookup_failure_propagates() {
        let err = TraceBuilder::default().build(sym("app::x"), &Broken).unwrap_err();
        assert!(matches!(err, TraceError::Lookup { .. }));
        assert!(err.to_string().contains("app::x"));
    }
}
