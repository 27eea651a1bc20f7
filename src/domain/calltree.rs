//! Reverse call tree.
//!
//! The tree is rooted at the traced symbol. Every other node stands for a
//! caller of its parent: `calls` points one step toward the root and
//! `callers` lists the node's own callers in discovery order. Nodes live in
//! an arena and are laid out in depth-first preorder, so `NodeId(0)` is
//! always the root.

use crate::domain::symbol::SymbolRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Why a node was not expanded even though it may have callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cut {
    /// The symbol already appears between this node and the root.
    Cycle,
    /// The node sits at the maximum depth and the run truncates instead of failing.
    DepthLimit,
}

impl Cut {
    pub fn marker(self) -> &'static str {
        match self {
            Cut::Cycle => "[cycle]",
            Cut::DepthLimit => "[depth limit]",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceNode {
    symbol: SymbolRef,
    calls: Option<NodeId>,
    callers: Vec<NodeId>,
    depth: usize,
    cut: Option<Cut>,
}

impl TraceNode {
    pub fn symbol(&self) -> &SymbolRef {
        &self.symbol
    }

    /// The node this one was discovered as a caller of; `None` for the root.
    pub fn calls(&self) -> Option<NodeId> {
        self.calls
    }

    pub fn callers(&self) -> &[NodeId] {
        &self.callers
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn cut(&self) -> Option<Cut> {
        self.cut
    }

    pub fn is_leaf(&self) -> bool {
        self.callers.is_empty()
    }
}

/// Owned subtree handed over by the builder. Branches are only assembled
/// into a `CallTree` once a whole trace succeeded.
#[derive(Debug, Clone)]
pub struct Branch {
    pub symbol: SymbolRef,
    pub callers: Vec<Branch>,
    pub cut: Option<Cut>,
}

impl Branch {
    pub fn leaf(symbol: SymbolRef) -> Self {
        Self {
            symbol,
            callers: Vec::new(),
            cut: None,
        }
    }

    pub fn cut(symbol: SymbolRef, cut: Cut) -> Self {
        Self {
            symbol,
            callers: Vec::new(),
            cut: Some(cut),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallTree {
    nodes: Vec<TraceNode>,
}

impl CallTree {
    pub fn from_branch(root: Branch) -> Self {
        let mut nodes = Vec::new();
        graft(&mut nodes, root, None, 0);
        Self { nodes }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &TraceNode {
        &self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in depth-first preorder.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &TraceNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn max_depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Every node without callers, depth-first with siblings in discovery
    /// order. Calling it again walks the tree again from the start.
    pub fn entry_points(&self) -> EntryPoints<'_> {
        EntryPoints {
            tree: self,
            stack: vec![self.root()],
        }
    }

    /// Walk from `id` along the `calls` links down to the root, inclusive.
    pub fn path_to_root(&self, id: NodeId) -> PathToRoot<'_> {
        PathToRoot {
            tree: self,
            next: Some(id),
        }
    }
}

fn graft(nodes: &mut Vec<TraceNode>, branch: Branch, calls: Option<NodeId>, depth: usize) -> NodeId {
    let id = NodeId(nodes.len());
    nodes.push(TraceNode {
        symbol: branch.symbol,
        calls,
        callers: Vec::with_capacity(branch.callers.len()),
        depth,
        cut: branch.cut,
    });
    for caller in branch.callers {
        let child = graft(nodes, caller, Some(id), depth + 1);
        nodes[id.0].callers.push(child);
    }
    id
}

#[derive(Debug, Clone)]
pub struct EntryPoints<'a> {
    tree: &'a CallTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for EntryPoints<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        while let Some(id) = self.stack.pop() {
            let node = self.tree.node(id);
            if node.is_leaf() {
                return Some(id);
            }
            self.stack.extend(node.callers.iter().rev().copied());
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct PathToRoot<'a> {
    tree: &'a CallTree,
    next: Option<NodeId>,
}

impl<'a> Iterator for PathToRoot<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.node(id).calls;
        Some(id)
    }
}
