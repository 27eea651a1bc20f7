//! Trace Renderer
//!
//! Plain indented text. One path per entry point, running from the entry
//! point down to the traced symbol with two more spaces per level.

use std::collections::HashSet;
use std::fmt;

use crate::domain::calltree::{CallTree, NodeId, TraceNode};
use crate::domain::symbol::SymbolRef;

pub const INDENT: &str = "  ";

fn node_line(node: &TraceNode, level: usize) -> String {
    let mut line = INDENT.repeat(level);
    line.push_str(node.symbol().display_name());
    if let Some(cut) = node.cut() {
        line.push(' ');
        line.push_str(cut.marker());
    }
    line
}

/// Render the chain from `entry` back down to the root of `tree`.
pub fn render_path(tree: &CallTree, entry: NodeId) -> String {
    tree.path_to_root(entry)
        .enumerate()
        .map(|(level, id)| node_line(tree.node(id), level))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render every caller under the symbol it calls, root excluded.
pub fn render_tree(tree: &CallTree) -> String {
    tree.iter()
        .filter(|(_, node)| node.calls().is_some())
        .map(|(_, node)| node_line(node, node.depth() - 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportStyle {
    /// One block per entry-point-to-target path.
    #[default]
    Paths,
    /// The whole caller tree in a single block.
    Tree,
}

/// Output for one traced symbol.
#[derive(Debug, Clone)]
pub struct TraceSection {
    pub target: SymbolRef,
    pub blocks: Vec<String>,
}

impl TraceSection {
    pub fn from_tree(target: SymbolRef, tree: &CallTree, style: ReportStyle, dedupe: bool) -> Self {
        let blocks = match style {
            ReportStyle::Paths => {
                let mut seen = HashSet::new();
                tree.entry_points()
                    .filter(|id| !dedupe || seen.insert(tree.node(*id).symbol().clone()))
                    .map(|id| render_path(tree, id))
                    .collect()
            }
            ReportStyle::Tree => {
                let text = render_tree(tree);
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![text]
                }
            }
        };
        Self { target, blocks }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TraceReport {
    sections: Vec<TraceSection>,
}

impl TraceReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, section: TraceSection) {
        self.sections.push(section);
    }

    pub fn sections(&self) -> &[TraceSection] {
        &self.sections
    }
}

impl fmt::Display for TraceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "Traces of {}", section.target)?;
            for (j, block) in section.blocks.iter().enumerate() {
                if j > 0 {
                    writeln!(f)?;
                }
                writeln!(f, "{}", block)?;
            }
        }
        Ok(())
    }
}
