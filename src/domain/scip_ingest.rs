/// SCIP Index Ingestor.
/// Reads a SCIP index and fills a `CallerStore` with the reverse call graph:
/// every reference is attributed to the innermost definition that encloses it,
/// and that definition is recorded as a caller of the referenced symbol.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info};
use memmap2::Mmap;
use protobuf::Message;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::domain::scip_symbol;
use crate::domain::store::CallerStore;

const ROLE_DEFINITION: i32 = 0x1;
const ROLE_IMPORT: i32 = 0x2;

/// A range in source code. SCIP lines and columns are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start_line: i32,
    pub start_col: i32,
    pub end_line: i32,
    pub end_col: i32,
}

impl SourceRange {
    pub fn new(start_line: i32, start_col: i32, end_line: i32, end_col: i32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// SCIP encodes `[start_line, start_col, end_col]` for single-line ranges
    /// and `[start_line, start_col, end_line, end_col]` otherwise.
    pub fn from_scip(range: &[i32]) -> Option<Self> {
        match *range {
            [line, start, end] => Some(Self::new(line, start, line, end)),
            [start_line, start_col, end_line, end_col] => {
                Some(Self::new(start_line, start_col, end_line, end_col))
            }
            _ => None,
        }
    }

    /// Check if `other` is fully contained within `self`.
    pub fn contains(&self, other: &SourceRange) -> bool {
        (self.start_line, self.start_col) <= (other.start_line, other.start_col)
            && (other.end_line, other.end_col) <= (self.end_line, self.end_col)
    }

    /// Check if a position lies within `self`, end inclusive.
    pub fn contains_point(&self, line: i32, col: i32) -> bool {
        (self.start_line, self.start_col) <= (line, col) && (line, col) <= (self.end_line, self.end_col)
    }

    /// Sort key: for nested ranges the inner one always compares smaller.
    fn extent(&self) -> (i32, i32) {
        (self.end_line - self.start_line, self.end_col - self.start_col)
    }
}

/// One symbol occurrence kept for position lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceRecord {
    pub symbol: String,
    pub range: SourceRange,
    pub is_definition: bool,
}

/// Innermost occurrence covering a position.
pub fn occurrence_at(occurrences: &[OccurrenceRecord], line: i32, col: i32) -> Option<&OccurrenceRecord> {
    occurrences
        .iter()
        .filter(|o| o.range.contains_point(line, col))
        .min_by_key(|o| o.range.extent())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub documents: usize,
    pub definitions: usize,
    pub edges: usize,
}

/// What one document contributes to the index.
struct DocumentCalls {
    path: String,
    occurrences: Vec<OccurrenceRecord>,
    definitions: Vec<String>,
    /// (callee, caller) in occurrence order.
    edges: Vec<(String, String)>,
}

pub struct ScipIngestor;

impl ScipIngestor {
    /// Memory-map and decode a SCIP index file.
    pub fn load_index(scip_path: &Path) -> Result<scip::types::Index> {
        info!("loading SCIP index from {}", scip_path.display());
        let file = File::open(scip_path)
            .with_context(|| format!("Failed to open SCIP index {}", scip_path.display()))?;
        // SAFETY: the index is opened read-only and only read while `mmap` lives.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to map SCIP index {}", scip_path.display()))?;
        scip::types::Index::parse_from_bytes(&mmap).context("Failed to decode SCIP index")
    }

    pub fn ingest_file(scip_path: &Path, store: &dyn CallerStore) -> Result<IngestSummary> {
        let index = Self::load_index(scip_path)?;
        Self::ingest(&index, store)
    }

    /// Fill `store` from a decoded index. Documents are analyzed in parallel
    /// and written back in index order, so caller lists come out the same on
    /// every run.
    pub fn ingest(index: &scip::types::Index, store: &dyn CallerStore) -> Result<IngestSummary> {
        let analyzed: Vec<DocumentCalls> = index.documents.par_iter().map(analyze_document).collect();

        let mut summary = IngestSummary::default();
        for doc in analyzed {
            for symbol in &doc.definitions {
                store
                    .insert_symbol(&scip_symbol::symbol_ref(symbol))
                    .with_context(|| format!("Failed to store symbol {}", symbol))?;
            }
            for (callee, caller) in &doc.edges {
                store
                    .add_caller(callee, caller)
                    .with_context(|| format!("Failed to store caller of {}", callee))?;
            }
            debug!(
                "{}: {} definitions, {} references attributed",
                doc.path,
                doc.definitions.len(),
                doc.edges.len()
            );
            summary.documents += 1;
            summary.definitions += doc.definitions.len();
            summary.edges += doc.edges.len();
            store
                .insert_document(&doc.path, doc.occurrences)
                .with_context(|| format!("Failed to store occurrences of {}", doc.path))?;
        }

        info!(
            "ingested {} documents: {} definitions, {} caller edges",
            summary.documents, summary.definitions, summary.edges
        );
        Ok(summary)
    }
}

fn analyze_document(document: &scip::types::Document) -> DocumentCalls {
    let mut occurrences = Vec::with_capacity(document.occurrences.len());
    let mut enclosing: Vec<(SourceRange, &str)> = Vec::new();
    let mut definitions: Vec<String> = Vec::new();
    let mut references: Vec<(SourceRange, &str)> = Vec::new();

    // Pass 1: collect occurrences and the definitions that can act as callers
    for occ in &document.occurrences {
        let Some(range) = SourceRange::from_scip(&occ.range) else {
            continue;
        };
        if occ.symbol.is_empty() {
            continue;
        }
        let is_definition = occ.symbol_roles & ROLE_DEFINITION != 0;
        occurrences.push(OccurrenceRecord {
            symbol: occ.symbol.clone(),
            range,
            is_definition,
        });
        if scip_symbol::is_local(&occ.symbol) {
            continue;
        }
        if is_definition {
            // Indexers that know the body emit it as the enclosing range
            let scope = SourceRange::from_scip(&occ.enclosing_range).unwrap_or(range);
            enclosing.push((scope, occ.symbol.as_str()));
            if !definitions.contains(&occ.symbol) {
                definitions.push(occ.symbol.clone());
            }
        } else if occ.symbol_roles & ROLE_IMPORT == 0 {
            references.push((range, occ.symbol.as_str()));
        }
    }

    // Smallest first, so the first match is the innermost enclosing definition
    enclosing.sort_by_key(|(range, _)| range.extent());

    // Pass 2: attribute references to their enclosing definition
    let mut edges: Vec<(String, String)> = Vec::new();
    for (ref_range, callee) in &references {
        let Some((_, caller)) = enclosing.iter().find(|(range, _)| range.contains(ref_range)) else {
            continue;
        };
        if caller == callee {
            continue;
        }
        let edge = (callee.to_string(), caller.to_string());
        if !edges.contains(&edge) {
            edges.push(edge);
        }
    }

    DocumentCalls {
        path: document.relative_path.clone(),
        occurrences,
        definitions,
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store::MemoryCallerStore;

    fn occurrence(symbol: &str, range: Vec<i32>, roles: i32) -> scip::types::Occurrence {
        let mut occ = scip::types::Occurrence::new();
        occ.symbol = symbol.to_string();
        occ.range = range;
        occ.symbol_roles = roles;
        occ
    }

    #[test]
    fn test_source_range_contains() {
        let outer = SourceRange::new(10, 0, 20, 0);
        let inner = SourceRange::new(15, 5, 15, 10);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains_point(20, 0));
        assert!(!outer.contains_point(20, 1));
    }

    #[test]
    fn test_from_scip_range() {
        let r3 = SourceRange::from_scip(&[10, 5, 15]).unwrap();
        assert_eq!(r3.start_line, 10);
        assert_eq!(r3.end_line, 10);

        let r4 = SourceRange::from_scip(&[10, 5, 20, 10]).unwrap();
        assert_eq!(r4.start_line, 10);
        assert_eq!(r4.end_line, 20);

        assert!(SourceRange::from_scip(&[1, 2]).is_none());
    }

    #[test]
    fn test_innermost_definition_is_the_caller() {
        let mut doc = scip::types::Document::new();
        doc.relative_path = "src/lib.rs".to_string();
        doc.occurrences.push(occurrence("pkg::outer", vec![10, 0, 30, 0], ROLE_DEFINITION));
        doc.occurrences.push(occurrence("pkg::inner", vec![15, 0, 25, 0], ROLE_DEFINITION));
        doc.occurrences.push(occurrence("pkg::target", vec![20, 5, 20], 0));
        doc.occurrences.push(occurrence("pkg::inner", vec![12, 4, 9], 0));
        doc.occurrences.push(occurrence("pkg::outer", vec![16, 4, 9], 0)); // recursion into outer from inner
        doc.occurrences.push(occurrence("local 1", vec![21, 4, 9], 0));
        doc.occurrences.push(occurrence("pkg::target", vec![11, 4, 9], ROLE_IMPORT));

        let calls = analyze_document(&doc);
        assert_eq!(calls.definitions, ["pkg::outer", "pkg::inner"]);
        assert_eq!(
            calls.edges,
            [
                ("pkg::target".to_string(), "pkg::inner".to_string()),
                ("pkg::inner".to_string(), "pkg::outer".to_string()),
                ("pkg::outer".to_string(), "pkg::inner".to_string()),
            ]
        );
    }

    #[test]
    fn test_enclosing_range_widens_definition() {
        let mut doc = scip::types::Document::new();
        doc.relative_path = "src/lib.rs".to_string();
        let mut def = occurrence("pkg::caller", vec![3, 3, 9], ROLE_DEFINITION);
        def.enclosing_range = vec![3, 0, 6, 1];
        doc.occurrences.push(def);
        doc.occurrences.push(occurrence("pkg::callee", vec![4, 4, 10], 0));

        let calls = analyze_document(&doc);
        assert_eq!(calls.edges, [("pkg::callee".to_string(), "pkg::caller".to_string())]);
    }

    #[test]
    fn test_self_reference_ignored() {
        let mut index = scip::types::Index::new();
        let mut doc = scip::types::Document::new();
        doc.relative_path = "src/main.rs".to_string();
        doc.occurrences.push(occurrence("pkg::main", vec![10, 0, 20, 0], ROLE_DEFINITION));
        doc.occurrences.push(occurrence("pkg::main", vec![15, 5, 10], 0));
        index.documents.push(doc);

        let store = MemoryCallerStore::default();
        let summary = ScipIngestor::ingest(&index, &store).unwrap();
        assert_eq!(summary.definitions, 1);
        assert_eq!(summary.edges, 0);
        assert!(store.callers_of("pkg::main").unwrap().is_empty());
        assert_eq!(store.document("src/main.rs").unwrap().unwrap().len(), 2);
    }

    #[test]
    fn test_occurrence_at_prefers_smallest() {
        let occs = vec![
            OccurrenceRecord {
                symbol: "pkg::f".to_string(),
                range: SourceRange::new(0, 0, 5, 1),
                is_definition: true,
            },
            OccurrenceRecord {
                symbol: "pkg::g".to_string(),
                range: SourceRange::new(2, 4, 2, 5),
                is_definition: false,
            },
        ];
        assert_eq!(occurrence_at(&occs, 2, 4).unwrap().symbol, "pkg::g");
        assert_eq!(occurrence_at(&occs, 3, 0).unwrap().symbol, "pkg::f");
        assert!(occurrence_at(&occs, 9, 0).is_none());
    }
}
