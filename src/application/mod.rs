// Application layer for calltrace: resolve a target, build its trees, assemble the report.

use anyhow::{Context, Result};
use log::info;

use crate::domain::builder::TraceBuilder;
use crate::domain::exclusion::{ExclusionRule, DEFAULT_TEST_EXCLUSION};
use crate::domain::render::{ReportStyle, TraceReport, TraceSection};
use crate::domain::symbol::{SymbolRef, PATH_SEP};
use crate::error::ResolveError;
use crate::ports::{CallerLookup, SymbolResolver};

/// What the user asked to trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceTarget {
    /// `Type::member`; every matching member is traced.
    QualifiedName(String),
    /// The symbol at a byte offset of a file in a unit.
    Position { unit: String, file: String, offset: usize },
}

/// Split `a::b::Type::member` (or `a.b.Type.member`) into type and member.
pub fn split_qualified(name: &str) -> Result<(&str, &str), ResolveError> {
    let split = name.rsplit_once(PATH_SEP).or_else(|| name.rsplit_once('.'));
    match split {
        Some((type_name, member)) if !type_name.is_empty() && !member.is_empty() => Ok((type_name, member)),
        _ => Err(ResolveError::MalformedName(name.to_string())),
    }
}

pub struct TraceUsecase<'a> {
    pub resolver: &'a dyn SymbolResolver,
    pub lookup: &'a dyn CallerLookup,
    pub builder: TraceBuilder,
    /// Add the test-code exclusion to qualified-name traces.
    pub default_test_exclusion: bool,
    pub style: ReportStyle,
    pub dedupe_entry_points: bool,
}

impl<'a> TraceUsecase<'a> {
    pub fn resolve(&self, target: &TraceTarget) -> Result<Vec<SymbolRef>, ResolveError> {
        match target {
            TraceTarget::QualifiedName(name) => {
                let (type_name, member) = split_qualified(name)?;
                self.resolver.resolve_by_qualified_name(type_name, member)
            }
            TraceTarget::Position { unit, file, offset } => {
                self.resolver.resolve_at_position(unit, file, *offset).map(|s| vec![s])
            }
        }
    }

    /// Trace every symbol the target resolves to, one report section each.
    /// The first failing trace aborts the whole run.
    pub fn run(&self, target: &TraceTarget) -> Result<TraceReport> {
        let symbols = self.resolve(target)?;
        if symbols.len() > 1 {
            info!("{} members match, tracing each", symbols.len());
        }

        let mut builder = self.builder.clone();
        if self.default_test_exclusion && matches!(target, TraceTarget::QualifiedName(_)) {
            builder
                .options_mut()
                .exclusions
                .push(ExclusionRule::new(DEFAULT_TEST_EXCLUSION));
        }

        let mut report = TraceReport::new();
        for symbol in symbols {
            let tree = builder
                .build(symbol.clone(), self.lookup)
                .with_context(|| format!("Failed to trace {}", symbol))?;
            info!(
                "{}: {} nodes, {} entry points",
                symbol,
                tree.len(),
                tree.entry_points().count()
            );
            report.push(TraceSection::from_tree(symbol, &tree, self.style, self.dedupe_entry_points));
        }
        Ok(report)
    }
}
