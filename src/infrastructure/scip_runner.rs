/// SCIP Index Generator Runner.
///
/// Runs the language's SCIP indexer in the codebase root:
/// - Rust: `rust-analyzer scip . --output index.scip`
/// - Python: `scip-python index . --output index.scip`
///
/// A cached index is reused while its sources and lockfiles are unchanged.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Context, Result};
use log::{info, warn};

use super::index_cache::{IndexCache, INDEX_FILE};
use crate::domain::language::Language;

// ═══════════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════════

/// Path to an up to date SCIP index for `root`, generating one if needed.
pub fn generate_index(root: &Path, language: Language, sources: &[String]) -> Result<PathBuf> {
    let cache = IndexCache::new(root, language);
    if let Some(cached) = cache.valid_index(sources) {
        return Ok(cached);
    }
    generate_fresh_index(root, language, &cache, sources)
}

/// Run the indexer regardless of the cache state.
pub fn generate_fresh_index(
    root: &Path,
    language: Language,
    cache: &IndexCache,
    sources: &[String],
) -> Result<PathBuf> {
    check_indexer_available(language)?;

    let command = IndexerCommand::for_language(language);
    info!("generating {} index for {}", language, root.display());

    let status = command
        .to_command()
        .current_dir(root)
        .status()
        .with_context(|| format!("Failed to execute {}", command))?;

    if !status.success() {
        bail!("{} failed with exit code: {:?}", command, status.code());
    }

    let output = cache.index_path().to_path_buf();
    if !output.exists() {
        bail!("Expected {} was not created at: {}", INDEX_FILE, output.display());
    }

    if let Err(e) = cache.record(sources) {
        warn!("failed to record index metadata: {:#}", e);
    }

    info!("generated index: {}", output.display());
    Ok(output)
}

// ═══════════════════════════════════════════════════════════════════════════
// Internal Implementation
// ═══════════════════════════════════════════════════════════════════════════

fn check_indexer_available(language: Language) -> Result<()> {
    let program = language.scip_command();
    match Command::new(program).arg("--version").output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout);
            info!("using {}: {}", program, version.trim());
            Ok(())
        }
        Ok(output) => bail!("{} found but returned error: {:?}", program, output.status.code()),
        Err(_) => bail!("{} not found in PATH. {}", program, language.install_instructions()),
    }
}

/// The indexer invocation for a language, kept apart from execution so it can be checked in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl IndexerCommand {
    pub fn for_language(language: Language) -> Self {
        Self {
            program: language.scip_command().to_string(),
            args: [language.scip_subcommand(), ".", "--output", INDEX_FILE]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl std::fmt::Display for IndexerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.program, self.args.join(" "))
    }
}
