//! Trace configuration.
//!
//! Optional `calltrace.toml` in the codebase root (or any file passed with
//! `--config`). Every key may be omitted; command-line flags override it.
//!
//! ```toml
//! max_depth = 30
//! exclude = ["::bench", "generated"]
//! depth_policy = "truncate"
//! parallel = true
//! threads = 4
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::domain::builder::{DepthPolicy, TraceOptions, DEFAULT_MAX_DEPTH};
use crate::domain::exclusion::ExclusionFilter;

pub const CONFIG_FILE: &str = "calltrace.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceConfig {
    pub max_depth: usize,
    /// Extra exclusion patterns, applied to every trace.
    pub exclude: Vec<String>,
    /// Apply the test-code exclusion to qualified-name traces.
    pub default_exclusions: bool,
    pub depth_policy: DepthPolicy,
    pub cycle_guard: bool,
    pub parallel: bool,
    pub threads: Option<usize>,
    pub dedupe_entry_points: bool,
    pub language: Option<String>,
    /// Directory of a persistent caller store.
    pub store: Option<PathBuf>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            exclude: Vec::new(),
            default_exclusions: true,
            depth_policy: DepthPolicy::Fail,
            cycle_guard: false,
            parallel: false,
            threads: None,
            dedupe_entry_points: false,
            language: None,
            store: None,
        }
    }
}

impl TraceConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    /// `calltrace.toml` next to the codebase descriptor, or the defaults.
    pub fn discover(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if path.is_file() {
            debug!("using configuration {}", path.display());
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Builder options. The test-code exclusion is not included here since
    /// it depends on how the target was named.
    pub fn to_trace_options(&self) -> TraceOptions {
        TraceOptions {
            max_depth: self.max_depth,
            exclusions: ExclusionFilter::from_patterns(self.exclude.iter().cloned()),
            depth_policy: self.depth_policy,
            cycle_guard: self.cycle_guard,
            parallel: self.parallel,
        }
    }
}
