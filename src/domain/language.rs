/// Language Domain Module
///
/// Languages whose codebases can be traced, and the SCIP indexer that
/// provides caller information for each.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Rust,
    Python,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::Rust, Language::Python];

    /// Infer language from file extension.
    pub fn from_extension(ext: &str) -> Option<Language> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.extensions().contains(&ext.to_lowercase().as_str()))
    }

    /// Infer language from a file path.
    pub fn from_path(path: &Path) -> Option<Language> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Guess the language of a project directory from its manifest files.
    pub fn detect(dir: &Path) -> Option<Language> {
        if dir.join("Cargo.toml").is_file() {
            return Some(Language::Rust);
        }
        if ["pyproject.toml", "setup.py", "requirements.txt"]
            .iter()
            .any(|m| dir.join(m).is_file())
        {
            return Some(Language::Python);
        }
        None
    }

    pub fn name(&self) -> &'static str {
        match self {
            Language::Rust => "Rust",
            Language::Python => "Python",
        }
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Rust => &["rs"],
            Language::Python => &["py"],
        }
    }

    /// Lockfiles whose change invalidates a cached index.
    pub fn lockfiles(&self) -> &'static [&'static str] {
        match self {
            Language::Rust => &["Cargo.lock"],
            Language::Python => &["poetry.lock", "requirements.txt", "uv.lock"],
        }
    }

    /// Get the SCIP indexer command for this language.
    pub fn scip_command(&self) -> &'static str {
        match self {
            Language::Rust => "rust-analyzer",
            Language::Python => "scip-python",
        }
    }

    /// Subcommand that makes the indexer emit SCIP.
    pub fn scip_subcommand(&self) -> &'static str {
        match self {
            Language::Rust => "scip",
            Language::Python => "index",
        }
    }

    pub fn install_instructions(&self) -> &'static str {
        match self {
            Language::Rust => "Install rust-analyzer: https://rust-analyzer.github.io/manual.html#installation",
            Language::Python => "Install scip-python: npm install -g @sourcegraph/scip-python",
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rust" | "rs" => Ok(Language::Rust),
            "python" | "py" => Ok(Language::Python),
            other => Err(format!("unsupported language: {}", other)),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
