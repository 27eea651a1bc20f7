use std::fs;
use std::path::{Path, PathBuf};

use cargo_metadata::MetadataCommand;
use log::{debug, info, warn};

use crate::domain::language::Language;
use crate::error::LoadError;

/// Directories never searched for sources.
const SKIP_DIRS: &[&str] = &["target", ".git", "node_modules", "__pycache__", "venv", ".venv"];

/// A named group of source files: a workspace member crate, or a Python project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub name: String,
    pub root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub root: PathBuf,
    pub language: Language,
    pub units: Vec<Unit>,
    /// Absolute paths of every source file, sorted.
    pub source_files: Vec<String>,
    /// Set when the descriptor was a prebuilt SCIP index.
    pub index_path: Option<PathBuf>,
}

pub struct ProjectLoader;

impl ProjectLoader {
    /// Load a codebase from a descriptor: a workspace `Cargo.toml`, a project
    /// directory, or a prebuilt `.scip` index sitting in the project root.
    pub fn load(descriptor: &Path, language: Option<Language>) -> Result<LoadedProject, LoadError> {
        let descriptor =
            fs::canonicalize(descriptor).map_err(|_| LoadError::NotFound(descriptor.to_path_buf()))?;

        let is_index = descriptor.extension().is_some_and(|ext| ext == "scip");
        let root = if descriptor.is_file() {
            descriptor
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| LoadError::NotFound(descriptor.clone()))?
        } else {
            descriptor.clone()
        };
        let language = language.or_else(|| Language::detect(&root)).unwrap_or_default();
        info!("loading {} codebase from {}", language, root.display());

        if is_index {
            // The index is authoritative; units only serve position lookups.
            let units = match Self::load_units(&root, language) {
                Ok(units) if !units.is_empty() => units,
                Ok(_) => vec![Self::root_unit(&root)],
                Err(e) => {
                    warn!("no units for prebuilt index, using the root: {}", e);
                    vec![Self::root_unit(&root)]
                }
            };
            let source_files = Self::sources_of(&units, language);
            return Ok(LoadedProject {
                root,
                language,
                units,
                source_files,
                index_path: Some(descriptor),
            });
        }

        let units = Self::load_units(&root, language)?;
        let source_files = Self::sources_of(&units, language);
        if units.is_empty() {
            return Err(LoadError::NoUsableUnits(root));
        }

        Ok(LoadedProject {
            root,
            language,
            units,
            source_files,
            index_path: None,
        })
    }

    /// Units that contain at least one source file. Unreadable or empty
    /// units are reported and skipped.
    fn load_units(root: &Path, language: Language) -> Result<Vec<Unit>, LoadError> {
        let candidates = match language {
            Language::Rust => Self::cargo_units(root)?,
            Language::Python => vec![Self::root_unit(root)],
        };

        let mut units = Vec::new();
        for unit in candidates {
            match collect_sources(&unit.root, language) {
                Ok(files) if files.is_empty() => {
                    warn!("skipping unit {}: no {} sources", unit.name, language)
                }
                Ok(files) => {
                    debug!("unit {}: {} source files", unit.name, files.len());
                    units.push(unit);
                }
                Err(e) => warn!("skipping unit {}: {}", unit.name, e),
            }
        }
        Ok(units)
    }

    fn cargo_units(root: &Path) -> Result<Vec<Unit>, LoadError> {
        let manifest = root.join("Cargo.toml");
        let metadata = MetadataCommand::new()
            .manifest_path(&manifest)
            .no_deps()
            .exec()
            .map_err(|source| LoadError::Metadata {
                path: manifest.clone(),
                source,
            })?;

        let mut units: Vec<Unit> = metadata
            .workspace_packages()
            .into_iter()
            .filter_map(|package| {
                let dir = package.manifest_path.parent()?;
                Some(Unit {
                    name: package.name.clone(),
                    root: dir.as_std_path().to_path_buf(),
                })
            })
            .collect();
        units.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(units)
    }

    fn root_unit(root: &Path) -> Unit {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "root".to_string());
        Unit {
            name,
            root: root.to_path_buf(),
        }
    }

    /// Nested workspace members live under their parent package, so files are deduplicated.
    fn sources_of(units: &[Unit], language: Language) -> Vec<String> {
        let mut files: Vec<String> = units
            .iter()
            .flat_map(|unit| collect_sources(&unit.root, language).unwrap_or_default())
            .map(|path| path.display().to_string())
            .collect();
        files.sort();
        files.dedup();
        files
    }
}

/// Recursively collect the source files of `language` under `dir`.
pub fn collect_sources(dir: &Path, language: Language) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    collect_recursive(dir, language, &mut out)?;
    out.sort();
    Ok(out)
}

fn collect_recursive(dir: &Path, language: Language, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            let skipped = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| SKIP_DIRS.contains(&n));
            if !skipped {
                collect_recursive(&path, language, out)?;
            }
        } else if Language::from_path(&path) == Some(language) {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_collect_sources_skips_build_dirs() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::create_dir_all(dir.path().join("target/debug")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        fs::write(dir.path().join("src/nested/mod.rs"), "").unwrap();
        fs::write(dir.path().join("src/notes.txt"), "").unwrap();
        fs::write(dir.path().join("target/debug/build.rs"), "").unwrap();

        let files = collect_sources(dir.path(), Language::Rust).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| !f.starts_with(dir.path().join("target"))));
    }

    #[test]
    fn test_load_python_project() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("pyproject.toml"), "[project]\nname = \"demo\"\n").unwrap();
        fs::write(dir.path().join("app.py"), "def main():\n    pass\n").unwrap();

        let project = ProjectLoader::load(dir.path(), None).unwrap();
        assert_eq!(project.language, Language::Python);
        assert_eq!(project.units.len(), 1);
        assert_eq!(project.source_files.len(), 1);
        assert!(project.index_path.is_none());
    }

    #[test]
    fn test_load_cargo_workspace() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"demo\"\nversion = \"0.1.0\"\nedition = \"2021\"\n\n[workspace]\n",
        )
        .unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub fn f() {}\n").unwrap();

        let project = ProjectLoader::load(&dir.path().join("Cargo.toml"), None).unwrap();
        assert_eq!(project.language, Language::Rust);
        assert_eq!(project.units[0].name, "demo");
        assert_eq!(project.source_files.len(), 1);
    }

    #[test]
    fn test_prebuilt_index_falls_back_to_root_unit() {
        let dir = tempdir().unwrap();
        let index = dir.path().join("index.scip");
        fs::write(&index, b"").unwrap();

        let project = ProjectLoader::load(&index, Some(Language::Python)).unwrap();
        assert_eq!(project.units.len(), 1);
        assert_eq!(project.units[0].root, fs::canonicalize(dir.path()).unwrap());
        assert!(project.index_path.is_some());
    }

    #[test]
    fn test_missing_descriptor() {
        let err = ProjectLoader::load(Path::new("/no/such/codebase"), None).unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }

    #[test]
    fn test_no_usable_units() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("requirements.txt"), "").unwrap();
        let err = ProjectLoader::load(dir.path(), None).unwrap_err();
        assert!(matches!(err, LoadError::NoUsableUnits(_)));
    }
}
