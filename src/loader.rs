//! Loading declaration files from disk

use anyhow::{Context, Result};
use declarative::{Plan, RawStanza};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXTENSION: &str = "toml";

/// Declaration files directly inside `dir`, sorted by file name
///
/// Hidden files and anything without a `.toml` extension are skipped.
pub fn declaration_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("Declarations directory not found: {}", dir.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.with_context(|| format!("Could not read {}", dir.display()))?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let is_toml = entry.path().extension().is_some_and(|ext| ext == EXTENSION);
        if entry.file_type().is_file() && is_toml && !hidden {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Parse one declaration file
pub fn load_file(path: &Path) -> Result<Vec<RawStanza>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    let stanzas = declarative::parse_document(&path.display().to_string(), &text)?;
    log::debug!("{}: {} stanzas", path.display(), stanzas.len());
    Ok(stanzas)
}

/// Parse every declaration file in `dir`, in file name order
///
/// Files are parsed in parallel; stanzas keep file order, then declaration
/// order within each file.
pub fn load_dir(dir: &Path) -> Result<Vec<RawStanza>> {
    let files = declaration_files(dir)?;
    if files.is_empty() {
        log::warn!("no declaration files in {}", dir.display());
    }

    let parsed: Vec<Vec<RawStanza>> = files
        .par_iter()
        .map(|path| load_file(path))
        .collect::<Result<_>>()?;

    Ok(parsed.into_iter().flatten().collect())
}

/// Load and resolve every declaration in `dir`
pub fn load_plan(dir: &Path) -> Result<Plan> {
    let stanzas = load_dir(dir)?;
    let plan = declarative::resolve(stanzas)?;
    log::info!(
        "resolved {} resources with {} edges from {}",
        plan.len(),
        plan.graph().edge_count(),
        dir.display()
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn loads_files_in_name_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "20-hello.toml", "[shell.run.hello]\ncmd = \"echo\"\n");
        write(dir.path(), "10-base.toml", "[apt.update.base]\npackages = []\n");
        write(dir.path(), ".hidden.toml", "[shell.run.hidden]\ncmd = \"true\"\n");
        write(dir.path(), "notes.md", "# not a declaration\n");
        fs::create_dir(dir.path().join("nested.toml")).unwrap();

        let stanzas = load_dir(dir.path()).unwrap();
        let labels: Vec<String> = stanzas.iter().map(|s| s.labels.join(".")).collect();
        assert_eq!(labels, ["apt.update.base", "shell.run.hello"]);
    }

    #[test]
    fn syntax_error_names_the_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "broken.toml", "[apt.update.base\n");

        let err = load_dir(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("broken.toml"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_dir(&dir.path().join("absent")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn plan_spans_files() {
        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "a.toml",
            "[shell.run.hello]\ncmd = \"echo\"\nrequires = \"apt.update.base\"\n",
        );
        write(dir.path(), "b.toml", "[apt.update.base]\npackages = [\"curl\"]\n");

        let plan = load_plan(dir.path()).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.graph().edge_count(), 2);
    }
}
