//! Source providers: where Go files come from
//!
//! Every provider reads and parses its files into [`GoFile`]s, marking test
//! files by the configured test-file pattern and dropping non-test files the
//! exclusion settings leave out. Files that cannot be read are skipped with a
//! warning; files with syntax errors are kept, since the parser is
//! error-tolerant and the strategies simply find less in them.

use crate::config::FileFilter;
use crate::go_ast::GoFile;
use eyre::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Parsed files plus anything that went wrong along the way
#[derive(Debug, Default)]
pub struct LoadResult {
    /// Sorted by path
    pub files: Vec<GoFile>,
    pub warnings: Vec<String>,
}

impl LoadResult {
    pub fn test_files(&self) -> impl Iterator<Item = &GoFile> {
        self.files.iter().filter(|f| f.is_test)
    }

    pub fn source_files(&self) -> impl Iterator<Item = &GoFile> {
        self.files.iter().filter(|f| !f.is_test)
    }
}

/// Trait for providing the Go files of one analysis
pub trait Sources {
    fn load(self, filter: &FileFilter) -> Result<LoadResult>;
}

enum Loaded {
    File(GoFile),
    Excluded,
    Unreadable(String),
}

fn parse_source(path: String, content: String, filter: &FileFilter) -> Result<Loaded> {
    let is_test = filter.is_test_file(&path);
    if !is_test && filter.is_excluded(&path) {
        debug!("excluding {}", path);
        return Ok(Loaded::Excluded);
    }
    Ok(Loaded::File(GoFile::parse(path, content, is_test)?))
}

fn load_path(path: &Path, filter: &FileFilter) -> Result<Loaded> {
    let display = path.to_string_lossy().replace('\\', "/");
    match std::fs::read_to_string(path) {
        Ok(content) => parse_source(display, content, filter),
        Err(e) => {
            let warning = format!("Failed to read {display}: {e}");
            warn!("{}", warning);
            Ok(Loaded::Unreadable(warning))
        }
    }
}

fn collect(outcomes: impl IntoIterator<Item = Result<Loaded>>) -> Result<LoadResult> {
    let mut result = LoadResult::default();
    for outcome in outcomes {
        match outcome? {
            Loaded::File(file) => result.files.push(file),
            Loaded::Excluded => {}
            Loaded::Unreadable(warning) => result.warnings.push(warning),
        }
    }
    result.files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(result)
}

fn load_paths(paths: &[PathBuf], filter: &FileFilter) -> Result<LoadResult> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        let outcomes: Vec<_> = paths
            .par_iter()
            .map(|path| load_path(path, filter))
            .collect();
        collect(outcomes)
    }

    #[cfg(not(feature = "parallel"))]
    {
        collect(paths.iter().map(|path| load_path(path, filter)))
    }
}

/// Sources from an explicit list of file paths
pub struct PathSources(Vec<PathBuf>);

impl PathSources {
    pub fn new(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self(paths.into_iter().map(Into::into).collect())
    }
}

impl Sources for PathSources {
    fn load(self, filter: &FileFilter) -> Result<LoadResult> {
        load_paths(&self.0, filter)
    }
}

/// In-memory sources (useful for testing)
#[derive(Debug, Default)]
pub struct MemorySources(Vec<(String, String)>);

impl MemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file with content
    pub fn add(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.0.push((path.into(), content.into()));
        self
    }
}

impl Sources for MemorySources {
    fn load(self, filter: &FileFilter) -> Result<LoadResult> {
        collect(
            self.0
                .into_iter()
                .map(|(path, content)| parse_source(path, content, filter)),
        )
    }
}

/// Gitignore-aware walk collecting every `*.go` file under a root
#[cfg(feature = "walk")]
pub struct WalkSources {
    root: PathBuf,
}

#[cfg(feature = "walk")]
impl WalkSources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[cfg(feature = "walk")]
impl Sources for WalkSources {
    fn load(self, filter: &FileFilter) -> Result<LoadResult> {
        use ignore::WalkBuilder;

        let mut paths = Vec::new();
        let mut warnings = Vec::new();
        let walker = WalkBuilder::new(&self.root)
            .follow_links(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false)
            .build();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping walk entry under {}: {}", self.root.display(), e);
                    warnings.push(e.to_string());
                    continue;
                }
            };
            let is_go_file = entry.file_type().is_some_and(|t| t.is_file())
                && entry.path().extension().is_some_and(|ext| ext == "go");
            if is_go_file {
                paths.push(entry.into_path());
            }
        }
        debug!("found {} Go files under {}", paths.len(), self.root.display());

        let mut result = load_paths(&paths, filter)?;
        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn filter() -> FileFilter {
        FileFilter::new(&Settings::default()).unwrap()
    }

    #[test]
    fn test_memory_sources() {
        let result = MemorySources::new()
            .add("widget_test.go", "package p\n")
            .add("widget.go", "package p\n")
            .add("widget_sweeper.go", "package p\n")
            .add("base_resource.go", "package p\n")
            .load(&filter())
            .unwrap();

        let paths: Vec<_> = result.files.iter().map(|f| (f.path.as_str(), f.is_test)).collect();
        assert_eq!(paths, vec![("widget.go", false), ("widget_test.go", true)]);
        assert!(result.warnings.is_empty());
        assert_eq!(result.test_files().count(), 1);
        assert_eq!(result.source_files().count(), 1);
    }

    #[test]
    fn test_syntax_errors_are_kept() {
        let result = MemorySources::new()
            .add("broken.go", "package p\n\nfunc (\n")
            .load(&filter())
            .unwrap();
        assert_eq!(result.files.len(), 1);
    }

    #[test]
    fn test_path_sources_missing_file_warns() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("widget.go");
        std::fs::write(&present, "package p\n").unwrap();
        let missing = dir.path().join("gone.go");

        let result = PathSources::new([present, missing]).load(&filter()).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("gone.go"), "got {:?}", result.warnings);
    }

    #[cfg(feature = "walk")]
    #[test]
    fn test_walk_sources_respects_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("internal/provider")).unwrap();
        std::fs::create_dir_all(root.join("generated")).unwrap();
        std::fs::write(root.join(".gitignore"), "generated/\n").unwrap();
        std::fs::write(root.join("internal/provider/widget.go"), "package provider\n").unwrap();
        std::fs::write(root.join("internal/provider/widget_test.go"), "package provider\n").unwrap();
        std::fs::write(root.join("internal/provider/README.md"), "# nope\n").unwrap();
        std::fs::write(root.join("generated/skip.go"), "package generated\n").unwrap();

        let result = WalkSources::new(root).load(&filter()).unwrap();
        let names: Vec<_> = result.files.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["widget.go", "widget_test.go"]);
    }
}
