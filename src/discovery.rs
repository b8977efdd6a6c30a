//! Schema Discovery
//!
//! Walks the base and overlay roots and partitions the schema files into two
//! sets that never share a file. The overlay root lives inside the base root,
//! so every overlay schema is also reachable from the base walk; those files
//! are compiled with the overlay set only.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{AssemblyError, Result};

/// Which of the two schema sets a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetKind {
    Base,
    Overlay,
}

/// A discovered schema file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFile {
    /// Canonical absolute path, the identity of the file
    pub path: PathBuf,
    /// Include root the file was discovered under
    pub root: PathBuf,
    /// Path handed to the compiler
    pub argument: PathBuf,
}

impl SchemaFile {
    /// Path relative to the discovery root
    pub fn relative(&self) -> Result<&Path> {
        self.path
            .strip_prefix(&self.root)
            .map_err(|_| AssemblyError::PathResolution {
                path: self.path.clone(),
                root: self.root.clone(),
            })
    }
}

/// Schema files compiled together under one working directory
#[derive(Debug, Clone)]
pub struct SchemaSet {
    pub kind: SetKind,
    /// The set's own root, also its compiler working directory
    pub root: PathBuf,
    /// Include paths in the order the compiler receives them
    pub include_paths: Vec<PathBuf>,
    pub files: Vec<SchemaFile>,
}

impl SchemaSet {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// File arguments as passed on the compiler command line
    pub fn arguments(&self) -> Vec<&Path> {
        self.files.iter().map(|f| f.argument.as_path()).collect()
    }
}

/// Finds schema files under the two roots and partitions them
#[derive(Debug, Clone)]
pub struct SchemaSetResolver {
    extension: String,
    skip_prefixes: Vec<String>,
}

impl Default for SchemaSetResolver {
    fn default() -> Self {
        Self::new("proto")
    }
}

impl SchemaSetResolver {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            skip_prefixes: Vec::new(),
        }
    }

    /// Skip relative subtrees (e.g. `third_party/`) in both walks
    pub fn with_skip_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.skip_prefixes = prefixes;
        self
    }

    /// Resolve `(base, overlay)` sets.
    ///
    /// Overlay files are passed to the compiler relative to the overlay root,
    /// base files as absolute paths. A base file whose canonical path is also
    /// in the overlay set is dropped from the base set.
    pub fn resolve(&self, base_root: &Path, overlay_root: &Path) -> Result<(SchemaSet, SchemaSet)> {
        let base_root = canonical_root(base_root)?;
        let overlay_root = canonical_root(overlay_root)?;

        if !overlay_root.starts_with(&base_root) {
            warn!(
                base = %base_root.display(),
                overlay = %overlay_root.display(),
                "overlay root is not nested inside the base root"
            );
        }

        let mut overlay_files = Vec::new();
        for path in self.walk(&overlay_root)? {
            let relative = strip_root(&path, &overlay_root)?;
            overlay_files.push(SchemaFile {
                argument: relative,
                root: overlay_root.clone(),
                path,
            });
        }

        let claimed: HashSet<&Path> = overlay_files.iter().map(|f| f.path.as_path()).collect();

        let mut base_files = Vec::new();
        for path in self.walk(&base_root)? {
            if claimed.contains(path.as_path()) {
                debug!(file = %path.display(), "schema claimed by overlay set");
                continue;
            }
            // Subtrees skipped in the overlay stay skipped when reached from the base root.
            if let Ok(relative) = path.strip_prefix(&overlay_root) {
                if self.is_skipped(relative) {
                    debug!(file = %path.display(), "schema skipped below overlay root");
                    continue;
                }
            }
            strip_root(&path, &base_root)?;
            base_files.push(SchemaFile {
                argument: path.clone(),
                root: base_root.clone(),
                path,
            });
        }

        let base = SchemaSet {
            kind: SetKind::Base,
            include_paths: vec![base_root.clone()],
            root: base_root.clone(),
            files: base_files,
        };
        let overlay = SchemaSet {
            kind: SetKind::Overlay,
            include_paths: vec![base_root, overlay_root.clone()],
            root: overlay_root,
            files: overlay_files,
        };

        debug!(base = base.len(), overlay = overlay.len(), "schema sets resolved");
        Ok((base, overlay))
    }

    /// Whether `relative` lies in a skipped subtree, matched by whole components
    fn is_skipped(&self, relative: &Path) -> bool {
        self.skip_prefixes.iter().any(|prefix| relative.starts_with(Path::new(prefix)))
    }

    /// Canonical paths of every schema file under `root`, sorted
    fn walk(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git");

        for entry in walker {
            let entry = entry.map_err(|e| AssemblyError::Discovery {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().map(|ext| ext != self.extension.as_str()).unwrap_or(true) {
                continue;
            }

            if self.is_skipped(path.strip_prefix(root).unwrap_or(path)) {
                continue;
            }

            let canonical = fs::canonicalize(path).map_err(|e| AssemblyError::Discovery {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            found.push(canonical);
        }

        found.sort();
        found.dedup();
        Ok(found)
    }
}

/// Resolve both sets with the default resolver
pub fn resolve_schema_sets(
    base_root: &Path,
    overlay_root: &Path,
) -> Result<(SchemaSet, SchemaSet)> {
    SchemaSetResolver::default().resolve(base_root, overlay_root)
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    let canonical = fs::canonicalize(root).map_err(|e| AssemblyError::Discovery {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !canonical.is_dir() {
        return Err(AssemblyError::Discovery {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    fs::read_dir(&canonical).map_err(|e| AssemblyError::Discovery {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(canonical)
}

fn strip_root(path: &Path, root: &Path) -> Result<PathBuf> {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .map_err(|_| AssemblyError::PathResolution {
            path: path.to_path_buf(),
            root: root.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("// {}\n", relative)).unwrap();
    }

    fn arguments(set: &SchemaSet) -> Vec<PathBuf> {
        set.arguments().into_iter().map(Path::to_path_buf).collect()
    }

    #[test]
    fn test_overlay_wins_partition() {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        touch(base, "a.proto");
        touch(base, "sub/b.proto");
        touch(base, "sub/c.proto");

        let (base_set, overlay_set) = resolve_schema_sets(base, &base.join("sub")).unwrap();

        let canonical_base = fs::canonicalize(base).unwrap();
        assert_eq!(arguments(&base_set), vec![canonical_base.join("a.proto")]);
        assert_eq!(
            arguments(&overlay_set),
            vec![PathBuf::from("b.proto"), PathBuf::from("c.proto")]
        );
        assert_eq!(
            overlay_set.include_paths,
            vec![canonical_base.clone(), canonical_base.join("sub")]
        );
        assert_eq!(base_set.include_paths, vec![canonical_base]);
    }

    #[test]
    fn test_same_name_different_path_is_kept() {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        touch(base, "apis/model.proto");
        touch(base, "serving/apis/model.proto");

        let (base_set, overlay_set) = resolve_schema_sets(base, &base.join("serving")).unwrap();

        assert_eq!(base_set.len(), 1);
        assert!(base_set.files[0].path.ends_with("apis/model.proto"));
        assert!(!base_set.files[0].path.starts_with(&overlay_set.root));
        assert_eq!(arguments(&overlay_set), vec![PathBuf::from("apis/model.proto")]);
    }

    #[test]
    fn test_empty_overlay_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.proto");
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        let (base_set, overlay_set) =
            resolve_schema_sets(dir.path(), &dir.path().join("empty")).unwrap();
        assert_eq!(base_set.len(), 1);
        assert!(overlay_set.is_empty());
    }

    #[test]
    fn test_missing_root_is_discovery_error() {
        let dir = TempDir::new().unwrap();
        let err = resolve_schema_sets(&dir.path().join("nope"), dir.path()).unwrap_err();
        assert!(matches!(err, AssemblyError::Discovery { .. }));
    }

    #[test]
    fn test_file_root_is_discovery_error() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.proto");
        let err = resolve_schema_sets(dir.path(), &dir.path().join("a.proto")).unwrap_err();
        assert!(matches!(err, AssemblyError::Discovery { .. }));
    }

    #[test]
    fn test_extension_and_skip_prefixes() {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        touch(base, "a.proto");
        touch(base, "README.md");
        touch(base, "third_party/x.proto");
        touch(base, ".git/objects/y.proto");
        fs::create_dir_all(base.join("overlay")).unwrap();

        let resolver =
            SchemaSetResolver::default().with_skip_prefixes(vec!["third_party".to_string()]);
        let (base_set, _) = resolver.resolve(base, &base.join("overlay")).unwrap();

        let names: Vec<_> = base_set
            .files
            .iter()
            .map(|f| f.relative().unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("a.proto")]);
    }

    #[test]
    fn test_overlay_skipped_subtree_stays_out_of_base() {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        touch(base, "a.proto");
        touch(base, "serving/b.proto");
        touch(base, "serving/third_party/x.proto");

        let resolver =
            SchemaSetResolver::default().with_skip_prefixes(vec!["third_party".to_string()]);
        let (base_set, overlay_set) = resolver.resolve(base, &base.join("serving")).unwrap();

        let base_names: Vec<_> = base_set
            .files
            .iter()
            .map(|f| f.relative().unwrap().to_path_buf())
            .collect();
        assert_eq!(base_names, vec![PathBuf::from("a.proto")]);
        assert_eq!(arguments(&overlay_set), vec![PathBuf::from("b.proto")]);
    }

    #[test]
    fn test_skip_prefix_matches_whole_components() {
        let dir = TempDir::new().unwrap();
        let base = dir.path();
        touch(base, "third_party/x.proto");
        touch(base, "third_party_ext/y.proto");
        touch(base, "third_partyz.proto");
        fs::create_dir_all(base.join("overlay")).unwrap();

        let resolver =
            SchemaSetResolver::default().with_skip_prefixes(vec!["third_party/".to_string()]);
        let (base_set, _) = resolver.resolve(base, &base.join("overlay")).unwrap();

        let names: Vec<_> = base_set
            .files
            .iter()
            .map(|f| f.relative().unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![PathBuf::from("third_party_ext/y.proto"), PathBuf::from("third_partyz.proto")]
        );
    }

    #[test]
    fn test_relative_outside_root_is_path_resolution_error() {
        let file = SchemaFile {
            path: PathBuf::from("/srv/other/a.proto"),
            root: PathBuf::from("/srv/protos"),
            argument: PathBuf::from("a.proto"),
        };
        assert!(matches!(file.relative(), Err(AssemblyError::PathResolution { .. })));
    }
}
