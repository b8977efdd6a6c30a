//! Service stub relocation
//!
//! gRPC service stubs come out of a separate plugin pass and do not land where
//! the package imports them from. They are copied into the package's services
//! directory after compilation, always overwriting.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{AssemblyError, Result};

/// One stub to relocate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubCopySpec {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl StubCopySpec {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Specs for `names`, read from `source_dir` and written into `dest_dir`
    pub fn for_files<S: AsRef<str>>(names: &[S], source_dir: &Path, dest_dir: &Path) -> Vec<Self> {
        names
            .iter()
            .map(|name| Self::new(source_dir.join(name.as_ref()), dest_dir.join(name.as_ref())))
            .collect()
    }
}

/// Copies stubs into place
#[derive(Debug, Clone, Default)]
pub struct StubCopier;

impl StubCopier {
    pub fn new() -> Self {
        Self
    }

    /// Copy every spec, returning the destinations written
    pub fn copy(&self, specs: &[StubCopySpec]) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(specs.len());
        for spec in specs {
            self.copy_one(spec)?;
            written.push(spec.destination.clone());
        }
        info!(count = written.len(), "service stubs copied");
        Ok(written)
    }

    fn copy_one(&self, spec: &StubCopySpec) -> Result<()> {
        let metadata = fs::metadata(&spec.source).map_err(|e| AssemblyError::Copy {
            path: spec.source.clone(),
            reason: format!("expected generated stub is missing: {}", e),
        })?;
        if !metadata.is_file() {
            return Err(AssemblyError::Copy {
                path: spec.source.clone(),
                reason: "not a regular file".to_string(),
            });
        }

        if same_file(&spec.source, &spec.destination) {
            debug!(file = %spec.source.display(), "stub already in place");
            return Ok(());
        }

        let copy_err = |e: std::io::Error| AssemblyError::Copy {
            path: spec.destination.clone(),
            reason: e.to_string(),
        };

        if let Some(parent) = spec.destination.parent() {
            fs::create_dir_all(parent).map_err(copy_err)?;
        }
        fs::copy(&spec.source, &spec.destination).map_err(copy_err)?;

        let modified = metadata.modified().map_err(copy_err)?;
        fs::File::options()
            .write(true)
            .open(&spec.destination)
            .and_then(|f| f.set_modified(modified))
            .map_err(copy_err)?;

        debug!(from = %spec.source.display(), to = %spec.destination.display(), "stub copied");
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
