//! Assembly report
//!
//! Summary of one pipeline run: what was compiled and a checksum of every
//! generated file, so two runs can be compared for reproducibility.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::checksum::Checksum;
use crate::error::{AssemblyError, Result};

/// A file present in the generated package tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Path relative to the package output directory
    pub path: PathBuf,
    pub checksum: Checksum,
    pub size: u64,
}

/// Result of a successful assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub base_root: PathBuf,
    pub overlay_root: PathBuf,
    pub output_dir: PathBuf,
    /// Schema files compiled with the base include path only
    pub base_files: usize,
    /// Schema files compiled with both include paths
    pub overlay_files: usize,
    /// Compiler processes started
    pub invocations: usize,
    /// Whether output went through a staging directory
    pub staged: bool,
    /// Stub destinations, relative to the output directory
    pub stubs: Vec<PathBuf>,
    /// Generated files, sorted by path
    pub artifacts: Vec<GeneratedArtifact>,
}

impl AssemblyReport {
    /// Checksum over every artifact path and checksum, independent of timestamps
    pub fn fingerprint(&self) -> Checksum {
        let combined: Vec<String> = self
            .artifacts
            .iter()
            .map(|a| format!("{}:{}", a.path.display(), a.checksum))
            .collect();
        Checksum::from_bytes(combined.join(",").as_bytes())
    }

    /// Look up an artifact by its package-relative path
    pub fn artifact(&self, path: impl AsRef<Path>) -> Option<&GeneratedArtifact> {
        self.artifacts.iter().find(|a| a.path == path.as_ref())
    }

    /// Write the report as pretty JSON
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Checksum every file under `dir`, paths relative to `dir`
pub fn collect_artifacts(dir: &Path) -> Result<Vec<GeneratedArtifact>> {
    let mut artifacts = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| AssemblyError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).map_err(|_| AssemblyError::PathResolution {
            path: entry.path().to_path_buf(),
            root: dir.to_path_buf(),
        })?;
        artifacts.push(GeneratedArtifact {
            path: relative.to_path_buf(),
            checksum: Checksum::from_file(entry.path())?,
            size: entry.metadata().map_err(|e| AssemblyError::Io(e.into()))?.len(),
        });
    }
    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(artifacts)
}
