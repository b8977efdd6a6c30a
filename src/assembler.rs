//! Package Assembly
//!
//! Sequences discovery, the two compile steps and stub relocation.
//!
//! ```text
//! base_root/                      output_dir/
//! ├── tensorflow/core/...   ──▶   ├── tensorflow/core/..._pb2.py
//! └── tensorflow_serving/         └── tensorflow_serving/apis/
//!     (overlay_root)                  ├── predict_pb2.py
//!     └── tensorflow_serving/         ├── prediction_service_pb2_grpc.py
//!         └── apis/...                └── model_service_pb2_grpc.py
//! ```
//!
//! With staging enabled nothing under `output_dir` changes until every step
//! has succeeded.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use chrono::Utc;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::compiler::{CompileInvoker, CompileOutcome};
use crate::config::{PipelineConfig, StubSource, WorkdirMode};
use crate::discovery::{SchemaSet, SchemaSetResolver};
use crate::error::{AssemblyError, Result};
use crate::report::{collect_artifacts, AssemblyReport};
use crate::stubs::{StubCopier, StubCopySpec};

/// Absolute paths the pipeline works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageLayout {
    pub base_root: PathBuf,
    pub overlay_root: PathBuf,
    pub output_dir: PathBuf,
}

/// Orchestrates one package build
#[derive(Debug, Clone)]
pub struct PackageAssembler {
    config: PipelineConfig,
    resolver: SchemaSetResolver,
    invoker: CompileInvoker,
    copier: StubCopier,
}

impl PackageAssembler {
    pub fn new(config: PipelineConfig) -> Self {
        let resolver = SchemaSetResolver::new(config.layout.extension.clone())
            .with_skip_prefixes(config.layout.skip_prefixes.clone());
        let invoker = CompileInvoker::new(config.compiler.clone());
        Self {
            config,
            resolver,
            invoker,
            copier: StubCopier::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve configured paths against the project root
    pub fn layout(&self) -> Result<PackageLayout> {
        Ok(PackageLayout {
            base_root: self.config.base_root()?,
            overlay_root: self.config.overlay_root()?,
            output_dir: self.config.output_dir()?,
        })
    }

    /// Discover and partition the schema files
    pub fn resolve(&self) -> Result<(SchemaSet, SchemaSet)> {
        let layout = self.layout()?;
        self.resolver.resolve(&layout.base_root, &layout.overlay_root)
    }

    /// Run the whole pipeline
    pub fn assemble(&self) -> Result<AssemblyReport> {
        let started_at = Utc::now();
        let layout = self.layout()?;
        info!(
            base = %layout.base_root.display(),
            overlay = %layout.overlay_root.display(),
            output = %layout.output_dir.display(),
            "assembling package"
        );

        let (base, overlay) = self.resolver.resolve(&layout.base_root, &layout.overlay_root)?;
        info!(base = base.len(), overlay = overlay.len(), "schema sets resolved");

        fs::create_dir_all(&layout.output_dir)?;
        let staging = if self.config.output.staging {
            Some(create_staging(&layout.output_dir)?)
        } else {
            None
        };
        let build_dir = staging
            .as_ref()
            .map(|s| s.path().to_path_buf())
            .unwrap_or_else(|| layout.output_dir.clone());

        let (base_outcome, overlay_outcome) = self.compile(&base, &overlay, &build_dir)?;

        let specs = self.stub_specs(&overlay.root, &build_dir);
        let written = self.copier.copy(&specs)?;

        let artifacts = collect_artifacts(&build_dir)?;

        if let Some(staging) = staging {
            promote(staging.path(), &layout.output_dir)?;
            debug!(staging = %staging.path().display(), "staging promoted");
        }

        let stubs = written
            .iter()
            .filter_map(|p| p.strip_prefix(&build_dir).ok().map(Path::to_path_buf))
            .collect();

        let report = AssemblyReport {
            started_at,
            finished_at: Utc::now(),
            base_root: base.root.clone(),
            overlay_root: overlay.root.clone(),
            output_dir: layout.output_dir,
            base_files: base.len(),
            overlay_files: overlay.len(),
            invocations: base_outcome.invocations() + overlay_outcome.invocations(),
            staged: self.config.output.staging,
            stubs,
            artifacts,
        };

        if let Some(path) = &self.config.output.report {
            let path = self.config.resolve(path)?;
            report.write(&path)?;
            info!(report = %path.display(), "assembly report written");
        }

        info!(
            artifacts = report.artifacts.len(),
            invocations = report.invocations,
            "package assembled"
        );
        Ok(report)
    }

    fn compile(
        &self,
        base: &SchemaSet,
        overlay: &SchemaSet,
        build_dir: &Path,
    ) -> Result<(CompileOutcome, CompileOutcome)> {
        let parallel = self.config.compiler.parallel;
        if parallel && self.config.compiler.workdir_mode == WorkdirMode::Process {
            warn!(
                "parallel compile needs per-command working directories, compiling sequentially"
            );
        }

        if parallel && self.config.compiler.workdir_mode == WorkdirMode::PerCommand {
            thread::scope(|s| -> Result<(CompileOutcome, CompileOutcome)> {
                let base_job = s.spawn(|| self.invoker.invoke(base, build_dir));
                let overlay_result = self.invoker.invoke(overlay, build_dir);
                let base_result = match base_job.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                };
                Ok((base_result?, overlay_result?))
            })
        } else {
            let base_outcome = self.invoker.invoke(base, build_dir)?;
            let overlay_outcome = self.invoker.invoke(overlay, build_dir)?;
            Ok((base_outcome, overlay_outcome))
        }
    }

    fn stub_specs(&self, overlay_root: &Path, build_dir: &Path) -> Vec<StubCopySpec> {
        let stubs = &self.config.stubs;
        let source_dir = match stubs.source {
            StubSource::OverlayRoot => overlay_root.join(&stubs.source_dir),
            StubSource::Output => build_dir.join(&stubs.source_dir),
        };
        let dest_dir = build_dir.join(&self.config.layout.services_dir);
        StubCopySpec::for_files(stubs.files.as_slice(), &source_dir, &dest_dir)
    }
}

fn create_staging(output_dir: &Path) -> Result<TempDir> {
    let parent = output_dir.parent().unwrap_or(output_dir);
    tempfile::Builder::new()
        .prefix(".proto-slim-staging-")
        .tempdir_in(parent)
        .map_err(|source| AssemblyError::Staging {
            path: parent.to_path_buf(),
            source,
        })
}

/// Move every staged file into `output_dir`, replacing existing files.
///
/// Files in `output_dir` that the run did not generate are kept, so
/// hand-written package modules survive regeneration.
fn promote(staging: &Path, output_dir: &Path) -> Result<()> {
    for entry in WalkDir::new(staging).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| AssemblyError::Staging {
            path: staging.to_path_buf(),
            source: e.into(),
        })?;
        let relative = entry
            .path()
            .strip_prefix(staging)
            .map_err(|_| AssemblyError::PathResolution {
                path: entry.path().to_path_buf(),
                root: staging.to_path_buf(),
            })?;
        let target = output_dir.join(relative);

        let staging_err = |source: std::io::Error| AssemblyError::Staging {
            path: target.clone(),
            source,
        };

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(staging_err)?;
        } else {
            fs::rename(entry.path(), &target).map_err(staging_err)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_promote_merges_into_output() {
        let staging = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();

        fs::create_dir_all(staging.path().join("apis")).unwrap();
        fs::write(staging.path().join("apis/predict_pb2.py"), "new").unwrap();
        fs::create_dir_all(output.path().join("apis")).unwrap();
        fs::write(output.path().join("apis/predict_pb2.py"), "old").unwrap();
        fs::write(output.path().join("client.py"), "handwritten").unwrap();

        promote(staging.path(), output.path()).unwrap();

        assert_eq!(fs::read_to_string(output.path().join("apis/predict_pb2.py")).unwrap(), "new");
        assert_eq!(fs::read_to_string(output.path().join("client.py")).unwrap(), "handwritten");
    }

    #[test]
    fn test_stub_specs_follow_source_setting() {
        let mut config = PipelineConfig::default();
        let assembler = PackageAssembler::new(config.clone());
        let specs = assembler.stub_specs(Path::new("/protos/serving"), Path::new("/build"));
        assert_eq!(
            specs[0],
            StubCopySpec::new(
                "/protos/serving/tensorflow_serving/apis/prediction_service_pb2_grpc.py",
                "/build/tensorflow_serving/apis/prediction_service_pb2_grpc.py",
            )
        );

        config.stubs.source = StubSource::Output;
        config.stubs.source_dir = PathBuf::from("grpc");
        let assembler = PackageAssembler::new(config);
        let specs = assembler.stub_specs(Path::new("/protos/serving"), Path::new("/build"));
        assert_eq!(specs[1].source, PathBuf::from("/build/grpc/model_service_pb2_grpc.py"));
    }

    #[test]
    fn test_layout_resolves_against_root() {
        let mut config = PipelineConfig::default();
        config.layout.root = PathBuf::from("/srv/client");
        let layout = PackageAssembler::new(config).layout().unwrap();
        assert_eq!(layout.base_root, PathBuf::from("/srv/client/protobuf_srcs"));
        assert_eq!(layout.output_dir, PathBuf::from("/srv/client/tensor_serving_client"));
    }
}
