//! proto-slim
//!
//! Builds a minimized TensorFlow Serving client package: selects the relevant
//! `.proto` files from two overlapping source trees, compiles them with an
//! external `protoc`, and relocates the hand-picked gRPC service stubs.
//!
//! ## Pipeline
//!
//! ```text
//! SchemaSetResolver ──▶ (base set, overlay set)
//!        │
//!        ▼
//! CompileInvoker (cwd = set root) ──▶ generated modules
//!        │
//!        ▼
//! StubCopier ──▶ package services directory
//! ```
//!
//! [`PackageAssembler`] runs the steps in order and stops at the first error.
//! By default the package is generated in a staging directory and only moved
//! into place once every step succeeded.

pub mod assembler;
pub mod checksum;
pub mod compiler;
pub mod config;
pub mod discovery;
pub mod error;
pub mod report;
pub mod stubs;
pub mod workdir;

pub use assembler::{PackageAssembler, PackageLayout};
pub use checksum::Checksum;
pub use compiler::{CompileInvocation, CompileInvoker, CompileOutcome};
pub use config::{PipelineConfig, StubSource, WorkdirMode};
pub use discovery::{resolve_schema_sets, SchemaFile, SchemaSet, SchemaSetResolver, SetKind};
pub use error::{AssemblyError, FailureStatus, Result};
pub use report::{AssemblyReport, GeneratedArtifact};
pub use stubs::{StubCopier, StubCopySpec};
pub use workdir::ScopedWorkingDirectory;
