//! Error types for the package assembly pipeline

use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Result type for assembly operations
pub type Result<T> = std::result::Result<T, AssemblyError>;

/// How a compiler invocation ended when it did not succeed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureStatus {
    /// The process ran and exited with a non-zero status
    Exited(Option<i32>),
    /// The process could not be started (usually: binary not on PATH)
    Spawn(String),
    /// The process outlived the configured timeout and was killed
    TimedOut { secs: u64 },
}

impl From<ExitStatus> for FailureStatus {
    fn from(status: ExitStatus) -> Self {
        FailureStatus::Exited(status.code())
    }
}

impl fmt::Display for FailureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStatus::Exited(Some(code)) => write!(f, "exit status {}", code),
            FailureStatus::Exited(None) => write!(f, "terminated by signal"),
            FailureStatus::Spawn(reason) => write!(f, "could not be started: {}", reason),
            FailureStatus::TimedOut { secs } => write!(f, "timed out after {}s", secs),
        }
    }
}

/// Assembly pipeline errors
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("Schema root {path:?} is not usable: {reason}")]
    Discovery { path: PathBuf, reason: String },

    #[error("Compiler {status} while compiling [{}]\n{diagnostics}", display_files(.files))]
    CompileFailure {
        files: Vec<String>,
        status: FailureStatus,
        diagnostics: String,
    },

    #[error("Stub copy failed for {path:?}: {reason}")]
    Copy { path: PathBuf, reason: String },

    #[error("{path:?} is not beneath schema root {root:?}")]
    PathResolution { path: PathBuf, root: PathBuf },

    #[error("Staging failed at {path:?}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssemblyError {
    /// Files involved in a compile failure, empty for every other kind
    pub fn failed_files(&self) -> &[String] {
        match self {
            AssemblyError::CompileFailure { files, .. } => files,
            _ => &[],
        }
    }
}

fn display_files(files: &[String]) -> String {
    files.join(", ")
}
