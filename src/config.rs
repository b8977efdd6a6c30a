//! Configuration management for the package assembler
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (proto-slim.toml)
//! - Environment variables (PROTO_SLIM__*)
//!
//! ## Example config file (proto-slim.toml):
//! ```toml
//! [layout]
//! root = "."
//! base_root = "protobuf_srcs"
//! overlay_root = "protobuf_srcs/tensorflow_serving"
//! output_dir = "tensor_serving_client"
//! services_dir = "tensorflow_serving/apis"
//!
//! [compiler]
//! program = "protoc"
//! output_flags = ["--python_out"]
//! timeout_secs = 300
//!
//! [stubs]
//! source = "overlay_root"
//! source_dir = "tensorflow_serving/apis"
//! files = ["prediction_service_pb2_grpc.py", "model_service_pb2_grpc.py"]
//!
//! [output]
//! staging = true
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the assembly pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Where schemas live and where the package is written
    #[serde(default)]
    pub layout: LayoutConfig,

    /// External compiler settings
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Service stubs relocated after compilation
    #[serde(default)]
    pub stubs: StubConfig,

    /// Output handling
    #[serde(default)]
    pub output: OutputConfig,
}

/// Directory layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Project root; every relative path below resolves against it
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Root of the full schema tree
    #[serde(default = "default_base_root")]
    pub base_root: PathBuf,

    /// Nested root whose schemas take precedence over the base tree
    #[serde(default = "default_overlay_root")]
    pub overlay_root: PathBuf,

    /// Package directory receiving generated modules
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Service stub directory, relative to the output directory
    #[serde(default = "default_services_dir")]
    pub services_dir: PathBuf,

    /// Schema file extension, without the dot
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Relative path prefixes skipped during discovery
    #[serde(default)]
    pub skip_prefixes: Vec<String>,
}

/// How the compiler's working directory is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkdirMode {
    /// Set on the child process only
    #[default]
    PerCommand,
    /// Change the process working directory around each invocation
    Process,
}

/// External compiler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Compiler executable, looked up on PATH when not a path
    #[serde(default = "default_program")]
    pub program: String,

    /// Output flags, each rendered as `<flag>=<output dir>`
    #[serde(default = "default_output_flags")]
    pub output_flags: Vec<String>,

    /// Per-invocation timeout in seconds (0 disables it)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum files per invocation (0 means the whole set at once)
    #[serde(default)]
    pub batch_size: usize,

    /// Working directory handling
    #[serde(default)]
    pub workdir_mode: WorkdirMode,

    /// Compile the base and overlay sets concurrently
    #[serde(default)]
    pub parallel: bool,
}

/// Where stub sources are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StubSource {
    /// Checked-in stubs next to the overlay schemas
    #[default]
    OverlayRoot,
    /// Stubs produced by the compiler in the output tree
    Output,
}

/// Stub relocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StubConfig {
    /// Tree the stub sources are read from
    #[serde(default)]
    pub source: StubSource,

    /// Directory holding the stubs, relative to the source tree
    #[serde(default = "default_services_dir")]
    pub source_dir: PathBuf,

    /// Stub file names
    #[serde(default = "default_stub_files")]
    pub files: Vec<String>,
}

/// Output handling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Generate into a temporary directory and promote on success
    #[serde(default = "default_true")]
    pub staging: bool,

    /// Write the assembly report as JSON to this path
    #[serde(default)]
    pub report: Option<PathBuf>,
}

// Default value functions
fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_base_root() -> PathBuf {
    PathBuf::from("protobuf_srcs")
}

fn default_overlay_root() -> PathBuf {
    PathBuf::from("protobuf_srcs/tensorflow_serving")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("tensor_serving_client")
}

fn default_services_dir() -> PathBuf {
    PathBuf::from("tensorflow_serving/apis")
}

fn default_extension() -> String {
    "proto".to_string()
}

fn default_program() -> String {
    "protoc".to_string()
}

fn default_output_flags() -> Vec<String> {
    vec!["--python_out".to_string()]
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_stub_files() -> Vec<String> {
    vec![
        "prediction_service_pb2_grpc.py".to_string(),
        "model_service_pb2_grpc.py".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            base_root: default_base_root(),
            overlay_root: default_overlay_root(),
            output_dir: default_output_dir(),
            services_dir: default_services_dir(),
            extension: default_extension(),
            skip_prefixes: Vec::new(),
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            output_flags: default_output_flags(),
            timeout_secs: default_timeout_secs(),
            batch_size: 0,
            workdir_mode: WorkdirMode::PerCommand,
            parallel: false,
        }
    }
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            source: StubSource::OverlayRoot,
            source_dir: default_services_dir(),
            files: default_stub_files(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            staging: true,
            report: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "proto-slim.toml",
            ".proto-slim.toml",
            "config/proto-slim.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "proto-slim") {
            let xdg_config = config_dir.config_dir().join("proto-slim.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // PROTO_SLIM__COMPILER__PROGRAM=/opt/protoc/bin/protoc
        builder = builder.add_source(
            Environment::with_prefix("PROTO_SLIM")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Project root as an absolute path
    pub fn root(&self) -> std::io::Result<PathBuf> {
        if self.layout.root.is_absolute() {
            Ok(self.layout.root.clone())
        } else {
            Ok(std::env::current_dir()?.join(&self.layout.root))
        }
    }

    /// Resolve a configured path against the project root
    pub fn resolve(&self, path: &Path) -> std::io::Result<PathBuf> {
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.root()?.join(path))
        }
    }

    pub fn base_root(&self) -> std::io::Result<PathBuf> {
        self.resolve(&self.layout.base_root)
    }

    pub fn overlay_root(&self) -> std::io::Result<PathBuf> {
        self.resolve(&self.layout.overlay_root)
    }

    pub fn output_dir(&self) -> std::io::Result<PathBuf> {
        self.resolve(&self.layout.output_dir)
    }
}
