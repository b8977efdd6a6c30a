//! Shared fixtures: a proto tree shaped like the TensorFlow Serving sources and
//! a fake `protoc` that mirrors its output layout.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use proto_slim::PipelineConfig;
use tempfile::TempDir;

pub const PREDICTION_STUB: &str = "prediction_service_pb2_grpc.py";
pub const MODEL_STUB: &str = "model_service_pb2_grpc.py";

pub struct Fixture {
    pub dir: TempDir,
    pub base: PathBuf,
    pub overlay: PathBuf,
    pub output: PathBuf,
    pub compiler: PathBuf,
    pub log: PathBuf,
}

impl Fixture {
    /// Proto tree with two base files, three overlay files and checked-in stubs
    pub fn tensorflow_serving() -> Self {
        let fixture = Self::empty();
        fixture.write_base(
            "tensorflow/core/framework/types.proto",
            "enum DataType { DT_FLOAT = 1; }",
        );
        fixture.write_base("tensorflow/core/framework/tensor.proto", "message TensorProto {}");
        fixture.write_overlay("tensorflow_serving/apis/predict.proto", "message PredictRequest {}");
        fixture.write_overlay("tensorflow_serving/apis/model.proto", "message ModelSpec {}");
        fixture.write_overlay(
            "tensorflow_serving/apis/prediction_service.proto",
            "service PredictionService {}",
        );
        fixture.write_overlay(
            &format!("tensorflow_serving/apis/{}", PREDICTION_STUB),
            "class PredictionServiceStub(object): pass\n",
        );
        fixture.write_overlay(
            &format!("tensorflow_serving/apis/{}", MODEL_STUB),
            "class ModelServiceStub(object): pass\n",
        );
        fixture
    }

    /// Layout with empty roots and the fake compiler installed
    pub fn empty() -> Self {
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let base = root.join("protobuf_srcs");
        let overlay = base.join("tensorflow_serving");
        let output = root.join("tensor_serving_client");
        fs::create_dir_all(&overlay).unwrap();

        let fixture = Self {
            compiler: root.join("bin/protoc"),
            log: root.join("protoc.log"),
            dir,
            base,
            overlay,
            output,
        };
        fixture.install_compiler(None);
        fixture
    }

    pub fn write_base(&self, relative: &str, content: &str) {
        write(&self.base.join(relative), content);
    }

    pub fn write_overlay(&self, relative: &str, content: &str) {
        write(&self.overlay.join(relative), content);
    }

    /// (Re)write the fake compiler, optionally failing on files ending in `fail_on`
    pub fn install_compiler(&self, fail_on: Option<&str>) {
        let fail_branch = match fail_on {
            Some(name) => format!(
                concat!(
                    "    *{name}) echo \"$a:1:1: Expected top-level statement ",
                    "(e.g. \\\"message\\\").\" >&2; status=1; continue ;;\n",
                ),
                name = name
            ),
            None => String::new(),
        };
        let script = format!(
            r##"#!/bin/sh
log="{log}"
echo "cwd=$(pwd -P)" >> "$log"
out=""
inc=""
for a in "$@"; do
  echo "arg=$a" >> "$log"
  case "$a" in
    -I*) [ -z "$inc" ] && inc="${{a#-I}}" ;;
    --*_out=*) out="${{a#*=}}" ;;
  esac
done
status=0
for a in "$@"; do
  case "$a" in
    -I*|--*) continue ;;
{fail_branch}  esac
  if [ ! -f "$a" ]; then
    echo "$a: File not found." >&2
    status=1
    continue
  fi
  case "$a" in
    /*) rel="${{a#$inc/}}" ;;
    *) rel="$a" ;;
  esac
  target="$out/${{rel%.proto}}_pb2.py"
  mkdir -p "$(dirname "$target")"
  {{ echo "# Generated from $rel"; cat "$a"; }} > "$target"
done
exit $status
"##,
            log = self.log.display(),
            fail_branch = fail_branch,
        );

        write(&self.compiler, &script);
        let mut perms = fs::metadata(&self.compiler).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&self.compiler, perms).unwrap();
    }

    pub fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.layout.root = self.dir.path().to_path_buf();
        config.layout.base_root = self.base.clone();
        config.layout.overlay_root = self.overlay.clone();
        config.layout.output_dir = self.output.clone();
        config.compiler.program = self.compiler.display().to_string();
        config.compiler.timeout_secs = 30;
        config
    }

    /// Working directories the fake compiler was started in, in order
    pub fn compiler_cwds(&self) -> Vec<PathBuf> {
        self.log_lines("cwd=").into_iter().map(PathBuf::from).collect()
    }

    pub fn compiler_args(&self) -> Vec<String> {
        self.log_lines("arg=")
    }

    fn log_lines(&self, prefix: &str) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .filter_map(|l| l.strip_prefix(prefix).map(String::from))
            .collect()
    }

    pub fn output_file(&self, relative: &str) -> PathBuf {
        self.output.join(relative)
    }

    /// Leftover staging directories next to the output directory
    pub fn staging_leftovers(&self) -> Vec<PathBuf> {
        fs::read_dir(self.dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(".proto-slim-staging-"))
                    .unwrap_or(false)
            })
            .collect()
    }
}

pub fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}
