//! External schema compiler invocation
//!
//! The compiler is a black box: it receives include paths, output flags and a
//! list of files, and writes generated sources below the output directory at
//! paths mirroring the file arguments. Its working directory is the schema
//! set's own root, which is what makes relative file arguments resolve.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{CompilerConfig, WorkdirMode};
use crate::discovery::SchemaSet;
use crate::error::{AssemblyError, FailureStatus, Result};
use crate::workdir::ScopedWorkingDirectory;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const OUTPUT_GRACE: Duration = Duration::from_millis(200);

/// A single compiler command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileInvocation {
    pub program: String,
    pub include_paths: Vec<PathBuf>,
    pub output_flags: Vec<String>,
    pub output_dir: PathBuf,
    pub working_dir: PathBuf,
    pub files: Vec<PathBuf>,
}

impl CompileInvocation {
    /// Command line arguments, without the program
    ///
    /// Paths are passed through as `OsString`s so non-UTF-8 names reach the
    /// compiler unchanged.
    pub fn args(&self) -> Vec<OsString> {
        let capacity = self.include_paths.len() + self.output_flags.len() + self.files.len();
        let mut args = Vec::with_capacity(capacity);
        for include in &self.include_paths {
            let mut arg = OsString::from("-I");
            arg.push(include);
            args.push(arg);
        }
        for flag in &self.output_flags {
            let mut arg = OsString::from(flag);
            arg.push("=");
            arg.push(&self.output_dir);
            args.push(arg);
        }
        for file in &self.files {
            args.push(file.as_os_str().to_os_string());
        }
        args
    }

    fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.display().to_string()).collect()
    }
}

/// What happened for one schema set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// The set had no files; no process was started
    Skipped,
    /// The compiler ran successfully this many times
    Compiled { invocations: usize, files: usize },
}

impl CompileOutcome {
    pub fn invocations(&self) -> usize {
        match self {
            CompileOutcome::Skipped => 0,
            CompileOutcome::Compiled { invocations, .. } => *invocations,
        }
    }
}

/// Runs the external compiler for a schema set
#[derive(Debug, Clone)]
pub struct CompileInvoker {
    config: CompilerConfig,
}

impl CompileInvoker {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Build the invocations for a set without running them
    pub fn plan(&self, set: &SchemaSet, output_dir: &Path) -> Vec<CompileInvocation> {
        let files: Vec<PathBuf> = set.files.iter().map(|f| f.argument.clone()).collect();
        if files.is_empty() {
            return Vec::new();
        }
        let chunk = match self.config.batch_size {
            0 => files.len(),
            size => size,
        };

        files
            .chunks(chunk)
            .map(|batch| CompileInvocation {
                program: self.config.program.clone(),
                include_paths: set.include_paths.clone(),
                output_flags: self.config.output_flags.clone(),
                output_dir: output_dir.to_path_buf(),
                working_dir: set.root.clone(),
                files: batch.to_vec(),
            })
            .collect()
    }

    /// Compile every file of `set` into `output_dir`
    pub fn invoke(&self, set: &SchemaSet, output_dir: &Path) -> Result<CompileOutcome> {
        if set.is_empty() {
            info!(
                set = ?set.kind,
                root = %set.root.display(),
                "no schema files, skipping compile"
            );
            return Ok(CompileOutcome::Skipped);
        }

        std::fs::create_dir_all(output_dir)?;

        let invocations = self.plan(set, output_dir);
        for invocation in &invocations {
            self.run(invocation)?;
        }

        info!(
            set = ?set.kind,
            files = set.len(),
            invocations = invocations.len(),
            "schema set compiled"
        );
        Ok(CompileOutcome::Compiled {
            invocations: invocations.len(),
            files: set.len(),
        })
    }

    /// Run a single invocation to completion
    pub fn run(&self, invocation: &CompileInvocation) -> Result<()> {
        debug!(
            program = %invocation.program,
            cwd = %invocation.working_dir.display(),
            args = ?invocation.args(),
            "invoking compiler"
        );

        let mut command = Command::new(&invocation.program);
        command
            .args(invocation.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        // Own process group, so a timeout also reaches plugins the compiler spawned.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        // Held until the child has exited.
        let _scope = match self.config.workdir_mode {
            WorkdirMode::PerCommand => {
                command.current_dir(&invocation.working_dir);
                None
            }
            WorkdirMode::Process => {
                Some(ScopedWorkingDirectory::enter(&invocation.working_dir)?)
            }
        };

        let child = command.spawn().map_err(|e| spawn_failure(invocation, e))?;
        self.wait(invocation, child)
    }

    fn wait(&self, invocation: &CompileInvocation, mut child: Child) -> Result<()> {
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = match self.config.timeout_secs {
            0 => None,
            secs => Some(Instant::now() + Duration::from_secs(secs)),
        };

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if deadline.map(|d| Instant::now() >= d).unwrap_or(false) {
                kill_tree(&mut child)?;
                break None;
            }
            thread::sleep(POLL_INTERVAL);
        };

        // Plugins spawned by the compiler inherit its pipes and may keep them
        // open after it is gone; whatever it wrote is already buffered.
        let collect_until = Instant::now() + OUTPUT_GRACE;
        let stdout = stdout
            .map(|rx| collect_output(rx, collect_until))
            .unwrap_or_default();
        let stderr = stderr
            .map(|rx| collect_output(rx, collect_until))
            .unwrap_or_default();

        match status {
            Some(status) if status.success() => {
                if !stderr.trim().is_empty() {
                    debug!(stderr = %stderr.trim(), "compiler warnings");
                }
                Ok(())
            }
            Some(status) => Err(AssemblyError::CompileFailure {
                files: invocation.file_names(),
                status: status.into(),
                diagnostics: diagnostics(&stdout, &stderr),
            }),
            None => Err(AssemblyError::CompileFailure {
                files: invocation.file_names(),
                status: FailureStatus::TimedOut {
                    secs: self.config.timeout_secs,
                },
                diagnostics: diagnostics(&stdout, &stderr),
            }),
        }
    }
}

/// Kill the compiler and, on Unix, every process in its process group
fn kill_tree(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        match Command::new("kill")
            .args(["-s", "KILL", "--", group.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => {}
            Ok(status) => {
                warn!(pgid = child.id(), %status, "could not kill compiler process group")
            }
            Err(e) => {
                warn!(pgid = child.id(), error = %e, "could not kill compiler process group")
            }
        }
    }
    if let Err(e) = child.kill() {
        debug!(error = %e, "compiler already gone");
    }
    child.wait()?;
    Ok(())
}

fn spawn_failure(invocation: &CompileInvocation, e: std::io::Error) -> AssemblyError {
    AssemblyError::CompileFailure {
        files: invocation.file_names(),
        status: FailureStatus::Spawn(format!("{}: {}", invocation.program, e)),
        diagnostics: String::new(),
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

fn collect_output(rx: Receiver<String>, until: Instant) -> String {
    match rx.recv_timeout(until.saturating_duration_since(Instant::now())) {
        Ok(output) => output,
        Err(RecvTimeoutError::Timeout) => {
            warn!("compiler output pipe still held open, abandoning it");
            String::new()
        }
        Err(RecvTimeoutError::Disconnected) => String::new(),
    }
}

fn diagnostics(stdout: &str, stderr: &str) -> String {
    match (stdout.trim(), stderr.trim()) {
        ("", err) => err.to_string(),
        (out, "") => out.to_string(),
        (out, err) => format!("{}\n{}", err, out),
    }
}
