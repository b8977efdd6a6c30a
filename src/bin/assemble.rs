//! Package Assembler CLI
//!
//! Compiles the curated proto set and assembles the client package.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use proto_slim::{PackageAssembler, PipelineConfig, SchemaSet};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "proto-slim")]
#[command(about = "Build a minimized TensorFlow Serving client package")]
#[command(version)]
struct Cli {
    /// Config file to load (optional)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log per-file decisions
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile schemas and assemble the package
    Assemble {
        #[command(flatten)]
        paths: PathArgs,

        /// Compiler executable
        #[arg(long)]
        compiler: Option<String>,

        /// Write straight into the output directory
        #[arg(long)]
        no_staging: bool,

        /// Compile the base and overlay sets concurrently
        #[arg(long)]
        parallel: bool,

        /// Write a JSON assembly report
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show how schema files are partitioned, without compiling
    Resolve {
        #[command(flatten)]
        paths: PathArgs,
    },
}

#[derive(Args)]
struct PathArgs {
    /// Root of the full proto tree
    #[arg(long)]
    base_root: Option<PathBuf>,

    /// Nested proto root whose files take precedence
    #[arg(long)]
    overlay_root: Option<PathBuf>,

    /// Package output directory
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl PathArgs {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(p) = self.base_root {
            config.layout.base_root = p;
        }
        if let Some(p) = self.overlay_root {
            config.layout.overlay_root = p;
        }
        if let Some(p) = self.output {
            config.layout.output_dir = p;
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = PipelineConfig::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Assemble {
            paths,
            compiler,
            no_staging,
            parallel,
            report,
        } => {
            paths.apply(&mut config);
            if let Some(program) = compiler {
                config.compiler.program = program;
            }
            if no_staging {
                config.output.staging = false;
            }
            if parallel {
                config.compiler.parallel = true;
            }
            if report.is_some() {
                config.output.report = report;
            }

            let report = PackageAssembler::new(config).assemble()?;
            println!(
                "✅ Assembled {} ({} base + {} overlay schemas, {} files, {} stubs)",
                report.output_dir.display(),
                report.base_files,
                report.overlay_files,
                report.artifacts.len(),
                report.stubs.len()
            );
            println!("   Fingerprint: {}", report.fingerprint());
        }

        Commands::Resolve { paths } => {
            paths.apply(&mut config);
            let (base, overlay) = PackageAssembler::new(config).resolve()?;
            print_set("Base", &base);
            println!();
            print_set("Overlay", &overlay);
        }
    }

    Ok(())
}

fn print_set(title: &str, set: &SchemaSet) {
    println!("{} set: {} file(s), cwd {}", title, set.len(), set.root.display());
    for include in &set.include_paths {
        println!("  -I {}", include.display());
    }
    for arg in set.arguments() {
        println!("    {}", arg.display());
    }
}
